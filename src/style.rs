use colored::{ColoredString, Colorize};

/// Style tags used by the report. Each maps to one fixed ANSI sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Error,
    BoldError,
    BoldSuccess,
    Warning,
    BoldWarning,
    Link,
    Comment,
}

impl Style {
    pub fn paint(self, text: impl AsRef<str>) -> ColoredString {
        let text = text.as_ref();
        match self {
            Style::Error => text.red(),
            Style::BoldError => text.red().bold(),
            Style::BoldSuccess => text.green().bold(),
            Style::Warning => text.yellow(),
            Style::BoldWarning => text.yellow().bold(),
            Style::Link => text.cyan().underline(),
            // xterm-256 colour 238
            Style::Comment => text.truecolor(68, 68, 68),
        }
    }
}
