use structopt::{clap::AppSettings, StructOpt};

use crate::{transport::RequestOptions, Error, Result};

#[derive(Debug, Clone, StructOpt)]
#[structopt(
    name = "urlinfo",
    rename_all = "kebab-case",
    usage = "urlinfo [options] URL",
    setting = AppSettings::DisableHelpFlags,
    setting = AppSettings::DisableVersion
)]
pub struct CliArgs {
    #[structopt(short = "b", long, help = "show body (only for unencoded text/plain content)")]
    pub body: bool,
    #[structopt(short = "c", long, help = "print verbose cURL info (without SSL info)")]
    pub curlinfo: bool,
    #[structopt(short = "f", long, help = "ignore SSL errors")]
    pub forcessl: bool,
    #[structopt(short = "H", long = "help", help = "print this info and exit")]
    pub show_help: bool,
    #[structopt(
        short = "h",
        long,
        help = "print verbose response headers (without cookies and CSP)"
    )]
    pub headers: bool,
    #[structopt(short = "i", long, help = "print verbose ipinfo")]
    pub ipinfo: bool,
    #[structopt(short = "m", long, help = "mute standard output")]
    pub mute: bool,
    #[structopt(
        short = "p",
        long,
        help = "force plain text content response (consider using with -b)"
    )]
    pub plaintext: bool,
    #[structopt(short = "t", long, help = "show script execution time")]
    pub time: bool,
    #[structopt(short = "v", long = "version", help = "print version and exit")]
    pub show_version: bool,
    #[structopt(help = "url to request, with or without the http(s):// prefix")]
    pub urls: Vec<String>,
}

/// Flags that shape a run, fixed once the command line is parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayOptions {
    pub show_body: bool,
    pub show_headers: bool,
    pub show_ipinfo: bool,
    pub show_curlinfo: bool,
    pub mute: bool,
    pub force_plaintext: bool,
    pub ignore_tls_errors: bool,
    pub show_time: bool,
}

impl DisplayOptions {
    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            plaintext: self.force_plaintext,
            insecure: self.ignore_tls_errors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Version,
    Run { url: String, options: DisplayOptions },
}

/// Parse the process arguments
pub fn args() -> Result<Command> {
    parse(std::env::args_os())
}

pub fn parse<I>(args: I) -> Result<Command>
where
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    let args = CliArgs::from_iter_safe(args).map_err(|e| {
        Error::InvalidArguments(e.message.lines().next().unwrap_or_default().to_string())
    })?;
    // Version wins over help, both win over everything else
    if args.show_version {
        return Ok(Command::Version);
    }
    if args.show_help {
        return Ok(Command::Help);
    }
    let mut urls = args.urls.into_iter();
    let url = match (urls.next(), urls.next()) {
        (None, _) => return Err(Error::NoArgument),
        (Some(_), Some(_)) => return Err(Error::TooManyArguments),
        (Some(url), None) => url,
    };
    Ok(Command::Run {
        url,
        options: DisplayOptions {
            show_body: args.body,
            show_headers: args.headers,
            show_ipinfo: args.ipinfo,
            show_curlinfo: args.curlinfo,
            mute: args.mute,
            force_plaintext: args.plaintext,
            ignore_tls_errors: args.forcessl,
            show_time: args.time,
        },
    })
}

/// The usage text printed for `-H`.
pub fn help() -> String {
    let mut buf = Vec::new();
    if CliArgs::clap().write_help(&mut buf).is_err() {
        return String::new();
    }
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn version() -> String {
    format!("URLInfo version {}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(args: &[&str]) -> Result<Command> {
        parse(std::iter::once("urlinfo").chain(args.iter().copied()))
    }

    #[test]
    fn flags_map_onto_display_options() {
        match run(&["-b", "-c", "-h", "-i", "-p", "example.com"]).unwrap() {
            Command::Run { url, options } => {
                assert_eq!(url, "example.com");
                assert!(options.show_body);
                assert!(options.show_curlinfo);
                assert!(options.show_headers);
                assert!(options.show_ipinfo);
                assert!(options.force_plaintext);
                assert!(!options.mute);
                assert!(!options.ignore_tls_errors);
                assert!(!options.show_time);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn short_flags_can_be_combined() {
        match run(&["-mft", "http://example.com"]).unwrap() {
            Command::Run { options, .. } => {
                assert!(options.mute);
                assert!(options.ignore_tls_errors);
                assert!(options.show_time);
                assert!(options.request_options().insecure);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn help_and_version_short_circuit() {
        assert_eq!(run(&["-H"]).unwrap(), Command::Help);
        assert_eq!(run(&["-v", "a", "b"]).unwrap(), Command::Version);
        assert_eq!(run(&["--help", "a"]).unwrap(), Command::Help);
        assert_eq!(run(&["-H", "-v"]).unwrap(), Command::Version);
    }

    #[test]
    fn exactly_one_url_is_required() {
        assert!(matches!(run(&[]), Err(Error::NoArgument)));
        assert!(matches!(run(&["-b"]), Err(Error::NoArgument)));
        assert!(matches!(
            run(&["a.com", "b.com"]),
            Err(Error::TooManyArguments)
        ));
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(matches!(
            run(&["-x", "a.com"]),
            Err(Error::InvalidArguments(_))
        ));
    }

    #[test]
    fn help_lists_every_flag() {
        let help = help();
        for flag in ["-b", "-c", "-f", "-H", "-h", "-i", "-m", "-p", "-t", "-v"] {
            assert!(help.contains(flag), "missing {} in {}", flag, help);
        }
    }
}
