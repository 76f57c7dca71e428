use std::{io::Write, time::Instant};

use cli::Command;
use config::Settings;
use style::Style;

mod cli;
mod config;
mod driver;
mod exchange;
mod geo;
mod humanize;
mod report;
mod style;
mod target;
#[cfg(test)]
mod testing;
mod tls;
mod transport;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Incorrect URL.")]
    InvalidUrl,
    #[error("Cannot parse url.")]
    UnparsableUrl,
    #[error("Only http:// and https:// schemes are allowed.")]
    InvalidScheme,
    #[error("{0}")]
    Transport(String),
    #[error("No URL specified. Use -H for help.")]
    NoArgument,
    #[error("Too many arguments. Use -H for help.")]
    TooManyArguments,
    #[error("{0} Use -H for help.")]
    InvalidArguments(String),
    #[error("Unexpected certificate: no {0} field.")]
    CertFieldMissing(String),
    #[error("Stopped after {0} redirects.")]
    TooManyRedirects(usize),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_logger();
    let started = Instant::now();
    let command = match cli::args() {
        Ok(command) => command,
        Err(e) => fail(&e),
    };
    let (url, options) = match command {
        Command::Help => {
            println!("{}", cli::help());
            return;
        }
        Command::Version => {
            println!("{}", cli::version());
            return;
        }
        Command::Run { url, options } => (url, options),
    };

    let settings = Settings::from_env();
    let mut stdout = std::io::stdout();
    let outcome = driver::run(&url, &options, &settings, &mut stdout).await;
    if let Err(e) = &outcome {
        println!("\n{}", Style::Error.paint(e.to_string()));
    }
    if options.show_time {
        let elapsed = started.elapsed().as_micros() as u64;
        println!(
            "{}",
            Style::Comment.paint(format!("Script time:\t{}", humanize::micros(elapsed)))
        );
    }
    let _ = stdout.flush();
    if outcome.is_err() {
        std::process::exit(1);
    }
}

fn fail(e: &Error) -> ! {
    println!("\n{}", Style::Error.paint(e.to_string()));
    std::process::exit(1);
}
