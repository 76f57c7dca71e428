use std::io::Write;

use chrono::Utc;

use crate::{
    cli::DisplayOptions, config::Settings, exchange::ExchangeResult, report, target::RequestTarget,
    transport, Error, Result,
};

enum State {
    AwaitingResponse { url: String, hop: usize },
    Done,
}

/// Request `url`, print its report to `out` and keep following redirects.
///
/// Fails with [`Error::TooManyRedirects`] once more than `settings.max_redirects` redirects have
/// been followed; every hop up to that point has already been printed.
pub async fn run(
    url: &str,
    options: &DisplayOptions,
    settings: &Settings,
    out: &mut impl Write,
) -> Result<()> {
    let mut state = State::AwaitingResponse {
        url: url.to_string(),
        hop: 0,
    };
    while let State::AwaitingResponse { url, hop } = state {
        let target = RequestTarget::parse(&url)?;
        log::debug!("Hop {}: requesting {}", hop, target);
        let transfer = transport::fetch(&target, options.request_options()).await?;
        let result = ExchangeResult::build(transfer, options.show_body, settings).await;
        out.write_all(report::render(&result, options, Utc::now())?.as_bytes())?;
        out.flush()?;

        state = match result.redirect_url.filter(|_| result.is_redirect) {
            Some(next) if hop >= settings.max_redirects => {
                log::warn!("Not following {} after {} redirects", next, hop);
                return Err(Error::TooManyRedirects(settings.max_redirects));
            }
            Some(next) => State::AwaitingResponse {
                url: next,
                hop: hop + 1,
            },
            None => State::Done,
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        report::tests::plain,
        testing::{response, serve, settings_for},
    };

    fn canned(path: &str) -> Vec<u8> {
        match path {
            "/old" => response("301 Moved Permanently", &[("Location", "/new")], ""),
            "/new" => response(
                "200 OK",
                &[("Content-Type", "text/plain; charset=utf-8"), ("Server", "canned")],
                "hello world",
            ),
            "/loop" => response("302 Found", &[("Location", "/loop")], ""),
            path if path.starts_with("/geo/") => response(
                "200 OK",
                &[("Content-Type", "application/json")],
                r#"{"ip":"127.0.0.1","bogon":true}"#,
            ),
            _ => response("404 Not Found", &[], "nope"),
        }
    }

    #[tokio::test]
    async fn single_redirect_prints_two_blocks() {
        let addr = serve(canned).await;
        let mut out = Vec::new();
        run(
            &format!("http://{}/old", addr),
            &DisplayOptions::default(),
            &settings_for(addr),
            &mut out,
        )
        .await
        .unwrap();
        let report = plain(&String::from_utf8(out).unwrap());

        assert_eq!(report.matches("Response:\t").count(), 2);
        assert_eq!(report.matches("Redirecting...").count(), 1);
        let (first, second) = report.split_at(report.find("Redirecting...").unwrap());
        assert!(first.contains(&format!("Request:\tGET: http://{}/old\n", addr)));
        assert!(first.contains("Response:\t301 Moved Permanently\n"));
        assert!(first.contains(&format!("Redirection:\thttp://{}/new\n", addr)));
        assert!(!first.contains("Content type"));

        assert!(second.contains(&format!("Request:\tGET: http://{}/new\n", addr)));
        assert!(second.contains("Response:\t200 OK (HTTP/1.1 200 OK)\n"));
        assert!(second.contains("IP info:\tprivate class bogon IP\n"));
        assert!(second.contains("Server info:\tname canned \n"));
        assert!(second.contains("Content type:\ttext/plain charset utf-8 as plain text\n"));
        assert!(second.contains("Content size:\t11 B downloaded at"));
        assert!(second.contains(" no SSL handshake (HTTP)\n"));
        assert!(second.contains("Transfer:\ttime to first byte"));
    }

    #[tokio::test]
    async fn body_is_printed_when_requested() {
        let addr = serve(canned).await;
        let options = DisplayOptions {
            show_body: true,
            mute: true,
            ..DisplayOptions::default()
        };
        let mut out = Vec::new();
        run(&format!("http://{}/new", addr), &options, &settings_for(addr), &mut out)
            .await
            .unwrap();
        let report = plain(&String::from_utf8(out).unwrap());
        assert_eq!(report, "\nBody content:\n\nhello world\n\n");
    }

    #[tokio::test]
    async fn endless_redirects_hit_the_cap() {
        let addr = serve(canned).await;
        let settings = Settings {
            max_redirects: 3,
            ..settings_for(addr)
        };
        let mut out = Vec::new();
        let err = run(
            &format!("http://{}/loop", addr),
            &DisplayOptions::default(),
            &settings,
            &mut out,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::TooManyRedirects(3)));
        let report = plain(&String::from_utf8(out).unwrap());
        assert_eq!(report.matches("Redirecting...").count(), 4);
    }

    #[tokio::test]
    async fn error_status_ends_the_loop() {
        let addr = serve(canned).await;
        let mut out = Vec::new();
        run(
            &format!("http://{}/missing", addr),
            &DisplayOptions::default(),
            &settings_for(addr),
            &mut out,
        )
        .await
        .unwrap();
        let report = plain(&String::from_utf8(out).unwrap());
        assert!(report.contains("Response:\t404 Not Found (HTTP/1.1 404 Not Found)\n"));
        assert!(!report.contains("IP info"));
    }

    #[tokio::test]
    async fn invalid_target_fails_before_any_output() {
        let mut out = Vec::new();
        let err = run(
            "ftp://example.com",
            &DisplayOptions::default(),
            &Settings::default(),
            &mut out,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidScheme));
        assert!(out.is_empty());
    }
}
