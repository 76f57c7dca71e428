use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::{
    cli::DisplayOptions,
    exchange::{ExchangeResult, Headers},
    geo::IpInfo,
    humanize,
    style::Style,
    tls,
    transport::Scheme,
    Result,
};

const DATE_TIME: &str = "%Y-%m-%d %H:%M UTC";
const REQUEST_URL_LIMIT: usize = 80;
const REDIRECT_URL_LIMIT: usize = 85;
const HIDDEN_HEADERS: &[&str] = &["set_cookie", "content_security_policy"];

/// Render the report for one hop. `now` decides whether the certificate has expired.
pub fn render(result: &ExchangeResult, options: &DisplayOptions, now: DateTime<Utc>) -> Result<String> {
    let mut out = String::from("\n");
    if !result.is_redirect {
        out.push_str(&verbose(result, options));
    }
    if options.mute {
        return Ok(out);
    }
    out.push_str(&request_info(result));
    out.push_str(&connection_info(result));
    out.push_str(&response_info(result));
    if result.is_redirect {
        let _ = writeln!(out, "\n{}", Style::Comment.paint("Redirecting..."));
    } else if result.status == 200 {
        out.push_str(&ipinfo_info(result.ipinfo.as_ref()));
        out.push_str(&server_info(&result.headers));
        out.push_str(&proxy_info(&result.headers));
        out.push_str(&cache_info(&result.headers));
        if result.scheme == Scheme::Https {
            out.push_str(&tls_info(result, now)?);
        }
        out.push_str(&server_flags(&result.headers));
        out.push_str(&content_info(result, options));
        out.push_str(&timing_info(result));
    }
    Ok(out)
}

fn verbose(result: &ExchangeResult, options: &DisplayOptions) -> String {
    let mut out = String::new();
    if options.show_curlinfo {
        let _ = write!(out, "{}\n\n", Style::BoldError.paint("cURL info:"));
        out.push_str(&dump(transfer_view(result)));
        out.push('\n');
    }
    if options.show_headers {
        let _ = write!(out, "{}\n\n", Style::BoldError.paint("Response headers:"));
        out.push_str(&dump(header_view(&result.headers)));
        out.push('\n');
    }
    if options.show_ipinfo {
        let _ = write!(out, "{}\n\n", Style::BoldError.paint("IP info response:"));
        match &result.ipinfo {
            Some(info) => out.push_str(&dump(info.fields())),
            None => {
                let _ = writeln!(out, "{}", Style::Comment.paint("no data"));
            }
        }
        out.push('\n');
    }
    if options.show_body {
        out.push_str(&Style::BoldError.paint("Body content:").to_string());
        match (&result.body, &result.content_encoding) {
            (Some(body), _) => {
                let _ = write!(out, "\n\n{}\n\n", body);
            }
            (None, Some(encoding)) => {
                let _ = writeln!(out, "\tencoded with {}", Style::Warning.paint(encoding));
            }
            (None, None) => {
                let _ = writeln!(out, "\t{}", Style::Comment.paint("empty"));
            }
        }
    }
    out
}

/// Transfer metadata for the `-c` dump: everything but body, headers, certificates and
/// geolocation.
pub fn transfer_view(result: &ExchangeResult) -> Vec<(&'static str, String)> {
    let t = &result.timings;
    vec![
        ("url", result.url.clone()),
        ("content_type", result.content_type.clone().unwrap_or_default()),
        ("http_code", result.status.to_string()),
        ("status_line", result.status_line.clone()),
        ("header_size", result.header_size.to_string()),
        ("redirect_url", result.redirect_url.clone().unwrap_or_default()),
        ("effective_method", result.method.clone()),
        ("size_download", result.size_download.to_string()),
        ("speed_download", format!("{:.0}", result.speed_download)),
        ("namelookup_time_us", t.namelookup.to_string()),
        ("connect_time_us", t.connect.to_string()),
        ("appconnect_time_us", t.appconnect.to_string()),
        ("pretransfer_time_us", t.pretransfer.to_string()),
        ("starttransfer_time_us", t.starttransfer.to_string()),
        ("total_time_us", t.total.to_string()),
        ("primary_ip", result.remote_ip.clone()),
        ("primary_port", result.remote_port.to_string()),
        ("local_ip", result.local_ip.clone()),
        ("local_port", result.local_port.to_string()),
        ("http_version", result.http_version.clone()),
        ("scheme", result.scheme.to_string()),
    ]
}

/// Response headers for the `-h` dump, without cookies and CSP.
pub fn header_view(headers: &Headers) -> Vec<(&str, String)> {
    headers
        .iter()
        .filter(|(name, _)| !HIDDEN_HEADERS.contains(name))
        .map(|(name, value)| (name, value.to_string()))
        .collect()
}

fn dump<'a>(fields: impl IntoIterator<Item = (&'a str, String)>) -> String {
    let mut out = String::new();
    for (key, value) in fields {
        let _ = writeln!(out, "{}: {}", title_case(key), Style::Warning.paint(value));
    }
    out
}

/// `content_security_policy` -> `Content Security Policy`
fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() > limit {
        format!("{}[...]", text.chars().take(limit).collect::<String>())
    } else {
        text.to_string()
    }
}

fn request_info(result: &ExchangeResult) -> String {
    format!(
        "Request:\t{}: {}\n",
        result.method,
        Style::Link.paint(truncate(&result.url, REQUEST_URL_LIMIT))
    )
}

fn connection_info(result: &ExchangeResult) -> String {
    let scheme = match result.scheme {
        Scheme::Http => Style::BoldError.paint("HTTP"),
        Scheme::Https => Style::BoldSuccess.paint("HTTPS"),
    };
    format!(
        "Connection:\t{}:{} → {}/{} → {}:{}\n",
        Style::Warning.paint(&result.local_ip),
        Style::Warning.paint(result.local_port.to_string()),
        scheme,
        result.http_version,
        Style::Warning.paint(&result.remote_ip),
        Style::Warning.paint(result.remote_port.to_string()),
    )
}

/// Human label for the status codes the report knows about.
pub fn status_label(code: u16) -> Option<&'static str> {
    Some(match code {
        200 => "OK",
        301 => "Moved Permanently",
        302 => "Moved Temporarily",
        304 => "Not Modified",
        307 => "Permanent Redirect",
        308 => "Moved Temporarily",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Server Error",
        502 => "Bad Gateway",
        504 => "Gateway Timeout",
        _ => return None,
    })
}

fn status_style(code: u16) -> Style {
    match code {
        200 | 304 => Style::BoldSuccess,
        301 | 302 | 307 | 308 => Style::BoldWarning,
        _ => Style::BoldError,
    }
}

fn response_info(result: &ExchangeResult) -> String {
    let mut out = format!(
        "Response:\t{}",
        status_style(result.status).paint(result.status.to_string())
    );
    if let Some(label) = status_label(result.status) {
        let _ = write!(out, " {}", label);
    }
    if let Some(status) = result.headers.get("status") {
        let _ = write!(out, " ({})", status);
    }
    if result.is_redirect {
        if let Some(url) = &result.redirect_url {
            let _ = write!(
                out,
                "\nRedirection:\t{}",
                Style::Link.paint(truncate(url, REDIRECT_URL_LIMIT))
            );
        }
    }
    out.push('\n');
    out
}

fn ipinfo_info(info: Option<&IpInfo>) -> String {
    let mut out = String::from("IP info:\t");
    let info = match info {
        Some(info) => info,
        None => {
            let _ = writeln!(out, "{}", Style::Comment.paint("unavailable"));
            return out;
        }
    };
    if let Some(error) = &info.error {
        let status = info.status.map(|s| s.to_string()).unwrap_or_default();
        let _ = write!(
            out,
            "{}",
            Style::Error.paint(format!("API error {}: {}", status, error.title))
        );
    } else if info.bogon {
        out.push_str("private class bogon IP");
    } else {
        let _ = write!(
            out,
            "company {} from {} ({}, {})",
            Style::Warning.paint(info.org.as_deref().unwrap_or("unknown")),
            Style::Warning.paint(info.city.as_deref().unwrap_or("unknown")),
            info.region.as_deref().unwrap_or("unknown"),
            info.country.as_deref().unwrap_or("unknown"),
        );
    }
    if let Some(hostname) = &info.hostname {
        let _ = write!(out, "\nIP hostname:\t{}", Style::Warning.paint(hostname));
    }
    out.push('\n');
    out
}

/// HTTP and certificate dates shown as `YYYY-MM-DD HH:MM UTC`.
fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(text)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

fn format_date(text: &str) -> String {
    parse_date(text)
        .map(|date| date.format(DATE_TIME).to_string())
        .unwrap_or_else(|| text.to_string())
}

fn server_info(headers: &Headers) -> String {
    let server = headers.get("server").filter(|s| !s.is_empty());
    let date = headers.get("date");
    if server.is_none() && date.is_none() {
        return String::new();
    }
    let mut out = String::from("Server info:\t");
    if let Some(server) = server {
        let _ = write!(out, "name {} ", Style::Warning.paint(server));
    }
    if let Some(date) = date {
        let _ = write!(out, "date {}", Style::Warning.paint(format_date(date)));
    }
    out.push('\n');
    out
}

fn proxy_info(headers: &Headers) -> String {
    match headers.get("via") {
        Some(via) => format!("Proxy info:\tvia {} \n", Style::Warning.paint(via)),
        None => String::new(),
    }
}

fn cache_info(headers: &Headers) -> String {
    let cache_control = headers.get("cache_control");
    let pragma = headers.get("pragma");
    if cache_control.is_none() && pragma.is_none() {
        return String::new();
    }
    let mut out = String::from("Cache info:\t");
    if let Some(cache_control) = cache_control {
        let _ = write!(out, "cache control {} ", Style::Warning.paint(cache_control));
    }
    if let Some(pragma) = pragma {
        let _ = write!(out, "pragma {}", Style::Warning.paint(pragma));
    }
    out.push('\n');
    out
}

fn tls_info(result: &ExchangeResult, now: DateTime<Utc>) -> Result<String> {
    let empty = tls::CertInfo::new();
    let cert = result.certs.first().unwrap_or(&empty);
    let subject = tls::name_field(tls::cert_field(cert, tls::SUBJECT)?, "CN")?;
    let issuer = tls::name_field(tls::cert_field(cert, tls::ISSUER)?, "CN")?;
    let start = tls::cert_field(cert, tls::START_DATE)?;
    let expire = tls::cert_field(cert, tls::EXPIRE_DATE)?;

    let until = match parse_date(expire) {
        Some(date) if date < now => Style::BoldError.paint(date.format(DATE_TIME).to_string()),
        Some(date) => Style::Warning.paint(date.format(DATE_TIME).to_string()),
        None => Style::Warning.paint(expire),
    };
    Ok(format!(
        "SSL subject:\tfor {} by {}\nSSL validity:\tfrom {} until {}\n",
        Style::Warning.paint(subject),
        Style::Warning.paint(issuer),
        Style::Warning.paint(format_date(start)),
        until,
    ))
}

fn server_flags(headers: &Headers) -> String {
    let hsts = headers.get("strict_transport_security");
    let frame_options = headers.get("x_frame_options");
    if hsts.is_none() && frame_options.is_none() {
        return String::new();
    }
    let mut out = String::from("Other flags:\t");
    if let Some(hsts) = hsts {
        let _ = write!(out, "HSTS {} ", Style::Warning.paint(hsts));
    }
    if let Some(frame_options) = frame_options {
        let _ = write!(
            out,
            "X-Frame-Options {}",
            Style::Warning.paint(frame_options.to_lowercase())
        );
    }
    out.push('\n');
    out
}

/// Split `text/html; charset=UTF-8` into the MIME type and the charset value.
pub fn split_content_type(content_type: &str) -> (&str, Option<&str>) {
    let mut parts = content_type.split(';');
    let mime = parts.next().unwrap_or_default().trim();
    let charset = parts
        .next()
        .and_then(|param| param.split_once('='))
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty());
    (mime, charset)
}

/// Descriptive label for a `Content-Encoding` token.
pub fn encoding_label(token: &str) -> &str {
    match token {
        "gzip" => "LZ77 with CRC",
        "compress" => "LZW",
        "deflate" => "zlib with deflate",
        "br" => "Brotli",
        other => other,
    }
}

fn content_info(result: &ExchangeResult, options: &DisplayOptions) -> String {
    let mut out = String::from("Content type:\t");
    match result.content_type.as_deref() {
        Some(content_type) => {
            let (mime, charset) = split_content_type(content_type);
            let _ = write!(out, "{}", Style::Warning.paint(mime));
            if let Some(charset) = charset {
                let _ = write!(out, " charset {}", Style::Warning.paint(charset));
            }
        }
        None => {
            let _ = write!(out, "{}", Style::Comment.paint("unknown"));
        }
    }
    match result.content_encoding.as_deref() {
        Some(encoding) => {
            let label = encoding_label(encoding);
            if label == encoding {
                let _ = write!(out, " encoded with {}", Style::Warning.paint(encoding));
            } else {
                let _ = write!(out, " encoded with {} ({})", Style::Warning.paint(encoding), label);
            }
        }
        None => {
            let _ = write!(out, " as {}", Style::Warning.paint("plain text"));
            if options.force_plaintext {
                let _ = write!(out, " ({})", Style::Error.paint("forced"));
            }
        }
    }

    let size = humanize::bytes(result.size_download, 2);
    // Suspiciously small payloads stand out
    let size = if result.size_download > 1000 {
        Style::Warning.paint(size)
    } else {
        Style::BoldError.paint(size)
    };
    let speed = format!(
        "{}/s",
        humanize::bytes(result.speed_download as u64, 2)
    );
    let _ = write!(
        out,
        "\nContent size:\t{} downloaded at {}\n",
        size,
        Style::Warning.paint(speed)
    );
    out
}

fn flagged(us: u64, threshold: u64) -> String {
    let text = humanize::micros(us);
    if us > threshold {
        Style::BoldError.paint(text).to_string()
    } else {
        Style::Warning.paint(text).to_string()
    }
}

fn timing_info(result: &ExchangeResult) -> String {
    let timings = &result.timings;
    let phases = timings.phases();
    let mut out = format!(
        "Pretransfer:\tDNS lookup {} TCP handshake {}",
        flagged(timings.namelookup, 100_000),
        flagged(phases.tcp_handshake, 200_000),
    );
    match result.scheme {
        Scheme::Https => {
            let _ = write!(out, " SSL handshake {}", flagged(phases.tls_handshake, 200_000));
        }
        Scheme::Http => out.push_str(" no SSL handshake (HTTP)"),
    }
    let _ = writeln!(
        out,
        "\nTransfer:\ttime to first byte {} transfer time {} total time {}",
        flagged(phases.time_to_first_byte, 500_000),
        Style::Warning.paint(humanize::micros(phases.transfer)),
        Style::Warning.paint(humanize::micros(timings.total)),
    );
    out
}
