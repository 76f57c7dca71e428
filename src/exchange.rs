use crate::{
    config::Settings,
    geo::{self, IpInfo},
    tls::CertInfo,
    transport::{Scheme, Timings, Transfer},
};

/// Response headers keyed by lower-cased, underscore separated names, in arrival order.
///
/// A repeated header keeps its first position and its last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn insert(&mut self, name: String, value: String) {
        match self.0.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Parse a raw header block.
///
/// The first non-empty line becomes the synthetic `status` entry, every other line is split on
/// its first colon. Lines without a colon are dropped.
pub fn parse_header_block(block: &[u8]) -> Headers {
    let text = String::from_utf8_lossy(block);
    let mut lines = text.split("\r\n").filter(|line| !line.is_empty());
    let mut headers = Headers::default();
    if let Some(status) = lines.next() {
        headers.insert("status".to_string(), status.trim().to_string());
    }
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim().to_lowercase().replace('-', "_");
            headers.insert(name, value.trim().to_string());
        }
    }
    headers
}

/// One hop, as shown by the report.
#[derive(Debug, Clone)]
pub struct ExchangeResult {
    pub url: String,
    pub method: String,
    pub status: u16,
    pub status_line: String,
    pub local_ip: String,
    pub local_port: u16,
    pub remote_ip: String,
    pub remote_port: u16,
    pub scheme: Scheme,
    pub http_version: String,
    pub redirect_url: Option<String>,
    pub is_redirect: bool,
    pub headers: Headers,
    pub header_size: usize,
    pub certs: Vec<CertInfo>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub size_download: u64,
    pub speed_download: f64,
    pub timings: Timings,
    pub body: Option<String>,
    pub ipinfo: Option<IpInfo>,
}

impl ExchangeResult {
    /// Build the model for a transfer.
    ///
    /// A redirect is returned as-is; otherwise headers are parsed, the body is captured when
    /// `capture_body` is set and the content is not encoded, and the remote IP is geolocated.
    pub async fn build(mut transfer: Transfer, capture_body: bool, settings: &Settings) -> Self {
        let raw = std::mem::take(&mut transfer.raw);
        let mut result = ExchangeResult::bare(transfer);
        if result.is_redirect {
            return result;
        }

        let (head, body) = raw.split_at(result.header_size.min(raw.len()));
        result.headers = parse_header_block(head);
        result.content_type = result.headers.get("content_type").map(str::to_string);
        result.content_encoding = result.headers.get("content_encoding").map(str::to_string);
        if capture_body && result.content_encoding.is_none() {
            result.body = Some(String::from_utf8_lossy(body).into_owned());
        }
        result.ipinfo = geo::lookup(&result.remote_ip, settings).await;
        result
    }

    fn bare(transfer: Transfer) -> Self {
        let is_redirect = transfer
            .redirect_url
            .as_deref()
            .map_or(false, |url| !url.is_empty());
        ExchangeResult {
            url: transfer.url,
            method: transfer.method,
            status: transfer.status,
            status_line: transfer.status_line,
            local_ip: transfer.local.ip().to_string(),
            local_port: transfer.local.port(),
            remote_ip: transfer.remote.ip().to_string(),
            remote_port: transfer.remote.port(),
            scheme: transfer.scheme,
            http_version: transfer.http_version,
            redirect_url: transfer.redirect_url,
            is_redirect,
            headers: Headers::default(),
            header_size: transfer.header_size,
            certs: transfer.certs,
            content_type: None,
            content_encoding: None,
            size_download: transfer.size_download,
            speed_download: transfer.speed_download,
            timings: transfer.timings,
            body: None,
            ipinfo: None,
        }
    }
}
