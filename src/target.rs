use std::{
    fmt::{Display, Formatter},
    sync::LazyLock,
};

use regex::Regex;
use url::Url;

use crate::{config::DEFAULT_SCHEME, Error, Result};

static SCHEME_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").expect("valid regex"));

/// A validated absolute `http` or `https` URL, rebuilt in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    url: Url,
    canonical: String,
}

impl RequestTarget {
    /// Normalize a user supplied URL.
    ///
    /// A missing scheme defaults to `https`. The canonical form keeps scheme, host, explicit
    /// port, path, query and fragment; user info is dropped.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let with_scheme = if SCHEME_PREFIX.is_match(raw) {
            raw.to_string()
        } else {
            format!("{}://{}", DEFAULT_SCHEME, raw)
        };
        let parsed = Url::parse(&with_scheme).map_err(|_| Error::InvalidUrl)?;
        let host = match parsed.host_str() {
            Some(host) if !host.is_empty() => host,
            _ => return Err(Error::UnparsableUrl),
        };
        let scheme = parsed.scheme().to_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(Error::InvalidScheme);
        }
        let mut canonical = format!("{}://{}", scheme, host);
        if let Some(port) = parsed.port() {
            canonical.push_str(&format!(":{}", port));
        }
        canonical.push_str(parsed.path());
        if let Some(query) = parsed.query() {
            canonical.push('?');
            canonical.push_str(query);
        }
        if let Some(fragment) = parsed.fragment() {
            canonical.push('#');
            canonical.push_str(fragment);
        }
        let url = Url::parse(&canonical).map_err(|_| Error::UnparsableUrl)?;
        Ok(RequestTarget { url, canonical })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    pub fn is_https(&self) -> bool {
        self.url.scheme() == "https"
    }
}

impl Display for RequestTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical)
    }
}
