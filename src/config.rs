use std::time::Duration;

pub const DEFAULT_SCHEME: &str = "https";
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
pub const TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);
pub const GEO_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_REDIRECTS: usize = 10;
pub const DEFAULT_IPINFO_URL: &str = "https://ipinfo.io";

pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36";

pub const ACCEPT_ENCODING: &str = "br;q=1.0, gzip;q=0.8, deflate;q=0.6, compress;q=0.4, *;q=0.1";

/// Headers sent with every request, after `Host` and `User-Agent`.
pub const BROWSER_HEADERS: &[(&str, &str)] = &[
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
    ),
    ("Accept-Language", "en-GB,en-US;q=0.9,en;q=0.8,pl;q=0.7"),
    ("Cache-Control", "no-cache"),
    ("Pragma", "no-cache"),
    ("Referer", "https://www.google.com/"),
    ("Sec-CH-UA-Platform", "macOS"),
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "cross-site"),
    ("Sec-Fetch-User", "?1"),
];

const ENV_IPINFO_TOKEN: &str = "URLINFO_IPINFO_TOKEN";
const ENV_IPINFO_URL: &str = "URLINFO_IPINFO_URL";
const ENV_MAX_REDIRECTS: &str = "URLINFO_MAX_REDIRECTS";

/// Runtime settings that are not command line flags.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base of the geolocation endpoint, the IP is appended as a path segment
    pub ipinfo_url: String,
    pub ipinfo_token: String,
    pub max_redirects: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            ipinfo_url: DEFAULT_IPINFO_URL.to_string(),
            ipinfo_token: String::new(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Settings::default();
        if let Some(url) = lookup(ENV_IPINFO_URL).filter(|url| !url.is_empty()) {
            settings.ipinfo_url = url.trim_end_matches('/').to_string();
        }
        if let Some(token) = lookup(ENV_IPINFO_TOKEN) {
            settings.ipinfo_token = token;
        }
        if let Some(raw) = lookup(ENV_MAX_REDIRECTS) {
            match raw.parse() {
                Ok(max) => settings.max_redirects = max,
                Err(_) => log::warn!(
                    "Ignoring {}={:?}, expected a number of hops",
                    ENV_MAX_REDIRECTS,
                    raw
                ),
            }
        }
        settings
    }
}
