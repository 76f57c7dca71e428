use reqwest::Client;
use serde::Deserialize;

use crate::config::{Settings, GEO_TIMEOUT};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IpInfo {
    pub ip: Option<String>,
    pub hostname: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub loc: Option<String>,
    pub org: Option<String>,
    pub postal: Option<String>,
    pub timezone: Option<String>,
    /// Set for reserved and private ranges
    #[serde(default)]
    pub bogon: bool,
    pub status: Option<u16>,
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApiError {
    pub title: String,
    pub message: Option<String>,
}

impl IpInfo {
    /// Present fields in API order, for the verbose dump.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::new();
        let text = [
            ("ip", &self.ip),
            ("hostname", &self.hostname),
            ("city", &self.city),
            ("region", &self.region),
            ("country", &self.country),
            ("loc", &self.loc),
            ("org", &self.org),
            ("postal", &self.postal),
            ("timezone", &self.timezone),
        ];
        for (name, value) in text {
            if let Some(value) = value {
                fields.push((name, value.clone()));
            }
        }
        if self.bogon {
            fields.push(("bogon", "true".to_string()));
        }
        if let Some(status) = self.status {
            fields.push(("status", status.to_string()));
        }
        if let Some(error) = &self.error {
            fields.push(("error", error.title.clone()));
            if let Some(message) = &error.message {
                fields.push(("message", message.clone()));
            }
        }
        fields
    }
}

/// Look up `ip`. Every failure is logged and turns into `None`.
///
/// An API error answer (`{"status": 429, "error": {...}}`) is kept so the report can show it.
pub async fn lookup(ip: &str, settings: &Settings) -> Option<IpInfo> {
    let url = format!(
        "{}/{}?token={}",
        settings.ipinfo_url, ip, settings.ipinfo_token
    );
    let client = match Client::builder().timeout(GEO_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            log::warn!("Cannot build geolocation client: {}", e);
            return None;
        }
    };
    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) => {
            log::warn!("Geolocation lookup for {} failed: {}", ip, e);
            return None;
        }
    };
    let status = response.status();
    let info = match response.json::<IpInfo>().await {
        Ok(info) => info,
        Err(e) => {
            log::warn!("Unreadable geolocation answer for {} ({}): {}", ip, status, e);
            return None;
        }
    };
    if status.is_success() {
        return Some(info);
    }
    match info.error {
        Some(_) => Some(IpInfo {
            status: info.status.or(Some(status.as_u16())),
            ..info
        }),
        None => {
            log::warn!("Geolocation lookup for {} answered {}", ip, status);
            None
        }
    }
}
