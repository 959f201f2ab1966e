use serde::{Deserialize, Serialize};

/// One polled device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Unique name, used as the metrics label.
    pub name: String,
    /// Address of the device (`host` or `host:port`).
    pub hostname: String,
}

impl Target {
    pub fn new(name: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
        }
    }
}

/// A complete HTTP response as assembled by the
/// [`ResponseParser`](crate::response::ResponseParser).
///
/// Only constructed when the status code, status text and content type are all
/// present; anything less is reported as an error instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status_code: u16,
    pub status_text: String,
    /// Lower-cased `Content-Type` header value.
    pub content_type: String,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// The content type without parameters, e.g. `application/json` for
    /// `application/json; charset=utf-8`.
    pub fn mime_essence(&self) -> &str {
        self.content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
    }
}

/// Normalized telemetry from one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Active power in watts.
    pub power: f64,
    pub voltage: f64,
    pub current: f64,
    pub temperature_c: f64,
    pub temperature_f: f64,
}
