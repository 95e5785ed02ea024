pub mod bindings;
pub mod catalog;
pub mod health;
pub mod instances;

use axum::http::HeaderMap;
use serde::Deserialize;

pub const ORIGINATING_IDENTITY_HEADER: &str = "X-Broker-API-Originating-Identity";

/// `accepts_incomplete` query flag shared by the asynchronous operations.
#[derive(Debug, Default, Deserialize)]
pub struct AsyncQuery {
    #[serde(default)]
    pub accepts_incomplete: bool,
}

/// Platform named in the originating-identity header (`<platform> <base64>`).
pub fn originating_platform(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ORIGINATING_IDENTITY_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.split_whitespace().next())
        .map(str::to_string)
}
