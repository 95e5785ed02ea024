//! Rejects broker API calls from platforms older than API 2.13.

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::infra::errors::AppError;

pub const API_VERSION_HEADER: &str = "X-Broker-API-Version";
pub const MIN_API_VERSION: (u32, u32) = (2, 13);

pub async fn require_api_version(request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get(API_VERSION_HEADER)
        .and_then(|value| value.to_str().ok());

    match header.and_then(parse_version) {
        Some(version) if version >= MIN_API_VERSION => next.run(request).await,
        _ => {
            let (major, minor) = MIN_API_VERSION;
            AppError::precondition_failed(format!(
                "The {API_VERSION_HEADER} header must be {major}.{minor} or later, got {}",
                header.unwrap_or("nothing")
            ))
            .into_response()
        }
    }
}

fn parse_version(raw: &str) -> Option<(u32, u32)> {
    let (major, minor) = raw.trim().split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_compare_numerically() {
        assert_eq!(parse_version("2.13"), Some((2, 13)));
        assert!(parse_version("2.9").unwrap() < MIN_API_VERSION);
        assert!(parse_version("2.14").unwrap() > MIN_API_VERSION);
        assert!(parse_version("3.0").unwrap() > MIN_API_VERSION);
        assert_eq!(parse_version("2"), None);
        assert_eq!(parse_version("two.thirteen"), None);
    }
}
