use axum::{
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use constant_time_eq::constant_time_eq;

use crate::infra::{app_state::AppState, errors::AppError};

const REALM: &str = "Basic realm=\"stackbroker\"";

/// HTTP basic auth against the configured broker credentials. Passes every
/// request through when no credentials are configured.
pub async fn require_basic_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some((username, password)) = state.auth.credentials() else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(decode_basic);

    match presented {
        Some((user, pass)) if credentials_match((&user, &pass), (username, password)) => {
            next.run(request).await
        }
        _ => {
            let mut response = AppError::unauthorized("Invalid or missing broker credentials")
                .into_response();
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(REALM));
            response
        }
    }
}

/// Both halves are always compared so a wrong username costs the same as a
/// wrong password.
fn credentials_match(presented: (&str, &str), expected: (&str, &str)) -> bool {
    let user_ok = constant_time_eq(presented.0.as_bytes(), expected.0.as_bytes());
    let pass_ok = constant_time_eq(presented.1.as_bytes(), expected.1.as_bytes());
    user_ok & pass_ok
}

fn decode_basic(raw: &str) -> Option<(String, String)> {
    let encoded = raw.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}
