pub mod v2;

use axum::{Router, routing::get};

use crate::{handlers::health, infra::app_state::AppState};

pub const HEALTH: &str = "/health";

/// Create the main router: the authenticated broker API plus the open
/// health probe.
pub fn create_api_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route(HEALTH, get(health::health))
        .nest("/v2", v2::create_v2_router(state))
}
