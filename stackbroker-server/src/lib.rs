//! # Stackbroker Server
//!
//! Open Service Broker API v2.13 front end for the stackbroker engine.
//!
//! ## Overview
//!
//! - **Catalog**: `GET /v2/catalog` serves the services the background
//!   synchronizer built from the template bucket
//! - **Instances**: provision, update, deprovision and last-operation polling,
//!   each backed by one infrastructure stack
//! - **Bindings**: credentials mapped from stack outputs, optionally through a
//!   delegated function
//! - **Security**: optional HTTP basic auth and an `X-Broker-API-Version`
//!   gate on every broker route
//!
//! Configuration is layered from `.env`, `stackbroker.toml`, the environment
//! and command-line flags; see [`infra::config`].

pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;

use axum::Router;
use tower_http::trace::TraceLayer;

/// Build the complete application router with request tracing.
pub fn create_app(state: AppState) -> Router {
    routes::create_api_router(state.clone())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
