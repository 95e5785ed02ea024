use axum::{
    Router, middleware,
    routing::{get, put},
};

use crate::{
    handlers::{bindings, catalog, instances},
    infra::{
        app_state::AppState,
        middleware::{require_api_version, require_basic_auth},
    },
};

pub const CATALOG: &str = "/catalog";
pub const INSTANCE: &str = "/service_instances/{instance_id}";
pub const LAST_OPERATION: &str = "/service_instances/{instance_id}/last_operation";
pub const BINDING: &str = "/service_instances/{instance_id}/service_bindings/{binding_id}";

/// Create all v2 broker API routes. Basic auth runs before the version check.
pub fn create_v2_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route(CATALOG, get(catalog::get_catalog))
        .route(
            INSTANCE,
            put(instances::provision)
                .delete(instances::deprovision)
                .patch(instances::update),
        )
        .route(LAST_OPERATION, get(instances::last_operation))
        .route(BINDING, put(bindings::bind).delete(bindings::unbind))
        .route_layer(middleware::from_fn(require_api_version))
        .route_layer(middleware::from_fn_with_state(state, require_basic_auth))
}
