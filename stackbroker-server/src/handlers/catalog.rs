use axum::{Json, extract::State};
use serde::Serialize;
use stackbroker_model::ServiceDefinition;

use crate::infra::app_state::AppState;

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub services: Vec<ServiceDefinition>,
}

/// `GET /v2/catalog`: the synchronizer's cached services, with prescribed
/// overrides applied.
pub async fn get_catalog(State(state): State<AppState>) -> Json<CatalogResponse> {
    Json(CatalogResponse {
        services: state.catalog.catalog(),
    })
}
