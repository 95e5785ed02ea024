use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::infra::app_state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "broker_id": state.broker.broker_id(),
        "services": state.catalog.catalog().len(),
    }))
}
