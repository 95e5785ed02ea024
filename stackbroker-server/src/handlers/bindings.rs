use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use stackbroker_core::broker::{BindRequest, UnbindRequest};

use super::instances::json_body;
use crate::infra::{app_state::AppState, errors::AppResult};

#[derive(Debug, Deserialize)]
pub struct BindBody {
    pub service_id: String,
    #[serde(default)]
    pub parameters: Option<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UnbindQuery {
    #[serde(default)]
    pub service_id: String,
}

#[derive(Debug, Serialize)]
pub struct BindResponse {
    pub credentials: Map<String, Value>,
}

/// `PUT /v2/service_instances/{instance_id}/service_bindings/{binding_id}`
pub async fn bind(
    State(state): State<AppState>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    body: Result<Json<BindBody>, JsonRejection>,
) -> AppResult<(StatusCode, Json<BindResponse>)> {
    let body = json_body(body)?;
    let outcome = state
        .broker
        .bind(&BindRequest {
            instance_id,
            binding_id,
            service_id: body.service_id,
            parameters: body.parameters.unwrap_or_default(),
        })
        .await?;

    let status = if outcome.exists {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(BindResponse {
            credentials: outcome.credentials,
        }),
    ))
}

/// `DELETE /v2/service_instances/{instance_id}/service_bindings/{binding_id}`
pub async fn unbind(
    State(state): State<AppState>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    Query(query): Query<UnbindQuery>,
) -> AppResult<Json<Value>> {
    state
        .broker
        .unbind(&UnbindRequest {
            instance_id,
            binding_id,
            service_id: query.service_id,
        })
        .await?;
    Ok(Json(json!({})))
}
