use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use stackbroker_core::broker::{
    DeprovisionRequest, LastOperation, LastOperationRequest, ProvisionOutcome, ProvisionRequest,
    UpdateOutcome, UpdateRequest,
};
use tracing::info;

use super::{AsyncQuery, originating_platform};
use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

#[derive(Debug, Deserialize)]
pub struct ProvisionBody {
    pub service_id: String,
    pub plan_id: String,
    #[serde(default)]
    pub parameters: Option<Map<String, Value>>,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
    /// Pre-context Cloud Foundry fields, folded into the context when the
    /// platform sends no context object.
    #[serde(default)]
    pub organization_guid: Option<String>,
    #[serde(default)]
    pub space_guid: Option<String>,
}

impl ProvisionBody {
    fn into_context(self) -> (Map<String, Value>, Map<String, Value>) {
        let parameters = self.parameters.unwrap_or_default();
        let context = match self.context {
            Some(context) if !context.is_empty() => context,
            _ => {
                let mut context = Map::new();
                if self.organization_guid.is_some() || self.space_guid.is_some() {
                    context.insert("platform".into(), json!("cloudfoundry"));
                    if let Some(org) = self.organization_guid {
                        context.insert("organization_guid".into(), Value::String(org));
                    }
                    if let Some(space) = self.space_guid {
                        context.insert("space_guid".into(), Value::String(space));
                    }
                }
                context
            }
        };
        (parameters, context)
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateBody {
    pub service_id: String,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub parameters: Option<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeprovisionQuery {
    #[serde(default)]
    pub accepts_incomplete: bool,
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub plan_id: String,
}

pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    body.map(|Json(body)| body)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

/// `PUT /v2/service_instances/{instance_id}`
pub async fn provision(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(query): Query<AsyncQuery>,
    body: Result<Json<ProvisionBody>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let body = json_body(body)?;
    let service_id = body.service_id.clone();
    let plan_id = body.plan_id.clone();
    let (parameters, context) = body.into_context();

    let outcome = state
        .broker
        .provision(&ProvisionRequest {
            instance_id: instance_id.clone(),
            service_id,
            plan_id,
            parameters,
            context,
            accepts_incomplete: query.accepts_incomplete,
        })
        .await?;

    let status = match outcome {
        ProvisionOutcome::Accepted => StatusCode::ACCEPTED,
        ProvisionOutcome::Exists => StatusCode::OK,
    };
    info!(instance_id = %instance_id, status = status.as_u16(), "provision handled");
    Ok((status, Json(json!({}))))
}

/// `DELETE /v2/service_instances/{instance_id}`
pub async fn deprovision(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(query): Query<DeprovisionQuery>,
) -> AppResult<(StatusCode, Json<Value>)> {
    state
        .broker
        .deprovision(&DeprovisionRequest {
            instance_id,
            service_id: query.service_id,
            plan_id: query.plan_id,
            accepts_incomplete: query.accepts_incomplete,
        })
        .await?;
    Ok((StatusCode::ACCEPTED, Json(json!({}))))
}

/// `PATCH /v2/service_instances/{instance_id}`
pub async fn update(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(query): Query<AsyncQuery>,
    body: Result<Json<UpdateBody>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let body = json_body(body)?;
    let outcome = state
        .broker
        .update(&UpdateRequest {
            instance_id,
            service_id: body.service_id,
            plan_id: body.plan_id,
            parameters: body.parameters.unwrap_or_default(),
            accepts_incomplete: query.accepts_incomplete,
        })
        .await?;

    let status = match outcome {
        UpdateOutcome::Accepted => StatusCode::ACCEPTED,
        UpdateOutcome::Unchanged => StatusCode::OK,
    };
    Ok((status, Json(json!({}))))
}

/// `GET /v2/service_instances/{instance_id}/last_operation`
pub async fn last_operation(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<LastOperation>> {
    let status = state
        .broker
        .last_operation(&LastOperationRequest {
            instance_id,
            originating_platform: originating_platform(&headers),
        })
        .await?;
    Ok(Json(status))
}
