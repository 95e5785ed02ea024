//! Request and response shapes for the broker operations.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::credentials::Credentials;

#[derive(Debug, Clone, Default)]
pub struct ProvisionRequest {
    pub instance_id: String,
    pub service_id: String,
    pub plan_id: String,
    pub parameters: Map<String, Value>,
    /// Platform context; selects the cluster and namespace scope.
    pub context: Map<String, Value>,
    pub accepts_incomplete: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DeprovisionRequest {
    pub instance_id: String,
    pub service_id: String,
    pub plan_id: String,
    pub accepts_incomplete: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub instance_id: String,
    pub service_id: String,
    pub plan_id: Option<String>,
    pub parameters: Map<String, Value>,
    pub accepts_incomplete: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LastOperationRequest {
    pub instance_id: String,
    /// Platform named in the originating-identity header, if any.
    pub originating_platform: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BindRequest {
    pub instance_id: String,
    pub binding_id: String,
    pub service_id: String,
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct UnbindRequest {
    pub instance_id: String,
    pub binding_id: String,
    pub service_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The stack run was started or is still running.
    Accepted,
    /// An identical instance is already fully provisioned.
    Exists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Accepted,
    /// No parameter changed, so no stack update was issued.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperationState {
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "succeeded")]
    Succeeded,
    #[serde(rename = "failed")]
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastOperation {
    pub state: OperationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindOutcome {
    pub credentials: Credentials,
    /// The binding already existed with the same attributes.
    pub exists: bool,
}
