//! Capabilities the broker needs from the cloud: stack orchestration,
//! secret lookup, role policy attachment and delegated credential functions.
//!
//! The state machine only sees these traits. A [`CloudProvider`] hands out a
//! [`CloudSession`] per request so that instance parameters (region override,
//! cross-account role) can select the account and region the calls run in.

#[cfg(feature = "aws")]
pub mod aws;
pub mod fake;

use std::{collections::BTreeMap, fmt, sync::Arc};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

pub use fake::FakeCloud;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackTag {
    pub key: String,
    pub value: String,
}

impl StackTag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Everything needed to start a create or update run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackRequest {
    pub stack_name: String,
    pub template_url: String,
    pub parameters: BTreeMap<String, String>,
    pub tags: Vec<StackTag>,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackOutput {
    pub key: String,
    pub value: String,
}

impl StackOutput {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackDescription {
    pub status: String,
    pub status_reason: Option<String>,
    pub outputs: Vec<StackOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEvent {
    pub logical_resource_id: String,
    pub resource_status: String,
    pub resource_status_reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct StackEventPage {
    pub events: Vec<StackEvent>,
    pub next_token: Option<String>,
}

#[async_trait]
pub trait StackOrchestrator: Send + Sync {
    /// Starts a create run and returns the stack identifier.
    async fn create_stack(&self, request: &StackRequest) -> Result<String>;

    async fn update_stack(&self, stack_id: &str, request: &StackRequest) -> Result<()>;

    async fn delete_stack(&self, stack_id: &str) -> Result<()>;

    async fn cancel_update_stack(&self, stack_id: &str) -> Result<()>;

    async fn describe_stack(&self, stack_id: &str) -> Result<StackDescription>;

    async fn describe_stack_events(
        &self,
        stack_id: &str,
        next_token: Option<&str>,
    ) -> Result<StackEventPage>;
}

/// Result of a batched, decrypting parameter lookup.
#[derive(Debug, Clone, Default)]
pub struct SecretLookup {
    pub values: BTreeMap<String, String>,
    pub invalid: Vec<String>,
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_parameters(&self, names: &[String]) -> Result<SecretLookup>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachOutcome {
    Detached,
    /// The role or policy no longer exists.
    AlreadyDetached,
}

#[async_trait]
pub trait PolicyManager: Send + Sync {
    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<()>;

    async fn detach_role_policy(&self, role_name: &str, policy_arn: &str)
    -> Result<DetachOutcome>;
}

/// Invokes an external function that derives binding credentials.
///
/// Transport failures are errors; a function-level failure comes back as a
/// normal response carrying an `errorMessage` field.
#[async_trait]
pub trait CredentialDelegate: Send + Sync {
    async fn invoke(
        &self,
        function_name: &str,
        payload: &Map<String, Value>,
    ) -> Result<Map<String, Value>>;
}

/// Cloud clients scoped to one request's account and region.
#[derive(Clone)]
pub struct CloudSession {
    pub orchestrator: Arc<dyn StackOrchestrator>,
    pub secrets: Arc<dyn SecretStore>,
    pub policies: Arc<dyn PolicyManager>,
    pub delegate: Arc<dyn CredentialDelegate>,
}

impl fmt::Debug for CloudSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudSession").finish_non_exhaustive()
    }
}

#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn session(&self, params: &BTreeMap<String, String>) -> Result<CloudSession>;
}

/// IAM role ARN; a role name with a leading path keeps its own slash.
pub fn role_arn(partition: &str, account_id: &str, role_name: &str) -> String {
    if role_name.starts_with('/') {
        format!("arn:{partition}:iam::{account_id}:role{role_name}")
    } else {
        format!("arn:{partition}:iam::{account_id}:role/{role_name}")
    }
}
