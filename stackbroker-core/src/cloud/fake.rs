//! In-process cloud whose stacks complete immediately.
//!
//! Backs the `memory` cloud backend for local runs and the test suites.
//! Every call is recorded so callers can assert on side effects.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::debug;

use super::{
    CloudProvider, CloudSession, CredentialDelegate, DetachOutcome, PolicyManager, SecretLookup,
    SecretStore, StackDescription, StackEvent, StackEventPage, StackOrchestrator, StackOutput,
    StackRequest,
};
use crate::error::{BrokerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FakeOp {
    CreateStack,
    UpdateStack,
    DeleteStack,
    CancelUpdateStack,
    DescribeStack,
    DescribeStackEvents,
    GetParameters,
    AttachRolePolicy,
    DetachRolePolicy,
    Invoke,
}

#[derive(Debug, Clone)]
pub struct FakeStack {
    pub request: StackRequest,
    pub description: StackDescription,
    pub events: Vec<StackEvent>,
}

#[derive(Debug, Default)]
struct FakeState {
    next_id: u64,
    stacks: BTreeMap<String, FakeStack>,
    calls: Vec<FakeOp>,
    failures: BTreeSet<FakeOp>,
    outputs: Vec<StackOutput>,
    secrets: BTreeMap<String, String>,
    attached: BTreeSet<(String, String)>,
    delegate_response: Map<String, Value>,
    delegate_calls: Vec<(String, Map<String, Value>)>,
    sessions: Vec<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<FakeState>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outputs every newly created stack reports.
    pub fn with_outputs(self, outputs: Vec<StackOutput>) -> Self {
        self.state.lock().outputs = outputs;
        self
    }

    pub fn set_secret(&self, name: impl Into<String>, value: impl Into<String>) {
        self.state.lock().secrets.insert(name.into(), value.into());
    }

    pub fn set_delegate_response(&self, response: Map<String, Value>) {
        self.state.lock().delegate_response = response;
    }

    /// The next call of `op` fails with a cloud error.
    pub fn fail_next(&self, op: FakeOp) {
        self.state.lock().failures.insert(op);
    }

    pub fn set_stack_status(&self, stack_id: &str, status: &str, reason: Option<&str>) {
        if let Some(stack) = self.state.lock().stacks.get_mut(stack_id) {
            stack.description.status = status.to_string();
            stack.description.status_reason = reason.map(str::to_string);
        }
    }

    pub fn push_event(&self, stack_id: &str, event: StackEvent) {
        if let Some(stack) = self.state.lock().stacks.get_mut(stack_id) {
            stack.events.push(event);
        }
    }

    pub fn attach_existing(&self, role_name: &str, policy_arn: &str) {
        self.state
            .lock()
            .attached
            .insert((role_name.to_string(), policy_arn.to_string()));
    }

    pub fn calls(&self, op: FakeOp) -> usize {
        self.state.lock().calls.iter().filter(|c| **c == op).count()
    }

    pub fn stack(&self, stack_id: &str) -> Option<FakeStack> {
        self.state.lock().stacks.get(stack_id).cloned()
    }

    pub fn stack_ids(&self) -> Vec<String> {
        self.state.lock().stacks.keys().cloned().collect()
    }

    pub fn is_attached(&self, role_name: &str, policy_arn: &str) -> bool {
        self.state
            .lock()
            .attached
            .contains(&(role_name.to_string(), policy_arn.to_string()))
    }

    pub fn delegate_calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.state.lock().delegate_calls.clone()
    }

    /// Parameter maps sessions were requested with, in order.
    pub fn sessions(&self) -> Vec<BTreeMap<String, String>> {
        self.state.lock().sessions.clone()
    }

    fn record(&self, op: FakeOp) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(op);
        if state.failures.remove(&op) {
            return Err(BrokerError::Cloud(format!("injected {op:?} failure")));
        }
        Ok(())
    }

    fn with_stack<T>(&self, stack_id: &str, f: impl FnOnce(&mut FakeStack) -> T) -> Result<T> {
        let mut state = self.state.lock();
        let stack = state
            .stacks
            .get_mut(stack_id)
            .ok_or_else(|| BrokerError::Cloud(format!("Stack with id {stack_id} does not exist")))?;
        Ok(f(stack))
    }
}

#[async_trait]
impl StackOrchestrator for FakeCloud {
    async fn create_stack(&self, request: &StackRequest) -> Result<String> {
        self.record(FakeOp::CreateStack)?;
        let mut state = self.state.lock();
        state.next_id += 1;
        let stack_id = format!(
            "arn:aws:cloudformation:us-east-1:000000000000:stack/{}/{}",
            request.stack_name, state.next_id
        );
        let description = StackDescription {
            status: "CREATE_COMPLETE".to_string(),
            status_reason: None,
            outputs: state.outputs.clone(),
        };
        state.stacks.insert(
            stack_id.clone(),
            FakeStack {
                request: request.clone(),
                description,
                events: Vec::new(),
            },
        );
        debug!(stack_id = %stack_id, "fake stack created");
        Ok(stack_id)
    }

    async fn update_stack(&self, stack_id: &str, request: &StackRequest) -> Result<()> {
        self.record(FakeOp::UpdateStack)?;
        self.with_stack(stack_id, |stack| {
            stack.request.parameters = request.parameters.clone();
            stack.description.status = "UPDATE_COMPLETE".to_string();
            stack.description.status_reason = None;
        })
    }

    async fn delete_stack(&self, stack_id: &str) -> Result<()> {
        self.record(FakeOp::DeleteStack)?;
        self.with_stack(stack_id, |stack| {
            stack.description.status = "DELETE_COMPLETE".to_string();
            stack.description.status_reason = None;
        })
    }

    async fn cancel_update_stack(&self, stack_id: &str) -> Result<()> {
        self.record(FakeOp::CancelUpdateStack)?;
        self.with_stack(stack_id, |stack| {
            stack.description.status = "UPDATE_ROLLBACK_IN_PROGRESS".to_string();
        })
    }

    async fn describe_stack(&self, stack_id: &str) -> Result<StackDescription> {
        self.record(FakeOp::DescribeStack)?;
        self.with_stack(stack_id, |stack| stack.description.clone())
    }

    async fn describe_stack_events(
        &self,
        stack_id: &str,
        next_token: Option<&str>,
    ) -> Result<StackEventPage> {
        self.record(FakeOp::DescribeStackEvents)?;
        // One event per page exercises pagination.
        let index: usize = next_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        self.with_stack(stack_id, |stack| StackEventPage {
            events: stack.events.get(index).cloned().into_iter().collect(),
            next_token: (index + 1 < stack.events.len()).then(|| (index + 1).to_string()),
        })
    }
}

#[async_trait]
impl SecretStore for FakeCloud {
    async fn get_parameters(&self, names: &[String]) -> Result<SecretLookup> {
        self.record(FakeOp::GetParameters)?;
        let state = self.state.lock();
        let mut lookup = SecretLookup::default();
        for name in names {
            match state.secrets.get(name) {
                Some(value) => {
                    lookup.values.insert(name.clone(), value.clone());
                }
                None => lookup.invalid.push(name.clone()),
            }
        }
        Ok(lookup)
    }
}

#[async_trait]
impl PolicyManager for FakeCloud {
    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<()> {
        self.record(FakeOp::AttachRolePolicy)?;
        self.attach_existing(role_name, policy_arn);
        Ok(())
    }

    async fn detach_role_policy(
        &self,
        role_name: &str,
        policy_arn: &str,
    ) -> Result<DetachOutcome> {
        self.record(FakeOp::DetachRolePolicy)?;
        let removed = self
            .state
            .lock()
            .attached
            .remove(&(role_name.to_string(), policy_arn.to_string()));
        Ok(if removed {
            DetachOutcome::Detached
        } else {
            DetachOutcome::AlreadyDetached
        })
    }
}

#[async_trait]
impl CredentialDelegate for FakeCloud {
    async fn invoke(
        &self,
        function_name: &str,
        payload: &Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        self.record(FakeOp::Invoke)?;
        let mut state = self.state.lock();
        state
            .delegate_calls
            .push((function_name.to_string(), payload.clone()));
        Ok(state.delegate_response.clone())
    }
}

#[async_trait]
impl CloudProvider for FakeCloud {
    async fn session(&self, params: &BTreeMap<String, String>) -> Result<CloudSession> {
        self.state.lock().sessions.push(params.clone());
        Ok(CloudSession {
            orchestrator: Arc::new(self.clone()),
            secrets: Arc::new(self.clone()),
            policies: Arc::new(self.clone()),
            delegate: Arc::new(self.clone()),
        })
    }
}
