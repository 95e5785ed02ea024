//! Naming, tagging and status rules for the stacks behind service instances.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::cloud::{StackOrchestrator, StackTag};

/// Instance parameters that configure the cloud session rather than the stack.
pub const NON_STACK_PARAMS: &[&str] = &[
    "aws_access_key",
    "aws_secret_key",
    "region",
    "target_role_name",
    "target_account_id",
];

pub const CAPABILITY_NAMED_IAM: &str = "CAPABILITY_NAMED_IAM";

const STACK_NAME_PREFIX: &str = "aws-service-broker";
const MAX_STACK_NAME_LEN: usize = 128;
const TAG_PREFIX: &str = "aws-service-broker";
const TAG_LIST_PARAMS: [&str; 2] = ["user_tags", "admin_tags"];
const UNKNOWN_SCOPE: &str = "unknown";

/// Stack names allow only ASCII alphanumerics and hyphens, up to 128 chars.
pub fn stack_name(service_name: &str, instance_id: &str) -> String {
    format!("{STACK_NAME_PREFIX}-{service_name}-{instance_id}")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .take(MAX_STACK_NAME_LEN)
        .collect()
}

pub fn stack_parameters(params: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    params
        .iter()
        .filter(|(name, _)| !NON_STACK_PARAMS.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Value")]
    value: String,
}

/// Broker ownership tags followed by any tags supplied through the
/// `user_tags` and `admin_tags` parameters.
pub fn build_tags(
    broker_id: &str,
    instance_id: &str,
    cluster: &str,
    namespace: &str,
    params: &BTreeMap<String, String>,
) -> Result<Vec<StackTag>, serde_json::Error> {
    let mut tags = vec![
        StackTag::new(format!("{TAG_PREFIX}:broker-id"), broker_id),
        StackTag::new(format!("{TAG_PREFIX}:instance-id"), instance_id),
        StackTag::new(format!("{TAG_PREFIX}:cluster"), cluster),
        StackTag::new(format!("{TAG_PREFIX}:namespace"), namespace),
    ];
    for param in TAG_LIST_PARAMS {
        if let Some(raw) = params.get(param) {
            let entries: Vec<TagEntry> = serde_json::from_str(raw)?;
            tags.extend(entries.into_iter().map(|t| StackTag::new(t.key, t.value)));
        }
    }
    Ok(tags)
}

/// Where stack templates are served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    pub bucket: String,
    pub region: String,
    /// Key prefix, including its trailing slash.
    pub key: String,
    pub filter: String,
}

impl TemplateSource {
    pub fn url_for(&self, service_name: &str) -> String {
        let host = if self.region == "us-east-1" {
            "https://s3.amazonaws.com/".to_string()
        } else {
            format!("https://s3-{}.amazonaws.com/", self.region)
        };
        let name = service_name.strip_suffix("-apb").unwrap_or(service_name);
        format!("{host}{}/{}{name}{}", self.bucket, self.key, self.filter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackState {
    Succeeded,
    InProgress,
    Failed,
}

impl StackState {
    pub fn classify(status: &str) -> Self {
        match status {
            "CREATE_COMPLETE" | "DELETE_COMPLETE" | "UPDATE_COMPLETE" => StackState::Succeeded,
            s if s.ends_with("_IN_PROGRESS") && !s.contains("ROLLBACK") => StackState::InProgress,
            _ => StackState::Failed,
        }
    }
}

fn context_str<'a>(context: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    context.get(key).and_then(Value::as_str)
}

fn scope_from(context: &Map<String, Value>, cf_key: &str, k8s_key: &str) -> String {
    match context_str(context, "platform") {
        Some("cloudfoundry") => context_str(context, cf_key)
            .map(|guid| guid.replace('-', ""))
            .unwrap_or_else(|| UNKNOWN_SCOPE.to_string()),
        Some("kubernetes") => context_str(context, k8s_key)
            .unwrap_or(UNKNOWN_SCOPE)
            .to_string(),
        _ => UNKNOWN_SCOPE.to_string(),
    }
}

/// Cluster segment for override lookup and tagging.
pub fn cluster_of(context: &Map<String, Value>) -> String {
    scope_from(context, "organization_guid", "clusterid")
}

pub fn namespace_of(context: &Map<String, Value>) -> String {
    scope_from(context, "space_guid", "namespace")
}

const FAILED_RESOURCE_STATES: [&str; 3] = ["CREATE_FAILED", "UPDATE_FAILED", "DELETE_FAILED"];

/// Concatenated `<resource> <reason> ` entries for every failed resource in
/// the stack's event history, skipping cancellations.
pub async fn failure_cause(orchestrator: &dyn StackOrchestrator, stack_id: &str) -> String {
    let mut events = Vec::new();
    let mut token: Option<String> = None;
    loop {
        match orchestrator
            .describe_stack_events(stack_id, token.as_deref())
            .await
        {
            Ok(page) => {
                events.extend(page.events);
                match page.next_token {
                    Some(next) => token = Some(next),
                    None => break,
                }
            }
            Err(err) => {
                warn!(stack_id, error = %err, "failed to read stack events");
                return format!("unable to retrieve failure cause: {err}");
            }
        }
    }

    events
        .iter()
        .filter(|event| FAILED_RESOURCE_STATES.contains(&event.resource_status.as_str()))
        .filter(|event| !event.resource_status_reason.ends_with(" cancelled"))
        .map(|event| {
            format!(
                "{} {} ",
                event.logical_resource_id, event.resource_status_reason
            )
        })
        .collect()
}
