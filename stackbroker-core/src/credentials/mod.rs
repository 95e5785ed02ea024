//! Mapping stack outputs to binding credentials.

pub mod cloudfoundry;
pub mod delegate;

use serde_json::{Map, Value};
use stackbroker_model::ServiceDefinition;
use thiserror::Error;
use tracing::debug;

use crate::{
    cloud::{SecretStore, StackOutput},
    error::BrokerError,
};

pub use delegate::{BindRequestType, DelegateError, invoke_bind_function};

/// Outputs with this prefix name per-scope policies and never become credentials.
pub const POLICY_ARN_PREFIX: &str = "PolicyArn";
/// Output values with this prefix name a secure parameter to resolve.
pub const SECRET_VALUE_PREFIX: &str = "ssm:";

const USER_KEY_ID: &str = "UserKeyId";
const USER_SECRET_KEY: &str = "UserSecretKey";

pub type Credentials = Map<String, Value>;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("{0}")]
    Lookup(#[from] BrokerError),

    #[error("invalid parameters: [{}]", .0.join(" "))]
    InvalidParameters(Vec<String>),

    #[error("output {field} is required to build {service} credentials")]
    MissingField { service: String, field: String },
}

/// `UserKeyId` becomes `USER_KEY_ID`, `DBName` becomes `DB_NAME`.
///
/// An underscore goes before an uppercase letter that is neither first nor
/// last and sits next to a lowercase letter.
pub fn screaming_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        let interior = i > 0 && i + 1 < chars.len();
        if interior && c.is_uppercase() && (chars[i - 1].is_lowercase() || chars[i + 1].is_lowercase()) {
            out.push('_');
        }
        out.extend(c.to_uppercase());
    }
    out
}

/// Value of the `PolicyArn<scope>` output, compared case-insensitively.
pub fn policy_arn(outputs: &[StackOutput], scope: &str) -> Result<String, String> {
    let key = format!("{POLICY_ARN_PREFIX}{scope}");
    outputs
        .iter()
        .find(|output| output.key.eq_ignore_ascii_case(&key))
        .map(|output| output.value.clone())
        .ok_or_else(|| format!("output not found: {key}"))
}

/// Builds the credentials for a binding from the stack outputs.
///
/// Access key outputs are prefixed with the upper-cased service name. Secret
/// references are resolved in a single batched lookup; any name the store
/// does not know fails the whole call.
pub async fn resolve_credentials(
    service: &ServiceDefinition,
    outputs: &[StackOutput],
    secrets: &dyn SecretStore,
) -> Result<Credentials, CredentialError> {
    let mut credentials = Credentials::new();
    let mut secret_names = Vec::new();

    for output in outputs {
        if output.key.starts_with(POLICY_ARN_PREFIX) {
            continue;
        }
        if output.key == USER_KEY_ID || output.key == USER_SECRET_KEY {
            let key = format!(
                "{}_{}",
                service.name.to_uppercase(),
                screaming_snake_case(&output.key)
            );
            credentials.insert(key, Value::String(output.value.clone()));
            secret_names.push(output.value.clone());
            continue;
        }

        let key = if service.leave_outputs_as_is() {
            output.key.clone()
        } else {
            screaming_snake_case(&output.key)
        };
        credentials.insert(key, Value::String(output.value.clone()));
        if let Some(name) = output.value.strip_prefix(SECRET_VALUE_PREFIX) {
            secret_names.push(name.to_string());
        }
    }

    if !secret_names.is_empty() {
        debug!(count = secret_names.len(), "resolving secret credential values");
        let lookup = secrets.get_parameters(&secret_names).await?;
        if !lookup.invalid.is_empty() {
            return Err(CredentialError::InvalidParameters(lookup.invalid));
        }
        for value in credentials.values_mut() {
            let Value::String(current) = value else {
                continue;
            };
            let name = current.strip_prefix(SECRET_VALUE_PREFIX).unwrap_or(current);
            if let Some(secret) = lookup.values.get(name) {
                *value = Value::String(secret.clone());
            }
        }
    }

    if service.metadata.cloud_foundry {
        credentials = cloudfoundry::reshape(&service.name, credentials)?;
    }
    Ok(credentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::FakeCloud;
    use serde_json::json;
    use stackbroker_model::ServiceMetadata;

    fn service(name: &str, metadata: ServiceMetadata) -> ServiceDefinition {
        ServiceDefinition {
            id: "svc".into(),
            name: name.into(),
            metadata,
            ..ServiceDefinition::default()
        }
    }

    #[test]
    fn screaming_snake_case_examples() {
        assert_eq!(screaming_snake_case("UserKeyId"), "USER_KEY_ID");
        assert_eq!(screaming_snake_case("DBName"), "DB_NAME");
        assert_eq!(screaming_snake_case("BucketArn"), "BUCKET_ARN");
        assert_eq!(screaming_snake_case("already_SNAKE"), "ALREADY_SNAKE");
        assert_eq!(screaming_snake_case("A"), "A");
        assert_eq!(screaming_snake_case(""), "");
    }

    #[test]
    fn policy_lookup_ignores_case() {
        let outputs = vec![
            StackOutput::new("PolicyArnReadOnly", "arn:aws:iam::1:policy/ro"),
            StackOutput::new("BucketName", "b"),
        ];
        assert_eq!(policy_arn(&outputs, "readonly").unwrap(), "arn:aws:iam::1:policy/ro");
        assert_eq!(
            policy_arn(&outputs, "Full").unwrap_err(),
            "output not found: PolicyArnFull"
        );
    }

    #[tokio::test]
    async fn outputs_are_renamed_and_secrets_resolved() {
        let cloud = FakeCloud::new();
        cloud.set_secret("key-param", "AKIAEXAMPLE");
        cloud.set_secret("secret-param", "shh");
        cloud.set_secret("db/password", "hunter2");
        let outputs = vec![
            StackOutput::new("UserKeyId", "key-param"),
            StackOutput::new("UserSecretKey", "secret-param"),
            StackOutput::new("MasterPassword", "ssm:db/password"),
            StackOutput::new("BucketName", "my-bucket"),
            StackOutput::new("PolicyArnFull", "arn:aws:iam::1:policy/full"),
        ];

        let creds = resolve_credentials(&service("s3", ServiceMetadata::default()), &outputs, &cloud)
            .await
            .unwrap();
        assert_eq!(
            Value::Object(creds),
            json!({
                "S3_USER_KEY_ID": "AKIAEXAMPLE",
                "S3_USER_SECRET_KEY": "shh",
                "MASTER_PASSWORD": "hunter2",
                "BUCKET_NAME": "my-bucket",
            })
        );
    }

    #[tokio::test]
    async fn outputs_as_is_keeps_keys() {
        let cloud = FakeCloud::new();
        let metadata = ServiceMetadata {
            outputs_as_is: true,
            ..ServiceMetadata::default()
        };
        let outputs = vec![StackOutput::new("BucketName", "b")];
        let creds = resolve_credentials(&service("s3", metadata), &outputs, &cloud)
            .await
            .unwrap();
        assert_eq!(creds["BucketName"], "b");
    }

    #[tokio::test]
    async fn unknown_secret_fails_the_lookup() {
        let cloud = FakeCloud::new();
        let outputs = vec![StackOutput::new("Password", "ssm:missing")];
        let err = resolve_credentials(&service("rds", ServiceMetadata::default()), &outputs, &cloud)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid parameters: [missing]");
    }

    #[tokio::test]
    async fn no_lookup_without_secret_references() {
        let cloud = FakeCloud::new();
        let outputs = vec![StackOutput::new("QueueUrl", "https://sqs")];
        resolve_credentials(&service("sqs", ServiceMetadata::default()), &outputs, &cloud)
            .await
            .unwrap();
        assert_eq!(cloud.calls(crate::cloud::fake::FakeOp::GetParameters), 0);
    }
}
