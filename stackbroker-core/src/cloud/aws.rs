//! AWS SDK implementations of the cloud capabilities.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig, sts::AssumeRoleProvider};
use aws_sdk_cloudformation::types::{Capability, Parameter, Tag};
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_sts::config::Credentials;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{
    CloudProvider, CloudSession, CredentialDelegate, DetachOutcome, PolicyManager, SecretLookup,
    SecretStore, StackDescription, StackEvent, StackEventPage, StackOrchestrator, StackOutput,
    StackRequest, role_arn,
};
use crate::error::{BrokerError, Result};

const SESSION_NAME: &str = "aws-service-broker";
const REQUEST_CREDENTIALS: &str = "stackbroker-request";

fn cloud_err(context: &str, err: impl std::error::Error) -> BrokerError {
    BrokerError::Cloud(format!(
        "{context}: {}",
        aws_sdk_cloudformation::error::DisplayErrorContext(&err)
    ))
}

/// Hands out AWS clients for the broker's own account or, when an instance
/// names a target role, for an assumed cross-account role.
#[derive(Debug, Clone)]
pub struct AwsCloudProvider {
    base: SdkConfig,
    default_region: String,
    account_id: String,
    partition: String,
}

impl AwsCloudProvider {
    /// Loads the default credential chain and resolves the caller's account.
    /// `account_id` skips the identity lookup for the account number.
    pub async fn connect(default_region: &str, account_id: Option<String>) -> Result<Self> {
        let base = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(default_region.to_string()))
            .load()
            .await;

        let identity = aws_sdk_sts::Client::new(&base)
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| cloud_err("failed to resolve caller identity", e))?;

        let partition = identity
            .arn()
            .and_then(|arn| arn.split(':').nth(1))
            .unwrap_or("aws")
            .to_string();
        let account_id = match account_id.filter(|a| !a.is_empty()) {
            Some(account_id) => account_id,
            None => identity
                .account()
                .map(str::to_string)
                .ok_or_else(|| BrokerError::Cloud("caller identity has no account".into()))?,
        };

        info!(account_id = %account_id, partition = %partition, region = %default_region, "AWS credentials resolved");

        Ok(Self {
            base,
            default_region: default_region.to_string(),
            account_id,
            partition,
        })
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn base_config(&self) -> &SdkConfig {
        &self.base
    }

    async fn config_for(&self, params: &BTreeMap<String, String>) -> Result<SdkConfig> {
        let region = params
            .get("region")
            .filter(|r| !r.is_empty())
            .cloned()
            .unwrap_or_else(|| self.default_region.clone());

        let base = match static_credentials(params) {
            Some(credentials) => {
                debug!(region = %region, "using request access keys");
                aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(region.clone()))
                    .credentials_provider(credentials)
                    .load()
                    .await
            }
            None => self
                .base
                .to_builder()
                .region(Region::new(region.clone()))
                .build(),
        };

        let Some(role_name) = params.get("target_role_name").filter(|r| !r.is_empty()) else {
            return Ok(base);
        };

        let account_id = params
            .get("target_account_id")
            .filter(|a| !a.is_empty())
            .unwrap_or(&self.account_id);
        let arn = role_arn(&self.partition, account_id, role_name);
        debug!(role_arn = %arn, region = %region, "assuming target role");

        let provider = AssumeRoleProvider::builder(arn)
            .session_name(SESSION_NAME)
            .region(Region::new(region.clone()))
            .configure(&base)
            .build()
            .await;

        Ok(aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .credentials_provider(provider)
            .load()
            .await)
    }
}

/// Access keys supplied on the instance, used in place of the broker's own
/// credential chain. Both halves must be present.
fn static_credentials(params: &BTreeMap<String, String>) -> Option<Credentials> {
    let access_key = params.get("aws_access_key").filter(|k| !k.is_empty())?;
    let secret_key = params.get("aws_secret_key").filter(|k| !k.is_empty())?;
    Some(Credentials::new(
        access_key,
        secret_key,
        None,
        None,
        REQUEST_CREDENTIALS,
    ))
}

#[async_trait]
impl CloudProvider for AwsCloudProvider {
    async fn session(&self, params: &BTreeMap<String, String>) -> Result<CloudSession> {
        let config = self.config_for(params).await?;
        Ok(CloudSession {
            orchestrator: Arc::new(CloudFormationStacks(aws_sdk_cloudformation::Client::new(
                &config,
            ))),
            secrets: Arc::new(SsmSecrets(aws_sdk_ssm::Client::new(&config))),
            policies: Arc::new(IamPolicies(aws_sdk_iam::Client::new(&config))),
            delegate: Arc::new(LambdaDelegate(aws_sdk_lambda::Client::new(&config))),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CloudFormationStacks(aws_sdk_cloudformation::Client);

impl CloudFormationStacks {
    fn parameters(request: &StackRequest) -> Vec<Parameter> {
        request
            .parameters
            .iter()
            .map(|(key, value)| {
                Parameter::builder()
                    .parameter_key(key)
                    .parameter_value(value)
                    .build()
            })
            .collect()
    }

    fn tags(request: &StackRequest) -> Vec<Tag> {
        request
            .tags
            .iter()
            .map(|tag| Tag::builder().key(&tag.key).value(&tag.value).build())
            .collect()
    }

    fn capabilities(request: &StackRequest) -> Vec<Capability> {
        request
            .capabilities
            .iter()
            .map(|c| Capability::from(c.as_str()))
            .collect()
    }
}

#[async_trait]
impl StackOrchestrator for CloudFormationStacks {
    async fn create_stack(&self, request: &StackRequest) -> Result<String> {
        let output = self
            .0
            .create_stack()
            .stack_name(&request.stack_name)
            .template_url(&request.template_url)
            .set_parameters(Some(Self::parameters(request)))
            .set_tags(Some(Self::tags(request)))
            .set_capabilities(Some(Self::capabilities(request)))
            .send()
            .await
            .map_err(|e| cloud_err("CreateStack failed", e))?;
        output
            .stack_id()
            .map(str::to_string)
            .ok_or_else(|| BrokerError::Cloud("CreateStack returned no stack id".into()))
    }

    async fn update_stack(&self, stack_id: &str, request: &StackRequest) -> Result<()> {
        self.0
            .update_stack()
            .stack_name(stack_id)
            .template_url(&request.template_url)
            .set_parameters(Some(Self::parameters(request)))
            // An empty tag list on update would strip the tags set at create.
            .set_tags(if request.tags.is_empty() { None } else { Some(Self::tags(request)) })
            .set_capabilities(Some(Self::capabilities(request)))
            .send()
            .await
            .map_err(|e| cloud_err("UpdateStack failed", e))?;
        Ok(())
    }

    async fn delete_stack(&self, stack_id: &str) -> Result<()> {
        self.0
            .delete_stack()
            .stack_name(stack_id)
            .send()
            .await
            .map_err(|e| cloud_err("DeleteStack failed", e))?;
        Ok(())
    }

    async fn cancel_update_stack(&self, stack_id: &str) -> Result<()> {
        self.0
            .cancel_update_stack()
            .stack_name(stack_id)
            .send()
            .await
            .map_err(|e| cloud_err("CancelUpdateStack failed", e))?;
        Ok(())
    }

    async fn describe_stack(&self, stack_id: &str) -> Result<StackDescription> {
        let output = self
            .0
            .describe_stacks()
            .stack_name(stack_id)
            .send()
            .await
            .map_err(|e| cloud_err("DescribeStacks failed", e))?;
        let stack = output
            .stacks()
            .first()
            .ok_or_else(|| BrokerError::Cloud(format!("stack {stack_id} not found")))?;

        Ok(StackDescription {
            status: stack
                .stack_status()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
            status_reason: stack.stack_status_reason().map(str::to_string),
            outputs: stack
                .outputs()
                .iter()
                .filter_map(|o| Some(StackOutput::new(o.output_key()?, o.output_value()?)))
                .collect(),
        })
    }

    async fn describe_stack_events(
        &self,
        stack_id: &str,
        next_token: Option<&str>,
    ) -> Result<StackEventPage> {
        let output = self
            .0
            .describe_stack_events()
            .stack_name(stack_id)
            .set_next_token(next_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| cloud_err("DescribeStackEvents failed", e))?;

        Ok(StackEventPage {
            events: output
                .stack_events()
                .iter()
                .map(|e| StackEvent {
                    logical_resource_id: e.logical_resource_id().unwrap_or_default().to_string(),
                    resource_status: e
                        .resource_status()
                        .map(|s| s.as_str().to_string())
                        .unwrap_or_default(),
                    resource_status_reason: e
                        .resource_status_reason()
                        .unwrap_or_default()
                        .to_string(),
                })
                .collect(),
            next_token: output.next_token().map(str::to_string),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SsmSecrets(aws_sdk_ssm::Client);

#[async_trait]
impl SecretStore for SsmSecrets {
    async fn get_parameters(&self, names: &[String]) -> Result<SecretLookup> {
        if names.is_empty() {
            return Ok(SecretLookup::default());
        }
        let output = self
            .0
            .get_parameters()
            .set_names(Some(names.to_vec()))
            .with_decryption(true)
            .send()
            .await
            .map_err(|e| cloud_err("GetParameters failed", e))?;

        Ok(SecretLookup {
            values: output
                .parameters()
                .iter()
                .filter_map(|p| Some((p.name()?.to_string(), p.value()?.to_string())))
                .collect(),
            invalid: output.invalid_parameters().to_vec(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct IamPolicies(aws_sdk_iam::Client);

#[async_trait]
impl PolicyManager for IamPolicies {
    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<()> {
        self.0
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| cloud_err("AttachRolePolicy failed", e))?;
        Ok(())
    }

    async fn detach_role_policy(
        &self,
        role_name: &str,
        policy_arn: &str,
    ) -> Result<DetachOutcome> {
        match self
            .0
            .detach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
        {
            Ok(_) => Ok(DetachOutcome::Detached),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_no_such_entity_exception()) =>
            {
                Ok(DetachOutcome::AlreadyDetached)
            }
            Err(err) => Err(cloud_err("DetachRolePolicy failed", err)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LambdaDelegate(aws_sdk_lambda::Client);

#[async_trait]
impl CredentialDelegate for LambdaDelegate {
    async fn invoke(
        &self,
        function_name: &str,
        payload: &Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        let body = serde_json::to_vec(payload)?;
        let output = self
            .0
            .invoke()
            .function_name(function_name)
            .payload(Blob::new(body))
            .send()
            .await
            .map_err(|e| cloud_err("Invoke failed", e))?;

        match output.payload() {
            Some(blob) if !blob.as_ref().is_empty() => Ok(serde_json::from_slice(blob.as_ref())?),
            _ => Ok(Map::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn request_keys_need_both_halves() {
        let credentials = static_credentials(&params(&[
            ("aws_access_key", "AKIAEXAMPLE"),
            ("aws_secret_key", "secret"),
        ]))
        .expect("both keys given");
        assert_eq!(credentials.access_key_id(), "AKIAEXAMPLE");
        assert_eq!(credentials.secret_access_key(), "secret");
        assert!(credentials.session_token().is_none());

        assert!(static_credentials(&params(&[("aws_access_key", "AKIAEXAMPLE")])).is_none());
        assert!(
            static_credentials(&params(&[("aws_access_key", ""), ("aws_secret_key", "secret")]))
                .is_none()
        );
        assert!(static_credentials(&BTreeMap::new()).is_none());
    }

    #[test]
    fn stack_tags_keep_request_order() {
        let request = StackRequest {
            stack_name: "s".into(),
            template_url: "u".into(),
            parameters: BTreeMap::new(),
            tags: vec![
                crate::cloud::StackTag::new("aws-service-broker:broker-id", "b"),
                crate::cloud::StackTag::new("team", "core"),
            ],
            capabilities: Vec::new(),
        };
        let tags = CloudFormationStacks::tags(&request);
        let keys: Vec<_> = tags.iter().filter_map(|t| t.key()).collect();
        assert_eq!(keys, ["aws-service-broker:broker-id", "team"]);
    }
}
