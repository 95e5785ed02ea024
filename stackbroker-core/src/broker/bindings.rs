use serde_json::Value;
use stackbroker_model::{
    ServiceBinding, ServiceDefinition, ServiceInstance, catalog::param_value,
};
use tracing::{error, info};

use super::{
    Broker,
    types::{BindOutcome, BindRequest, UnbindRequest},
};
use crate::{
    cloud::{CloudSession, DetachOutcome, StackOutput},
    credentials::{self, BindRequestType, Credentials},
    error::{BrokerError, Result},
};

const BIND_PARAM_ROLE_NAME: &str = "RoleName";
const BIND_PARAM_SCOPE: &str = "Scope";
const INSTANCE_ID_KEY: &str = "INSTANCE_ID";
const BINDING_ID_KEY: &str = "BINDING_ID";

impl Broker {
    /// Creates a binding and returns its credentials.
    ///
    /// When a role name is given, the stack's `PolicyArn<Scope>` policy is
    /// attached to that role and remembered on the binding for unbind.
    /// Repeating an identical bind recomputes the credentials.
    pub async fn bind(&self, request: &BindRequest) -> Result<BindOutcome> {
        let mut binding = ServiceBinding {
            id: request.binding_id.clone(),
            instance_id: request.instance_id.clone(),
            ..ServiceBinding::default()
        };
        for (name, value) in &request.parameters {
            if name.eq_ignore_ascii_case(BIND_PARAM_ROLE_NAME) {
                binding.role_name = non_empty(value);
            } else if name.eq_ignore_ascii_case(BIND_PARAM_SCOPE) {
                binding.scope = non_empty(value);
            } else {
                return Err(BrokerError::BadRequest(format!(
                    "The parameter {name} is not supported."
                )));
            }
        }

        let service = self.service(&request.service_id).await?;
        let instance = self.bound_instance(&binding.instance_id).await?;
        let session = self.session(&instance.params).await?;
        let outputs = describe_outputs(&session, &instance).await?;

        let existing = self
            .store
            .get_service_binding(&binding.id)
            .await
            .map_err(|err| {
                BrokerError::internal(format!("Failed to get the service binding {}", binding.id), err)
            })?;
        if let Some(existing) = existing {
            if !existing.matches(&binding) {
                return Err(BrokerError::Conflict(format!(
                    "Service binding {} already exists but with different attributes.",
                    binding.id
                )));
            }
            info!(binding_id = %binding.id, "service binding already exists");
            let credentials = self
                .binding_credentials(&session, &service, &instance, &outputs, &binding)
                .await?;
            return Ok(BindOutcome {
                credentials,
                exists: true,
            });
        }

        if let Some(role_name) = &binding.role_name {
            let scope = binding.scope.as_deref().unwrap_or_default();
            let policy_arn = credentials::policy_arn(&outputs, scope).map_err(|err| {
                BrokerError::BadRequest(format!(
                    "The CloudFormation stack {} does not support binding with scope '{scope}': {err}",
                    instance.stack_id
                ))
            })?;
            session
                .policies
                .attach_role_policy(role_name, &policy_arn)
                .await
                .map_err(|err| {
                    BrokerError::internal(
                        format!("Failed to attach the policy {policy_arn} to role {role_name}"),
                        err,
                    )
                })?;
            info!(binding_id = %binding.id, role = %role_name, policy = %policy_arn, "attached binding policy");
            binding.policy_arn = Some(policy_arn);
        }

        let credentials = self
            .binding_credentials(&session, &service, &instance, &outputs, &binding)
            .await?;

        self.store
            .put_service_binding(&binding)
            .await
            .map_err(|err| {
                BrokerError::internal(format!("Failed to store the service binding {}", binding.id), err)
            })?;

        Ok(BindOutcome {
            credentials,
            exists: false,
        })
    }

    /// Removes a binding, running the unbind function and detaching the
    /// binding's policy first when either applies.
    pub async fn unbind(&self, request: &UnbindRequest) -> Result<()> {
        let binding = self
            .store
            .get_service_binding(&request.binding_id)
            .await
            .map_err(|err| {
                BrokerError::internal(
                    format!("Failed to get the service binding {}", request.binding_id),
                    err,
                )
            })?
            .ok_or_else(|| {
                BrokerError::Gone(format!(
                    "The service binding {} was not found.",
                    request.binding_id
                ))
            })?;

        let service = self.service(&request.service_id).await?;
        let instance = self.bound_instance(&binding.instance_id).await?;
        let session = self.session(&instance.params).await?;

        if service.bind_via_lambda() {
            let outputs = describe_outputs(&session, &instance).await?;
            let mut credentials = resolve(&session, &service, &instance, &outputs).await?;
            inject_ids(&mut credentials, &binding);
            credentials::invoke_bind_function(
                session.delegate.as_ref(),
                credentials,
                BindRequestType::Unbind,
            )
            .await
            .map_err(|err| {
                BrokerError::Internal(format!("Error running lambda function for unbind from: {err}"))
            })?;
        }

        if let Some(policy_arn) = &binding.policy_arn {
            let role_name = binding.role_name.as_deref().unwrap_or_default();
            match session.policies.detach_role_policy(role_name, policy_arn).await {
                Ok(DetachOutcome::Detached) => {
                    info!(binding_id = %binding.id, role = %role_name, policy = %policy_arn, "detached binding policy");
                }
                Ok(DetachOutcome::AlreadyDetached) => {
                    info!("The policy {policy_arn} was already detached from role {role_name}.");
                }
                Err(err) => {
                    return Err(BrokerError::internal(
                        format!("Failed to detach the policy {policy_arn} from role {role_name}"),
                        err,
                    ));
                }
            }
        }

        self.store
            .delete_service_binding(&binding.id)
            .await
            .map_err(|err| {
                BrokerError::internal(format!("Failed to delete the service binding {}", binding.id), err)
            })?;
        info!(binding_id = %binding.id, "service binding removed");
        Ok(())
    }

    async fn bound_instance(&self, instance_id: &str) -> Result<ServiceInstance> {
        self.find_instance(instance_id).await?.ok_or_else(|| {
            BrokerError::BadRequest(format!("The service instance {instance_id} was not found."))
        })
    }

    async fn binding_credentials(
        &self,
        session: &CloudSession,
        service: &ServiceDefinition,
        instance: &ServiceInstance,
        outputs: &[StackOutput],
        binding: &ServiceBinding,
    ) -> Result<Credentials> {
        let mut credentials = resolve(session, service, instance, outputs).await?;
        if !service.bind_via_lambda() {
            return Ok(credentials);
        }
        inject_ids(&mut credentials, binding);
        credentials::invoke_bind_function(session.delegate.as_ref(), credentials, BindRequestType::Bind)
            .await
            .map_err(|err| {
                error!(binding_id = %binding.id, error = %err, "bind function failed");
                BrokerError::Internal(err.to_string())
            })
    }
}

async fn describe_outputs(session: &CloudSession, instance: &ServiceInstance) -> Result<Vec<StackOutput>> {
    session
        .orchestrator
        .describe_stack(&instance.stack_id)
        .await
        .map(|description| description.outputs)
        .map_err(|err| {
            BrokerError::internal(
                format!("Failed to describe the CloudFormation stack {}", instance.stack_id),
                err,
            )
        })
}

async fn resolve(
    session: &CloudSession,
    service: &ServiceDefinition,
    instance: &ServiceInstance,
    outputs: &[StackOutput],
) -> Result<Credentials> {
    credentials::resolve_credentials(service, outputs, session.secrets.as_ref())
        .await
        .map_err(|err| {
            error!(stack_id = %instance.stack_id, error = %err, "credential mapping failed");
            BrokerError::internal(
                format!(
                    "Failed to get the credentials from CloudFormation stack {}",
                    instance.stack_id
                ),
                err,
            )
        })
}

fn inject_ids(credentials: &mut Credentials, binding: &ServiceBinding) {
    credentials.insert(
        INSTANCE_ID_KEY.to_string(),
        Value::String(binding.instance_id.clone()),
    );
    credentials.insert(BINDING_ID_KEY.to_string(), Value::String(binding.id.clone()));
}

fn non_empty(value: &Value) -> Option<String> {
    Some(param_value(value)).filter(|v| !v.is_empty())
}
