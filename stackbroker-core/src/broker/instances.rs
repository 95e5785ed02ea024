use std::collections::BTreeMap;

use stackbroker_model::{ServiceInstance, catalog::param_value};
use tracing::{debug, error, info};

use super::{
    Broker,
    stack::{self, CAPABILITY_NAMED_IAM, StackState},
    types::{
        DeprovisionRequest, LastOperation, LastOperationRequest, OperationState, ProvisionOutcome,
        ProvisionRequest, UpdateOutcome, UpdateRequest,
    },
};
use crate::{
    cloud::StackRequest,
    error::{BrokerError, Result},
};

/// Platform whose clients mishandle a failed last-operation body.
const ERROR_ON_FAILED_PLATFORM: &str = "kubernetes";

impl Broker {
    /// Starts creating the stack for a new instance.
    ///
    /// Effective parameters are layered as plan defaults, scoped overrides,
    /// plan-fixed values, then client values; the client may only set
    /// parameters the plan's schema exposes.
    pub async fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionOutcome> {
        if !request.accepts_incomplete {
            return Err(BrokerError::AsyncRequired);
        }

        let cluster = stack::cluster_of(&request.context);
        let namespace = stack::namespace_of(&request.context);

        let service = self.service(&request.service_id).await?;
        let plan = service.plan(&request.plan_id).ok_or_else(|| {
            BrokerError::BadRequest(format!("The service plan {} was not found.", request.plan_id))
        })?;

        let available = plan.available_params();
        let mut params: BTreeMap<String, String> = plan.defaults().into_iter().collect();
        params.extend(
            self.overrides
                .resolve(&available, &cluster, &namespace, &service.name),
        );
        params.extend(plan.prescribed_params());
        for (name, value) in &request.parameters {
            if !available.contains(name) {
                return Err(BrokerError::BadRequest(format!(
                    "The parameter {name} is not available."
                )));
            }
            params.insert(name.clone(), param_value(value));
        }
        if let Some(missing) = plan
            .required_params()
            .into_iter()
            .find(|name| !params.contains_key(name))
        {
            return Err(BrokerError::BadRequest(format!(
                "The parameter {missing} is required."
            )));
        }
        debug!(instance_id = %request.instance_id, ?params, "resolved provision parameters");

        let mut instance = ServiceInstance {
            id: request.instance_id.clone(),
            service_id: request.service_id.clone(),
            plan_id: request.plan_id.clone(),
            params,
            stack_id: String::new(),
        };

        if let Some(existing) = self.find_instance(&instance.id).await? {
            if !existing.matches(&instance) {
                return Err(BrokerError::Conflict(format!(
                    "Service instance {} already exists but with different attributes.",
                    instance.id
                )));
            }
            info!(instance_id = %instance.id, "service instance already exists");
            let session = self.session(&instance.params).await?;
            let description = session
                .orchestrator
                .describe_stack(&existing.stack_id)
                .await
                .map_err(|err| {
                    BrokerError::internal(format!("Failed to get the stack {}", existing.stack_id), err)
                })?;
            return match StackState::classify(&description.status) {
                StackState::Succeeded => Ok(ProvisionOutcome::Exists),
                StackState::InProgress => Ok(ProvisionOutcome::Accepted),
                StackState::Failed => {
                    info!(instance_id = %instance.id, status = %description.status, "existing instance failed to provision");
                    let cause = stack::failure_cause(session.orchestrator.as_ref(), &existing.stack_id).await;
                    Err(BrokerError::Orchestration(or_reason(cause, description.status_reason)))
                }
            };
        }

        let tags = stack::build_tags(
            self.broker_id(),
            &instance.id,
            &cluster,
            &namespace,
            &instance.params,
        )
        .map_err(|err| BrokerError::BadRequest(format!("failed to parse tags: {err}")))?;

        let stack_request = StackRequest {
            stack_name: stack::stack_name(&service.name, &instance.id),
            template_url: self.options.templates.url_for(&service.name),
            parameters: stack::stack_parameters(&instance.params),
            tags,
            capabilities: vec![CAPABILITY_NAMED_IAM.to_string()],
        };

        let session = self.session(&instance.params).await?;
        instance.stack_id = session
            .orchestrator
            .create_stack(&stack_request)
            .await
            .map_err(|err| {
                error!(
                    stack_name = %stack_request.stack_name,
                    template_url = %stack_request.template_url,
                    "stack creation rejected"
                );
                BrokerError::internal("Failed to create the CloudFormation stack", err)
            })?;

        if let Err(err) = self.store.put_service_instance(&instance).await {
            if let Err(delete_err) = session.orchestrator.delete_stack(&instance.stack_id).await {
                error!(
                    stack_id = %instance.stack_id,
                    error = %delete_err,
                    "Failed to delete the CloudFormation stack"
                );
            }
            return Err(BrokerError::internal(
                format!("Failed to create the service instance {}", instance.id),
                err,
            ));
        }

        info!(instance_id = %instance.id, stack_id = %instance.stack_id, "provisioning started");
        Ok(ProvisionOutcome::Accepted)
    }

    /// Starts deleting the instance's stack. The record itself is removed
    /// once a later [`last_operation`](Self::last_operation) sees the delete
    /// complete.
    pub async fn deprovision(&self, request: &DeprovisionRequest) -> Result<()> {
        if !request.accepts_incomplete {
            return Err(BrokerError::AsyncRequired);
        }

        let instance = self.find_instance(&request.instance_id).await?.ok_or_else(|| {
            BrokerError::Gone(format!(
                "The service instance {} was not found.",
                request.instance_id
            ))
        })?;

        let session = self.session(&instance.params).await?;
        session
            .orchestrator
            .delete_stack(&instance.stack_id)
            .await
            .map_err(|err| {
                BrokerError::internal(
                    format!("Failed to delete the CloudFormation stack {}", instance.stack_id),
                    err,
                )
            })?;
        info!(instance_id = %instance.id, stack_id = %instance.stack_id, "deprovisioning started");
        Ok(())
    }

    pub async fn last_operation(&self, request: &LastOperationRequest) -> Result<LastOperation> {
        let instance = self.find_instance(&request.instance_id).await?.ok_or_else(|| {
            BrokerError::Gone(format!(
                "The service instance {} was not found.",
                request.instance_id
            ))
        })?;

        let session = self.session(&instance.params).await?;
        let description = session
            .orchestrator
            .describe_stack(&instance.stack_id)
            .await
            .map_err(|err| {
                BrokerError::internal(
                    format!("Failed to describe the CloudFormation stack {}", instance.stack_id),
                    err,
                )
            })?;
        debug!(stack_id = %instance.stack_id, status = %description.status, "stack status");

        match StackState::classify(&description.status) {
            StackState::Succeeded => {
                if description.status == "DELETE_COMPLETE" {
                    if let Err(err) = self.store.delete_service_instance(&instance.id).await {
                        error!(instance_id = %instance.id, error = %err, "Failed to delete the service instance");
                    }
                }
                Ok(LastOperation {
                    state: OperationState::Succeeded,
                    description: None,
                })
            }
            StackState::InProgress => Ok(LastOperation {
                state: OperationState::InProgress,
                description: None,
            }),
            StackState::Failed => {
                error!(
                    stack_id = %instance.stack_id,
                    status = %description.status,
                    reason = description.status_reason.as_deref().unwrap_or_default(),
                    "CloudFormation stack failed"
                );
                let cause = stack::failure_cause(session.orchestrator.as_ref(), &instance.stack_id).await;
                let detail = or_reason(cause, description.status_reason);
                if request.originating_platform.as_deref() == Some(ERROR_ON_FAILED_PLATFORM) {
                    return Err(BrokerError::Orchestration(detail));
                }
                Ok(LastOperation {
                    state: OperationState::Failed,
                    description: Some(detail),
                })
            }
        }
    }

    /// Applies changed parameters to an existing instance's stack.
    ///
    /// Only parameters in the plan's update schema may change. A request
    /// that changes nothing completes synchronously.
    pub async fn update(&self, request: &UpdateRequest) -> Result<UpdateOutcome> {
        if !request.accepts_incomplete {
            return Err(BrokerError::AsyncRequired);
        }

        let mut instance = self.find_instance(&request.instance_id).await?.ok_or_else(|| {
            BrokerError::BadRequest(format!(
                "The service instance {:?} was not found.",
                request.instance_id
            ))
        })?;

        if let Some(plan_id) = &request.plan_id {
            if *plan_id != instance.plan_id {
                return Err(BrokerError::BadRequest(format!(
                    "The service plan cannot be changed from {:?} to {:?}.",
                    instance.plan_id, plan_id
                )));
            }
        }

        let service = self.service(&request.service_id).await?;
        let plan = service.plan(&instance.plan_id).ok_or_else(|| {
            BrokerError::BadRequest(format!(
                "The service plan {:?} was not found.",
                instance.plan_id
            ))
        })?;

        let updatable = plan.updatable_params();
        let mut params: BTreeMap<String, String> = plan.defaults().into_iter().collect();
        params.extend(instance.params.clone());
        let mut changed = false;
        for (name, value) in &request.parameters {
            let value = param_value(value);
            if params.get(name).map(String::as_str).unwrap_or_default() == value {
                continue;
            }
            if !updatable.contains(name) {
                return Err(BrokerError::BadRequest(format!(
                    "The parameter {name:?} is not updatable."
                )));
            }
            params.insert(name.clone(), value);
            changed = true;
        }
        if !changed {
            debug!(instance_id = %instance.id, "update changes nothing");
            return Ok(UpdateOutcome::Unchanged);
        }

        let stack_request = StackRequest {
            stack_name: stack::stack_name(&service.name, &instance.id),
            template_url: self.options.templates.url_for(&service.name),
            parameters: stack::stack_parameters(&params),
            tags: Vec::new(),
            capabilities: vec![CAPABILITY_NAMED_IAM.to_string()],
        };
        let session = self.session(&params).await?;
        session
            .orchestrator
            .update_stack(&instance.stack_id, &stack_request)
            .await
            .map_err(|err| {
                BrokerError::internal(
                    format!("Failed to update the CloudFormation stack {:?}", instance.stack_id),
                    err,
                )
            })?;

        instance.params = params;
        if let Err(err) = self.store.put_service_instance(&instance).await {
            if let Err(cancel_err) = session.orchestrator.cancel_update_stack(&instance.stack_id).await {
                error!(stack_id = %instance.stack_id, error = %cancel_err, "Failed to cancel updating the CloudFormation stack");
                error!(
                    "Service instance {:?} and CloudFormation stack {:?} may be out of sync!",
                    instance.id, instance.stack_id
                );
            }
            return Err(BrokerError::internal(
                format!("Failed to update the service instance {:?}", instance.id),
                err,
            ));
        }

        info!(instance_id = %instance.id, "update started");
        Ok(UpdateOutcome::Accepted)
    }
}

fn or_reason(cause: String, reason: Option<String>) -> String {
    if cause.is_empty() {
        reason.unwrap_or_default()
    } else {
        cause
    }
}
