//! The provisioning state machine.
//!
//! Every operation re-reads instance and binding state from the
//! [`DataStore`]; nothing about instances is cached in process. Concurrent
//! duplicate requests converge through the structural `matches` checks and
//! the store's type-checked deletes.

mod bindings;
mod instances;
pub mod stack;
pub mod types;

use std::{collections::BTreeMap, fmt, sync::Arc};

use stackbroker_model::{ServiceDefinition, ServiceInstance};

use crate::{
    cloud::{CloudProvider, CloudSession},
    error::{BrokerError, Result},
    overrides::OverrideEngine,
    store::DataStore,
};

pub use stack::{StackState, TemplateSource};
pub use types::*;

#[derive(Debug, Clone)]
pub struct BrokerOptions {
    pub broker_id: String,
    pub templates: TemplateSource,
}

pub struct Broker {
    store: Arc<dyn DataStore>,
    cloud: Arc<dyn CloudProvider>,
    overrides: OverrideEngine,
    options: BrokerOptions,
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("options", &self.options)
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

impl Broker {
    pub fn new(
        store: Arc<dyn DataStore>,
        cloud: Arc<dyn CloudProvider>,
        overrides: OverrideEngine,
        options: BrokerOptions,
    ) -> Self {
        Self {
            store,
            cloud,
            overrides,
            options,
        }
    }

    pub fn broker_id(&self) -> &str {
        &self.options.broker_id
    }

    async fn session(&self, params: &BTreeMap<String, String>) -> Result<CloudSession> {
        self.cloud
            .session(params)
            .await
            .map_err(|err| BrokerError::internal("Failed to create a cloud session", err))
    }

    async fn service(&self, service_id: &str) -> Result<ServiceDefinition> {
        self.store
            .get_service_definition(service_id)
            .await
            .map_err(|err| BrokerError::internal(format!("Failed to get the service {service_id}"), err))?
            .ok_or_else(|| BrokerError::BadRequest(format!("The service {service_id} was not found.")))
    }

    async fn find_instance(&self, instance_id: &str) -> Result<Option<ServiceInstance>> {
        self.store
            .get_service_instance(instance_id)
            .await
            .map_err(|err| {
                BrokerError::internal(format!("Failed to get the service instance {instance_id}"), err)
            })
    }
}
