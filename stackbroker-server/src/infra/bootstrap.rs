//! Wires configuration into a running broker: cloud provider, datastore,
//! template repository, override engine, synchronizer and broker.

use std::sync::Arc;

use anyhow::{Context, Result};
use stackbroker_core::{
    Broker, BrokerOptions, CatalogSynchronizer,
    catalog::CatalogBuilder,
    cloud::{CloudProvider, FakeCloud, aws::AwsCloudProvider},
    overrides::{EnvOverrides, OverrideEngine, OverrideSource},
    store::{DataStore, MemoryStore, RedisStore},
    templates::{LocalTemplates, TemplateRepository, s3::S3Templates},
};
use stackbroker_model::AccountScope;
use tracing::{info, warn};

use crate::infra::{
    app_state::AppState,
    config::{CloudBackend, Config},
};

/// Account number used for the in-process cloud when none is configured.
pub const FAKE_ACCOUNT_ID: &str = "000000000000";

/// The pluggable collaborators a broker runs against.
pub struct Backends {
    pub scope: AccountScope,
    pub store: Arc<dyn DataStore>,
    pub cloud: Arc<dyn CloudProvider>,
    pub templates: Arc<dyn TemplateRepository>,
    pub overrides: Arc<dyn OverrideSource>,
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Connects every backend the configuration names.
pub async fn connect_backends(config: &Config) -> Result<Backends> {
    let broker = &config.broker;

    let (cloud, account_id): (Arc<dyn CloudProvider>, String) = match broker.cloud_backend {
        CloudBackend::Aws => {
            let provider = AwsCloudProvider::connect(&broker.region, broker.account_id.clone())
                .await
                .context("failed to resolve AWS credentials")?;
            let account_id = provider.account_id().to_string();
            (Arc::new(provider), account_id)
        }
        CloudBackend::Memory => {
            warn!("running against the in-process cloud; no stacks will be created");
            let account_id = broker
                .account_id
                .clone()
                .unwrap_or_else(|| FAKE_ACCOUNT_ID.to_string());
            (Arc::new(FakeCloud::new()), account_id)
        }
    };

    let scope = AccountScope::new(&account_id, &broker.broker_id)
        .with_context(|| format!("invalid broker id {:?}", broker.broker_id))?;

    let store: Arc<dyn DataStore> = match &config.redis {
        Some(redis) => Arc::new(
            RedisStore::connect(&redis.url, &broker.table_name, scope)
                .await
                .context("failed to connect to the datastore")?,
        ),
        None => {
            info!("no Redis URL configured; keeping broker state in memory");
            Arc::new(MemoryStore::new(scope))
        }
    };

    let templates: Arc<dyn TemplateRepository> = match &config.templates.local_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "reading templates from a local directory");
            Arc::new(LocalTemplates::new(dir.clone(), config.templates.filter.clone()))
        }
        None => Arc::new(
            S3Templates::connect(
                &config.templates.bucket,
                &config.templates.region,
                config.templates.location(),
            )
            .await,
        ),
    };

    let overrides = EnvOverrides::from_env();
    info!(count = overrides.len(), "parameter overrides loaded");

    Ok(Backends {
        scope,
        store,
        cloud,
        templates,
        overrides: Arc::new(overrides),
    })
}

/// Builds the application state over already connected backends.
pub fn assemble(config: &Config, backends: Backends) -> AppState {
    let broker_id = config.broker.broker_id.clone();
    let overrides = OverrideEngine::new(
        broker_id.clone(),
        backends.overrides,
        config.broker.prescribe_overrides,
    );

    let catalog = Arc::new(CatalogSynchronizer::new(
        Arc::clone(&backends.store),
        backends.templates,
        CatalogBuilder::new(backends.scope, config.broker.region.clone()),
        overrides.clone(),
    ));

    let broker = Broker::new(
        backends.store,
        backends.cloud,
        overrides,
        BrokerOptions {
            broker_id,
            templates: config.templates.source(),
        },
    );

    AppState::new(broker, catalog, config.auth.clone())
}
