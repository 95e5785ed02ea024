use std::{fmt, sync::Arc};

use stackbroker_core::{Broker, CatalogSynchronizer};

use crate::infra::config::AuthConfig;

#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<Broker>,
    pub catalog: Arc<CatalogSynchronizer>,
    pub auth: Arc<AuthConfig>,
}

impl AppState {
    pub fn new(broker: Broker, catalog: Arc<CatalogSynchronizer>, auth: AuthConfig) -> Self {
        Self {
            broker: Arc::new(broker),
            catalog,
            auth: Arc::new(auth),
        }
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("broker_id", &self.broker.broker_id())
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}
