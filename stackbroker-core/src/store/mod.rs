//! Logical persistence contract for catalog, instance and binding records,
//! plus the named-lock primitive used by the catalog synchronizer.

pub mod memory;
pub mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use stackbroker_model::{ServiceBinding, ServiceDefinition, ServiceInstance};
use tracing::{debug, warn};

use crate::error::Result;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Type tag stored with every record; deletes refuse to remove a record
/// whose tag does not match the requested kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    ServiceDefinition,
    ServiceInstance,
    Binding,
    Param,
    Lock,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::ServiceDefinition => "servicedefinition",
            RecordKind::ServiceInstance => "serviceinstance",
            RecordKind::Binding => "binding",
            RecordKind::Param => "param",
            RecordKind::Lock => "lock",
        }
    }
}

/// Bounds for [`DataStore::wait_for_unlock`].
#[derive(Debug, Clone, Copy)]
pub struct LockWait {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub timeout: Duration,
}

impl Default for LockWait {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(15),
            timeout: Duration::from_secs(10),
        }
    }
}

impl LockWait {
    fn jitter(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        let mut rng = rand::rng();
        let millis = rng.random_range(
            self.min_delay.as_millis() as u64..self.max_delay.as_millis() as u64,
        );
        Duration::from_millis(millis)
    }
}

#[async_trait]
pub trait DataStore: Send + Sync {
    async fn put_service_definition(&self, definition: &ServiceDefinition) -> Result<()>;

    async fn get_service_definition(&self, id: &str) -> Result<Option<ServiceDefinition>>;

    async fn get_service_instance(&self, id: &str) -> Result<Option<ServiceInstance>>;

    async fn put_service_instance(&self, instance: &ServiceInstance) -> Result<()>;

    /// Deletes the instance record; a record of another kind under the same
    /// key is left alone.
    async fn delete_service_instance(&self, id: &str) -> Result<()>;

    async fn get_service_binding(&self, id: &str) -> Result<Option<ServiceBinding>>;

    async fn put_service_binding(&self, binding: &ServiceBinding) -> Result<()>;

    async fn delete_service_binding(&self, id: &str) -> Result<()>;

    async fn get_param(&self, name: &str) -> Result<Option<String>>;

    async fn put_param(&self, name: &str, value: &str) -> Result<()>;

    /// Creates the lock if absent. Returns true iff this call created it.
    async fn lock(&self, name: &str) -> Result<bool>;

    async fn is_locked(&self, name: &str) -> Result<bool>;

    async fn unlock(&self, name: &str) -> Result<()>;

    fn lock_wait(&self) -> LockWait {
        LockWait::default()
    }

    /// Polls until the lock disappears. On timeout the lock is broken and
    /// `false` is returned so the caller can retry acquisition itself.
    async fn wait_for_unlock(&self, name: &str) -> Result<bool> {
        let policy = self.lock_wait();
        let mut waited = Duration::ZERO;
        while self.is_locked(name).await? {
            let delay = policy.jitter();
            waited += delay;
            if waited > policy.timeout {
                warn!(lock = %name, waited = ?waited, "lock wait timed out, breaking lock");
                self.unlock(name).await?;
                return Ok(false);
            }
            debug!(lock = %name, delay = ?delay, "waiting for lock");
            tokio::time::sleep(delay).await;
        }
        Ok(true)
    }
}
