use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use stackbroker_model::{AccountScope, ServiceBinding, ServiceDefinition, ServiceInstance};
use tracing::debug;

use super::{DataStore, LockWait, RecordKind};
use crate::error::{BrokerError, Result};

#[derive(Debug, Clone)]
struct Record {
    kind: RecordKind,
    body: Value,
}

/// Process-local [`DataStore`]. Used when no Redis URL is configured and
/// throughout the test suites.
#[derive(Debug)]
pub struct MemoryStore {
    scope: AccountScope,
    records: DashMap<String, Record>,
    lock_wait: LockWait,
}

impl MemoryStore {
    pub fn new(scope: AccountScope) -> Self {
        Self {
            scope,
            records: DashMap::new(),
            lock_wait: LockWait::default(),
        }
    }

    pub fn with_lock_wait(mut self, lock_wait: LockWait) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    fn put<T: Serialize>(&self, key: &str, kind: RecordKind, value: &T) -> Result<()> {
        let body = serde_json::to_value(value)?;
        self.records.insert(key.to_string(), Record { kind, body });
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, key: &str, kind: RecordKind) -> Result<Option<T>> {
        let Some(record) = self.records.get(key) else {
            return Ok(None);
        };
        if record.kind != kind {
            debug!(key, expected = kind.as_str(), found = record.kind.as_str(), "record kind mismatch");
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(record.body.clone())?))
    }

    fn delete(&self, key: &str, kind: RecordKind) -> Result<()> {
        let removed = self.records.remove_if(key, |_, record| record.kind == kind);
        if removed.is_none() && self.records.contains_key(key) {
            return Err(BrokerError::Store(format!(
                "refusing to delete {key}: stored record is not a {}",
                kind.as_str()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn put_service_definition(&self, definition: &ServiceDefinition) -> Result<()> {
        self.put(&definition.id, RecordKind::ServiceDefinition, definition)
    }

    async fn get_service_definition(&self, id: &str) -> Result<Option<ServiceDefinition>> {
        self.get(id, RecordKind::ServiceDefinition)
    }

    async fn get_service_instance(&self, id: &str) -> Result<Option<ServiceInstance>> {
        self.get(id, RecordKind::ServiceInstance)
    }

    async fn put_service_instance(&self, instance: &ServiceInstance) -> Result<()> {
        self.put(&instance.id, RecordKind::ServiceInstance, instance)
    }

    async fn delete_service_instance(&self, id: &str) -> Result<()> {
        self.delete(id, RecordKind::ServiceInstance)
    }

    async fn get_service_binding(&self, id: &str) -> Result<Option<ServiceBinding>> {
        self.get(id, RecordKind::Binding)
    }

    async fn put_service_binding(&self, binding: &ServiceBinding) -> Result<()> {
        self.put(&binding.id, RecordKind::Binding, binding)
    }

    async fn delete_service_binding(&self, id: &str) -> Result<()> {
        self.delete(id, RecordKind::Binding)
    }

    async fn get_param(&self, name: &str) -> Result<Option<String>> {
        self.get(name, RecordKind::Param)
    }

    async fn put_param(&self, name: &str, value: &str) -> Result<()> {
        self.put(name, RecordKind::Param, &value)
    }

    async fn lock(&self, name: &str) -> Result<bool> {
        let key = self.scope.lock_key(name);
        match self.records.entry(key) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(Record {
                    kind: RecordKind::Lock,
                    body: Value::String(name.to_string()),
                });
                Ok(true)
            }
        }
    }

    async fn is_locked(&self, name: &str) -> Result<bool> {
        Ok(self.records.contains_key(&self.scope.lock_key(name)))
    }

    async fn unlock(&self, name: &str) -> Result<()> {
        self.delete(&self.scope.lock_key(name), RecordKind::Lock)
    }

    fn lock_wait(&self) -> LockWait {
        self.lock_wait
    }
}
