use std::fmt;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::{AsyncCommands, Script, aio::ConnectionManager};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use stackbroker_model::{AccountScope, ServiceBinding, ServiceDefinition, ServiceInstance};
use tracing::{debug, info, warn};

use super::{DataStore, RecordKind};
use crate::error::{BrokerError, Result};

/// Deletes KEYS[1] only when its stored `type` equals ARGV[1].
/// Returns 1 when deleted, 0 when absent, -1 on kind mismatch.
static DELETE_IF_KIND: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
  return 0
end
local record = cjson.decode(raw)
if record['type'] ~= ARGV[1] then
  return -1
end
redis.call('DEL', KEYS[1])
return 1
"#,
    )
});

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: RecordKind,
    data: Value,
}

/// [`DataStore`] backed by Redis. Records live under
/// `<table>:<account-scope>:<id>` as JSON envelopes tagged with their kind.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    table: String,
    scope: AccountScope,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("connection", &"ConnectionManager")
            .field("table", &self.table)
            .field("scope", &self.scope)
            .finish()
    }
}

impl RedisStore {
    pub async fn connect(redis_url: &str, table: &str, scope: AccountScope) -> Result<Self> {
        info!("Connecting to Redis datastore at {}", redis_url);

        let client = redis::Client::open(redis_url)
            .map_err(|e| BrokerError::Store(format!("Failed to create Redis client: {e}")))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| BrokerError::Store(format!("Failed to connect to Redis: {e}")))?;

        info!(table, "Successfully connected to Redis datastore");

        Ok(Self {
            conn,
            table: table.to_string(),
            scope,
        })
    }

    fn key(&self, id: &str) -> String {
        format!("{}:{}:{}", self.table, self.scope, id)
    }

    async fn put<T: Serialize>(&self, id: &str, kind: RecordKind, value: &T) -> Result<()> {
        let key = self.key(id);
        debug!("Store PUT: {} ({})", key, kind.as_str());
        let envelope = Envelope {
            kind,
            data: serde_json::to_value(value)?,
        };
        let json = serde_json::to_string(&envelope)?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(&key, json)
            .await
            .map_err(|e| BrokerError::Store(format!("Redis SET failed: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, id: &str, kind: RecordKind) -> Result<Option<T>> {
        let key = self.key(id);
        debug!("Store GET: {}", key);
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| BrokerError::Store(format!("Redis GET failed: {e}")))?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let envelope: Envelope = serde_json::from_str(&raw)?;
        if envelope.kind != kind {
            debug!(key = %key, expected = kind.as_str(), "record kind mismatch");
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(envelope.data)?))
    }

    async fn delete(&self, id: &str, kind: RecordKind) -> Result<()> {
        let key = self.key(id);
        debug!("Store DEL: {} ({})", key, kind.as_str());
        let mut conn = self.conn.clone();
        let outcome: i64 = DELETE_IF_KIND
            .key(&key)
            .arg(kind.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| BrokerError::Store(format!("Redis conditional delete failed: {e}")))?;
        if outcome < 0 {
            warn!(key = %key, kind = kind.as_str(), "refusing to delete record of a different kind");
            return Err(BrokerError::Store(format!(
                "refusing to delete {id}: stored record is not a {}",
                kind.as_str()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DataStore for RedisStore {
    async fn put_service_definition(&self, definition: &ServiceDefinition) -> Result<()> {
        self.put(&definition.id, RecordKind::ServiceDefinition, definition)
            .await
    }

    async fn get_service_definition(&self, id: &str) -> Result<Option<ServiceDefinition>> {
        self.get(id, RecordKind::ServiceDefinition).await
    }

    async fn get_service_instance(&self, id: &str) -> Result<Option<ServiceInstance>> {
        self.get(id, RecordKind::ServiceInstance).await
    }

    async fn put_service_instance(&self, instance: &ServiceInstance) -> Result<()> {
        self.put(&instance.id, RecordKind::ServiceInstance, instance)
            .await
    }

    async fn delete_service_instance(&self, id: &str) -> Result<()> {
        self.delete(id, RecordKind::ServiceInstance).await
    }

    async fn get_service_binding(&self, id: &str) -> Result<Option<ServiceBinding>> {
        self.get(id, RecordKind::Binding).await
    }

    async fn put_service_binding(&self, binding: &ServiceBinding) -> Result<()> {
        self.put(&binding.id, RecordKind::Binding, binding).await
    }

    async fn delete_service_binding(&self, id: &str) -> Result<()> {
        self.delete(id, RecordKind::Binding).await
    }

    async fn get_param(&self, name: &str) -> Result<Option<String>> {
        self.get(name, RecordKind::Param).await
    }

    async fn put_param(&self, name: &str, value: &str) -> Result<()> {
        self.put(name, RecordKind::Param, &value).await
    }

    async fn lock(&self, name: &str) -> Result<bool> {
        let key = self.key(&self.scope.lock_key(name));
        let envelope = Envelope {
            kind: RecordKind::Lock,
            data: Value::String(name.to_string()),
        };
        let json = serde_json::to_string(&envelope)?;
        let mut conn = self.conn.clone();
        let acquired: bool = conn
            .set_nx(&key, json)
            .await
            .map_err(|e| BrokerError::Store(format!("Redis SETNX failed: {e}")))?;
        if !acquired {
            debug!(lock = %name, "already locked");
        }
        Ok(acquired)
    }

    async fn is_locked(&self, name: &str) -> Result<bool> {
        let key = self.key(&self.scope.lock_key(name));
        let mut conn = self.conn.clone();
        conn.exists::<_, bool>(&key)
            .await
            .map_err(|e| BrokerError::Store(format!("Redis EXISTS failed: {e}")))
    }

    async fn unlock(&self, name: &str) -> Result<()> {
        self.delete(&self.scope.lock_key(name), RecordKind::Lock)
            .await
    }
}
