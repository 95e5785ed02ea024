use uuid::Uuid;

use crate::error::{ModelError, Result};

/// Namespace for every deterministic identifier the broker hands out.
///
/// Derived once at startup from the cloud account and broker id, so that two
/// brokers sharing a datastore never collide and repeated catalog syncs yield
/// the same service and plan ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountScope(Uuid);

impl AccountScope {
    pub fn new(account_id: &str, broker_id: &str) -> Result<Self> {
        validate_broker_id(broker_id)?;
        let seed = format!("{account_id}{broker_id}");
        Ok(Self(Uuid::new_v5(&Uuid::nil(), seed.as_bytes())))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn service_id(&self, service_name: &str) -> String {
        Uuid::new_v5(&self.0, service_name.as_bytes()).to_string()
    }

    pub fn plan_id(&self, service_name: &str, plan_name: &str) -> String {
        let seed = format!("service__{service_name}__plan__{plan_name}");
        Uuid::new_v5(&self.0, seed.as_bytes()).to_string()
    }

    /// Storage key for a named lock.
    pub fn lock_key(&self, lock_name: &str) -> String {
        Uuid::new_v5(&self.0, lock_name.as_bytes()).to_string()
    }
}

impl std::fmt::Display for AccountScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn validate_broker_id(broker_id: &str) -> Result<()> {
    let valid = !broker_id.is_empty()
        && broker_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ModelError::InvalidBrokerId(broker_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_across_scopes_built_from_same_inputs() {
        let a = AccountScope::new("123456789012", "aws-service-broker").unwrap();
        let b = AccountScope::new("123456789012", "aws-service-broker").unwrap();
        assert_eq!(a.service_id("s3"), b.service_id("s3"));
        assert_eq!(
            a.plan_id("s3", "production"),
            b.plan_id("s3", "production")
        );
        assert_ne!(a.service_id("s3"), a.service_id("sqs"));
    }

    #[test]
    fn different_brokers_get_different_namespaces() {
        let a = AccountScope::new("123456789012", "broker-a").unwrap();
        let b = AccountScope::new("123456789012", "broker-b").unwrap();
        assert_ne!(a.service_id("s3"), b.service_id("s3"));
        assert_ne!(a.lock_key("ServiceSpec-s3"), b.lock_key("ServiceSpec-s3"));
    }

    #[test]
    fn rejects_broker_ids_with_separators() {
        assert!(AccountScope::new("1", "").is_err());
        assert!(AccountScope::new("1", "my_broker").is_err());
        assert!(AccountScope::new("1", "my-broker-2").is_ok());
    }
}
