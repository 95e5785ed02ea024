use serde::{Deserialize, Serialize};

/// A credential binding against a service instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceBinding {
    pub id: String,
    pub instance_id: String,
    /// Policy attached to `role_name` at bind time, detached on unbind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl ServiceBinding {
    /// Requested bindings never carry a policy yet, so it is not compared.
    pub fn matches(&self, other: &ServiceBinding) -> bool {
        self.id == other.id
            && self.instance_id == other.instance_id
            && self.role_name == other.role_name
            && self.scope == other.scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_is_not_part_of_identity() {
        let stored = ServiceBinding {
            id: "b".into(),
            instance_id: "i".into(),
            policy_arn: Some("arn:aws:iam::1:policy/p".into()),
            role_name: Some("app".into()),
            scope: Some("ReadOnly".into()),
        };
        let requested = ServiceBinding {
            policy_arn: None,
            ..stored.clone()
        };
        assert!(stored.matches(&requested));
        assert!(!stored.matches(&ServiceBinding {
            scope: Some("Full".into()),
            ..requested
        }));
    }
}
