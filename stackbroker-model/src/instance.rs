use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A provisioned service instance and the parameters its stack ran with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub id: String,
    pub service_id: String,
    pub plan_id: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Orchestrator run identifier; empty until the create call succeeds.
    #[serde(default)]
    pub stack_id: String,
}

impl ServiceInstance {
    /// Two instances match when everything but the stack id is equal.
    pub fn matches(&self, other: &ServiceInstance) -> bool {
        self.id == other.id
            && self.service_id == other.service_id
            && self.plan_id == other.plan_id
            && self.params == other.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(params: &[(&str, &str)], stack_id: &str) -> ServiceInstance {
        ServiceInstance {
            id: "i-1".into(),
            service_id: "svc".into(),
            plan_id: "plan".into(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            stack_id: stack_id.into(),
        }
    }

    #[test]
    fn stack_id_is_ignored_when_matching() {
        let stored = instance(&[("a", "1")], "arn:stack/1");
        let requested = instance(&[("a", "1")], "");
        assert!(stored.matches(&requested));
    }

    #[test]
    fn params_are_compared_deeply() {
        let stored = instance(&[("a", "1"), ("b", "2")], "");
        assert!(!stored.matches(&instance(&[("a", "1")], "")));
        assert!(!stored.matches(&instance(&[("a", "1"), ("b", "3")], "")));
    }
}
