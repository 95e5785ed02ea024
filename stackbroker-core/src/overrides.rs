//! Operator-supplied parameter overrides.
//!
//! Keys have the shape `<broker>_<cluster>_<namespace>_<service>_<param>`
//! where any of the four scope segments may be the wildcard `all`. An
//! override either injects a value at provision time or, when it applies to
//! every cluster, namespace and service, is prescribed: hidden from the
//! published schemas entirely.

use std::{collections::BTreeMap, fmt, sync::Arc};

use stackbroker_model::ServiceDefinition;
use tracing::debug;

pub const OVERRIDE_ENV_PREFIX: &str = "PARAM_OVERRIDE_";
pub const WILDCARD: &str = "all";

/// A fully scoped override lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverrideKey<'a> {
    pub broker: &'a str,
    pub cluster: &'a str,
    pub namespace: &'a str,
    pub service: &'a str,
    pub param: &'a str,
}

impl fmt::Display for OverrideKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}_{}",
            self.broker, self.cluster, self.namespace, self.service, self.param
        )
    }
}

pub trait OverrideSource: Send + Sync {
    /// Non-empty value stored under exactly this key.
    fn value(&self, key: &OverrideKey<'_>) -> Option<String>;

    /// Overrides scoped to all clusters, namespaces and services of `broker`,
    /// keyed by parameter name.
    fn global_params(&self, broker: &str) -> BTreeMap<String, String>;
}

/// Overrides read from `PARAM_OVERRIDE_*` variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    entries: BTreeMap<String, String>,
}

impl EnvOverrides {
    /// Snapshot of the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Keeps prefixed variables with non-empty values; the prefix is dropped.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let entries = vars
            .into_iter()
            .filter_map(|(key, value)| {
                let key = key.as_ref().strip_prefix(OVERRIDE_ENV_PREFIX)?.to_string();
                let value = value.into();
                (!value.is_empty()).then_some((key, value))
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl OverrideSource for EnvOverrides {
    fn value(&self, key: &OverrideKey<'_>) -> Option<String> {
        self.entries.get(&key.to_string()).cloned()
    }

    fn global_params(&self, broker: &str) -> BTreeMap<String, String> {
        let scoped = |b: &str| format!("{b}_{WILDCARD}_{WILDCARD}_{WILDCARD}_");
        let mut globals = BTreeMap::new();
        // Broker-specific entries are applied last so they win.
        for prefix in [scoped(WILDCARD), scoped(broker)] {
            for (key, value) in &self.entries {
                if let Some(param) = key.strip_prefix(prefix.as_str()) {
                    globals.insert(param.to_string(), value.clone());
                }
            }
        }
        globals
    }
}

/// Resolves and prescribes overrides for one broker.
#[derive(Clone)]
pub struct OverrideEngine {
    broker_id: String,
    source: Arc<dyn OverrideSource>,
    prescribe: bool,
}

impl fmt::Debug for OverrideEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideEngine")
            .field("broker_id", &self.broker_id)
            .field("prescribe", &self.prescribe)
            .finish_non_exhaustive()
    }
}

impl OverrideEngine {
    pub fn new(broker_id: impl Into<String>, source: Arc<dyn OverrideSource>, prescribe: bool) -> Self {
        Self {
            broker_id: broker_id.into(),
            source,
            prescribe,
        }
    }

    pub fn broker_id(&self) -> &str {
        &self.broker_id
    }

    /// Override values for `params` in the given scope.
    ///
    /// Every combination of wildcard and specific segment is probed, least
    /// specific first, so the most specific match ends up in the result.
    pub fn resolve(
        &self,
        params: &[String],
        cluster: &str,
        namespace: &str,
        service: &str,
    ) -> BTreeMap<String, String> {
        let brokers = probe_values(&self.broker_id);
        let clusters = probe_values(cluster);
        let namespaces = probe_values(namespace);
        let services = probe_values(service);

        let mut overrides = BTreeMap::new();
        for broker in &brokers {
            for cluster in &clusters {
                for namespace in &namespaces {
                    for service in &services {
                        for param in params {
                            let key = OverrideKey {
                                broker,
                                cluster,
                                namespace,
                                service,
                                param,
                            };
                            if let Some(value) = self.source.value(&key) {
                                overrides.insert(param.clone(), value);
                            }
                        }
                    }
                }
            }
        }
        debug!(?overrides, cluster, namespace, service, "resolved overrides");
        overrides
    }

    pub fn global_overrides(&self) -> BTreeMap<String, String> {
        self.source.global_params(&self.broker_id)
    }

    /// Hides globally overridden parameters from every plan's schemas.
    /// Does nothing unless prescription is enabled.
    pub fn prescribe(&self, services: &mut [ServiceDefinition]) {
        if !self.prescribe {
            return;
        }
        let globals = self.global_overrides();
        if globals.is_empty() {
            return;
        }
        for service in services.iter_mut() {
            for plan in service.plans.iter_mut() {
                for param in globals.keys() {
                    plan.schemas.service_instance.strip(param);
                }
            }
        }
    }
}

fn probe_values(specific: &str) -> Vec<&str> {
    if specific == WILDCARD {
        vec![WILDCARD]
    } else {
        vec![WILDCARD, specific]
    }
}
