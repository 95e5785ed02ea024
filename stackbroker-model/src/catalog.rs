use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::{InstanceSchemas, ObjectSchema};

/// Display hints and behaviour flags carried on a catalog service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
    /// Credentials are produced by invoking a function named in the stack outputs.
    #[serde(default, skip_serializing_if = "is_false")]
    pub bind_via_lambda: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub outputs_as_is: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub cloud_foundry: bool,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub bindable: bool,
    pub plan_updateable: bool,
    #[serde(default)]
    pub metadata: ServiceMetadata,
    #[serde(default)]
    pub plans: Vec<Plan>,
}

impl ServiceDefinition {
    /// A definition the builder could not fill in; never published.
    pub fn is_blank(&self) -> bool {
        self.name.is_empty()
    }

    pub fn plan(&self, plan_id: &str) -> Option<&Plan> {
        self.plans.iter().find(|plan| plan.id == plan_id)
    }

    pub fn bind_via_lambda(&self) -> bool {
        self.metadata.bind_via_lambda
    }

    pub fn leave_outputs_as_is(&self) -> bool {
        self.metadata.outputs_as_is || self.metadata.cloud_foundry
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub description: String,
    pub free: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bindable: Option<bool>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    pub schemas: PlanSchemas,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSchemas {
    pub service_instance: InstanceSchemas,
}

impl Plan {
    pub fn create_schema(&self) -> Option<&ObjectSchema> {
        self.schemas.service_instance.create()
    }

    pub fn update_schema(&self) -> Option<&ObjectSchema> {
        self.schemas.service_instance.update()
    }

    /// Defaults declared on the create schema, rendered as strings.
    pub fn defaults(&self) -> Vec<(String, String)> {
        self.create_schema()
            .map(|schema| {
                schema
                    .properties()
                    .iter()
                    .filter_map(|(name, node)| {
                        node.default_value()
                            .map(|value| (name.clone(), param_value(value)))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn available_params(&self) -> Vec<String> {
        self.create_schema()
            .map(|schema| schema.properties().keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn updatable_params(&self) -> Vec<String> {
        self.update_schema()
            .map(|schema| schema.properties().keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn required_params(&self) -> Vec<String> {
        self.create_schema()
            .map(|schema| schema.required().iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Values the plan fixes regardless of client input.
    pub fn prescribed_params(&self) -> Vec<(String, String)> {
        self.create_schema()
            .map(|schema| {
                schema
                    .prescribed()
                    .iter()
                    .map(|(name, value)| (name.clone(), param_value(value)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Renders a JSON scalar the way it is handed to the orchestrator.
pub fn param_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
