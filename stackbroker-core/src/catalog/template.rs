//! Serde view of the parts of a stack template the catalog reads.
//!
//! Everything else in the document (resources, outputs, conditions) is
//! ignored, so intrinsic-function tags never need to be understood here.

use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateDocument {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, TemplateParameter>,
    #[serde(default)]
    pub metadata: TemplateMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateParameter {
    #[serde(rename = "Type", default)]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default: Option<serde_yaml::Value>,
    #[serde(default)]
    pub allowed_values: Option<Vec<serde_yaml::Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateMetadata {
    #[serde(rename = "AWS::CloudFormation::Interface", default)]
    pub interface: ParameterInterface,
    #[serde(rename = "AWS::ServiceBroker::Specification", default)]
    pub specification: Option<BrokerSpecification>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParameterInterface {
    #[serde(default)]
    pub parameter_groups: Vec<ParameterGroup>,
    #[serde(default)]
    pub parameter_labels: BTreeMap<String, Label>,
}

impl ParameterInterface {
    pub fn group_of(&self, parameter: &str) -> Option<&str> {
        self.parameter_groups
            .iter()
            .find(|group| group.parameters.iter().any(|p| p == parameter))
            .map(|group| group.label.text.as_str())
            .filter(|label| !label.is_empty())
    }

    pub fn label_of(&self, parameter: &str) -> Option<&str> {
        self.parameter_labels
            .get(parameter)
            .map(|label| label.text.as_str())
            .filter(|label| !label.is_empty())
    }

    /// Parameters in the order the groups declare them.
    pub fn declared_order(&self) -> Vec<String> {
        self.parameter_groups
            .iter()
            .flat_map(|group| group.parameters.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParameterGroup {
    #[serde(default)]
    pub label: Label,
    #[serde(default)]
    pub parameters: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Label {
    #[serde(rename = "default", default)]
    pub text: String,
}

/// The broker's own metadata block inside a template.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BrokerSpecification {
    #[serde(default)]
    pub version: Option<serde_yaml::Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub long_description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub documentation_url: Option<String>,
    #[serde(default)]
    pub provider_display_name: Option<String>,
    #[serde(default)]
    pub bindable: bool,
    #[serde(default)]
    pub updatable_parameters: Vec<String>,
    #[serde(default)]
    pub bind_via_lambda: bool,
    #[serde(default)]
    pub outputs_as_is: bool,
    #[serde(default)]
    pub cloud_foundry: bool,
    #[serde(default)]
    pub service_plans: BTreeMap<String, ServicePlanSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServicePlanSpec {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub long_description: Option<String>,
    #[serde(default)]
    pub cost: Option<String>,
    /// Fixed values; these parameters disappear from the plan's schema.
    #[serde(default)]
    pub parameter_values: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub parameter_defaults: BTreeMap<String, serde_yaml::Value>,
}
