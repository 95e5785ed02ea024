use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};
use stackbroker_model::{
    AccountScope, InstanceSchemas, ObjectSchema, ParameterSpec, Plan, PlanSchemas, SchemaNode,
    ServiceDefinition, ServiceMetadata, catalog::param_value,
};
use thiserror::Error;
use tracing::{debug, warn};

use super::template::{BrokerSpecification, ServicePlanSpec, TemplateDocument};

static TEMPLATE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"qs-([a-z0-9]){9}").expect("template id pattern is valid")
});

/// Regions offered for the `region` parameter.
pub const SUPPORTED_REGIONS: &[&str] = &[
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-south-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ca-central-1",
    "eu-central-1",
    "eu-north-1",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "sa-east-1",
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
];

const ACCOUNT_GROUP: &str = "AWS Account Information";
const TAGS_GROUP: &str = "Resource Tags";

#[derive(Debug, Error)]
enum BuildError {
    #[error("invalid template document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("template has no AWS::ServiceBroker::Specification metadata")]
    MissingSpecification,

    #[error("specification has no service name")]
    MissingName,

    #[error("unrepresentable value: {0}")]
    Value(#[from] serde_json::Error),
}

/// Turns template documents into catalog services for one account scope.
#[derive(Debug, Clone)]
pub struct CatalogBuilder {
    scope: AccountScope,
    default_region: String,
}

impl CatalogBuilder {
    pub fn new(scope: AccountScope, default_region: impl Into<String>) -> Self {
        Self {
            scope,
            default_region: default_region.into(),
        }
    }

    /// Builds the service for a template body.
    ///
    /// A template that cannot be converted yields a blank definition (empty
    /// name) and a warning; callers skip publishing blank definitions.
    pub fn build(&self, template_name: &str, body: &[u8]) -> ServiceDefinition {
        match self.try_build(body) {
            Ok(definition) => {
                debug!(
                    template = %template_name,
                    service_id = %definition.id,
                    plans = definition.plans.len(),
                    "converted template"
                );
                definition
            }
            Err(err) => {
                warn!(template = %template_name, error = %err, "failed to convert template");
                ServiceDefinition::default()
            }
        }
    }

    fn try_build(&self, body: &[u8]) -> Result<ServiceDefinition, BuildError> {
        let document: TemplateDocument = serde_yaml::from_slice(body)?;
        let spec = document
            .metadata
            .specification
            .as_ref()
            .ok_or(BuildError::MissingSpecification)?;
        if spec.name.is_empty() {
            return Err(BuildError::MissingName);
        }

        let base = self.base_schema(&document)?;
        let mut order = document.metadata.interface.declared_order();
        order.extend(non_template_names().map(str::to_string));

        let plans = spec
            .service_plans
            .iter()
            .map(|(plan_name, plan)| self.build_plan(spec, plan_name, plan, &base, &order))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ServiceDefinition {
            id: self.scope.service_id(&spec.name),
            name: spec.name.clone(),
            description: strip_template_id(&document.description),
            tags: spec.tags.clone(),
            bindable: spec.bindable,
            plan_updateable: false,
            metadata: ServiceMetadata {
                display_name: spec.display_name.clone(),
                image_url: spec.image_url.clone(),
                long_description: spec.long_description.clone(),
                provider_display_name: spec.provider_display_name.clone(),
                documentation_url: spec.documentation_url.clone(),
                bind_via_lambda: spec.bind_via_lambda,
                outputs_as_is: spec.outputs_as_is,
                cloud_foundry: spec.cloud_foundry,
            },
            plans,
        })
    }

    /// Schema shared by every plan before plan values and defaults apply.
    fn base_schema(&self, document: &TemplateDocument) -> Result<ObjectSchema, BuildError> {
        let interface = &document.metadata.interface;
        let mut schema = ObjectSchema::root();

        for (name, parameter) in &document.parameters {
            let default = parameter.default.as_ref().map(yaml_to_json).transpose()?;
            let allowed = parameter
                .allowed_values
                .as_ref()
                .map(|values| {
                    values
                        .iter()
                        .map(|v| yaml_to_json(v).map(|v| param_value(&v)))
                        .collect::<Result<Vec<_>, _>>()
                })
                .transpose()?;
            let required = default.is_none();
            let spec = ParameterSpec {
                description: parameter.description.clone(),
                default,
                allowed,
                title: interface.label_of(name).map(str::to_string),
                display_group: interface.group_of(name).map(str::to_string),
            };
            let node = match parameter.kind.as_str() {
                "Number" => SchemaNode::Integer(spec),
                _ => SchemaNode::String(spec),
            };
            schema.insert(name.clone(), node, required);
        }

        for (name, spec) in self.non_template_params() {
            schema.insert(name, SchemaNode::String(spec), false);
        }
        Ok(schema)
    }

    fn build_plan(
        &self,
        spec: &BrokerSpecification,
        plan_name: &str,
        plan: &ServicePlanSpec,
        base: &ObjectSchema,
        order: &[String],
    ) -> Result<Plan, BuildError> {
        let mut create = base.clone();
        for (name, value) in &plan.parameter_values {
            create.remove(name);
            create.prescribe(name.clone(), yaml_to_json(value)?);
        }
        for (name, value) in &plan.parameter_defaults {
            if !create.set_default(name, yaml_to_json(value)?) {
                debug!(plan = %plan_name, parameter = %name, "default for unknown parameter ignored");
            }
        }

        let mut update = create.restricted_to(&spec.updatable_parameters);
        create.rebuild_form(order);
        update.rebuild_form(order);

        let mut metadata = Map::new();
        if let Some(display_name) = &plan.display_name {
            metadata.insert("displayName".into(), json!(display_name));
        }
        if let Some(long_description) = &plan.long_description {
            metadata.insert("longDescription".into(), json!(long_description));
        }
        if let Some(cost) = &plan.cost {
            metadata.insert("cost".into(), json!(cost));
        }

        Ok(Plan {
            id: self.scope.plan_id(&spec.name, plan_name),
            name: plan_name.to_string(),
            description: plan.description.clone(),
            free: false,
            bindable: None,
            metadata,
            schemas: PlanSchemas {
                service_instance: InstanceSchemas::new(create, update),
            },
        })
    }

    fn non_template_params(&self) -> Vec<(&'static str, ParameterSpec)> {
        vec![
            (
                "region",
                ParameterSpec {
                    description: Some("AWS Region to create the resources in.".into()),
                    default: Some(json!(self.default_region)),
                    allowed: Some(SUPPORTED_REGIONS.iter().map(|r| r.to_string()).collect()),
                    title: Some("AWS Region".into()),
                    display_group: Some(ACCOUNT_GROUP.into()),
                },
            ),
            (
                "target_account_id",
                ParameterSpec {
                    description: Some(
                        "AWS account to provision into. Defaults to the broker's account.".into(),
                    ),
                    title: Some("AWS Target Account ID".into()),
                    display_group: Some(ACCOUNT_GROUP.into()),
                    ..ParameterSpec::default()
                },
            ),
            (
                "target_role_name",
                ParameterSpec {
                    description: Some(
                        "IAM role to assume in the target account. Leave empty to use the broker's credentials.".into(),
                    ),
                    title: Some("AWS Target Role Name".into()),
                    display_group: Some(ACCOUNT_GROUP.into()),
                    ..ParameterSpec::default()
                },
            ),
            (
                "user_tags",
                ParameterSpec {
                    description: Some(
                        r#"JSON list of tags for the stack, e.g. [{"Key": "team", "Value": "data"}]"#.into(),
                    ),
                    title: Some("User Tags".into()),
                    display_group: Some(TAGS_GROUP.into()),
                    ..ParameterSpec::default()
                },
            ),
            (
                "admin_tags",
                ParameterSpec {
                    description: Some(
                        r#"JSON list of operator tags for the stack, e.g. [{"Key": "cost-center", "Value": "42"}]"#.into(),
                    ),
                    title: Some("Admin Tags".into()),
                    display_group: Some(TAGS_GROUP.into()),
                    ..ParameterSpec::default()
                },
            ),
        ]
    }
}

fn non_template_names() -> impl Iterator<Item = &'static str> {
    ["region", "target_account_id", "target_role_name", "user_tags", "admin_tags"].into_iter()
}

fn yaml_to_json(value: &serde_yaml::Value) -> Result<Value, serde_json::Error> {
    serde_json::to_value(value)
}

pub fn strip_template_id(description: &str) -> String {
    TEMPLATE_ID.replace_all(description, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = r#"
AWSTemplateFormatVersion: "2010-09-09"
Description: "AWS Service Broker - Amazon S3 (qs-1nt0fs937)"
Metadata:
  AWS::CloudFormation::Interface:
    ParameterGroups:
      - Label:
          default: S3 Bucket Settings
        Parameters:
          - BucketName
          - LoggingPrefix
          - EnableVersioning
      - Label:
          default: Lifecycle
        Parameters:
          - RetentionDays
    ParameterLabels:
      BucketName:
        default: Bucket Name
  AWS::ServiceBroker::Specification:
    Version: 1.0
    Tags: [AWS, S3, Object Storage]
    Name: s3
    DisplayName: Amazon S3
    LongDescription: Object storage built to store and retrieve any amount of data.
    Bindable: true
    UpdatableParameters:
      - EnableVersioning
      - RetentionDays
    ServicePlans:
      production:
        DisplayName: Production
        Description: S3 bucket pre-configured with production best practices
        Cost: https://aws.amazon.com/s3/pricing/
        ParameterValues:
          EnableVersioning: "true"
        ParameterDefaults:
          LoggingPrefix: prod-logs/
      custom:
        DisplayName: Custom
        Description: S3 bucket pre-configured with sane defaults
Parameters:
  BucketName:
    Type: String
    Description: Name of the bucket.
  LoggingPrefix:
    Type: String
    Description: Prefix for access logs.
  EnableVersioning:
    Type: String
    Default: "false"
    AllowedValues: ["true", "false"]
  RetentionDays:
    Type: Number
    Default: 30
Resources:
  Bucket:
    Type: AWS::S3::Bucket
    Properties:
      BucketName: !Ref BucketName
"#;

    fn builder() -> CatalogBuilder {
        CatalogBuilder::new(
            AccountScope::new("123456789012", "test-broker").unwrap(),
            "us-west-2",
        )
    }

    #[test]
    fn converts_service_and_plans() {
        let builder = builder();
        let def = builder.build("s3", TEMPLATE.as_bytes());

        assert_eq!(def.name, "s3");
        assert_eq!(def.description, "AWS Service Broker - Amazon S3 ()");
        assert_eq!(def.id, builder.scope.service_id("s3"));
        assert!(def.bindable);
        assert!(!def.plan_updateable);
        assert_eq!(def.metadata.display_name.as_deref(), Some("Amazon S3"));
        assert_eq!(def.plans.len(), 2);

        let custom = def.plans.iter().find(|p| p.name == "custom").unwrap();
        assert_eq!(custom.id, builder.scope.plan_id("s3", "custom"));
        let create = custom.create_schema().unwrap();
        assert!(matches!(create.property("RetentionDays"), Some(SchemaNode::Integer(_))));
        let required: Vec<_> = create.required().iter().cloned().collect();
        assert_eq!(required, ["BucketName", "LoggingPrefix"]);
        assert!(create.contains("region"));
        assert!(create.contains("target_role_name"));
        assert_eq!(
            create.property("BucketName").and_then(|n| n.spec()).and_then(|s| s.title.as_deref()),
            Some("Bucket Name")
        );
        assert_eq!(custom.updatable_params(), ["EnableVersioning", "RetentionDays"]);
    }

    #[test]
    fn plan_values_are_prescribed_and_defaults_apply() {
        let def = builder().build("s3", TEMPLATE.as_bytes());
        let production = def.plans.iter().find(|p| p.name == "production").unwrap();
        let create = production.create_schema().unwrap();

        assert!(!create.contains("EnableVersioning"));
        assert_eq!(
            production.prescribed_params(),
            vec![("EnableVersioning".to_string(), "true".to_string())]
        );
        assert!(!create.required().contains("LoggingPrefix"));
        assert!(production.defaults().contains(&("LoggingPrefix".to_string(), "prod-logs/".to_string())));
        assert_eq!(production.updatable_params(), ["RetentionDays"]);
        assert_eq!(
            production.metadata.get("cost"),
            Some(&json!("https://aws.amazon.com/s3/pricing/"))
        );
    }

    #[test]
    fn fieldsets_follow_parameter_groups() {
        let def = builder().build("s3", TEMPLATE.as_bytes());
        let create = def.plans[0].create_schema().unwrap();
        let titles: Vec<_> = create.form().iter().map(|f| f.title.as_str()).collect();
        assert_eq!(
            titles,
            ["S3 Bucket Settings", "Lifecycle", ACCOUNT_GROUP, TAGS_GROUP]
        );
    }

    #[test]
    fn update_schema_is_omitted_without_updatable_parameters() {
        let template = TEMPLATE.replace(
            "    UpdatableParameters:\n      - EnableVersioning\n      - RetentionDays\n",
            "",
        );
        let def = builder().build("s3", template.as_bytes());
        assert!(!def.is_blank());
        assert!(def.plans.iter().all(|p| p.update_schema().is_none()));
    }

    #[test]
    fn broken_templates_yield_blank_definitions() {
        let builder = builder();
        assert!(builder.build("bad", b"Description: [unclosed").is_blank());
        assert!(builder.build("nospec", b"Description: no metadata").is_blank());
        assert!(
            builder
                .build("noname", b"Metadata:\n  AWS::ServiceBroker::Specification:\n    Bindable: true\n")
                .is_blank()
        );
    }

    #[test]
    fn strips_template_ids() {
        assert_eq!(strip_template_id("  Amazon SQS qs-1nt0fs93c "), "Amazon SQS");
        assert_eq!(strip_template_id("no id here"), "no id here");
    }
}
