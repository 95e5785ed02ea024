//! Typed JSON-Schema subset used for plan parameter schemas.
//!
//! Only the node kinds the catalog builder emits are modelled. An empty
//! `required` list is never serialized, because several platforms reject
//! `"required": []`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSON_SCHEMA_DRAFT: &str = "http://json-schema.org/draft-06/schema#";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SchemaNode {
    Object(ObjectSchema),
    String(ParameterSpec),
    Integer(ParameterSpec),
}

impl SchemaNode {
    pub fn spec(&self) -> Option<&ParameterSpec> {
        match self {
            SchemaNode::String(spec) | SchemaNode::Integer(spec) => Some(spec),
            SchemaNode::Object(_) => None,
        }
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.spec().and_then(|spec| spec.default.as_ref())
    }

    pub fn display_group(&self) -> Option<&str> {
        self.spec().and_then(|spec| spec.display_group.as_deref())
    }
}

/// Leaf parameter attributes shared by string and integer nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_group: Option<String>,
}

/// UI grouping hint attached to a schema; advisory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fieldset {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub items: Vec<String>,
}

impl Fieldset {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            kind: "fieldset".to_string(),
            title: title.into(),
            items: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectSchema {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<String>,
    #[serde(default)]
    properties: BTreeMap<String, SchemaNode>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    required: BTreeSet<String>,
    /// Values fixed by the plan, shown to clients but not settable.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    prescribed: BTreeMap<String, Value>,
    #[serde(
        rename = "openshift_form_definition",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    form: Vec<Fieldset>,
}

impl ObjectSchema {
    /// Top-level parameter schema carrying the draft marker.
    pub fn root() -> Self {
        Self {
            draft: Some(JSON_SCHEMA_DRAFT.to_string()),
            ..Self::default()
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, node: SchemaNode, required: bool) {
        let name = name.into();
        if required {
            self.required.insert(name.clone());
        } else {
            self.required.remove(&name);
        }
        self.properties.insert(name, node);
    }

    /// Drops a property and its required entry. Returns whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        self.required.remove(name);
        self.prescribed.remove(name);
        self.properties.remove(name).is_some()
    }

    /// Gives an existing leaf property a default, which also makes it optional.
    pub fn set_default(&mut self, name: &str, value: Value) -> bool {
        let Some(SchemaNode::String(spec) | SchemaNode::Integer(spec)) =
            self.properties.get_mut(name)
        else {
            return false;
        };
        spec.default = Some(value);
        self.required.remove(name);
        true
    }

    pub fn prescribe(&mut self, name: impl Into<String>, value: Value) {
        self.prescribed.insert(name.into(), value);
    }

    pub fn properties(&self) -> &BTreeMap<String, SchemaNode> {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&SchemaNode> {
        self.properties.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn required(&self) -> &BTreeSet<String> {
        &self.required
    }

    pub fn prescribed(&self) -> &BTreeMap<String, Value> {
        &self.prescribed
    }

    pub fn form(&self) -> &[Fieldset] {
        &self.form
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Rebuilds the fieldset list from the current properties' display groups.
    ///
    /// Groups appear in order of first occurrence; properties without a
    /// group are left out of the form.
    pub fn rebuild_form(&mut self, order: &[String]) {
        let mut form: Vec<Fieldset> = Vec::new();
        let names = order
            .iter()
            .filter(|name| self.properties.contains_key(name.as_str()))
            .chain(
                self.properties
                    .keys()
                    .filter(|name| !order.contains(name)),
            );
        for name in names {
            let Some(group) = self.properties[name].display_group() else {
                continue;
            };
            match form.iter_mut().find(|set| set.title == group) {
                Some(set) => set.items.push(name.clone()),
                None => {
                    let mut set = Fieldset::new(group);
                    set.items.push(name.clone());
                    form.push(set);
                }
            }
        }
        self.form = form;
    }

    /// Copy of this schema restricted to the named properties.
    pub fn restricted_to(&self, keep: &[String]) -> Self {
        let mut out = Self {
            draft: self.draft.clone(),
            ..Self::default()
        };
        for (name, node) in &self.properties {
            if keep.contains(name) {
                out.insert(name.clone(), node.clone(), self.required.contains(name));
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputParameters {
    pub parameters: SchemaNode,
}

impl InputParameters {
    pub fn new(schema: ObjectSchema) -> Self {
        Self {
            parameters: SchemaNode::Object(schema),
        }
    }

    pub fn object(&self) -> Option<&ObjectSchema> {
        match &self.parameters {
            SchemaNode::Object(schema) => Some(schema),
            _ => None,
        }
    }

    pub fn object_mut(&mut self) -> Option<&mut ObjectSchema> {
        match &mut self.parameters {
            SchemaNode::Object(schema) => Some(schema),
            _ => None,
        }
    }
}

/// Create and optional Update schemas for a plan's service instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSchemas {
    pub create: InputParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    update: Option<InputParameters>,
}

impl InstanceSchemas {
    /// The update schema is dropped when it has no properties.
    pub fn new(create: ObjectSchema, update: ObjectSchema) -> Self {
        let update = (!update.is_empty()).then(|| InputParameters::new(update));
        Self {
            create: InputParameters::new(create),
            update,
        }
    }

    pub fn create(&self) -> Option<&ObjectSchema> {
        self.create.object()
    }

    pub fn update(&self) -> Option<&ObjectSchema> {
        self.update.as_ref().and_then(InputParameters::object)
    }

    /// Removes a parameter from both schemas, collapsing an emptied update
    /// schema to `None`.
    pub fn strip(&mut self, name: &str) {
        if let Some(create) = self.create.object_mut() {
            create.remove(name);
        }
        let emptied = match self.update.as_mut().and_then(InputParameters::object_mut) {
            Some(update) => {
                update.remove(name);
                update.is_empty()
            }
            None => false,
        };
        if emptied {
            self.update = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn string_param() -> SchemaNode {
        SchemaNode::String(ParameterSpec::default())
    }

    #[test]
    fn empty_required_is_not_serialized() {
        let mut schema = ObjectSchema::root();
        schema.insert("only", string_param(), true);
        schema.remove("only");

        let value = serde_json::to_value(SchemaNode::Object(schema)).unwrap();
        assert_eq!(value["type"], "object");
        assert!(value.get("required").is_none(), "got {value}");
        assert_eq!(value["$schema"], JSON_SCHEMA_DRAFT);
    }

    #[test]
    fn stripping_last_update_property_drops_update_schema() {
        let mut create = ObjectSchema::root();
        create.insert("a", string_param(), true);
        create.insert("b", string_param(), false);
        let update = create.restricted_to(&["b".to_string()]);
        let mut schemas = InstanceSchemas::new(create, update);
        assert!(schemas.update().is_some());

        schemas.strip("b");
        assert!(schemas.update().is_none());
        let create = schemas.create().unwrap();
        assert!(create.contains("a"));
        assert!(!create.contains("b"));
    }

    #[test]
    fn empty_update_schema_is_omitted_at_construction() {
        let schemas = InstanceSchemas::new(ObjectSchema::root(), ObjectSchema::root());
        let value = serde_json::to_value(&schemas).unwrap();
        assert!(value.get("update").is_none());
    }

    #[test]
    fn leaf_nodes_serialize_as_json_schema() {
        let node = SchemaNode::Integer(ParameterSpec {
            default: Some(json!(5)),
            allowed: Some(vec!["5".into(), "10".into()]),
            ..ParameterSpec::default()
        });
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({"type": "integer", "default": 5, "enum": ["5", "10"]})
        );
    }

    #[test]
    fn form_groups_follow_declared_order() {
        let grouped = |group: &str| {
            SchemaNode::String(ParameterSpec {
                display_group: Some(group.to_string()),
                ..ParameterSpec::default()
            })
        };
        let mut schema = ObjectSchema::root();
        schema.insert("z", grouped("Network"), false);
        schema.insert("a", grouped("Storage"), false);
        schema.insert("m", grouped("Network"), false);
        schema.insert("loose", string_param(), false);
        schema.rebuild_form(&["z".into(), "a".into(), "m".into()]);

        let titles: Vec<_> = schema.form().iter().map(|f| f.title.as_str()).collect();
        assert_eq!(titles, ["Network", "Storage"]);
        assert_eq!(schema.form()[0].items, ["z", "m"]);
    }
}
