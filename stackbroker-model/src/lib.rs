//! Core data model definitions shared across stackbroker crates.
//!
//! The types here serialize to the Open Service Broker v2.13 wire shapes
//! directly, so the server can hand catalog snapshots to clients without an
//! intermediate mapping layer.
#![allow(missing_docs)]

pub mod binding;
pub mod catalog;
pub mod error;
pub mod ids;
pub mod instance;
pub mod schema;

pub use binding::ServiceBinding;
pub use catalog::{Plan, PlanSchemas, ServiceDefinition, ServiceMetadata};
pub use error::{ModelError, Result as ModelResult};
pub use ids::AccountScope;
pub use instance::ServiceInstance;
pub use schema::{
    Fieldset, InputParameters, InstanceSchemas, JSON_SCHEMA_DRAFT,
    ObjectSchema, ParameterSpec, SchemaNode,
};
