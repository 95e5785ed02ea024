//! Template-to-catalog conversion.

pub mod builder;
pub mod template;

pub use builder::{CatalogBuilder, SUPPORTED_REGIONS, strip_template_id};
pub use template::TemplateDocument;
