//! Template sources for the catalog.
//!
//! A repository lists template objects under a prefix, keeps only keys
//! ending in the configured suffix, and reports each as a bare service name
//! with its last-modified time.

pub mod local;
#[cfg(feature = "aws")]
pub mod s3;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::{BrokerError, Result};

pub use local::LocalTemplates;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateListing {
    pub name: String,
    pub last_modified: DateTime<Utc>,
}

/// Where templates live inside a bucket or directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateLocation {
    pub prefix: String,
    pub suffix: String,
}

impl TemplateLocation {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// Service name for an object key, if the key is a template.
    pub fn name_for(&self, key: &str) -> Option<String> {
        let rest = key.strip_prefix(self.prefix.as_str()).unwrap_or(key);
        rest.strip_suffix(self.suffix.as_str()).map(str::to_string)
    }

    pub fn key_for(&self, name: &str) -> String {
        format!("{}{}{}", self.prefix, name, self.suffix)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn list_templates(&self) -> Result<Vec<TemplateListing>>;

    async fn get_template(&self, name: &str) -> Result<Vec<u8>>;
}

/// Templates held in memory, keyed by service name.
#[derive(Debug, Default)]
pub struct MemoryTemplates {
    entries: RwLock<BTreeMap<String, (DateTime<Utc>, Vec<u8>)>>,
}

impl MemoryTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, name: impl Into<String>, last_modified: DateTime<Utc>, body: impl Into<Vec<u8>>) {
        self.entries
            .write()
            .insert(name.into(), (last_modified, body.into()));
    }

    pub fn remove(&self, name: &str) {
        self.entries.write().remove(name);
    }
}

#[async_trait]
impl TemplateRepository for MemoryTemplates {
    async fn list_templates(&self) -> Result<Vec<TemplateListing>> {
        Ok(self
            .entries
            .read()
            .iter()
            .map(|(name, (last_modified, _))| TemplateListing {
                name: name.clone(),
                last_modified: *last_modified,
            })
            .collect())
    }

    async fn get_template(&self, name: &str) -> Result<Vec<u8>> {
        self.entries
            .read()
            .get(name)
            .map(|(_, body)| body.clone())
            .ok_or_else(|| BrokerError::Template(format!("template {name} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_strip_prefix_and_suffix() {
        let location = TemplateLocation::new("templates/", "-main.yaml");
        assert_eq!(location.name_for("templates/s3-main.yaml").as_deref(), Some("s3"));
        assert_eq!(location.name_for("templates/s3-readme.md"), None);
        assert_eq!(location.key_for("rdsmysql"), "templates/rdsmysql-main.yaml");
    }
}
