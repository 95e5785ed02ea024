use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{TemplateListing, TemplateRepository};
use crate::error::{BrokerError, Result};

/// Templates read from a directory on disk, for running without a bucket.
#[derive(Debug, Clone)]
pub struct LocalTemplates {
    root: PathBuf,
    suffix: String,
}

impl LocalTemplates {
    pub fn new(root: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            suffix: suffix.into(),
        }
    }
}

#[async_trait]
impl TemplateRepository for LocalTemplates {
    async fn list_templates(&self) -> Result<Vec<TemplateListing>> {
        let mut dir = tokio::fs::read_dir(&self.root).await.map_err(|e| {
            BrokerError::Template(format!("failed to read {}: {e}", self.root.display()))
        })?;

        let mut listings = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| BrokerError::Template(e.to_string()))?
        {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(name) = file_name.strip_suffix(self.suffix.as_str()) else {
                continue;
            };
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| BrokerError::Template(e.to_string()))?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata
                .modified()
                .map_err(|e| BrokerError::Template(e.to_string()))?;
            listings.push(TemplateListing {
                name: name.to_string(),
                last_modified: DateTime::<Utc>::from(modified),
            });
        }
        listings.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(count = listings.len(), root = %self.root.display(), "listed local templates");
        Ok(listings)
    }

    async fn get_template(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.root.join(format!("{name}{}", self.suffix));
        tokio::fs::read(&path)
            .await
            .map_err(|e| BrokerError::Template(format!("failed to read {}: {e}", path.display())))
    }
}
