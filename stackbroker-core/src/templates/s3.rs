use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{TemplateListing, TemplateLocation, TemplateRepository};
use crate::error::{BrokerError, Result};

/// Templates stored as objects in an S3 bucket.
#[derive(Debug, Clone)]
pub struct S3Templates {
    client: Client,
    bucket: String,
    location: TemplateLocation,
}

impl S3Templates {
    pub async fn connect(bucket: &str, region: &str, location: TemplateLocation) -> Self {
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self::from_config(&shared_config, bucket, location)
    }

    pub fn from_config(shared_config: &SdkConfig, bucket: &str, location: TemplateLocation) -> Self {
        let client = Client::from_conf(aws_sdk_s3::config::Builder::from(shared_config).build());
        Self {
            client,
            bucket: bucket.to_string(),
            location,
        }
    }
}

#[async_trait]
impl TemplateRepository for S3Templates {
    async fn list_templates(&self) -> Result<Vec<TemplateListing>> {
        info!(bucket = %self.bucket, prefix = %self.location.prefix, "listing templates");

        let mut listings = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&self.location.prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|err| {
                    if err
                        .as_service_error()
                        .is_some_and(|e| e.is_no_such_bucket())
                    {
                        BrokerError::BucketInaccessible
                    } else {
                        BrokerError::Template(format!(
                            "failed to list objects: {}",
                            DisplayErrorContext(&err)
                        ))
                    }
                })?;

            for object in output.contents() {
                let Some(name) = object.key().and_then(|key| self.location.name_for(key)) else {
                    continue;
                };
                let last_modified = object
                    .last_modified()
                    .and_then(|ts| DateTime::<Utc>::from_timestamp(ts.secs(), ts.subsec_nanos()))
                    .unwrap_or_default();
                listings.push(TemplateListing {
                    name,
                    last_modified,
                });
            }

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!(count = listings.len(), "found templates");
        Ok(listings)
    }

    async fn get_template(&self, name: &str) -> Result<Vec<u8>> {
        let key = self.location.key_for(name);
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|err| {
                BrokerError::Template(format!("failed to get {key}: {}", DisplayErrorContext(&err)))
            })?;
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|err| BrokerError::Template(format!("failed to read {key}: {err}")))?;
        Ok(bytes.into_bytes().to_vec())
    }
}
