use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Shape of `stackbroker.toml`. Every field is optional; the environment
/// and built-in defaults fill whatever the file leaves out.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub broker: FileBrokerConfig,
    #[serde(default)]
    pub templates: FileTemplatesConfig,
    #[serde(default)]
    pub auth: FileAuthConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis: Option<FileRedisConfig>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileBrokerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prescribe_overrides: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_poll_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_backend: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileTemplatesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileAuthConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileRedisConfig {
    pub url: String,
}

/// Settings read from the process environment.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub broker_id: Option<String>,
    pub region: Option<String>,
    pub account_id: Option<String>,
    pub bucket: Option<String>,
    pub bucket_region: Option<String>,
    pub key: Option<String>,
    pub template_filter: Option<String>,
    pub template_dir: Option<PathBuf>,
    pub prescribe_overrides: Option<bool>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub redis_url: Option<String>,
    pub catalog_poll_secs: Option<u64>,
    pub table_name: Option<String>,
    pub cloud_backend: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the settings from an arbitrary variable lookup. Empty values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            config_path: var("STACKBROKER_CONFIG").map(PathBuf::from),
            server_host: var("SERVER_HOST"),
            server_port: var("SERVER_PORT").and_then(|s| s.parse().ok()),
            broker_id: var("BROKER_ID"),
            region: var("AWS_REGION"),
            account_id: var("AWS_ACCOUNT_ID"),
            bucket: var("S3_BUCKET"),
            bucket_region: var("S3_REGION"),
            key: var("S3_KEY"),
            template_filter: var("TEMPLATE_FILTER"),
            template_dir: var("TEMPLATE_DIR").map(PathBuf::from),
            prescribe_overrides: var("PRESCRIBE_OVERRIDES").and_then(|s| parse_bool(&s)),
            username: var("BROKER_USERNAME"),
            password: var("BROKER_PASSWORD"),
            redis_url: var("REDIS_URL"),
            catalog_poll_secs: var("CATALOG_POLL_SECS").and_then(|s| s.parse().ok()),
            table_name: var("TABLE_NAME"),
            cloud_backend: var("CLOUD_BACKEND"),
        }
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
