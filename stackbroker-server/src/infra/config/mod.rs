pub mod cli;
pub mod loader;
pub mod sources;

use std::path::PathBuf;

use stackbroker_core::{broker::TemplateSource, templates::TemplateLocation};

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8443;
pub const DEFAULT_BROKER_ID: &str = "aws-service-broker";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_BUCKET: &str = "awsservicebroker";
pub const DEFAULT_KEY: &str = "templates/";
pub const DEFAULT_TEMPLATE_FILTER: &str = "-main.yaml";
pub const DEFAULT_TABLE_NAME: &str = "aws-service-broker";
pub const DEFAULT_POLL_SECS: u64 = 600;

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub broker: BrokerConfig,
    pub templates: TemplatesConfig,
    pub auth: AuthConfig,
    pub redis: Option<RedisConfig>,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub broker_id: String,
    pub region: String,
    /// Account the catalog is scoped to; resolved from the caller identity
    /// when unset.
    pub account_id: Option<String>,
    pub prescribe_overrides: bool,
    pub table_name: String,
    pub catalog_poll_secs: u64,
    pub cloud_backend: CloudBackend,
}

/// Which cloud the broker drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloudBackend {
    #[default]
    Aws,
    /// In-process fake cloud, for local runs without credentials.
    Memory,
}

impl CloudBackend {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "aws" => Some(Self::Aws),
            "memory" | "fake" => Some(Self::Memory),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemplatesConfig {
    pub bucket: String,
    pub region: String,
    /// Key prefix, always ending in `/`.
    pub key: String,
    pub filter: String,
    /// Read templates from this directory instead of the bucket.
    pub local_dir: Option<PathBuf>,
}

impl TemplatesConfig {
    pub fn location(&self) -> TemplateLocation {
        TemplateLocation::new(self.key.clone(), self.filter.clone())
    }

    pub fn source(&self) -> TemplateSource {
        TemplateSource {
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            key: self.key.clone(),
            filter: self.filter.clone(),
        }
    }
}

#[derive(Clone, Default)]
pub struct AuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl AuthConfig {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Basic auth is enforced only when both halves are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some((user, pass))
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
