use once_cell::sync::Lazy;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

use stackbroker_model::{ModelError, ids::validate_broker_id};

use super::{
    AuthConfig, BrokerConfig, CloudBackend, Config, ConfigMetadata, DEFAULT_BROKER_ID,
    DEFAULT_BUCKET, DEFAULT_HOST, DEFAULT_KEY, DEFAULT_POLL_SECS, DEFAULT_PORT, DEFAULT_REGION,
    DEFAULT_TABLE_NAME, DEFAULT_TEMPLATE_FILTER, RedisConfig, ServerConfig, TemplatesConfig,
    sources::{EnvConfig, FileConfig},
};

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("stackbroker.toml"),
        PathBuf::from("config/stackbroker.toml"),
    ]
});

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

/// A loaded configuration plus the non-fatal problems found on the way.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file {path} does not exist")]
    MissingConfig { path: PathBuf },

    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to load environment file: {0}")]
    EnvFile(#[from] dotenvy::Error),

    #[error(transparent)]
    BrokerId(#[from] ModelError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Loads `.env`, then the TOML file, then the process environment.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = self.load_env_file()?;
        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Resolves the configuration against an already gathered environment.
    pub fn load_with_env(&self, env: EnvConfig) -> Result<ConfigLoad, ConfigLoadError> {
        let (file, config_path) = self.load_file_config(&env)?;
        self.compose_config(file, env, config_path)
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        let loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        match loaded {
            Ok(loaded) => Ok(loaded),
            Err(dotenvy::Error::Io(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let explicit = self
            .options
            .config_path
            .clone()
            .or_else(|| env.config_path.clone());

        let path = match explicit {
            Some(path) if !path.exists() => {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            Some(path) => path,
            None => match DEFAULT_CONFIG_LOCATIONS.iter().find(|candidate| candidate.exists()) {
                Some(found) => found.clone(),
                None => return Ok((None, None)),
            },
        };

        let file = read_file_config(&path)?;
        Ok((Some(file), Some(path)))
    }

    fn compose_config(
        &self,
        file: Option<FileConfig>,
        env: EnvConfig,
        config_path: Option<PathBuf>,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let mut warnings = Vec::new();
        if config_path.is_none() {
            warnings.push(
                "No stackbroker.toml detected; using environment variables and defaults".to_string(),
            );
        }

        let FileConfig {
            server: file_server,
            broker: file_broker,
            templates: file_templates,
            auth: file_auth,
            redis: file_redis,
        } = file.unwrap_or_default();

        let server = ServerConfig {
            host: env
                .server_host
                .or(file_server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: env.server_port.or(file_server.port).unwrap_or(DEFAULT_PORT),
        };

        let cloud_backend = match env.cloud_backend.or(file_broker.cloud_backend) {
            Some(raw) => CloudBackend::parse(&raw).ok_or_else(|| {
                ConfigLoadError::Invalid(format!(
                    "unknown cloud backend {raw:?}; expected \"aws\" or \"memory\""
                ))
            })?,
            None => CloudBackend::default(),
        };

        let broker = BrokerConfig {
            broker_id: env
                .broker_id
                .or(file_broker.broker_id)
                .unwrap_or_else(|| DEFAULT_BROKER_ID.to_string()),
            region: env
                .region
                .or(file_broker.region)
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            account_id: env.account_id.or(file_broker.account_id),
            prescribe_overrides: env
                .prescribe_overrides
                .or(file_broker.prescribe_overrides)
                .unwrap_or(false),
            table_name: env
                .table_name
                .or(file_broker.table_name)
                .unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            catalog_poll_secs: env
                .catalog_poll_secs
                .or(file_broker.catalog_poll_secs)
                .unwrap_or(DEFAULT_POLL_SECS),
            cloud_backend,
        };

        let templates = TemplatesConfig {
            bucket: env
                .bucket
                .or(file_templates.bucket)
                .unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            region: env
                .bucket_region
                .or(file_templates.region)
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            key: with_trailing_slash(
                env.key
                    .or(file_templates.key)
                    .unwrap_or_else(|| DEFAULT_KEY.to_string()),
            ),
            filter: env
                .template_filter
                .or(file_templates.filter)
                .unwrap_or_else(|| DEFAULT_TEMPLATE_FILTER.to_string()),
            local_dir: env.template_dir.or(file_templates.local_dir),
        };

        let auth = AuthConfig {
            username: env.username.or(file_auth.username),
            password: env.password.or(file_auth.password),
        };
        if auth.credentials().is_none() {
            if auth.username.is_some() || auth.password.is_some() {
                warnings.push(
                    "Only one of BROKER_USERNAME and BROKER_PASSWORD is set; basic auth is disabled"
                        .to_string(),
                );
            } else {
                warnings.push("Basic auth is disabled; the broker API is open".to_string());
            }
        }

        let redis = env
            .redis_url
            .map(|url| RedisConfig { url })
            .or_else(|| file_redis.map(|r| RedisConfig { url: r.url }));

        let config = Config {
            server,
            broker,
            templates,
            auth,
            redis,
            metadata: ConfigMetadata {
                config_path,
                env_file_loaded: false,
            },
        };
        validate(&config)?;

        Ok(ConfigLoad { config, warnings })
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn with_trailing_slash(mut key: String) -> String {
    if !key.ends_with('/') {
        key.push('/');
    }
    key
}

/// Checks that the broker can start with this configuration.
pub fn validate(config: &Config) -> Result<(), ConfigLoadError> {
    validate_broker_id(&config.broker.broker_id)?;
    if config.broker.catalog_poll_secs == 0 {
        return Err(ConfigLoadError::Invalid(
            "catalog poll interval must be at least one second".into(),
        ));
    }
    if config.templates.filter.is_empty() {
        return Err(ConfigLoadError::Invalid("template filter must not be empty".into()));
    }
    Ok(())
}
