use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use super::{CloudBackend, Config, ConfigLoadError, ConfigLoader, ConfigLoaderOptions, loader};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "stackbroker")]
#[command(about = "Open Service Broker that provisions catalog services as infrastructure stacks")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub serve: ServeArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load and validate the configuration, print a summary and exit
    Check,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Path to a stackbroker.toml file
    #[arg(short, long, env = "STACKBROKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to a .env file loaded before the environment is read
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// Server host (overrides config)
    #[arg(long)]
    pub host: Option<String>,

    /// Server port (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Broker id used to scope catalog ids and overrides
    #[arg(long)]
    pub broker_id: Option<String>,

    /// Default region for stacks
    #[arg(long)]
    pub region: Option<String>,

    /// Read templates from a local directory instead of the bucket
    #[arg(long)]
    pub template_dir: Option<PathBuf>,

    /// Cloud backend: aws or memory
    #[arg(long)]
    pub cloud_backend: Option<String>,

    /// Hide overridden parameters from the catalog and report them as
    /// prescribed values
    #[arg(long)]
    pub prescribe_overrides: Option<bool>,
}

impl ServeArgs {
    pub fn loader(&self) -> ConfigLoader {
        ConfigLoader::with_options(ConfigLoaderOptions {
            config_path: self.config.clone(),
            env_file: self.env_file.clone(),
        })
    }

    /// Applies flag values on top of a loaded configuration and re-validates it.
    pub fn apply(&self, config: &mut Config) -> Result<(), ConfigLoadError> {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(broker_id) = &self.broker_id {
            config.broker.broker_id = broker_id.clone();
        }
        if let Some(region) = &self.region {
            config.broker.region = region.clone();
        }
        if let Some(dir) = &self.template_dir {
            config.templates.local_dir = Some(dir.clone());
        }
        if let Some(raw) = &self.cloud_backend {
            config.broker.cloud_backend = CloudBackend::parse(raw).ok_or_else(|| {
                ConfigLoadError::Invalid(format!("unknown cloud backend {raw:?}"))
            })?;
        }
        if let Some(prescribe) = self.prescribe_overrides {
            config.broker.prescribe_overrides = prescribe;
        }
        loader::validate(config)
    }
}

/// Human-readable summary printed by `stackbroker check`.
pub fn summarize(config: &Config) -> String {
    let mut lines = vec![
        format!("listen: {}:{}", config.server.host, config.server.port),
        format!("broker id: {}", config.broker.broker_id),
        format!("region: {}", config.broker.region),
        format!(
            "account: {}",
            config
                .broker
                .account_id
                .as_deref()
                .unwrap_or("(caller identity)")
        ),
        format!("cloud backend: {}", config.broker.cloud_backend.as_str()),
    ];
    match &config.templates.local_dir {
        Some(dir) => lines.push(format!("templates: {} (*{})", dir.display(), config.templates.filter)),
        None => lines.push(format!(
            "templates: s3://{}/{}*{} ({})",
            config.templates.bucket, config.templates.key, config.templates.filter, config.templates.region
        )),
    }
    lines.push(format!(
        "datastore: {}",
        if config.redis.is_some() { "redis" } else { "memory" }
    ));
    lines.push(format!("table: {}", config.broker.table_name));
    lines.push(format!("prescribe overrides: {}", config.broker.prescribe_overrides));
    lines.push(format!("catalog poll: {}s", config.broker.catalog_poll_secs));
    lines.push(format!(
        "basic auth: {}",
        if config.auth.credentials().is_some() { "enabled" } else { "disabled" }
    ));
    lines.join("\n")
}
