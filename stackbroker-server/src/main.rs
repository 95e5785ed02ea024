//! # Stackbroker
//!
//! Open Service Broker that turns every catalog service into an
//! infrastructure stack template.
//!
//! ## Architecture
//!
//! The server is built on Axum and uses:
//! - S3 (or a local directory) for service templates
//! - CloudFormation, SSM, IAM and Lambda through the AWS SDK
//! - Redis for instance and binding records, or memory when unconfigured

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use clap::Parser;
use stackbroker_server::{
    create_app,
    infra::{
        bootstrap,
        config::{
            Config, ConfigLoad,
            cli::{Cli, Command, ServeArgs, summarize},
        },
        startup::{ProdStartupHooks, StartupHooks},
    },
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Loaded before the subscriber so RUST_LOG may come from .env.
    let load = cli
        .serve
        .loader()
        .load()
        .context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = finish_config(&cli.serve, load)?;

    match cli.command {
        Some(Command::Check) => {
            println!("{}", summarize(&config));
            Ok(())
        }
        None => run_server(config).await,
    }
}

fn finish_config(args: &ServeArgs, load: ConfigLoad) -> anyhow::Result<Config> {
    for warning in &load.warnings {
        warn!("{warning}");
    }

    let mut config = load.config;
    if config.metadata.env_file_loaded {
        info!("environment file loaded");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }
    args.apply(&mut config)
        .context("invalid command-line configuration")?;
    Ok(config)
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    info!(
        broker_id = %config.broker.broker_id,
        region = %config.broker.region,
        backend = config.broker.cloud_backend.as_str(),
        "starting stackbroker"
    );

    let backends = bootstrap::connect_backends(&config).await?;
    let state = bootstrap::assemble(&config, backends);

    ProdStartupHooks::new(Duration::from_secs(config.broker.catalog_poll_secs))
        .run(&state)
        .await?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Broker API listening on http://{addr}");

    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("stackbroker stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
