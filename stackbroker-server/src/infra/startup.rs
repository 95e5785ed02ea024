use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use stackbroker_core::BrokerError;
use tracing::info;

use crate::infra::app_state::AppState;

#[async_trait]
pub trait StartupHooks: Send + Sync {
    async fn run(&self, state: &AppState) -> Result<()>;
}

/// Runs the first catalog sync before the listener opens, then keeps the
/// catalog current in the background.
#[derive(Debug)]
pub struct ProdStartupHooks {
    pub poll_interval: Duration,
}

impl ProdStartupHooks {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

#[async_trait]
impl StartupHooks for ProdStartupHooks {
    async fn run(&self, state: &AppState) -> Result<()> {
        let report = match state.catalog.sync_once().await {
            Ok(report) => report,
            Err(err @ BrokerError::BucketInaccessible) => {
                return Err(err).context("initial catalog sync cannot read the template bucket");
            }
            Err(err) => return Err(err).context("initial catalog sync failed"),
        };
        info!(
            listed = report.listed,
            published = report.published.len(),
            skipped = ?report.skipped,
            unresolved = ?report.unresolved,
            "initial catalog sync complete"
        );

        Arc::clone(&state.catalog).spawn_poller(self.poll_interval);
        info!(period_secs = self.poll_interval.as_secs(), "catalog poller started");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NoopStartupHooks;

#[async_trait]
impl StartupHooks for NoopStartupHooks {
    async fn run(&self, _state: &AppState) -> Result<()> {
        Ok(())
    }
}
