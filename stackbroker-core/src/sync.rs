//! Periodic reconciliation of the catalog with the template repository.
//!
//! Each pass lists templates, marks names whose timestamp advanced as stale,
//! and rebuilds those under a per-name lock in the data store so that several
//! brokers sharing a store do not convert the same template at once.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use stackbroker_model::ServiceDefinition;
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, error, info, warn};

use crate::{
    catalog::CatalogBuilder,
    error::Result,
    overrides::OverrideEngine,
    store::DataStore,
    templates::TemplateRepository,
};

pub const LAST_SYNC_PARAM: &str = "catalogLastSync";
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(600);
/// Rounds of wait-and-retry for templates whose lock was held.
pub const MAX_LOCK_RETRIES: usize = 3;

pub fn lock_name(template: &str) -> String {
    format!("ServiceSpec-{template}")
}

/// Concurrent map whose entries expire after a fixed time-to-live.
#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: Duration,
    entries: DashMap<String, (Instant, V)>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.0.elapsed() < self.ttl => return Some(entry.1.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), (Instant::now(), value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refresh {
    Published,
    Skipped,
    LockHeld,
}

/// Outcome of one synchronization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub listed: usize,
    pub published: Vec<String>,
    pub skipped: Vec<String>,
    /// Names whose lock could not be obtained within the retry budget.
    pub unresolved: Vec<String>,
}

pub struct CatalogSynchronizer {
    store: Arc<dyn DataStore>,
    templates: Arc<dyn TemplateRepository>,
    builder: CatalogBuilder,
    overrides: OverrideEngine,
    listings: TtlCache<DateTime<Utc>>,
    definitions: TtlCache<ServiceDefinition>,
    listed: RwLock<Vec<String>>,
}

impl std::fmt::Debug for CatalogSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogSynchronizer")
            .field("builder", &self.builder)
            .field("overrides", &self.overrides)
            .field("cached_definitions", &self.definitions.len())
            .finish_non_exhaustive()
    }
}

impl CatalogSynchronizer {
    pub fn new(
        store: Arc<dyn DataStore>,
        templates: Arc<dyn TemplateRepository>,
        builder: CatalogBuilder,
        overrides: OverrideEngine,
    ) -> Self {
        Self::with_ttl(store, templates, builder, overrides, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(
        store: Arc<dyn DataStore>,
        templates: Arc<dyn TemplateRepository>,
        builder: CatalogBuilder,
        overrides: OverrideEngine,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            templates,
            builder,
            overrides,
            listings: TtlCache::new(ttl),
            definitions: TtlCache::new(ttl),
            listed: RwLock::new(Vec::new()),
        }
    }

    /// Runs one list, diff, refresh pass.
    ///
    /// Only a failure to list templates is returned; per-template failures
    /// are logged and leave the previously cached definition in place.
    pub async fn sync_once(&self) -> Result<SyncReport> {
        let listings = self.templates.list_templates().await?;
        let mut report = SyncReport {
            listed: listings.len(),
            ..SyncReport::default()
        };

        let mut stale = Vec::new();
        let mut fresh = Vec::new();
        for listing in &listings {
            let newer = match self.listings.get(&listing.name) {
                Some(seen) => seen.timestamp() < listing.last_modified.timestamp(),
                None => true,
            };
            if newer {
                self.listings.set(listing.name.clone(), listing.last_modified);
                stale.push(listing.name.clone());
            } else {
                fresh.push(listing.name.clone());
            }
        }
        *self.listed.write() = listings.iter().map(|l| l.name.clone()).collect();
        info!(stale = ?stale, unchanged = fresh.len(), "updating catalog listings");

        let mut deferred = Vec::new();
        for name in stale {
            match self.refresh(&name).await {
                Refresh::Published => report.published.push(name),
                Refresh::Skipped => report.skipped.push(name),
                Refresh::LockHeld => deferred.push(name),
            }
        }

        for name in &fresh {
            match self.definitions.get(name) {
                Some(definition) => self.definitions.set(name.clone(), definition),
                None => warn!(template = %name, "unchanged template missing from catalog cache"),
            }
        }

        let mut attempt = 0;
        while !deferred.is_empty() && attempt < MAX_LOCK_RETRIES {
            attempt += 1;
            debug!(attempt, names = ?deferred, "retrying locked templates");
            let outcomes = join_all(deferred.iter().map(|name| self.wait_and_refresh(name))).await;
            let mut still_locked = Vec::new();
            for (name, outcome) in deferred.into_iter().zip(outcomes) {
                match outcome {
                    Refresh::Published => report.published.push(name),
                    Refresh::Skipped => report.skipped.push(name),
                    Refresh::LockHeld => still_locked.push(name),
                }
            }
            deferred = still_locked;
        }
        if !deferred.is_empty() {
            warn!(names = ?deferred, "gave up waiting for template locks");
        }
        report.unresolved = deferred;

        if let Err(err) = self
            .store
            .put_param(LAST_SYNC_PARAM, &Utc::now().to_rfc3339())
            .await
        {
            warn!(error = %err, "failed to record catalog sync time");
        }

        Ok(report)
    }

    async fn wait_and_refresh(&self, name: &str) -> Refresh {
        if let Err(err) = self.store.wait_for_unlock(&lock_name(name)).await {
            warn!(template = %name, error = %err, "waiting for template lock failed");
            return Refresh::LockHeld;
        }
        self.refresh(name).await
    }

    async fn refresh(&self, name: &str) -> Refresh {
        let lock = lock_name(name);
        match self.store.lock(&lock).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(template = %name, "template lock held elsewhere");
                return Refresh::LockHeld;
            }
            Err(err) => {
                warn!(template = %name, error = %err, "failed to acquire template lock");
                return Refresh::LockHeld;
            }
        }

        let outcome = self.load(name).await;

        if let Err(err) = self.store.unlock(&lock).await {
            warn!(template = %name, error = %err, "failed to release template lock");
        }
        outcome
    }

    async fn load(&self, name: &str) -> Refresh {
        let body = match self.templates.get_template(name).await {
            Ok(body) => body,
            Err(err) => {
                error!(template = %name, error = %err, "failed to fetch template");
                return Refresh::Skipped;
            }
        };

        let definition = self.builder.build(name, &body);
        if definition.is_blank() {
            error!(template = %name, "invalid service definition, keeping previous version");
            return Refresh::Skipped;
        }

        if let Err(err) = self.store.put_service_definition(&definition).await {
            error!(template = %name, error = %err, "failed to store service definition");
            return Refresh::Skipped;
        }
        info!(template = %name, service = %definition.name, id = %definition.id, "published service");
        self.definitions.set(name, definition);
        Refresh::Published
    }

    /// Cached definitions for every listed template with prescription applied.
    pub fn catalog(&self) -> Vec<ServiceDefinition> {
        let names = self.listed.read().clone();
        let mut services: Vec<ServiceDefinition> = names
            .iter()
            .filter_map(|name| {
                let definition = self.definitions.get(name);
                if definition.is_none() {
                    warn!(template = %name, "listed template has no cached definition");
                }
                definition
            })
            .collect();
        self.overrides.prescribe(&mut services);
        services
    }

    /// Re-runs [`sync_once`](Self::sync_once) every `period`, starting one
    /// period from now.
    pub fn spawn_poller(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                match self.sync_once().await {
                    Ok(report) => debug!(?report, "catalog poll complete"),
                    Err(err) => error!(error = %err, "catalog poll failed"),
                }
            }
        })
    }
}
