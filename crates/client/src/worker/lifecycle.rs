//! Install and activate.
//!
//! `installing → waiting → activating → active`. Install precaches the
//! shell (plus the locality's data when registered under a locality) and
//! never fails on a single resource. Activate drops every partition from
//! other versions, purges expired dynamic entries, claims the open pages
//! and announces itself.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::Ordering;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use url::Url;

use barrio_core::{Error, Partition};

use super::ServiceWorker;
use super::messages::WorkerMessage;
use crate::engine::CacheEngine;
use crate::fetch::url::short;
use crate::fetch::{RetryPolicy, with_cache_buster};

/// Lifecycle position of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Installing,
    Waiting,
    Activating,
    Active,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Installing => "installing",
            WorkerState::Waiting => "waiting",
            WorkerState::Activating => "activating",
            WorkerState::Active => "active",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecacheFailure {
    pub url: String,
    pub error: String,
}

/// Per-partition precache result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecacheOutcome {
    pub successful: Vec<String>,
    pub failed: Vec<PrecacheFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReport {
    pub context: String,
    /// Keyed by partition storage name.
    pub partitions: BTreeMap<String, PrecacheOutcome>,
}

impl InstallReport {
    pub fn successful(&self) -> usize {
        self.partitions.values().map(|o| o.successful.len()).sum()
    }

    pub fn failed(&self) -> usize {
        self.partitions.values().map(|o| o.failed.len()).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateReport {
    pub deleted_partitions: Vec<String>,
    pub purged_entries: u64,
    pub claimed_clients: usize,
}

/// Static and image resources get the larger retry budget.
fn precache_priority(partition: Partition) -> u32 {
    match partition {
        Partition::Static | Partition::Assets => 1,
        Partition::Api | Partition::Business | Partition::Dynamic => 2,
    }
}

impl ServiceWorker {
    /// Site paths precached at install time.
    pub fn precache_paths(&self) -> Vec<String> {
        let config = self.engine.config();
        let mut paths = config.critical_resources.clone();
        if let Some(locality) = self.context.locality() {
            paths.push(format!("/{locality}/index.html"));
            paths.extend(config.locality_data_files.iter().map(|f| format!("/{locality}/data/{f}")));
        }
        paths
    }

    /// Precache everything into its classified partition, then move to waiting.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        if self.state().await != WorkerState::Installing {
            return Err(Error::InvalidState(format!("install while {}", self.state().await)));
        }

        let config = self.engine.config();
        tracing::info!(version = %config.cache_version, context = %self.context, "installing");

        let now = self.engine.now_ms();
        for name in config.current_partition_names() {
            self.engine.db().open_partition(&name, now).await?;
        }

        let mut groups: BTreeMap<Partition, Vec<Url>> = BTreeMap::new();
        for path in self.precache_paths() {
            match self.engine.site_url(&path) {
                Ok(url) => {
                    let partition = self.engine.classifier().classify(url.path()).class.partition();
                    groups.entry(partition).or_default().push(url);
                }
                Err(e) => tracing::warn!(path, error = %e, "skipping precache path"),
            }
        }

        let runs = groups.into_iter().map(|(partition, urls)| async move {
            let outcome = precache_group(&self.engine, partition, &urls).await;
            (partition, outcome)
        });

        let mut report = InstallReport { context: self.context.to_string(), partitions: BTreeMap::new() };
        for (partition, outcome) in join_all(runs).await {
            tracing::info!(%partition, successful = outcome.successful.len(), failed = outcome.failed.len(), "precache");
            if !outcome.failed.is_empty() {
                let failed: Vec<&str> = outcome.failed.iter().map(|f| f.url.as_str()).collect();
                tracing::warn!(%partition, ?failed, "precache failures");
            }
            report.partitions.insert(self.engine.partition_name(partition), outcome);
        }

        self.precache_complete.store(true, Ordering::SeqCst);
        self.last_update.store(self.engine.now_ms(), Ordering::SeqCst);
        self.transition(WorkerState::Installing, WorkerState::Waiting).await?;

        self.engine
            .notify(WorkerMessage::SwInstalled {
                version: config.cache_version.clone(),
                context: self.context.to_string(),
                precache_complete: true,
            })
            .await;

        Ok(report)
    }

    /// Take over: claim pages, drop other versions, purge expired entries.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        self.transition(WorkerState::Waiting, WorkerState::Activating).await?;

        match self.run_activate().await {
            Ok(report) => {
                self.set_state(WorkerState::Active).await;
                if let Some(locality) = self.context.locality() {
                    let engine = self.engine.clone();
                    let locality = locality.to_string();
                    tokio::spawn(async move {
                        refresh_locality_data(&engine, &locality).await;
                    });
                }
                Ok(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "activation failed");
                self.set_state(WorkerState::Waiting).await;
                Err(e)
            }
        }
    }

    async fn run_activate(&self) -> Result<ActivateReport, Error> {
        let config = self.engine.config();
        let claimed_clients = self.engine.clients().claim().await;

        let current = config.current_partition_names();
        let mut deleted_partitions = Vec::new();
        for name in self.engine.db().partition_names().await? {
            if !current.contains(&name) {
                tracing::info!(partition = %name, "deleting old partition");
                self.engine.db().delete_partition(&name).await?;
                deleted_partitions.push(name);
            }
        }

        let purged_entries = self.purge_expired().await?;

        self.engine.notify(WorkerMessage::CleanLocalStorage).await;

        tracing::info!(version = %config.cache_version, context = %self.context, "activated");
        self.engine
            .notify(WorkerMessage::SwActivated {
                version: config.cache_version.clone(),
                context: self.context.to_string(),
                message: format!("¡Nueva versión {} activa!", config.cache_version),
            })
            .await;

        Ok(ActivateReport { deleted_partitions, purged_entries, claimed_clients })
    }

    /// Delete api/business/dynamic entries whose freshness record is past the TTL.
    async fn purge_expired(&self) -> Result<u64, Error> {
        let mut purged = 0;
        for partition in Partition::DYNAMIC {
            let name = self.engine.partition_name(partition);
            for url in self.engine.tracker().expired(partition).await {
                if self.engine.db().delete(&name, &url).await? {
                    purged += 1;
                    tracing::info!(url = %short(&url), %partition, "expired entry purged");
                }
                self.engine.tracker().forget(&url, partition).await;
            }
        }
        Ok(purged)
    }
}

/// Precache one partition's resources in order.
async fn precache_group(engine: &CacheEngine, partition: Partition, urls: &[Url]) -> PrecacheOutcome {
    let policy = RetryPolicy::precache(&engine.config().retry, precache_priority(partition));
    let mut outcome = PrecacheOutcome::default();

    for url in urls {
        match precache_one(engine, partition, url, policy).await {
            Ok(()) => outcome.successful.push(url.to_string()),
            Err(e) => {
                tracing::warn!(url = %short(url.as_str()), error = %e, "precache failed");
                outcome.failed.push(PrecacheFailure { url: url.to_string(), error: e.to_string() });
            }
        }
    }

    outcome
}

async fn precache_one(engine: &CacheEngine, partition: Partition, url: &Url, policy: RetryPolicy) -> Result<(), Error> {
    let mut attempt = 0;
    loop {
        match precache_attempt(engine, partition, url).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < policy.max_retries => {
                tracing::debug!(url = %short(url.as_str()), attempt, error = %e, "precache retry");
                tokio::time::sleep(policy.delay(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Fetch, validate JSON payloads, store.
async fn precache_attempt(engine: &CacheEngine, partition: Partition, url: &Url) -> Result<(), Error> {
    let mut response = engine.fetcher().fetch(url).await?;

    if url.path().ends_with(".json") {
        serde_json::from_slice::<serde_json::Value>(&response.bytes)
            .map_err(|e| Error::InvalidPayload(format!("{}: {e}", short(url.as_str()))))?;
        response.headers = BTreeMap::from([
            ("content-type".to_string(), "application/json".to_string()),
            ("x-cached".to_string(), "true".to_string()),
            ("x-cache-timestamp".to_string(), engine.now_ms().to_string()),
        ]);
        response.content_type = Some("application/json".to_string());
    }

    engine.cache_response(partition, url.as_str(), response).await
}

/// Re-fetch every data file of a locality, bypassing HTTP caches.
///
/// Failures are silent. Returns how many files were refreshed.
pub(crate) async fn refresh_locality_data(engine: &CacheEngine, locality: &str) -> usize {
    tracing::info!(locality, "background refresh of locality data");
    let stamp = engine.now_ms().to_string();

    let refreshes = engine.config().locality_data_files.iter().map(|file| {
        let stamp = stamp.as_str();
        async move {
            let url = engine.site_url(&format!("/{locality}/data/{file}")).ok()?;
            let partition = engine.classifier().classify(url.path()).class.partition();
            let response = engine.fetcher().fetch(&with_cache_buster(&url, "bg_refresh", stamp)).await.ok()?;
            engine.cache_response(partition, url.as_str(), response).await.ok()
        }
    });

    let refreshed = join_all(refreshes).await.into_iter().flatten().count();
    tracing::info!(locality, refreshed, "background refresh complete");
    refreshed
}
