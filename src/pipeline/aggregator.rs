// src/pipeline/aggregator.rs

//! Process-wide entry point.
//!
//! Owns the settings, the caches and the HTTP fetcher for the lifetime of the
//! process: built once from config + raw settings + saved state, queried per
//! request, and serialized back on demand.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::stream::{self, StreamExt};
use serde_json::Value;

use crate::error::{FetchError, Result};
use crate::models::{
    AggregatedResult, Config, DisplayItem, DisplayMapper, ItemMapper, ListingKind, ListingQuery,
    Settings,
};
use crate::pipeline::AggregationPipeline;
use crate::services::{
    InstanceHealthCache, InstanceSelector, ListingFetcher, ListingSource, SeenIdHistory,
};
use crate::storage::PersistedState;

/// Outcome of probing one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub host: String,
    /// Reported server version, or the failure
    pub result: std::result::Result<String, FetchError>,
}

/// Aggregating front end over a set of instances.
pub struct Aggregator {
    config: Config,
    settings: Settings,
    health: Arc<InstanceHealthCache>,
    source: Arc<dyn ListingSource>,
    selector: InstanceSelector,
    pipeline: AggregationPipeline,
    seen: Mutex<SeenIdHistory>,
    server_version: Mutex<String>,
}

impl Aggregator {
    /// Build the aggregator with the HTTP fetcher.
    pub fn enable(config: Config, raw_settings: &Value, state_blob: Option<&str>) -> Result<Self> {
        config.validate()?;
        let health = Arc::new(InstanceHealthCache::new(config.health.cooldown()));
        let fetcher = ListingFetcher::from_config(&config.http, health.clone())?;
        Ok(Self::with_source(
            config,
            raw_settings,
            state_blob,
            Arc::new(fetcher),
            health,
        ))
    }

    /// Build the aggregator over any listing source.
    ///
    /// `health` should be the cache `source` reports failures to.
    pub fn with_source(
        config: Config,
        raw_settings: &Value,
        state_blob: Option<&str>,
        source: Arc<dyn ListingSource>,
        health: Arc<InstanceHealthCache>,
    ) -> Self {
        let settings = Settings::normalize(raw_settings);
        let state = PersistedState::load(state_blob, settings.seen_max, health.now());
        health.restore(state.unhealthy_hosts);

        log::info!(
            "Enabled with {} instance(s), sample size {}, {} seen id(s), {} host(s) cooling down",
            settings.instances.len(),
            settings.sample_size,
            state.seen.len(),
            health.len()
        );

        Self {
            selector: InstanceSelector::new(&config.aggregation.fallback_instances),
            pipeline: AggregationPipeline::from_config(source.clone(), &config),
            config,
            settings,
            health,
            source,
            seen: Mutex::new(state.seen),
            server_version: Mutex::new(state.server_version),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn health(&self) -> &InstanceHealthCache {
        &self.health
    }

    pub fn server_version(&self) -> String {
        self.server_version_guard().clone()
    }

    /// Seen ids, most recent first.
    pub fn seen_ids(&self) -> Vec<String> {
        self.seen_guard().iter().map(str::to_string).collect()
    }

    fn seen_guard(&self) -> MutexGuard<'_, SeenIdHistory> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn server_version_guard(&self) -> MutexGuard<'_, String> {
        self.server_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Query sent to each selected host.
    pub fn query(&self, kind: ListingKind) -> ListingQuery {
        let aggregation = &self.config.aggregation;
        ListingQuery {
            kind,
            start: 0,
            count: aggregation.per_host_count,
            sort: aggregation.sort.clone(),
            languages: self.settings.preferred_languages.iter().cloned().collect(),
            is_live: None,
            nsfw: Some(aggregation.nsfw.clone()),
        }
    }

    /// Recent videos across the selected instances.
    pub async fn home(&self) -> AggregatedResult<DisplayItem> {
        self.list(self.query(ListingKind::Home), &DisplayMapper)
            .await
    }

    /// Search results across the selected instances.
    pub async fn search(&self, text: &str) -> AggregatedResult<DisplayItem> {
        self.list(self.query(ListingKind::Search(text.to_string())), &DisplayMapper)
            .await
    }

    /// Select hosts, fetch, then merge with the caller's mapper.
    pub async fn list<T, M>(&self, query: ListingQuery, mapper: &M) -> AggregatedResult<T>
    where
        M: ItemMapper<T> + ?Sized,
    {
        let hosts = self.selector.select(&self.settings, &self.health);
        log::debug!("Selected {:?}", hosts);

        let fetched = self.pipeline.fetch_all(&hosts, &query).await;
        let mut seen = self.seen_guard();
        self.pipeline
            .merge(fetched, &self.settings, &mut seen, mapper)
    }

    /// Probe every candidate instance.
    ///
    /// The first version reported is kept as the server version.
    pub async fn probe_all(&self) -> Vec<ProbeReport> {
        let hosts = self.selector.candidates(&self.settings);
        let source = self.source.as_ref();
        let reports: Vec<ProbeReport> = stream::iter(hosts)
            .map(|host| async move {
                let result = source.probe(&host).await;
                ProbeReport { host, result }
            })
            .buffered(self.config.http.max_concurrent.max(1))
            .collect()
            .await;

        let version = reports
            .iter()
            .filter_map(|report| report.result.as_ref().ok())
            .find(|version| !version.is_empty());
        if let Some(version) = version {
            *self.server_version_guard() = version.clone();
        }

        let healthy = reports.iter().filter(|r| r.result.is_ok()).count();
        log::info!("Probed {} instance(s), {} healthy", reports.len(), healthy);
        reports
    }

    /// Report a view of `id` on `host` when activity submission is enabled.
    ///
    /// Returns whether the report was accepted. Failures are only logged.
    pub async fn report_view(&self, host: &str, id: &str) -> bool {
        if !self.settings.submit_activity {
            log::debug!("Activity submission disabled, not reporting {id}");
            return false;
        }
        match self.source.submit_view(host, id).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("View report for {} failed: {}", id, e);
                false
            }
        }
    }

    /// Current state as a blob for [`Aggregator::enable`].
    pub fn save_state(&self) -> String {
        PersistedState {
            server_version: self.server_version(),
            seen: self.seen_guard().clone(),
            unhealthy_hosts: self.health.snapshot().into_iter().collect(),
        }
        .save()
    }
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("settings", &self.settings)
            .field("health", &self.health)
            .finish_non_exhaustive()
    }
}
