// src/service.rs
//! Service facade over the whole engine: builds the job catalog from
//! configuration, owns the scheduler and the stores, and exposes the
//! surface a binary or API layer drives (start/stop, manual triggers,
//! read paths, cleanup, health).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::ingest::adapters::{CryptoAdapter, NewsAdapter, WeatherAdapter};
use crate::ingest::types::SourceAdapter;
use crate::ingest::IngestJob;
use crate::model::{DataType, StoredItem};
use crate::retention::{run_sweep, CleanupJob, RetentionPolicy, SweepStats};
use crate::runlog::{RunLogStore, RunRecord, RunSummary, TypePerformance};
use crate::schedule::Schedule;
use crate::scheduler::{JobScheduler, JobSpec, JobStatus, JobTask, RunOutcome};
use crate::store::{ItemStore, ListQuery, Page, TypeStats};

pub const CLEANUP_JOB: &str = "cleanup";
pub const HEALTH_JOB: &str = "health-check";

/// Error runs inside the look-back window beyond which the probe warns.
const HEALTH_ERROR_WARN_THRESHOLD: u64 = 5;

/// Counters the health probe reads on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub active_items: u64,
    pub runs_24h: u64,
    pub errors_2h: u64,
}

/// One read pass over both stores. Fails only when a store read fails.
pub async fn health_snapshot(
    items: &dyn ItemStore,
    runs: &dyn RunLogStore,
) -> Result<HealthSnapshot> {
    let now = Utc::now();
    Ok(HealthSnapshot {
        active_items: items.count_active().await?,
        runs_24h: runs.count_since(now - chrono::Duration::hours(24)).await?,
        errors_2h: runs.count_errors_since(now - chrono::Duration::hours(2)).await?,
    })
}

struct HealthJob {
    items: Arc<dyn ItemStore>,
    runs: Arc<dyn RunLogStore>,
}

#[async_trait]
impl JobTask for HealthJob {
    async fn run(&self) -> Result<RunSummary> {
        let snapshot = health_snapshot(self.items.as_ref(), self.runs.as_ref()).await?;
        info!(
            target: "health",
            active_items = snapshot.active_items,
            runs_24h = snapshot.runs_24h,
            errors_2h = snapshot.errors_2h,
            "health probe",
        );
        if snapshot.errors_2h > HEALTH_ERROR_WARN_THRESHOLD {
            warn!(
                target: "health",
                errors_2h = snapshot.errors_2h,
                threshold = HEALTH_ERROR_WARN_THRESHOLD,
                "error volume over the last two hours is elevated",
            );
        }
        Ok(RunSummary::empty_success())
    }
}

pub struct ScrapeService {
    items: Arc<dyn ItemStore>,
    runs: Arc<dyn RunLogStore>,
    scheduler: JobScheduler,
    jobs: Vec<(String, Schedule, Arc<dyn JobTask>)>,
    ingestion_jobs: Vec<String>,
    retention: RetentionPolicy,
}

impl ScrapeService {
    /// Builds the full job catalog from configuration. Fails only on
    /// configuration the adapters cannot use (bad CSS selector, bad
    /// client identity); missing API keys degrade at run time instead.
    pub fn new(
        config: &AppConfig,
        items: Arc<dyn ItemStore>,
        runs: Arc<dyn RunLogStore>,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);

        let news = NewsAdapter::new(config.news_sources.clone(), timeout, &config.user_agent)?;
        let crypto = CryptoAdapter::new(timeout, &config.user_agent)?;
        let weather = WeatherAdapter::new(
            config.cities.clone(),
            config.weather_api_key.clone(),
            Duration::from_secs(config.weather_timeout_secs),
            &config.user_agent,
        )?;

        let adapters: Vec<(Arc<dyn SourceAdapter>, Schedule)> = vec![
            (Arc::new(news), Schedule::every_minutes(config.news_interval_mins)),
            (Arc::new(crypto), Schedule::every_minutes(config.crypto_interval_mins)),
            (Arc::new(weather), Schedule::every_minutes(config.weather_interval_mins)),
        ];

        let mut jobs: Vec<(String, Schedule, Arc<dyn JobTask>)> = Vec::new();
        let mut ingestion_jobs = Vec::new();
        for (adapter, schedule) in adapters {
            let name = adapter.job_name().to_string();
            ingestion_jobs.push(name.clone());
            let task: Arc<dyn JobTask> =
                Arc::new(IngestJob::new(adapter, items.clone(), runs.clone()));
            jobs.push((name, schedule, task));
        }
        jobs.push((
            CLEANUP_JOB.to_string(),
            Schedule::daily_at(config.cleanup_hour_utc, config.cleanup_minute_utc),
            Arc::new(CleanupJob::new(config.retention, items.clone(), runs.clone())),
        ));
        jobs.push((
            HEALTH_JOB.to_string(),
            Schedule::every_minutes(config.health_interval_mins),
            Arc::new(HealthJob {
                items: items.clone(),
                runs: runs.clone(),
            }),
        ));

        crate::ingest::ensure_metrics_described();

        Ok(ScrapeService {
            items,
            runs,
            scheduler: JobScheduler::new(),
            jobs,
            ingestion_jobs,
            retention: config.retention,
        })
    }

    /// Registers and arms every configured job. Repeated calls are no-ops
    /// until [`stop_all`](Self::stop_all). Per-job failures come back so a
    /// partially started service is visible to the caller.
    pub fn start(&self) -> Vec<(String, Error)> {
        let specs = self
            .jobs
            .iter()
            .map(|(name, schedule, task)| JobSpec::new(name.clone(), *schedule, task.clone()))
            .collect();
        let failures = self.scheduler.start_all(specs);
        info!(
            jobs = self.jobs.len(),
            failed = failures.len(),
            "scrape service started"
        );
        failures
    }

    /// Disarms one job's timer. In-flight runs finish on their own.
    pub fn stop(&self, name: &str) -> bool {
        self.scheduler.stop(name)
    }

    /// Disarms every job and lets the catalog be started again.
    pub fn stop_all(&self) -> usize {
        self.scheduler.stop_all()
    }

    pub fn restart(&self) -> Vec<(String, Error)> {
        self.scheduler.stop_all();
        self.start()
    }

    /// Runs one job now, off schedule. `Busy` when it is already running.
    pub async fn trigger_job(&self, name: &str) -> Result<RunOutcome> {
        self.scheduler.trigger(name).await
    }

    /// Triggers the ingestion jobs sequentially, in catalog order.
    /// Cleanup and health keep to their schedules.
    pub async fn trigger_all(&self) -> Vec<(String, RunOutcome)> {
        let mut outcomes = Vec::with_capacity(self.ingestion_jobs.len());
        for name in &self.ingestion_jobs {
            let outcome = match self.scheduler.trigger(name).await {
                Ok(outcome) => outcome,
                Err(e) => RunOutcome::Failed {
                    message: e.to_string(),
                },
            };
            outcomes.push((name.clone(), outcome));
        }
        outcomes
    }

    pub fn job_status(&self) -> HashMap<String, JobStatus> {
        self.scheduler.status()
    }

    pub fn job_names(&self) -> Vec<String> {
        self.scheduler.job_names()
    }

    /// Runs the retention sweep immediately, outside the cleanup schedule.
    pub async fn run_cleanup(&self) -> SweepStats {
        run_sweep(self.retention, self.items.as_ref(), self.runs.as_ref()).await
    }

    pub async fn health(&self) -> Result<HealthSnapshot> {
        health_snapshot(self.items.as_ref(), self.runs.as_ref()).await
    }

    /// Soft-deletes one item; false when the id is unknown.
    pub async fn deactivate_item(&self, id: Uuid) -> Result<bool> {
        let changed = self.items.set_active(id, false).await?;
        if changed {
            info!(%id, "item deactivated");
        } else {
            warn!(%id, "deactivation requested for unknown item");
        }
        Ok(changed)
    }

    // Read paths delegate straight to the stores.

    pub async fn item(&self, id: Uuid) -> Result<Option<StoredItem>> {
        self.items.get(id).await
    }

    pub async fn latest(&self, data_type: DataType, limit: usize) -> Result<Vec<StoredItem>> {
        self.items.latest_by_type(data_type, limit).await
    }

    pub async fn by_source(&self, source: &str, limit: usize) -> Result<Vec<StoredItem>> {
        self.items.by_source(source, limit).await
    }

    pub async fn search(
        &self,
        query: &str,
        data_type: Option<DataType>,
        limit: usize,
    ) -> Result<Vec<StoredItem>> {
        self.items.search(query, data_type, limit).await
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Page<StoredItem>> {
        self.items.list(query).await
    }

    pub async fn stats(&self) -> Result<Vec<TypeStats>> {
        self.items.stats_by_type().await
    }

    pub async fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        self.runs.recent(limit).await
    }

    pub async fn runs_for(&self, data_type: DataType, limit: usize) -> Result<Vec<RunRecord>> {
        self.runs.by_data_type(data_type, limit).await
    }

    pub async fn error_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        self.runs.errors(limit).await
    }

    pub async fn performance(&self, window_days: i64) -> Result<Vec<TypePerformance>> {
        self.runs.performance(window_days).await
    }
}
