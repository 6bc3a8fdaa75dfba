// src/retention.rs
//! Retention sweep: age out stored items and run records, then compact
//! duplicate groups that slipped past ingestion-time dedup.
//!
//! The three sub-operations are independent: one failing is logged and
//! counted, the others still run, and re-running a sweep is always safe.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use metrics::counter;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ingest::ensure_metrics_described;
use crate::runlog::{RunLogStore, RunSummary};
use crate::scheduler::JobTask;
use crate::store::ItemStore;

/// Age cutoffs for the two persisted collections. Items live longer than run
/// records; the windows are independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub item_max_age_days: i64,
    pub run_log_max_age_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy {
            item_max_age_days: 30,
            run_log_max_age_days: 7,
        }
    }
}

/// What one sweep accomplished. `failures` is empty on a clean sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepStats {
    pub items_deleted: u64,
    pub logs_deleted: u64,
    pub duplicates_deactivated: u64,
    pub failures: Vec<String>,
}

/// Runs all three sub-operations, absorbing individual failures into the
/// returned stats.
pub async fn run_sweep(
    policy: RetentionPolicy,
    items: &dyn ItemStore,
    runs: &dyn RunLogStore,
) -> SweepStats {
    ensure_metrics_described();
    let now = Utc::now();
    let mut stats = SweepStats::default();

    let item_cutoff = now - Duration::days(policy.item_max_age_days);
    match items.delete_scraped_before(item_cutoff).await {
        Ok(n) => {
            stats.items_deleted = n;
            counter!("retention_items_deleted_total").increment(n);
        }
        Err(e) => {
            warn!(target: "retention", error = %e, "aged item deletion failed");
            stats.failures.push(format!("item deletion: {e}"));
        }
    }

    let log_cutoff = now - Duration::days(policy.run_log_max_age_days);
    match runs.delete_completed_before(log_cutoff).await {
        Ok(n) => stats.logs_deleted = n,
        Err(e) => {
            warn!(target: "retention", error = %e, "aged run record deletion failed");
            stats.failures.push(format!("run record deletion: {e}"));
        }
    }

    match compact_duplicates(items).await {
        Ok(n) => {
            stats.duplicates_deactivated = n;
            counter!("retention_duplicates_deactivated_total").increment(n);
        }
        Err(e) => {
            warn!(target: "retention", error = %e, "duplicate compaction failed");
            stats.failures.push(format!("duplicate compaction: {e}"));
        }
    }

    info!(
        target: "retention",
        items_deleted = stats.items_deleted,
        logs_deleted = stats.logs_deleted,
        duplicates_deactivated = stats.duplicates_deactivated,
        failures = stats.failures.len(),
        "retention sweep finished"
    );
    stats
}

/// Keeps the earliest-inserted active member of every (url, data-type) group
/// and soft-deletes the rest.
async fn compact_duplicates(items: &dyn ItemStore) -> Result<u64> {
    let groups = items.duplicate_groups().await?;
    let mut deactivated = 0u64;
    for group in groups {
        let extras: Vec<Uuid> = group.ids.iter().skip(1).copied().collect();
        if extras.is_empty() {
            continue;
        }
        let n = items.deactivate_many(&extras).await?;
        deactivated += n;
        debug!(
            target: "retention",
            url = %group.url,
            kept = %group.ids[0],
            deactivated = n,
            "duplicate group compacted"
        );
    }
    Ok(deactivated)
}

/// Scheduler task wrapping the sweep. A sweep with any failed sub-operation
/// reports as a failed run; the successful sub-operations have still applied.
pub struct CleanupJob {
    policy: RetentionPolicy,
    items: Arc<dyn ItemStore>,
    runs: Arc<dyn RunLogStore>,
}

impl CleanupJob {
    pub fn new(
        policy: RetentionPolicy,
        items: Arc<dyn ItemStore>,
        runs: Arc<dyn RunLogStore>,
    ) -> Self {
        CleanupJob {
            policy,
            items,
            runs,
        }
    }
}

#[async_trait]
impl JobTask for CleanupJob {
    async fn run(&self) -> Result<RunSummary> {
        let stats = run_sweep(self.policy, self.items.as_ref(), self.runs.as_ref()).await;
        if let Some(first) = stats.failures.first() {
            return Err(Error::JobFailed {
                name: "cleanup".into(),
                reason: first.clone(),
            });
        }
        Ok(RunSummary::empty_success())
    }
}
