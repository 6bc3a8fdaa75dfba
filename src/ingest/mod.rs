// src/ingest/mod.rs
//! Ingestion pipeline: adapter fetch, identity-keyed dedup, persistence, and
//! the run record that makes each run auditable.
//!
//! Failure handling is layered. Sub-source failures arrive already absorbed
//! into the batch; per-item store failures are counted here and the walk
//! continues; only run-record persistence failures propagate, because
//! without the record the run never happened.

pub mod adapters;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::ingest::types::SourceAdapter;
use crate::model::NewItem;
use crate::runlog::{RunLogStore, RunStatus, RunSummary, RunTracker};
use crate::scheduler::JobTask;
use crate::store::ItemStore;

/// One-time metrics registration so every series carries a description.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "scrape_runs_total",
            "Completed scrape runs by data type and status."
        );
        describe_counter!("scrape_items_saved_total", "Items persisted, by data type.");
        describe_counter!(
            "scrape_source_errors_total",
            "Sub-source failures absorbed into runs."
        );
        describe_counter!(
            "scheduler_ticks_skipped_total",
            "Ticks dropped while a previous run was still in flight."
        );
        describe_counter!(
            "retention_items_deleted_total",
            "Items hard-deleted by the retention sweep."
        );
        describe_counter!(
            "retention_duplicates_deactivated_total",
            "Duplicate items soft-deleted by the retention sweep."
        );
        describe_histogram!(
            "scrape_run_duration_ms",
            "Wall-clock duration of scrape runs."
        );
    });
}

/// One full scrape run. Exactly one run record is appended per call,
/// whatever happens in between.
pub async fn run_scrape(
    adapter: &dyn SourceAdapter,
    items: &dyn ItemStore,
    runs: &dyn RunLogStore,
) -> Result<RunSummary> {
    ensure_metrics_described();
    let data_type = adapter.data_type();
    let mut tracker = RunTracker::start(data_type, adapter.source_label());
    info!(target: "ingest", job = adapter.job_name(), data_type = %data_type, "scrape run started");

    let batch = match adapter.fetch().await {
        Ok(batch) => batch,
        Err(e) => {
            warn!(target: "ingest", job = adapter.job_name(), error = %e, "fetch failed outright");
            tracker.note_error(&e);
            return record_run(runs, tracker, RunStatus::Error).await;
        }
    };

    tracker.items_scraped = batch.candidates.len() as u64;
    tracker.sources_attempted = batch.sources_attempted;
    tracker.sources_failed = batch.sources_failed;
    for msg in &batch.errors {
        tracker.note_error(msg);
    }
    if batch.sources_failed > 0 {
        counter!("scrape_source_errors_total", "data_type" => data_type.as_str())
            .increment(u64::from(batch.sources_failed));
    }

    for candidate in batch.candidates {
        tracker.items_processed += 1;
        let key = adapter.identity_key(&candidate);

        match items.find_by_identity(&key).await {
            Ok(Some(existing)) => {
                debug!(target: "ingest", url = %candidate.url, existing = %existing.id, "duplicate skipped");
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(target: "ingest", url = %candidate.url, error = %e, "identity lookup failed");
                tracker.store_errors += 1;
                tracker.note_error(&e);
                continue;
            }
        }

        match items.insert(NewItem::new(candidate, key)).await {
            Ok(saved) => {
                tracker.items_saved += 1;
                debug!(target: "ingest", id = %saved.id, title = %saved.title, "item saved");
            }
            Err(e) => {
                warn!(target: "ingest", error = %e, "item save failed");
                tracker.store_errors += 1;
                tracker.note_error(&e);
            }
        }
    }

    let status = derive_status(&tracker);
    record_run(runs, tracker, status).await
}

/// Status policy: a dead fetch, every sub-source down, or every save attempt
/// failing is an error; mixed outcomes are partial; a fully deduplicated run
/// that saved nothing new is still a success.
fn derive_status(tracker: &RunTracker) -> RunStatus {
    let all_sources_failed =
        tracker.sources_attempted > 0 && tracker.sources_failed == tracker.sources_attempted;
    let every_save_failed =
        tracker.items_processed > 0 && tracker.items_saved == 0 && tracker.store_errors > 0;
    if all_sources_failed || every_save_failed {
        RunStatus::Error
    } else if tracker.sources_failed > 0 || tracker.store_errors > 0 {
        RunStatus::Partial
    } else {
        RunStatus::Success
    }
}

async fn record_run(
    runs: &dyn RunLogStore,
    tracker: RunTracker,
    status: RunStatus,
) -> Result<RunSummary> {
    let data_type = tracker.data_type();
    counter!(
        "scrape_runs_total",
        "data_type" => data_type.as_str(),
        "status" => status.as_str()
    )
    .increment(1);
    counter!("scrape_items_saved_total", "data_type" => data_type.as_str())
        .increment(tracker.items_saved);

    let record = runs.append(tracker.finish(status)).await?;
    histogram!("scrape_run_duration_ms", "data_type" => data_type.as_str())
        .record(record.duration_ms as f64);
    info!(
        target: "ingest",
        data_type = %record.data_type,
        status = %record.status,
        scraped = record.items_scraped,
        saved = record.items_saved,
        duration_ms = record.duration_ms,
        "scrape run recorded"
    );
    Ok(RunSummary::from(&record))
}

/// Glue that lets the scheduler drive one adapter against the stores.
pub struct IngestJob {
    adapter: Arc<dyn SourceAdapter>,
    items: Arc<dyn ItemStore>,
    runs: Arc<dyn RunLogStore>,
}

impl IngestJob {
    pub fn new(
        adapter: Arc<dyn SourceAdapter>,
        items: Arc<dyn ItemStore>,
        runs: Arc<dyn RunLogStore>,
    ) -> Self {
        IngestJob {
            adapter,
            items,
            runs,
        }
    }
}

#[async_trait]
impl JobTask for IngestJob {
    async fn run(&self) -> Result<RunSummary> {
        run_scrape(self.adapter.as_ref(), self.items.as_ref(), self.runs.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DataType;

    fn tracker(
        processed: u64,
        saved: u64,
        store_errors: u64,
        attempted: u32,
        failed: u32,
    ) -> RunTracker {
        let mut t = RunTracker::start(DataType::News, "multiple");
        t.items_processed = processed;
        t.items_saved = saved;
        t.store_errors = store_errors;
        t.sources_attempted = attempted;
        t.sources_failed = failed;
        t
    }

    #[test]
    fn clean_run_is_success() {
        assert_eq!(derive_status(&tracker(5, 5, 0, 3, 0)), RunStatus::Success);
    }

    #[test]
    fn fully_deduplicated_run_is_success() {
        assert_eq!(derive_status(&tracker(5, 0, 0, 3, 0)), RunStatus::Success);
    }

    #[test]
    fn empty_skipped_run_is_success() {
        // Weather without an API key: nothing attempted at all.
        assert_eq!(derive_status(&tracker(0, 0, 0, 0, 0)), RunStatus::Success);
    }

    #[test]
    fn some_sources_down_is_partial() {
        assert_eq!(derive_status(&tracker(4, 4, 0, 3, 1)), RunStatus::Partial);
    }

    #[test]
    fn some_saves_failing_is_partial() {
        assert_eq!(derive_status(&tracker(4, 2, 2, 3, 0)), RunStatus::Partial);
    }

    #[test]
    fn all_sources_down_is_error() {
        assert_eq!(derive_status(&tracker(0, 0, 0, 3, 3)), RunStatus::Error);
    }

    #[test]
    fn every_save_failing_is_error() {
        assert_eq!(derive_status(&tracker(3, 0, 3, 1, 0)), RunStatus::Error);
    }

    #[test]
    fn dups_plus_failed_saves_with_none_saved_is_error() {
        // Four deduplicated, one attempted save that failed.
        assert_eq!(derive_status(&tracker(5, 0, 1, 1, 0)), RunStatus::Error);
    }
}
