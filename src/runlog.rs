// src/runlog.rs
//! Run records: the append-only audit trail of job executions.
//!
//! A [`RunTracker`] is created when a run starts and consumed exactly once
//! into a [`NewRunRecord`] when it finishes, which is what makes the
//! one-record-per-execution invariant structural rather than disciplinary.
//! Records are never updated after append.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::model::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
    Partial,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Error => "error",
            RunStatus::Partial => "partial",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-source accounting carried on every record, so partial runs are
/// auditable without parsing log text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSourceStats {
    pub sources_attempted: u32,
    pub sources_failed: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub data_type: DataType,
    pub source: String, // label, e.g. "BBC News, CNN, Reuters"
    pub status: RunStatus,
    pub items_scraped: u64,
    pub items_processed: u64,
    pub items_saved: u64,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub error_message: Option<String>,
    pub source_stats: RunSourceStats,
}

/// Append payload; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewRunRecord {
    pub data_type: DataType,
    pub source: String,
    pub status: RunStatus,
    pub items_scraped: u64,
    pub items_processed: u64,
    pub items_saved: u64,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub error_message: Option<String>,
    pub source_stats: RunSourceStats,
}

/// Per-run accumulator. Counts are tallied as the pipeline walks candidates;
/// `finish` consumes the tracker and stamps the completion time.
#[derive(Debug)]
pub struct RunTracker {
    data_type: DataType,
    source: String,
    started_at: DateTime<Utc>,
    pub items_scraped: u64,
    pub items_processed: u64,
    pub items_saved: u64,
    pub sources_attempted: u32,
    pub sources_failed: u32,
    pub store_errors: u64,
    first_error: Option<String>,
}

impl RunTracker {
    pub fn start(data_type: DataType, source: impl Into<String>) -> Self {
        RunTracker {
            data_type,
            source: source.into(),
            started_at: Utc::now(),
            items_scraped: 0,
            items_processed: 0,
            items_saved: 0,
            sources_attempted: 0,
            sources_failed: 0,
            store_errors: 0,
            first_error: None,
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Remember the first failure message of the run; later ones only count.
    pub fn note_error(&mut self, msg: impl ToString) {
        if self.first_error.is_none() {
            self.first_error = Some(msg.to_string());
        }
    }

    pub fn first_error(&self) -> Option<&str> {
        self.first_error.as_deref()
    }

    /// Consume the tracker into an append payload. The error message is
    /// carried only on non-success records.
    pub fn finish(self, status: RunStatus) -> NewRunRecord {
        let completed_at = Utc::now();
        let duration_ms = (completed_at - self.started_at).num_milliseconds().max(0) as u64;
        NewRunRecord {
            data_type: self.data_type,
            source: self.source,
            status,
            items_scraped: self.items_scraped,
            items_processed: self.items_processed,
            items_saved: self.items_saved,
            duration_ms,
            started_at: self.started_at,
            completed_at,
            error_message: match status {
                RunStatus::Success => None,
                _ => self.first_error,
            },
            source_stats: RunSourceStats {
                sources_attempted: self.sources_attempted,
                sources_failed: self.sources_failed,
            },
        }
    }
}

/// What a completed execution reports back to whoever triggered it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub items_scraped: u64,
    pub items_processed: u64,
    pub items_saved: u64,
    pub duration_ms: u64,
    pub error_message: Option<String>,
}

impl RunSummary {
    /// Summary for maintenance tasks that do not write run records.
    pub fn empty_success() -> Self {
        RunSummary {
            status: RunStatus::Success,
            items_scraped: 0,
            items_processed: 0,
            items_saved: 0,
            duration_ms: 0,
            error_message: None,
        }
    }
}

impl From<&RunRecord> for RunSummary {
    fn from(r: &RunRecord) -> Self {
        RunSummary {
            status: r.status,
            items_scraped: r.items_scraped,
            items_processed: r.items_processed,
            items_saved: r.items_saved,
            duration_ms: r.duration_ms,
            error_message: r.error_message.clone(),
        }
    }
}

/// Rolling-window performance rollup for one data type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypePerformance {
    pub data_type: DataType,
    pub total_runs: u64,
    pub successful_runs: u64,
    pub error_runs: u64,
    pub partial_runs: u64,
    pub success_rate_pct: f64,
    pub error_rate_pct: f64,
    pub total_items_scraped: u64,
    pub total_items_saved: u64,
    pub save_rate_pct: f64,
    pub avg_duration_ms: f64,
    pub last_run: Option<DateTime<Utc>>,
}

/// Storage seam for run records.
#[async_trait::async_trait]
pub trait RunLogStore: Send + Sync {
    /// Append one record. Records are immutable once written.
    async fn append(&self, record: NewRunRecord) -> Result<RunRecord>;
    /// Most recent records, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<RunRecord>>;
    /// Most recent records for one data type, newest first.
    async fn by_data_type(&self, data_type: DataType, limit: usize) -> Result<Vec<RunRecord>>;
    /// Most recent error records, newest first.
    async fn errors(&self, limit: usize) -> Result<Vec<RunRecord>>;
    /// Per-type rollup over the trailing window.
    async fn performance(&self, window_days: i64) -> Result<Vec<TypePerformance>>;
    /// Drop records completed before the cutoff; returns how many went.
    async fn delete_completed_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
    /// Records completed at or after `since`.
    async fn count_since(&self, since: DateTime<Utc>) -> Result<u64>;
    /// Error records completed at or after `since`.
    async fn count_errors_since(&self, since: DateTime<Utc>) -> Result<u64>;
}

/// Aggregate records completed within the trailing `window_days` into one
/// rollup per data type, in [`DataType::ALL`] order. Rates guard empty sets.
pub fn performance_rollup(
    records: &[RunRecord],
    window_days: i64,
    now: DateTime<Utc>,
) -> Vec<TypePerformance> {
    let cutoff = now - Duration::days(window_days.max(0));
    let mut out = Vec::new();

    for data_type in DataType::ALL {
        let mut total = 0u64;
        let mut ok = 0u64;
        let mut err = 0u64;
        let mut partial = 0u64;
        let mut scraped = 0u64;
        let mut saved = 0u64;
        let mut duration_sum = 0u64;
        let mut last_run: Option<DateTime<Utc>> = None;

        for r in records
            .iter()
            .filter(|r| r.data_type == data_type && r.completed_at >= cutoff)
        {
            total += 1;
            match r.status {
                RunStatus::Success => ok += 1,
                RunStatus::Error => err += 1,
                RunStatus::Partial => partial += 1,
            }
            scraped += r.items_scraped;
            saved += r.items_saved;
            duration_sum += r.duration_ms;
            if last_run.map_or(true, |t| r.completed_at > t) {
                last_run = Some(r.completed_at);
            }
        }

        if total == 0 {
            continue;
        }

        let pct = |part: u64, whole: u64| {
            if whole == 0 {
                0.0
            } else {
                part as f64 / whole as f64 * 100.0
            }
        };

        out.push(TypePerformance {
            data_type,
            total_runs: total,
            successful_runs: ok,
            error_runs: err,
            partial_runs: partial,
            success_rate_pct: pct(ok, total),
            error_rate_pct: pct(err, total),
            total_items_scraped: scraped,
            total_items_saved: saved,
            save_rate_pct: pct(saved, scraped),
            avg_duration_ms: duration_sum as f64 / total as f64,
            last_run,
        });
    }

    out
}
