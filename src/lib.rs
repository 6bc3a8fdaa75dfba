// src/lib.rs
// Public library surface for the binary, integration tests, and reuse.

pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod normalize;
pub mod retention;
pub mod runlog;
pub mod schedule;
pub mod scheduler;
pub mod service;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::config::AppConfig;
pub use crate::error::{Error, Result};
pub use crate::ingest::types::{FetchBatch, SourceAdapter};
pub use crate::model::{CandidateItem, DataType, IdentityKey, NewItem, StoredItem};
pub use crate::retention::{RetentionPolicy, SweepStats};
pub use crate::runlog::{RunLogStore, RunRecord, RunStatus, RunSummary};
pub use crate::schedule::Schedule;
pub use crate::scheduler::{JobScheduler, JobSpec, JobStatus, JobTask, RunOutcome};
pub use crate::service::{HealthSnapshot, ScrapeService};
pub use crate::store::{ItemStore, MemoryStore};
