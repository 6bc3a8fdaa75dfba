// src/ingest/types.rs
//! Adapter contract: where raw upstream data becomes shaped candidates.

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{CandidateItem, DataType, IdentityKey};

/// Everything one fetch produced: shaped candidates plus sub-source
/// accounting for the run record.
#[derive(Debug, Default)]
pub struct FetchBatch {
    pub candidates: Vec<CandidateItem>,
    pub sources_attempted: u32,
    pub sources_failed: u32,
    /// Sub-source failure messages in occurrence order; the first one is
    /// carried into the run record.
    pub errors: Vec<String>,
}

impl FetchBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one failed sub-source without aborting the batch.
    pub fn source_failed(&mut self, label: &str, err: impl fmt::Display) {
        self.sources_failed += 1;
        self.errors.push(format!("{label}: {err}"));
    }
}

/// One upstream source family (news outlets, a coin API, a weather API).
///
/// `fetch` owns the shaping: candidates come back with tags, priority, and
/// category already assigned, so the pipeline only has to dedup and save.
/// Sub-source failures (one outlet down, one city refused) are absorbed into
/// the batch; an `Err` from `fetch` means the run could not happen at all.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Scheduler job this adapter runs under, e.g. "news-scraper".
    fn job_name(&self) -> &'static str;

    /// Data type every candidate from this adapter carries.
    fn data_type(&self) -> DataType;

    /// Source label stamped on run records, e.g. "CoinGecko".
    fn source_label(&self) -> &'static str;

    async fn fetch(&self) -> Result<FetchBatch>;

    /// Identity rule for one candidate, as a pure function of the candidate.
    /// Default: canonical URL scoped by data type.
    fn identity_key(&self, candidate: &CandidateItem) -> IdentityKey {
        IdentityKey::url(candidate.data_type, &candidate.url)
    }
}
