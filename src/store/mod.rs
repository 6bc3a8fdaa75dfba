// src/store/mod.rs
//! Persistence port: the storage interface the ingestion core depends on.
//!
//! The core never talks to a concrete engine; it sees [`ItemStore`] (items)
//! and [`crate::runlog::RunLogStore`] (run records) and nothing else.
//! [`memory::MemoryStore`] implements both and backs the daemon and the
//! test suite.

pub mod memory;

pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::model::{DataType, IdentityKey, NewItem, StoredItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    PublishedAt,
    ScrapedAt,
    Priority,
    Title,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Paginated listing request over active items. Pages are 1-based.
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub data_type: Option<DataType>,
    pub source: Option<String>,
    pub page: usize,
    pub per_page: usize,
    pub sort: SortKey,
    pub order: SortOrder,
}

impl Default for ListQuery {
    fn default() -> Self {
        ListQuery {
            data_type: None,
            source: None,
            page: 1,
            per_page: 20,
            sort: SortKey::PublishedAt,
            order: SortOrder::Desc,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: u64,
    pub total_pages: usize,
}

/// Per-type overview row for the stats read path and the health probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeStats {
    pub data_type: DataType,
    pub active_items: u64,
    pub latest_scrape: Option<DateTime<Utc>>,
    pub sources: Vec<String>, // distinct, sorted
}

/// Active items sharing one (canonical URL, data-type) pair, ids in
/// insertion order. Input to duplicate compaction.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub url: String,
    pub data_type: DataType,
    pub ids: Vec<Uuid>,
}

/// Storage seam for scraped items.
#[async_trait::async_trait]
pub trait ItemStore: Send + Sync {
    /// Validate and persist a new item; the store assigns id and audit
    /// timestamps. Does not enforce identity uniqueness — that is the dedup
    /// gate's job, with compaction as the safety net.
    async fn insert(&self, item: NewItem) -> Result<StoredItem>;
    /// Look up an **active** item by identity key.
    async fn find_by_identity(&self, key: &IdentityKey) -> Result<Option<StoredItem>>;
    async fn get(&self, id: Uuid) -> Result<Option<StoredItem>>;
    /// Active items of one type, newest published first, priority breaking ties.
    async fn latest_by_type(&self, data_type: DataType, limit: usize) -> Result<Vec<StoredItem>>;
    /// Active items from one source (case-insensitive label match).
    async fn by_source(&self, source: &str, limit: usize) -> Result<Vec<StoredItem>>;
    /// Case-insensitive substring search over title, description, and tags.
    async fn search(
        &self,
        query: &str,
        data_type: Option<DataType>,
        limit: usize,
    ) -> Result<Vec<StoredItem>>;
    async fn list(&self, query: &ListQuery) -> Result<Page<StoredItem>>;
    async fn stats_by_type(&self) -> Result<Vec<TypeStats>>;
    async fn count_active(&self) -> Result<u64>;
    /// Flip the soft-delete flag; returns false when the id is unknown.
    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool>;
    /// Hard-delete items scraped before the cutoff, active or not.
    async fn delete_scraped_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
    /// Groups of active items sharing (URL, data-type), size > 1 only.
    async fn duplicate_groups(&self) -> Result<Vec<DuplicateGroup>>;
    /// Soft-delete every listed id; returns how many flipped.
    async fn deactivate_many(&self, ids: &[Uuid]) -> Result<u64>;
}
