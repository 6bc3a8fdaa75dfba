// src/store/memory.rs
//! In-memory persistence. Backs the daemon out of the box and every test
//! that needs a store; swapping in a database means implementing the two
//! port traits, nothing else.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{DuplicateGroup, ItemStore, ListQuery, Page, SortKey, SortOrder, TypeStats};
use crate::error::Result;
use crate::model::{DataType, IdentityKey, NewItem, StoredItem};
use crate::runlog::{
    performance_rollup, NewRunRecord, RunLogStore, RunRecord, RunStatus, TypePerformance,
};

/// Vec-backed store. Insertion order doubles as the "earliest inserted"
/// ordering that duplicate compaction relies on.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<Vec<StoredItem>>,
    runs: Mutex<Vec<RunRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> MutexGuard<'_, Vec<StoredItem>> {
        self.items.lock().expect("item store mutex poisoned")
    }

    fn runs(&self) -> MutexGuard<'_, Vec<RunRecord>> {
        self.runs.lock().expect("run log mutex poisoned")
    }
}

/// Primary sort by the requested key, ties broken by priority (or recency
/// when priority itself is the key) so listings stay stable.
fn sort_items(items: &mut [StoredItem], key: SortKey, order: SortOrder) {
    items.sort_by(|a, b| {
        let primary = match key {
            SortKey::PublishedAt => a.published_at.cmp(&b.published_at),
            SortKey::ScrapedAt => a.scraped_at.cmp(&b.scraped_at),
            SortKey::Priority => a.priority.cmp(&b.priority),
            SortKey::Title => a.title.cmp(&b.title),
        };
        let primary = match order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        primary.then_with(|| match key {
            SortKey::Priority => b.published_at.cmp(&a.published_at),
            _ => b.priority.cmp(&a.priority),
        })
    });
}

#[async_trait::async_trait]
impl ItemStore for MemoryStore {
    async fn insert(&self, item: NewItem) -> Result<StoredItem> {
        item.validate()?;
        let now = Utc::now();
        let c = item.candidate;
        let stored = StoredItem {
            id: Uuid::new_v4(),
            source: c.source,
            data_type: c.data_type,
            title: c.title,
            description: c.description,
            url: c.url,
            image_url: c.image_url,
            published_at: c.published_at,
            metadata: c.metadata,
            tags: c.tags,
            priority: c.priority,
            category: c.category,
            identity_key: item.identity_key,
            is_active: true,
            scraped_at: item.scraped_at.unwrap_or(now),
            created_at: now,
            updated_at: now,
        };
        self.items().push(stored.clone());
        Ok(stored)
    }

    async fn find_by_identity(&self, key: &IdentityKey) -> Result<Option<StoredItem>> {
        Ok(self
            .items()
            .iter()
            .find(|i| i.is_active && i.identity_key == *key)
            .cloned())
    }

    async fn get(&self, id: Uuid) -> Result<Option<StoredItem>> {
        Ok(self.items().iter().find(|i| i.id == id).cloned())
    }

    async fn latest_by_type(&self, data_type: DataType, limit: usize) -> Result<Vec<StoredItem>> {
        let mut out: Vec<StoredItem> = self
            .items()
            .iter()
            .filter(|i| i.is_active && i.data_type == data_type)
            .cloned()
            .collect();
        sort_items(&mut out, SortKey::PublishedAt, SortOrder::Desc);
        out.truncate(limit);
        Ok(out)
    }

    async fn by_source(&self, source: &str, limit: usize) -> Result<Vec<StoredItem>> {
        let mut out: Vec<StoredItem> = self
            .items()
            .iter()
            .filter(|i| i.is_active && i.source.eq_ignore_ascii_case(source))
            .cloned()
            .collect();
        sort_items(&mut out, SortKey::PublishedAt, SortOrder::Desc);
        out.truncate(limit);
        Ok(out)
    }

    async fn search(
        &self,
        query: &str,
        data_type: Option<DataType>,
        limit: usize,
    ) -> Result<Vec<StoredItem>> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return Ok(Vec::new());
        }
        let mut out: Vec<StoredItem> = self
            .items()
            .iter()
            .filter(|i| i.is_active)
            .filter(|i| data_type.map_or(true, |dt| i.data_type == dt))
            .filter(|i| {
                i.title.to_lowercase().contains(&q)
                    || i.description.to_lowercase().contains(&q)
                    || i.tags.iter().any(|t| t.contains(&q))
            })
            .cloned()
            .collect();
        sort_items(&mut out, SortKey::PublishedAt, SortOrder::Desc);
        out.truncate(limit);
        Ok(out)
    }

    async fn list(&self, query: &ListQuery) -> Result<Page<StoredItem>> {
        let mut out: Vec<StoredItem> = self
            .items()
            .iter()
            .filter(|i| i.is_active)
            .filter(|i| query.data_type.map_or(true, |dt| i.data_type == dt))
            .filter(|i| {
                query
                    .source
                    .as_deref()
                    .map_or(true, |s| i.source.eq_ignore_ascii_case(s))
            })
            .cloned()
            .collect();

        let total = out.len() as u64;
        sort_items(&mut out, query.sort, query.order);

        let per_page = query.per_page.max(1);
        let page = query.page.max(1);
        let total_pages = ((total as usize) + per_page - 1) / per_page;
        let items: Vec<StoredItem> = out
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect();

        Ok(Page {
            items,
            page,
            per_page,
            total,
            total_pages,
        })
    }

    async fn stats_by_type(&self) -> Result<Vec<TypeStats>> {
        let items = self.items();
        let mut out = Vec::new();
        for data_type in DataType::ALL {
            let mut count = 0u64;
            let mut latest: Option<DateTime<Utc>> = None;
            let mut sources = BTreeSet::new();
            for i in items.iter().filter(|i| i.is_active && i.data_type == data_type) {
                count += 1;
                if latest.map_or(true, |t| i.scraped_at > t) {
                    latest = Some(i.scraped_at);
                }
                sources.insert(i.source.clone());
            }
            if count > 0 {
                out.push(TypeStats {
                    data_type,
                    active_items: count,
                    latest_scrape: latest,
                    sources: sources.into_iter().collect(),
                });
            }
        }
        Ok(out)
    }

    async fn count_active(&self) -> Result<u64> {
        Ok(self.items().iter().filter(|i| i.is_active).count() as u64)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool> {
        let mut items = self.items();
        match items.iter_mut().find(|i| i.id == id) {
            Some(item) => {
                item.is_active = active;
                item.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_scraped_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut items = self.items();
        let before = items.len();
        items.retain(|i| i.scraped_at >= cutoff);
        Ok((before - items.len()) as u64)
    }

    async fn duplicate_groups(&self) -> Result<Vec<DuplicateGroup>> {
        let items = self.items();
        let mut groups: Vec<DuplicateGroup> = Vec::new();
        for i in items.iter().filter(|i| i.is_active) {
            match groups
                .iter_mut()
                .find(|g| g.url == i.url && g.data_type == i.data_type)
            {
                Some(g) => g.ids.push(i.id),
                None => groups.push(DuplicateGroup {
                    url: i.url.clone(),
                    data_type: i.data_type,
                    ids: vec![i.id],
                }),
            }
        }
        groups.retain(|g| g.ids.len() > 1);
        Ok(groups)
    }

    async fn deactivate_many(&self, ids: &[Uuid]) -> Result<u64> {
        let mut items = self.items();
        let now = Utc::now();
        let mut flipped = 0u64;
        for item in items.iter_mut() {
            if item.is_active && ids.contains(&item.id) {
                item.is_active = false;
                item.updated_at = now;
                flipped += 1;
            }
        }
        Ok(flipped)
    }
}

#[async_trait::async_trait]
impl RunLogStore for MemoryStore {
    async fn append(&self, record: NewRunRecord) -> Result<RunRecord> {
        let stored = RunRecord {
            id: Uuid::new_v4(),
            data_type: record.data_type,
            source: record.source,
            status: record.status,
            items_scraped: record.items_scraped,
            items_processed: record.items_processed,
            items_saved: record.items_saved,
            duration_ms: record.duration_ms,
            started_at: record.started_at,
            completed_at: record.completed_at,
            error_message: record.error_message,
            source_stats: record.source_stats,
        };
        self.runs().push(stored.clone());
        Ok(stored)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<RunRecord>> {
        Ok(self.runs().iter().rev().take(limit).cloned().collect())
    }

    async fn by_data_type(&self, data_type: DataType, limit: usize) -> Result<Vec<RunRecord>> {
        Ok(self
            .runs()
            .iter()
            .rev()
            .filter(|r| r.data_type == data_type)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn errors(&self, limit: usize) -> Result<Vec<RunRecord>> {
        Ok(self
            .runs()
            .iter()
            .rev()
            .filter(|r| r.status == RunStatus::Error)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn performance(&self, window_days: i64) -> Result<Vec<TypePerformance>> {
        Ok(performance_rollup(&self.runs(), window_days, Utc::now()))
    }

    async fn delete_completed_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut runs = self.runs();
        let before = runs.len();
        runs.retain(|r| r.completed_at >= cutoff);
        Ok((before - runs.len()) as u64)
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<u64> {
        Ok(self.runs().iter().filter(|r| r.completed_at >= since).count() as u64)
    }

    async fn count_errors_since(&self, since: DateTime<Utc>) -> Result<u64> {
        Ok(self
            .runs()
            .iter()
            .filter(|r| r.status == RunStatus::Error && r.completed_at >= since)
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CandidateItem, SourceMetadata, PRIORITY_MAX};
    use chrono::Duration;

    fn mk_new(title: &str, url: &str, priority: u8) -> NewItem {
        let candidate = CandidateItem {
            source: "BBC News".into(),
            data_type: DataType::News,
            title: title.into(),
            description: format!("about {title}"),
            url: url.into(),
            image_url: None,
            published_at: Utc::now(),
            metadata: SourceMetadata::News {
                outlet: "BBC News".into(),
                author: None,
            },
            tags: vec![],
            priority,
            category: "general".into(),
        };
        let key = IdentityKey::url(DataType::News, url);
        NewItem::new(candidate, key)
    }

    #[tokio::test]
    async fn insert_assigns_identity_and_audit_fields() {
        let store = MemoryStore::new();
        let saved = store.insert(mk_new("a", "https://e.org/a", 3)).await.unwrap();
        assert!(saved.is_active);
        assert!(!saved.id.is_nil());
        assert_eq!(saved.created_at, saved.updated_at);
    }

    #[tokio::test]
    async fn insert_rejects_invalid_priority() {
        let store = MemoryStore::new();
        let err = store
            .insert(mk_new("a", "https://e.org/a", PRIORITY_MAX + 1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("priority"));
        assert_eq!(store.count_active().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn identity_lookup_sees_active_items_only() {
        let store = MemoryStore::new();
        let saved = store.insert(mk_new("a", "https://e.org/a", 3)).await.unwrap();
        let key = IdentityKey::url(DataType::News, "https://e.org/a");
        assert!(store.find_by_identity(&key).await.unwrap().is_some());

        assert!(store.set_active(saved.id, false).await.unwrap());
        assert!(store.find_by_identity(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn latest_by_type_orders_by_published_then_priority() {
        let store = MemoryStore::new();
        let ts = Utc::now();
        for (title, offset, priority) in [("old", 60, 9), ("new-low", 0, 1), ("new-high", 0, 7)] {
            let mut item = mk_new(title, &format!("https://e.org/{title}"), priority);
            item.candidate.published_at = ts - Duration::seconds(offset);
            store.insert(item).await.unwrap();
        }
        let got = store.latest_by_type(DataType::News, 10).await.unwrap();
        let titles: Vec<&str> = got.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["new-high", "new-low", "old"]);
    }

    #[tokio::test]
    async fn search_covers_title_description_and_tags() {
        let store = MemoryStore::new();
        let mut item = mk_new("Quiet day", "https://e.org/q", 2);
        item.candidate.tags = vec!["markets".into()];
        store.insert(item).await.unwrap();

        assert_eq!(store.search("MARKETS", None, 10).await.unwrap().len(), 1);
        assert_eq!(store.search("quiet", None, 10).await.unwrap().len(), 1);
        assert_eq!(
            store.search("quiet", Some(DataType::Crypto), 10).await.unwrap().len(),
            0
        );
        assert!(store.search("   ", None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_paginates_with_totals() {
        let store = MemoryStore::new();
        for n in 0..5 {
            store
                .insert(mk_new(&format!("item {n}"), &format!("https://e.org/{n}"), 1))
                .await
                .unwrap();
        }
        let page = store
            .list(&ListQuery {
                per_page: 2,
                page: 3,
                ..ListQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn age_deletion_removes_inactive_rows_too() {
        let store = MemoryStore::new();
        let mut old = mk_new("old", "https://e.org/old", 1);
        old.scraped_at = Some(Utc::now() - Duration::days(40));
        let old = store.insert(old).await.unwrap();
        store.set_active(old.id, false).await.unwrap();
        store.insert(mk_new("fresh", "https://e.org/fresh", 1)).await.unwrap();

        let deleted = store
            .delete_scraped_before(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get(old.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_groups_keep_insertion_order() {
        let store = MemoryStore::new();
        let first = store.insert(mk_new("a", "https://e.org/dup", 1)).await.unwrap();
        store.insert(mk_new("b", "https://e.org/solo", 1)).await.unwrap();
        let second = store.insert(mk_new("c", "https://e.org/dup", 1)).await.unwrap();

        let groups = store.duplicate_groups().await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn run_log_queries_are_newest_first() {
        let store = MemoryStore::new();
        for (n, status) in [(1u64, RunStatus::Success), (2, RunStatus::Error), (3, RunStatus::Success)] {
            let mut t = crate::runlog::RunTracker::start(DataType::News, format!("run {n}"));
            t.items_scraped = n;
            store.append(t.finish(status)).await.unwrap();
        }

        let recent = store.recent(2).await.unwrap();
        assert_eq!(recent[0].source, "run 3");
        assert_eq!(recent[1].source, "run 2");

        let errors = store.errors(10).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].source, "run 2");

        let since = Utc::now() - Duration::minutes(1);
        assert_eq!(store.count_since(since).await.unwrap(), 3);
        assert_eq!(store.count_errors_since(since).await.unwrap(), 1);
    }
}
