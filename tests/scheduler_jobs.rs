// tests/scheduler_jobs.rs
//! Scheduler driving real ingestion jobs against the in-memory store:
//! manual triggers, busy signalling, and the job lifecycle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;

use pulsewire::error::Result;
use pulsewire::ingest::types::{FetchBatch, SourceAdapter};
use pulsewire::ingest::IngestJob;
use pulsewire::model::{CandidateItem, DataType, SourceMetadata};
use pulsewire::runlog::{RunLogStore, RunStatus};
use pulsewire::scheduler::{JobScheduler, JobSpec, JobTask, RunOutcome};
use pulsewire::store::{ItemStore, MemoryStore};
use pulsewire::Schedule;

fn crypto_candidate(id: &str, rank: u8) -> CandidateItem {
    CandidateItem {
        source: "CoinGecko".to_string(),
        data_type: DataType::Crypto,
        title: format!("Coin {id}"),
        description: "24h Change: 1.00%".to_string(),
        url: format!("https://www.coingecko.com/en/coins/{id}"),
        image_url: None,
        published_at: Utc::now(),
        metadata: SourceMetadata::Crypto {
            name: format!("Coin {id}"),
            symbol: id.to_uppercase(),
            price_usd: 1.0,
            change_24h_pct: 1.0,
            market_cap: "$1".to_string(),
            volume_24h: "$1".to_string(),
            rank: u32::from(rank),
        },
        tags: vec!["cryptocurrency".to_string()],
        priority: 9,
        category: "business".to_string(),
    }
}

struct StaticAdapter {
    candidates: Vec<CandidateItem>,
}

#[async_trait]
impl SourceAdapter for StaticAdapter {
    fn job_name(&self) -> &'static str {
        "crypto-scraper"
    }

    fn data_type(&self) -> DataType {
        DataType::Crypto
    }

    fn source_label(&self) -> &'static str {
        "CoinGecko"
    }

    async fn fetch(&self) -> Result<FetchBatch> {
        let mut batch = FetchBatch::new();
        batch.candidates = self.candidates.clone();
        batch.sources_attempted = 1;
        Ok(batch)
    }
}

/// Adapter that parks inside fetch until a permit is released.
struct StalledAdapter {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl SourceAdapter for StalledAdapter {
    fn job_name(&self) -> &'static str {
        "news-scraper"
    }

    fn data_type(&self) -> DataType {
        DataType::News
    }

    fn source_label(&self) -> &'static str {
        "stalled"
    }

    async fn fetch(&self) -> Result<FetchBatch> {
        let permit = self.gate.acquire().await.expect("gate open");
        permit.forget();
        Ok(FetchBatch::new())
    }
}

fn scrape_spec(name: &str, adapter: impl SourceAdapter + 'static, store: &Arc<MemoryStore>) -> JobSpec {
    let task: Arc<dyn JobTask> = Arc::new(IngestJob::new(
        Arc::new(adapter),
        store.clone(),
        store.clone(),
    ));
    JobSpec::new(name, Schedule::every_minutes(15), task)
}

#[tokio::test]
async fn triggered_ingest_job_saves_items_and_records_the_run() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = JobScheduler::new();
    let adapter = StaticAdapter {
        candidates: vec![crypto_candidate("bitcoin", 1), crypto_candidate("solana", 2)],
    };
    let spec = scrape_spec("crypto-scraper", adapter, &store);
    scheduler.register(&spec.name, spec.schedule, spec.task).unwrap();

    let outcome = scheduler.trigger("crypto-scraper").await.unwrap();
    match outcome {
        RunOutcome::Completed(summary) => {
            assert_eq!(summary.status, RunStatus::Success);
            assert_eq!(summary.items_saved, 2);
        }
        other => panic!("expected completion, got {other:?}"),
    }

    assert_eq!(store.count_active().await.unwrap(), 2);
    let records = store.by_data_type(DataType::Crypto, 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].source, "CoinGecko");

    scheduler.stop_all();
}

#[tokio::test]
async fn second_trigger_while_running_reports_busy() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = JobScheduler::new();
    let gate = Arc::new(Semaphore::new(0));
    let spec = scrape_spec("news-scraper", StalledAdapter { gate: gate.clone() }, &store);
    scheduler.register(&spec.name, spec.schedule, spec.task).unwrap();

    let first = {
        let scheduler = &scheduler;
        tokio::join!(
            async {
                // Claim the job; fetch parks on the gate until released below.
                scheduler.trigger("news-scraper").await.unwrap()
            },
            async {
                while !scheduler.status()["news-scraper"].running {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
                let second = scheduler.trigger("news-scraper").await.unwrap();
                assert!(matches!(second, RunOutcome::Busy));
                gate.add_permits(1);
            }
        )
        .0
    };
    assert!(matches!(first, RunOutcome::Completed(_)));

    scheduler.stop_all();
}

#[tokio::test]
async fn stop_then_restart_keeps_triggering_working() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = JobScheduler::new();
    let specs = vec![scrape_spec(
        "crypto-scraper",
        StaticAdapter {
            candidates: vec![crypto_candidate("bitcoin", 1)],
        },
        &store,
    )];

    assert!(scheduler.start_all(specs).is_empty());
    assert_eq!(scheduler.stop_all(), 1);
    assert!(scheduler.job_names().is_empty());

    let specs = vec![scrape_spec(
        "crypto-scraper",
        StaticAdapter {
            candidates: vec![crypto_candidate("bitcoin", 1)],
        },
        &store,
    )];
    assert!(scheduler.start_all(specs).is_empty());
    let outcome = scheduler.trigger("crypto-scraper").await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));

    // Same coin again: deduplicated, still a success.
    let outcome = scheduler.trigger("crypto-scraper").await.unwrap();
    match outcome {
        RunOutcome::Completed(summary) => assert_eq!(summary.items_saved, 0),
        other => panic!("expected completion, got {other:?}"),
    }

    scheduler.stop_all();
}
