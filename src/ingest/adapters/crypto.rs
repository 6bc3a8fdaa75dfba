// src/ingest/adapters/crypto.rs
//! Trending-coin adapter backed by the CoinGecko search/trending endpoint.
//! Takes the top of the trending list; position in that list drives both
//! priority and the identity key, so a coin re-entering at a new rank is a
//! new item.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::ingest::adapters::http_client;
use crate::ingest::types::{FetchBatch, SourceAdapter};
use crate::model::{CandidateItem, DataType, IdentityKey, SourceMetadata, PRIORITY_MAX};
use crate::normalize::categorize;

const TRENDING_URL: &str = "https://api.coingecko.com/api/v3/search/trending";
/// Coins kept per run. Priority is `PRIORITY_MAX - rank`, so the cap also
/// keeps priorities in range.
const TRENDING_CAP: usize = 10;

#[derive(Debug, Deserialize)]
struct TrendingResponse {
    coins: Vec<TrendingEntry>,
}

#[derive(Debug, Deserialize)]
struct TrendingEntry {
    item: TrendingCoin,
}

#[derive(Debug, Deserialize)]
struct TrendingCoin {
    id: String,
    name: String,
    symbol: String,
    #[serde(default)]
    large: Option<String>,
    #[serde(default)]
    data: CoinMarketData,
}

#[derive(Debug, Default, Deserialize)]
struct CoinMarketData {
    #[serde(default)]
    price: f64,
    #[serde(default)]
    price_change_percentage_24h: HashMap<String, f64>,
    #[serde(default)]
    market_cap: String,
    #[serde(default)]
    total_volume: String,
}

pub struct CryptoAdapter {
    client: reqwest::Client,
    timeout: Duration,
}

impl CryptoAdapter {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        Ok(CryptoAdapter {
            client: http_client(user_agent)?,
            timeout,
        })
    }
}

#[async_trait]
impl SourceAdapter for CryptoAdapter {
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
        batch.sources_attempted = 1;

        let body = match self
            .client
            .get(TRENDING_URL)
            .timeout(self.timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status())
        {
            Ok(resp) => match resp.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(target: "ingest", error = %e, "trending body unreadable");
                    batch.source_failed("CoinGecko", &e);
                    return Ok(batch);
                }
            },
            Err(e) => {
                tracing::warn!(target: "ingest", error = %e, "trending request failed");
                batch.source_failed("CoinGecko", &e);
                return Ok(batch);
            }
        };

        match parse_trending(&body) {
            Ok(candidates) => batch.candidates = candidates,
            Err(e) => {
                tracing::warn!(target: "ingest", error = %e, "trending response unparseable");
                batch.source_failed("CoinGecko", &e);
            }
        }
        Ok(batch)
    }

    fn identity_key(&self, candidate: &CandidateItem) -> IdentityKey {
        match &candidate.metadata {
            SourceMetadata::Crypto { name, rank, .. } => IdentityKey::coin(name, *rank),
            _ => IdentityKey::url(candidate.data_type, &candidate.url),
        }
    }
}

/// Shapes the trending payload into candidates, capped at [`TRENDING_CAP`].
fn parse_trending(body: &str) -> Result<Vec<CandidateItem>> {
    let resp: TrendingResponse = serde_json::from_str(body)
        .map_err(|e| Error::parse("CoinGecko", format!("trending response: {e}")))?;
    let now = Utc::now();

    let mut out = Vec::new();
    for (idx, entry) in resp.coins.into_iter().take(TRENDING_CAP).enumerate() {
        let coin = entry.item;
        let rank = idx as u32 + 1;
        let symbol = coin.symbol.to_uppercase();
        let change = coin
            .data
            .price_change_percentage_24h
            .get("usd")
            .copied()
            .unwrap_or(0.0);

        let title = format!("{} ({}) - ${}", coin.name, symbol, format_price(coin.data.price));
        let description = format!(
            "24h Change: {change:.2}% | Market Cap: {} | Volume: {}",
            coin.data.market_cap, coin.data.total_volume
        );
        let category = categorize(&title, &description).to_string();
        out.push(CandidateItem {
            source: "CoinGecko".into(),
            data_type: DataType::Crypto,
            url: format!("https://www.coingecko.com/en/coins/{}", coin.id),
            image_url: coin.large,
            published_at: now,
            metadata: SourceMetadata::Crypto {
                name: coin.name,
                symbol: symbol.clone(),
                price_usd: coin.data.price,
                change_24h_pct: change,
                market_cap: coin.data.market_cap,
                volume_24h: coin.data.total_volume,
                rank,
            },
            tags: vec!["cryptocurrency".into(), symbol.to_lowercase(), "trending".into()],
            priority: PRIORITY_MAX - rank as u8,
            category,
            title,
            description,
        });
    }
    Ok(out)
}

/// Two decimals above a dollar, six below, so micro-cap prices stay legible.
fn format_price(price: f64) -> String {
    if price >= 1.0 {
        format!("{price:.2}")
    } else {
        format!("{price:.6}")
    }
}
