// src/model.rs
//! Core data model: candidates produced by adapters, stored items owned by
//! the persistence port, and the identity keys that link the two.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Ceiling for item priority; the urgent-keyword override assigns it.
pub const PRIORITY_MAX: u8 = 10;
/// Ceiling for derived tags per item.
pub const MAX_TAGS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    News,
    Crypto,
    Weather,
    Stocks,
    Sports,
}

impl DataType {
    pub const ALL: [DataType; 5] = [
        DataType::News,
        DataType::Crypto,
        DataType::Weather,
        DataType::Stocks,
        DataType::Sports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::News => "news",
            DataType::Crypto => "crypto",
            DataType::Weather => "weather",
            DataType::Stocks => "stocks",
            DataType::Sports => "sports",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "news" => Ok(DataType::News),
            "crypto" => Ok(DataType::Crypto),
            "weather" => Ok(DataType::Weather),
            "stocks" => Ok(DataType::Stocks),
            "sports" => Ok(DataType::Sports),
            other => Err(Error::Config(format!("unknown data type '{other}'"))),
        }
    }
}

/// Per-data-type metadata payload. One shape per source family instead of an
/// open key/value bag; `Extra` covers types without a dedicated adapter yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceMetadata {
    News {
        outlet: String,
        author: Option<String>,
    },
    Crypto {
        name: String,         // display name, e.g. "Bitcoin"
        symbol: String,       // upper-cased ticker, e.g. "BTC"
        price_usd: f64,
        change_24h_pct: f64,
        market_cap: String,   // formatted as reported upstream
        volume_24h: String,
        rank: u32,            // 1-based position in the trending list
    },
    Weather {
        city: String,
        country: String,
        temperature_c: i32,   // rounded
        conditions: String,
        humidity_pct: u32,
        wind_speed_ms: f64,
        pressure_hpa: u32,
        visibility_km: Option<f64>,
    },
    Extra {
        fields: BTreeMap<String, String>,
    },
}

/// Adapter-specific identity rule, computed by the adapter as a pure function
/// of the candidate. Exact composite keys, no substring matching: the store
/// only ever compares keys for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum IdentityKey {
    /// Canonical URL within a data type. Default rule.
    Url { data_type: DataType, url: String },
    /// Coin name plus trending rank.
    Coin { name: String, rank: u32 },
    /// City name; one current-weather item per city.
    City { city: String },
}

impl IdentityKey {
    pub fn url(data_type: DataType, url: &str) -> Self {
        IdentityKey::Url {
            data_type,
            url: url.trim().to_string(),
        }
    }

    pub fn coin(name: &str, rank: u32) -> Self {
        IdentityKey::Coin {
            name: name.trim().to_lowercase(),
            rank,
        }
    }

    pub fn city(city: &str) -> Self {
        IdentityKey::City {
            city: city.trim().to_lowercase(),
        }
    }
}

/// Ephemeral adapter output. Consumed by the dedup gate and discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    pub source: String, // e.g. "BBC News", "CoinGecko", "OpenWeatherMap"
    pub data_type: DataType,
    pub title: String,
    pub description: String,
    pub url: String,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub metadata: SourceMetadata,
    pub tags: Vec<String>, // ordered, at most MAX_TAGS
    pub priority: u8,      // 0..=PRIORITY_MAX
    pub category: String,
}

/// Insert payload for the persistence port: a candidate plus the identity key
/// its adapter derived for it.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub candidate: CandidateItem,
    pub identity_key: IdentityKey,
    /// Ingestion timestamp override; `None` means now. Used by backfills.
    pub scraped_at: Option<DateTime<Utc>>,
}

impl NewItem {
    pub fn new(candidate: CandidateItem, identity_key: IdentityKey) -> Self {
        NewItem {
            candidate,
            identity_key,
            scraped_at: None,
        }
    }

    /// Model invariants checked at the store boundary. Violations are
    /// rejected, never clamped.
    pub fn validate(&self) -> Result<()> {
        let c = &self.candidate;
        if c.title.trim().is_empty() {
            return Err(Error::InvalidItem("empty title".into()));
        }
        if c.url.trim().is_empty() {
            return Err(Error::InvalidItem("empty url".into()));
        }
        if c.source.trim().is_empty() {
            return Err(Error::InvalidItem("empty source".into()));
        }
        if c.priority > PRIORITY_MAX {
            return Err(Error::InvalidItem(format!(
                "priority {} out of range 0..={PRIORITY_MAX}",
                c.priority
            )));
        }
        if c.tags.len() > MAX_TAGS {
            return Err(Error::InvalidItem(format!(
                "{} tags exceed cap of {MAX_TAGS}",
                c.tags.len()
            )));
        }
        Ok(())
    }
}

/// Persisted item. Superset of [`CandidateItem`] with stable identity,
/// soft-delete flag, and audit timestamps. `scraped_at` is when we ingested
/// it; `published_at` is what the source claimed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredItem {
    pub id: Uuid,
    pub source: String,
    pub data_type: DataType,
    pub title: String,
    pub description: String,
    pub url: String,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub metadata: SourceMetadata,
    pub tags: Vec<String>,
    pub priority: u8,
    pub category: String,
    pub identity_key: IdentityKey,
    pub is_active: bool,
    pub scraped_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
