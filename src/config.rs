// src/config.rs
//! Process configuration: job cadences, retention windows, HTTP client
//! identity, and the source catalog. Everything is env-tunable; the catalog
//! of outlets and cities can also come from a TOML file.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::retention::RetentionPolicy;

const ENV_SOURCES_PATH: &str = "SOURCES_PATH";
const DEFAULT_SOURCES_PATH: &str = "config/sources.toml";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// One HTML outlet: where to fetch and which CSS selector marks a headline
/// card on its front page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewsSource {
    pub name: String,
    pub url: String,
    pub selector: String,
}

/// One weather location, queried by coordinates.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct City {
    pub name: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub news_interval_mins: u64,
    pub crypto_interval_mins: u64,
    pub weather_interval_mins: u64,
    pub cleanup_hour_utc: u8,
    pub cleanup_minute_utc: u8,
    pub health_interval_mins: u64,
    pub retention: RetentionPolicy,
    pub request_timeout_secs: u64,
    pub weather_timeout_secs: u64,
    pub user_agent: String,
    pub weather_api_key: Option<String>,
    pub news_sources: Vec<NewsSource>,
    pub cities: Vec<City>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            news_interval_mins: 30,
            crypto_interval_mins: 15,
            weather_interval_mins: 60,
            cleanup_hour_utc: 2,
            cleanup_minute_utc: 0,
            health_interval_mins: 5,
            retention: RetentionPolicy::default(),
            request_timeout_secs: 30,
            weather_timeout_secs: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            weather_api_key: None,
            news_sources: default_news_sources(),
            cities: default_cities(),
        }
    }
}

impl AppConfig {
    /// Builds configuration from the environment. Catalog resolution follows
    /// the usual order: `$SOURCES_PATH` (must exist if set), then
    /// `config/sources.toml` if present, then built-in defaults.
    pub fn from_env() -> Result<AppConfig> {
        let mut cfg = AppConfig {
            news_interval_mins: env_u64("NEWS_INTERVAL_MINS", 30),
            crypto_interval_mins: env_u64("CRYPTO_INTERVAL_MINS", 15),
            weather_interval_mins: env_u64("WEATHER_INTERVAL_MINS", 60),
            cleanup_hour_utc: env_u8("CLEANUP_HOUR_UTC", 2),
            cleanup_minute_utc: env_u8("CLEANUP_MINUTE_UTC", 0),
            health_interval_mins: env_u64("HEALTH_INTERVAL_MINS", 5),
            retention: RetentionPolicy {
                item_max_age_days: env_i64("ITEM_RETENTION_DAYS", 30),
                run_log_max_age_days: env_i64("RUN_LOG_RETENTION_DAYS", 7),
            },
            request_timeout_secs: env_u64("REQUEST_TIMEOUT_SECS", 30),
            weather_timeout_secs: env_u64("WEATHER_TIMEOUT_SECS", 10),
            user_agent: std::env::var("SCRAPER_USER_AGENT")
                .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
            weather_api_key: std::env::var("OPENWEATHER_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            news_sources: default_news_sources(),
            cities: default_cities(),
        };

        if let Ok(p) = std::env::var(ENV_SOURCES_PATH) {
            let path = Path::new(&p);
            if !path.exists() {
                return Err(Error::Config(format!(
                    "{ENV_SOURCES_PATH} points to non-existent path {p}"
                )));
            }
            cfg.apply_catalog(&load_catalog(path)?);
        } else {
            let default_path = Path::new(DEFAULT_SOURCES_PATH);
            if default_path.exists() {
                cfg.apply_catalog(&load_catalog(default_path)?);
            }
        }
        Ok(cfg)
    }

    /// A catalog overrides only the lists it actually fills in.
    fn apply_catalog(&mut self, catalog: &SourceCatalog) {
        if !catalog.news.is_empty() {
            self.news_sources = catalog.news.clone();
        }
        if !catalog.cities.is_empty() {
            self.cities = catalog.cities.clone();
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SourceCatalog {
    #[serde(default)]
    news: Vec<NewsSource>,
    #[serde(default)]
    cities: Vec<City>,
}

fn load_catalog(path: &Path) -> Result<SourceCatalog> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u8(name: &str, default: u8) -> u8 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(name: &str, default: i64) -> i64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn default_news_sources() -> Vec<NewsSource> {
    vec![
        NewsSource {
            name: "BBC News".into(),
            url: "https://www.bbc.com/news".into(),
            selector: ".gs-c-promo".into(),
        },
        NewsSource {
            name: "CNN".into(),
            url: "https://www.cnn.com".into(),
            selector: ".container__item".into(),
        },
        NewsSource {
            name: "Reuters".into(),
            url: "https://www.reuters.com".into(),
            selector: "[data-testid=\"MediaStoryCard\"]".into(),
        },
    ]
}

fn default_cities() -> Vec<City> {
    vec![
        City {
            name: "New York".into(),
            country: "US".into(),
            lat: 40.7128,
            lon: -74.0060,
        },
        City {
            name: "London".into(),
            country: "GB".into(),
            lat: 51.5074,
            lon: -0.1278,
        },
        City {
            name: "Tokyo".into(),
            country: "JP".into(),
            lat: 35.6762,
            lon: 139.6503,
        },
        City {
            name: "Sydney".into(),
            country: "AU".into(),
            lat: -33.8688,
            lon: 151.2093,
        },
        City {
            name: "Mumbai".into(),
            country: "IN".into(),
            lat: 19.0760,
            lon: 72.8777,
        },
    ]
}
