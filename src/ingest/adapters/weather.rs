// src/ingest/adapters/weather.rs
//! Current-weather adapter over the OpenWeatherMap API. One request per
//! configured city; without an API key the whole run is skipped with a
//! warning instead of burning requests that will all be refused.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::config::City;
use crate::error::{Error, Result};
use crate::ingest::adapters::http_client;
use crate::ingest::types::{FetchBatch, SourceAdapter};
use crate::model::{CandidateItem, DataType, IdentityKey, SourceMetadata};
use crate::normalize::categorize;

const WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
/// Weather readings are routine; urgent ones would come from news anyway.
const WEATHER_PRIORITY: u8 = 5;

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    weather: Vec<WeatherCondition>,
    main: MainReadings,
    #[serde(default)]
    visibility: Option<u32>,
    wind: WindReading,
}

#[derive(Debug, Deserialize)]
struct WeatherCondition {
    description: String,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f64,
    humidity: u32,
    pressure: u32,
}

#[derive(Debug, Deserialize)]
struct WindReading {
    speed: f64,
}

pub struct WeatherAdapter {
    client: reqwest::Client,
    cities: Vec<City>,
    api_key: Option<String>,
    timeout: Duration,
}

impl WeatherAdapter {
    pub fn new(
        cities: Vec<City>,
        api_key: Option<String>,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self> {
        Ok(WeatherAdapter {
            client: http_client(user_agent)?,
            cities,
            api_key,
            timeout,
        })
    }

    async fn fetch_city(&self, key: &str, city: &City) -> Result<CandidateItem> {
        let resp = self
            .client
            .get(WEATHER_URL)
            .timeout(self.timeout)
            .query(&[
                ("lat", city.lat.to_string()),
                ("lon", city.lon.to_string()),
                ("appid", key.to_string()),
                ("units", "metric".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;
        let body = resp.text().await?;
        parse_weather_response(&body, city)
    }
}

#[async_trait]
impl SourceAdapter for WeatherAdapter {
    fn job_name(&self) -> &'static str {
        "weather-scraper"
    }

    fn data_type(&self) -> DataType {
        DataType::Weather
    }

    fn source_label(&self) -> &'static str {
        "OpenWeatherMap"
    }

    async fn fetch(&self) -> Result<FetchBatch> {
        let mut batch = FetchBatch::new();
        let Some(key) = self.api_key.as_deref() else {
            tracing::warn!(target: "ingest", "no OpenWeatherMap API key; weather scrape skipped");
            return Ok(batch);
        };

        for city in &self.cities {
            batch.sources_attempted += 1;
            match self.fetch_city(key, city).await {
                Ok(candidate) => batch.candidates.push(candidate),
                Err(e) => {
                    tracing::warn!(
                        target: "ingest",
                        city = %city.name,
                        error = %e,
                        "weather fetch failed"
                    );
                    batch.source_failed(&city.name, &e);
                }
            }
        }
        Ok(batch)
    }

    fn identity_key(&self, candidate: &CandidateItem) -> IdentityKey {
        match &candidate.metadata {
            SourceMetadata::Weather { city, .. } => IdentityKey::city(city),
            _ => IdentityKey::url(candidate.data_type, &candidate.url),
        }
    }
}

/// Shapes one city's current-weather payload into a candidate.
fn parse_weather_response(body: &str, city: &City) -> Result<CandidateItem> {
    let w: WeatherResponse = serde_json::from_str(body)
        .map_err(|e| Error::parse(&city.name, format!("weather response: {e}")))?;

    let conditions = w
        .weather
        .first()
        .map(|c| c.description.clone())
        .unwrap_or_else(|| "unknown".to_string());
    let temperature_c = w.main.temp.round() as i32;
    let title = format!("{}, {} - {temperature_c}°C", city.name, city.country);
    let description = format!(
        "{conditions} | Humidity: {}% | Wind: {} m/s",
        w.main.humidity, w.wind.speed
    );
    let category = categorize(&title, &description).to_string();

    Ok(CandidateItem {
        source: "OpenWeatherMap".into(),
        data_type: DataType::Weather,
        url: format!("https://openweathermap.org/city/{}", city_slug(&city.name)),
        image_url: None,
        published_at: Utc::now(),
        metadata: SourceMetadata::Weather {
            city: city.name.clone(),
            country: city.country.clone(),
            temperature_c,
            conditions: conditions.clone(),
            humidity_pct: w.main.humidity,
            wind_speed_ms: w.wind.speed,
            pressure_hpa: w.main.pressure,
            visibility_km: w.visibility.map(|m| f64::from(m) / 1000.0),
        },
        tags: vec![
            "weather".into(),
            city.name.to_lowercase(),
            city.country.to_lowercase(),
        ],
        priority: WEATHER_PRIORITY,
        category,
        title,
        description,
    })
}

fn city_slug(name: &str) -> String {
    name.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-")
}
