// src/ingest/adapters/mod.rs
//! Concrete source adapters, one per upstream family.

pub mod crypto;
pub mod news;
pub mod weather;

pub use crypto::CryptoAdapter;
pub use news::NewsAdapter;
pub use weather::WeatherAdapter;

use once_cell::sync::OnceCell;

use crate::error::{Error, Result};

/// The single long-lived fetch engine. Built lazily on first use; every
/// adapter shares its connection pool and the first caller's identity
/// header. Timeouts are per request, set by each adapter.
pub(crate) fn http_client(user_agent: &str) -> Result<reqwest::Client> {
    static CLIENT: OnceCell<reqwest::Client> = OnceCell::new();
    CLIENT
        .get_or_try_init(|| {
            reqwest::Client::builder()
                .user_agent(user_agent)
                .build()
                .map_err(Error::from)
        })
        .cloned()
}
