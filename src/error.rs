// src/error.rs
//! Error taxonomy for the ingestion core.
//!
//! Failures below the job-execution boundary (one unreachable outlet, one
//! malformed candidate, one failed save) are absorbed into run counts and
//! never propagate past the pipeline. The variants here exist so call sites
//! can tell those classes apart when deciding what to absorb.

use thiserror::Error;

/// Result type alias using the crate-wide [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// One sub-source (outlet, city, endpoint) could not be fetched.
    // Field is named `src` rather than `source` because thiserror reserves
    // the name `source` for an underlying std::error::Error cause.
    #[error("fetch failed for {src}: {reason}")]
    Fetch { src: String, reason: String },

    /// One candidate was malformed or missing required fields.
    #[error("unparseable item from {src}: {reason}")]
    Parse { src: String, reason: String },

    /// Save or lookup failure in the persistence port.
    #[error("store error: {0}")]
    Store(String),

    /// A job run failed before or during adapter orchestration.
    #[error("job '{name}' failed: {reason}")]
    JobFailed { name: String, reason: String },

    /// Trigger or stop referenced a job the scheduler does not know.
    #[error("unknown job '{0}'")]
    UnknownJob(String),

    /// A schedule that can never fire (zero interval, hour 25, ...).
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// An item that violates model invariants (priority range, empty title).
    #[error("invalid item: {0}")]
    InvalidItem(String),

    /// Unusable configuration (bad env value, malformed source catalog).
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level HTTP failure.
    #[error("request error: {0}")]
    Http(String),

    /// File I/O failure (source catalog loading).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a fetch failure on a named sub-source.
    pub fn fetch(source: impl Into<String>, reason: impl ToString) -> Self {
        Error::Fetch {
            src: source.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for a parse failure on a named sub-source.
    pub fn parse(source: impl Into<String>, reason: impl ToString) -> Self {
        Error::Parse {
            src: source.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(format!("source catalog: {e}"))
    }
}
