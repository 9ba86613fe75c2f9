//! Unified error types for the dashboard pipeline.
//!
//! Scopes follow the recovery ladder: roster errors abort startup, fetch
//! errors skip one account for one tick, and per-record decode failures are
//! counted drops rather than errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("roster error: {0}")]
    Roster(#[from] csv::Error),

    #[error("roster has no usable accounts")]
    EmptyRoster,

    #[error("unknown timezone {0:?}")]
    UnknownTimezone(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    UpstreamStatus(reqwest::StatusCode),

    #[error("malformed response body: {0}")]
    MalformedBody(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
