use std::path::PathBuf;

use thiserror::Error;

/// Failures while fetching or shaping market data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no usable data for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("unexpected response format: {0}")]
    ResponseFormat(String),

    #[error("invalid price series: {0}")]
    InvalidSeries(String),
}

impl DataError {
    pub fn unavailable(symbol: &str, reason: impl Into<String>) -> Self {
        DataError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failures in user-supplied configuration or input.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read thresholds file {path}: {source}")]
    ReadThresholds {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid thresholds file {path}: {source}")]
    ParseThresholds {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("ticker must not be empty")]
    EmptyTicker,

    #[error("days until expiration must be a non-negative integer, got {0:?}")]
    InvalidDays(String),
}
