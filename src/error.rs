//! Error types for the monitor

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Authentication error on source {source_id}: {message}")]
    Auth { source_id: String, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Durable write failed after {attempts} attempts: {message}")]
    DurableWrite { attempts: u32, message: String },

    #[error("Remote mirror error: {0}")]
    Mirror(String),

    #[error("Enrichment error: {0}")]
    Enrich(String),

    #[error("Log file unreadable: {0}")]
    LogUnreadable(String),

    #[error("Another writer holds the log lock: {0}")]
    LogLocked(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
