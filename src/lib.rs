//! Krill: a cooperative, store-backed web crawler
//!
//! This crate implements a single-site crawler whose work queue lives in a shared
//! key-value store, so several crawler processes can cooperate on one crawl.
//! Every URL moves through four disjoint namespaces (`todo`, `doing`, `done`,
//! `trash`) and a bounded in-memory staging set feeds a fixed pool of workers.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Krill operations
#[derive(Debug, Error)]
pub enum KrillError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Extraction error: {0}")]
    Extraction(#[from] crawler::ExtractError),

    #[error("Too many errors ({count} consecutive, limit {max}), aborting crawl")]
    TooManyErrors { count: u64, max: u64 },

    #[error("No crawl settings published in the store; run once with --set")]
    MissingSettings,

    #[error("Worker pool stopped unexpectedly: {0}")]
    WorkerPool(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Krill operations
pub type Result<T> = std::result::Result<T, KrillError>;


// Re-export commonly used types
pub use config::{Config, CrawlSettings};
pub use state::{CrawlState, Namespace};
pub use storage::{open_store, Storage};
pub use crate::url::{canonicalize, normalize_and_filter};
