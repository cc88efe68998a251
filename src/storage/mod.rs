//! Storage module for the shared URL state store
//!
//! This module holds every backend of the four-namespace store:
//! - Redis, shared by crawler processes across hosts
//! - SQLite, shared by processes on one host
//! - Memory, for one-shot crawls and tests
//!
//! plus publication of the crawl settings through whichever store is in use.

mod memory;
mod redis_store;
mod schema;
mod settings;
mod sqlite;
mod traits;

#[cfg(test)]
pub(crate) mod conformance;

pub use memory::MemoryStorage;
pub use redis_store::RedisStorage;
pub use settings::{fingerprint, load_settings, publish_settings, SettingsRecord, SETTINGS_VERSION};
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::config::StoreConfig;
use std::path::Path;
use std::sync::Arc;

/// Opens the store named by `config.url` and checks that it answers
///
/// # Supported URLs
///
/// | URL | Backend |
/// |-----|---------|
/// | `redis://host:port/db`, `rediss://...` | [`RedisStorage`] |
/// | `sqlite://path/to/file.db` | [`SqliteStorage`] |
/// | `memory://` | [`MemoryStorage`] |
///
/// # Returns
///
/// * `Ok(Arc<dyn Storage>)` - A reachable store
/// * `Err(StorageError::Unavailable)` - Unknown scheme or the store did not answer
pub async fn open_store(config: &StoreConfig) -> StorageResult<Arc<dyn Storage>> {
    let url = config.url.as_str();

    let store: Arc<dyn Storage> = if url.starts_with("redis://") || url.starts_with("rediss://") {
        Arc::new(RedisStorage::connect(url, &config.prefix).await?)
    } else if let Some(path) = url.strip_prefix("sqlite://") {
        Arc::new(SqliteStorage::new(Path::new(path), &config.prefix)?)
    } else if url.starts_with("memory://") {
        Arc::new(MemoryStorage::new())
    } else {
        return Err(StorageError::Unavailable(format!(
            "unsupported store url: {}",
            url
        )));
    };

    store
        .ping()
        .await
        .map_err(|e| StorageError::Unavailable(format!("{} did not answer: {}", url, e)))?;

    tracing::info!(store = %url, prefix = %config.prefix, "Connected to URL store");
    Ok(store)
}
