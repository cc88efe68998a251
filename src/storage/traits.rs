//! Storage traits and error types
//!
//! This module defines the trait interface for URL state store backends and
//! associated error types. Every backend keeps the four namespaces disjoint:
//! each canonical URL lives in at most one of them.

use crate::state::Namespace;
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for URL state store implementations
///
/// All operations are keyed by canonical URL. Implementations must be safe to
/// share between tasks and, for networked backends, between processes: two
/// concurrent `claim_batch` callers never receive the same URL.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Checks that the store is reachable
    async fn ping(&self) -> StorageResult<()>;

    // ===== Membership =====

    /// Returns true if `url` is present in any of the four namespaces
    async fn exists_anywhere(&self, url: &str) -> StorageResult<bool>;

    /// Returns the namespace `url` currently lives in, if any
    async fn namespace_of(&self, url: &str) -> StorageResult<Option<Namespace>>;

    /// Inserts `url` into todo
    ///
    /// # Arguments
    ///
    /// * `url` - The canonical URL
    /// * `force` - When false, does nothing if the URL exists anywhere. When
    ///   true, moves the URL into todo from whichever namespace holds it.
    ///
    /// # Returns
    ///
    /// True if the URL was (re)inserted
    async fn insert_todo(&self, url: &str, force: bool) -> StorageResult<bool>;

    // ===== Transitions =====

    /// Atomically moves up to `max_n` URLs from todo to doing and returns them
    ///
    /// Order is unspecified.
    async fn claim_batch(&self, max_n: usize) -> StorageResult<Vec<String>>;

    /// Moves `url` into done with its extraction result
    async fn mark_done(&self, url: &str, result: &str) -> StorageResult<()>;

    /// Moves `url` into trash
    async fn mark_trash(&self, url: &str) -> StorageResult<()>;

    /// Moves `url` from doing back into todo after a transient failure
    async fn requeue(&self, url: &str) -> StorageResult<()>;

    // ===== Administration =====

    /// Moves every URL in doing and trash back into todo
    ///
    /// # Returns
    ///
    /// The number of URLs moved
    async fn recover_all(&self) -> StorageResult<u64>;

    /// Empties all four namespaces
    async fn flush_all(&self) -> StorageResult<()>;

    // ===== Enumeration =====

    /// Counts the URLs in one namespace
    async fn size(&self, namespace: Namespace) -> StorageResult<u64>;

    /// Lists the URLs in one namespace
    async fn enumerate(&self, namespace: Namespace) -> StorageResult<Vec<String>>;

    /// Returns the done namespace as a URL -> extraction result map
    async fn enumerate_done_as_map(&self) -> StorageResult<BTreeMap<String, String>>;

    // ===== Shared settings =====

    /// Stores the serialized settings record, replacing any previous one
    async fn put_settings(&self, record: &str) -> StorageResult<()>;

    /// Loads the serialized settings record
    async fn get_settings(&self) -> StorageResult<Option<String>>;
}
