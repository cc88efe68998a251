//! Export of the store's contents
//!
//! - `dump_keys` writes every known URL, one per line, namespace by namespace
//! - `dump_done` writes the done namespace as a pretty-printed JSON object of
//!   URL -> extraction result

use crate::state::Namespace;
use crate::storage::Storage;
use crate::KrillError;
use std::path::Path;

/// Collects every URL in the store, in lifecycle order of namespaces
pub async fn collect_keys(storage: &dyn Storage) -> Result<Vec<String>, KrillError> {
    let mut keys = Vec::new();
    for namespace in Namespace::ALL {
        let mut urls = storage.enumerate(namespace).await?;
        urls.sort();
        keys.extend(urls);
    }
    Ok(keys)
}

/// Writes every URL in the store to `path`
///
/// # Returns
///
/// The number of URLs written
pub async fn dump_keys(storage: &dyn Storage, path: &Path) -> Result<usize, KrillError> {
    let keys = collect_keys(storage).await?;
    std::fs::write(path, keys.join("\n"))?;
    tracing::info!(path = %path.display(), count = keys.len(), "Dumped keys");
    Ok(keys.len())
}

/// Writes the done map to `path` as JSON
///
/// # Returns
///
/// The number of entries written
pub async fn dump_done(storage: &dyn Storage, path: &Path) -> Result<usize, KrillError> {
    let done = storage.enumerate_done_as_map().await?;
    let json = serde_json::to_string_pretty(&done)?;
    std::fs::write(path, json)?;
    tracing::info!(path = %path.display(), count = done.len(), "Dumped done map");
    Ok(done.len())
}
