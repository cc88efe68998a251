//! Publication of crawl settings through the shared store
//!
//! Every cooperating process must crawl with identical settings, so the
//! process started with `--set` writes them into the store and the others
//! read them back. The record carries a schema version and a fingerprint so
//! operators can tell at a glance whether two processes agree.

use crate::config::CrawlSettings;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Current layout of the stored settings record
pub const SETTINGS_VERSION: u32 = 1;

/// Settings as stored, with version and fingerprint metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsRecord {
    pub version: u32,

    /// Hex SHA-256 of the serialized settings
    pub fingerprint: String,

    pub saved_at: DateTime<Utc>,

    pub settings: CrawlSettings,
}

impl SettingsRecord {
    pub fn new(settings: CrawlSettings) -> StorageResult<Self> {
        Ok(Self {
            version: SETTINGS_VERSION,
            fingerprint: fingerprint(&settings)?,
            saved_at: Utc::now(),
            settings,
        })
    }
}

/// Computes the hex SHA-256 of the JSON form of `settings`
pub fn fingerprint(settings: &CrawlSettings) -> StorageResult<String> {
    let json =
        serde_json::to_vec(settings).map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(hex::encode(Sha256::digest(&json)))
}

/// Writes `settings` to the store, replacing whatever was published before
///
/// # Returns
///
/// The record that was stored
pub async fn publish_settings(
    store: &dyn Storage,
    settings: &CrawlSettings,
) -> StorageResult<SettingsRecord> {
    let record = SettingsRecord::new(settings.clone())?;
    let json =
        serde_json::to_string(&record).map_err(|e| StorageError::Serialization(e.to_string()))?;
    store.put_settings(&json).await?;

    tracing::info!(
        base_url = %record.settings.base_url,
        fingerprint = %record.fingerprint,
        "Published crawl settings"
    );
    Ok(record)
}

/// Reads the published settings, if any
///
/// Fails if the record was written by an incompatible version or its
/// fingerprint no longer matches its contents.
pub async fn load_settings(store: &dyn Storage) -> StorageResult<Option<SettingsRecord>> {
    let Some(json) = store.get_settings().await? else {
        return Ok(None);
    };

    let record: SettingsRecord =
        serde_json::from_str(&json).map_err(|e| StorageError::Serialization(e.to_string()))?;

    if record.version != SETTINGS_VERSION {
        return Err(StorageError::Serialization(format!(
            "settings record version {} is not supported (expected {})",
            record.version, SETTINGS_VERSION
        )));
    }
    if fingerprint(&record.settings)? != record.fingerprint {
        return Err(StorageError::Serialization(
            "settings record fingerprint does not match its contents".to_string(),
        ));
    }

    Ok(Some(record))
}
