//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.
//! Claims run inside an immediate transaction, so crawler processes sharing
//! the database file on one host never claim the same URL twice.

use crate::state::Namespace;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    crawl: String,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `crawl` - Store prefix naming this crawl inside the file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path, crawl: &str) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        // Other crawler processes may hold the write lock briefly
        conn.busy_timeout(Duration::from_secs(5))?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            crawl: crawl.to_string(),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            crawl: "test".to_string(),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    /// Moves `url` into `namespace`, whichever namespace held it before
    fn place(&self, url: &str, namespace: Namespace, value: &str) -> StorageResult<()> {
        self.lock()?.execute(
            "INSERT INTO urls (crawl, url, namespace, value) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(crawl, url) DO UPDATE SET namespace = excluded.namespace, value = excluded.value",
            params![self.crawl, url, namespace.as_str(), value],
        )?;
        Ok(())
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn ping(&self) -> StorageResult<()> {
        self.lock()?.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    // ===== Membership =====

    async fn exists_anywhere(&self, url: &str) -> StorageResult<bool> {
        Ok(self.namespace_of(url).await?.is_some())
    }

    async fn namespace_of(&self, url: &str) -> StorageResult<Option<Namespace>> {
        let namespace: Option<String> = self
            .lock()?
            .query_row(
                "SELECT namespace FROM urls WHERE crawl = ?1 AND url = ?2",
                params![self.crawl, url],
                |row| row.get(0),
            )
            .optional()?;

        match namespace {
            None => Ok(None),
            Some(name) => Namespace::parse(&name)
                .map(Some)
                .ok_or_else(|| StorageError::Serialization(format!("unknown namespace {}", name))),
        }
    }

    async fn insert_todo(&self, url: &str, force: bool) -> StorageResult<bool> {
        let conn = self.lock()?;
        let changed = if force {
            conn.execute(
                "INSERT INTO urls (crawl, url, namespace, value) VALUES (?1, ?2, 'todo', '')
                 ON CONFLICT(crawl, url) DO UPDATE SET namespace = 'todo', value = ''",
                params![self.crawl, url],
            )?
        } else {
            conn.execute(
                "INSERT OR IGNORE INTO urls (crawl, url, namespace, value) VALUES (?1, ?2, 'todo', '')",
                params![self.crawl, url],
            )?
        };
        Ok(changed > 0)
    }

    // ===== Transitions =====

    async fn claim_batch(&self, max_n: usize) -> StorageResult<Vec<String>> {
        if max_n == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let candidates: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT url FROM urls WHERE crawl = ?1 AND namespace = 'todo'
                 ORDER BY RANDOM() LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![self.crawl, max_n as i64], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut claimed = Vec::with_capacity(candidates.len());
        for url in candidates {
            // Only dispatch the URL if this transaction actually moved it
            let moved = tx.execute(
                "UPDATE urls SET namespace = 'doing' WHERE crawl = ?1 AND url = ?2 AND namespace = 'todo'",
                params![self.crawl, url],
            )?;
            if moved == 1 {
                claimed.push(url);
            }
        }

        tx.commit()?;
        Ok(claimed)
    }

    async fn mark_done(&self, url: &str, result: &str) -> StorageResult<()> {
        self.place(url, Namespace::Done, result)
    }

    async fn mark_trash(&self, url: &str) -> StorageResult<()> {
        self.place(url, Namespace::Trash, "")
    }

    async fn requeue(&self, url: &str) -> StorageResult<()> {
        self.place(url, Namespace::Todo, "")
    }

    // ===== Administration =====

    async fn recover_all(&self) -> StorageResult<u64> {
        let moved = self.lock()?.execute(
            "UPDATE urls SET namespace = 'todo', value = ''
             WHERE crawl = ?1 AND namespace IN ('doing', 'trash')",
            params![self.crawl],
        )?;
        Ok(moved as u64)
    }

    async fn flush_all(&self) -> StorageResult<()> {
        self.lock()?
            .execute("DELETE FROM urls WHERE crawl = ?1", params![self.crawl])?;
        Ok(())
    }

    // ===== Enumeration =====

    async fn size(&self, namespace: Namespace) -> StorageResult<u64> {
        let count: i64 = self.lock()?.query_row(
            "SELECT COUNT(*) FROM urls WHERE crawl = ?1 AND namespace = ?2",
            params![self.crawl, namespace.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    async fn enumerate(&self, namespace: Namespace) -> StorageResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT url FROM urls WHERE crawl = ?1 AND namespace = ?2")?;
        let urls = stmt
            .query_map(params![self.crawl, namespace.as_str()], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(urls)
    }

    async fn enumerate_done_as_map(&self) -> StorageResult<BTreeMap<String, String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT url, value FROM urls WHERE crawl = ?1 AND namespace = 'done'")?;
        let done = stmt
            .query_map(params![self.crawl], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(done)
    }

    // ===== Shared settings =====

    async fn put_settings(&self, record: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.lock()?.execute(
            "INSERT INTO settings (crawl, record, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(crawl) DO UPDATE SET record = excluded.record, updated_at = excluded.updated_at",
            params![self.crawl, record, now],
        )?;
        Ok(())
    }

    async fn get_settings(&self) -> StorageResult<Option<String>> {
        let record = self
            .lock()?
            .query_row(
                "SELECT record FROM settings WHERE crawl = ?1",
                params![self.crawl],
                |row| row.get(0),
            )
            .optional()?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::conformance;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sqlite_conformance_in_memory() {
        let store = SqliteStorage::new_in_memory().unwrap();
        conformance::run_all(&store).await;
    }

    #[tokio::test]
    async fn test_sqlite_conformance_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStorage::new(&dir.path().join("krill.db"), "disk").unwrap();
        conformance::run_all(&store).await;
    }

    #[tokio::test]
    async fn test_crawls_are_isolated_by_prefix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared.db");
        let first = SqliteStorage::new(&path, "first").unwrap();
        let second = SqliteStorage::new(&path, "second").unwrap();

        first.insert_todo("http://x.test/", false).await.unwrap();
        assert!(second.insert_todo("http://x.test/", false).await.unwrap());

        second.flush_all().await.unwrap();
        assert_eq!(first.size(Namespace::Todo).await.unwrap(), 1);
        assert_eq!(second.size(Namespace::Todo).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_two_handles_never_double_claim() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("claims.db");
        let a = SqliteStorage::new(&path, "k").unwrap();
        let b = SqliteStorage::new(&path, "k").unwrap();

        for i in 0..20 {
            a.insert_todo(&format!("http://x.test/{}", i), false)
                .await
                .unwrap();
        }

        let mut seen = std::collections::HashSet::new();
        loop {
            let mut progressed = false;
            for store in [&a, &b] {
                for url in store.claim_batch(3).await.unwrap() {
                    assert!(seen.insert(url), "URL claimed twice");
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
        assert_eq!(seen.len(), 20);
    }
}
