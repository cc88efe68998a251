//! In-process storage implementation
//!
//! One map from URL to `(namespace, value)` keeps the namespaces disjoint
//! structurally. Used for one-shot crawls and by the test suites.

use crate::state::Namespace;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    urls: HashMap<String, (Namespace, String)>,
    settings: Option<String>,
}

/// Storage backend living entirely in this process
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StorageError::Poisoned)
    }

    fn place(&self, url: &str, namespace: Namespace, value: String) -> StorageResult<()> {
        self.lock()?.urls.insert(url.to_string(), (namespace, value));
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn ping(&self) -> StorageResult<()> {
        self.lock().map(|_| ())
    }

    async fn exists_anywhere(&self, url: &str) -> StorageResult<bool> {
        Ok(self.lock()?.urls.contains_key(url))
    }

    async fn namespace_of(&self, url: &str) -> StorageResult<Option<Namespace>> {
        Ok(self.lock()?.urls.get(url).map(|(ns, _)| *ns))
    }

    async fn insert_todo(&self, url: &str, force: bool) -> StorageResult<bool> {
        let mut inner = self.lock()?;
        if !force && inner.urls.contains_key(url) {
            return Ok(false);
        }
        inner
            .urls
            .insert(url.to_string(), (Namespace::Todo, String::new()));
        Ok(true)
    }

    async fn claim_batch(&self, max_n: usize) -> StorageResult<Vec<String>> {
        let mut inner = self.lock()?;
        let mut claimed = Vec::new();
        for (url, (namespace, _)) in inner.urls.iter_mut() {
            if claimed.len() >= max_n {
                break;
            }
            if *namespace == Namespace::Todo {
                *namespace = Namespace::Doing;
                claimed.push(url.clone());
            }
        }
        Ok(claimed)
    }

    async fn mark_done(&self, url: &str, result: &str) -> StorageResult<()> {
        self.place(url, Namespace::Done, result.to_string())
    }

    async fn mark_trash(&self, url: &str) -> StorageResult<()> {
        self.place(url, Namespace::Trash, String::new())
    }

    async fn requeue(&self, url: &str) -> StorageResult<()> {
        self.place(url, Namespace::Todo, String::new())
    }

    async fn recover_all(&self) -> StorageResult<u64> {
        let mut inner = self.lock()?;
        let mut moved = 0;
        for (namespace, value) in inner.urls.values_mut() {
            if matches!(namespace, Namespace::Doing | Namespace::Trash) {
                *namespace = Namespace::Todo;
                value.clear();
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn flush_all(&self) -> StorageResult<()> {
        self.lock()?.urls.clear();
        Ok(())
    }

    async fn size(&self, namespace: Namespace) -> StorageResult<u64> {
        Ok(self
            .lock()?
            .urls
            .values()
            .filter(|(ns, _)| *ns == namespace)
            .count() as u64)
    }

    async fn enumerate(&self, namespace: Namespace) -> StorageResult<Vec<String>> {
        Ok(self
            .lock()?
            .urls
            .iter()
            .filter(|(_, (ns, _))| *ns == namespace)
            .map(|(url, _)| url.clone())
            .collect())
    }

    async fn enumerate_done_as_map(&self) -> StorageResult<BTreeMap<String, String>> {
        Ok(self
            .lock()?
            .urls
            .iter()
            .filter(|(_, (ns, _))| *ns == Namespace::Done)
            .map(|(url, (_, value))| (url.clone(), value.clone()))
            .collect())
    }

    async fn put_settings(&self, record: &str) -> StorageResult<()> {
        self.lock()?.settings = Some(record.to_string());
        Ok(())
    }

    async fn get_settings(&self) -> StorageResult<Option<String>> {
        Ok(self.lock()?.settings.clone())
    }
}
