//! Staging set and enqueuer
//!
//! This module handles:
//! - The bounded in-memory staging set between claim and dispatch
//! - The enqueuer loop that tops the staging set up from the store
//! - Detecting the end of the crawl (todo empty and nothing in flight)

use crate::state::{CrawlState, Namespace};
use crate::storage::{Storage, StorageResult};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

/// Bounded set of claimed URLs waiting for a worker
///
/// Every read-modify-write (size check, add, drain) happens under one lock.
#[derive(Debug)]
pub struct StagingQueue {
    urls: Mutex<HashSet<String>>,
    capacity: usize,
}

impl StagingQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            urls: Mutex::new(HashSet::with_capacity(capacity)),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.urls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Number of URLs that can still be staged
    pub fn free_slots(&self) -> usize {
        self.capacity.saturating_sub(self.len())
    }

    /// Stages `urls`, up to the capacity
    ///
    /// # Returns
    ///
    /// The URLs that did not fit; the caller must hand them back to the store.
    pub fn stage(&self, urls: Vec<String>) -> Vec<String> {
        let mut staged = self.lock();
        let mut overflow = Vec::new();
        for url in urls {
            if staged.len() < self.capacity {
                staged.insert(url);
            } else {
                overflow.push(url);
            }
        }
        overflow
    }

    /// Removes up to `max` URLs for one dispatch cycle
    ///
    /// The drained URLs are counted as in flight before the lock is released,
    /// so an observer never sees them in neither place.
    pub fn drain_batch(&self, max: usize, state: &CrawlState) -> Vec<String> {
        let mut staged = self.lock();
        let batch: Vec<String> = staged.iter().take(max).cloned().collect();
        for url in &batch {
            staged.remove(url);
        }
        state.jobs_started(batch.len());
        batch
    }

    /// Empties the staging set without dispatching anything
    pub fn drain_all(&self) -> Vec<String> {
        self.lock().drain().collect()
    }

    /// True when nothing is staged and no job is in flight
    pub fn is_idle(&self, state: &CrawlState) -> bool {
        let staged = self.lock();
        staged.is_empty() && !state.is_busy()
    }
}

/// What one enqueuer cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueCycle {
    /// Staging set was full; nothing claimed
    Full,

    /// Claimed and staged this many URLs
    Staged(usize),

    /// Nothing to claim right now, but work is still in flight
    Waiting,

    /// Todo is empty and nothing is staged or in flight
    Exhausted,
}

/// Long-lived loop that moves work from the store's todo set into staging
pub struct Enqueuer {
    store: Arc<dyn Storage>,
    staging: Arc<StagingQueue>,
    state: Arc<CrawlState>,
    batch_size: usize,
    interval: Duration,
}

impl Enqueuer {
    /// Creates an enqueuer
    ///
    /// # Arguments
    ///
    /// * `batch_size` - Most URLs claimed per cycle (one per worker slot)
    /// * `interval` - Sleep between cycles
    pub fn new(
        store: Arc<dyn Storage>,
        staging: Arc<StagingQueue>,
        state: Arc<CrawlState>,
        batch_size: usize,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            staging,
            state,
            batch_size: batch_size.max(1),
            interval,
        }
    }

    /// Runs one claim cycle
    ///
    /// Store errors are returned to the caller, which retries on the next tick.
    pub async fn cycle(&self) -> StorageResult<EnqueueCycle> {
        let free = self.staging.free_slots();
        if free == 0 {
            return Ok(EnqueueCycle::Full);
        }

        let claimed = self.store.claim_batch(free.min(self.batch_size)).await?;
        if claimed.is_empty() {
            // Idle must be checked before todo: a job finishing in between
            // may still add links, and those show up in the size check.
            if self.staging.is_idle(&self.state) && self.store.size(Namespace::Todo).await? == 0 {
                return Ok(EnqueueCycle::Exhausted);
            }
            return Ok(EnqueueCycle::Waiting);
        }

        let count = claimed.len();
        let overflow = self.staging.stage(claimed);
        for url in &overflow {
            self.store.requeue(url).await?;
        }
        Ok(EnqueueCycle::Staged(count - overflow.len()))
    }

    /// Runs until the crawl is exhausted or `shutdown` fires
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                tracing::debug!("Enqueuer stopping on shutdown");
                break;
            }

            match self.cycle().await {
                Ok(EnqueueCycle::Exhausted) => {
                    tracing::info!("No work left in todo and nothing in flight");
                    self.state.mark_exhausted();
                    break;
                }
                Ok(EnqueueCycle::Staged(n)) => {
                    tracing::trace!(staged = n, "Claimed work from todo");
                }
                Ok(EnqueueCycle::Full) | Ok(EnqueueCycle::Waiting) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Enqueuer store error, retrying next cycle");
                }
            }
        }
    }
}
