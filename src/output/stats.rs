//! Crawl statistics
//!
//! This module samples the store's namespace sizes and the run counters for
//! operator visibility. Nothing here feeds back into control flow.

use crate::state::{rate_per_minute, CrawlState, Namespace};
use crate::storage::{Storage, StorageResult};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Point-in-time view of a crawl
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlStatistics {
    /// URLs processed by this process
    pub parsed: u64,

    /// Average throughput since the run started
    pub urls_per_minute: f64,

    pub todo: u64,
    pub doing: u64,
    pub done: u64,
    pub trash: u64,

    /// Current consecutive soft-error count
    pub errors: u64,
}

impl CrawlStatistics {
    /// Total URLs known to the store
    pub fn total(&self) -> u64 {
        self.todo + self.doing + self.done + self.trash
    }
}

impl fmt::Display for CrawlStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parsed {} ({:.1}/min), todo {}, doing {}, done {}, trash {}, errors {}",
            self.parsed,
            self.urls_per_minute,
            self.todo,
            self.doing,
            self.done,
            self.trash,
            self.errors
        )
    }
}

/// Reads the namespace sizes from `storage`
///
/// The run counters are left at zero; see [`load_run_statistics`].
pub async fn load_statistics(storage: &dyn Storage) -> StorageResult<CrawlStatistics> {
    Ok(CrawlStatistics {
        todo: storage.size(Namespace::Todo).await?,
        doing: storage.size(Namespace::Doing).await?,
        done: storage.size(Namespace::Done).await?,
        trash: storage.size(Namespace::Trash).await?,
        ..CrawlStatistics::default()
    })
}

/// Reads the namespace sizes plus this process's run counters
pub async fn load_run_statistics(
    storage: &dyn Storage,
    state: &CrawlState,
) -> StorageResult<CrawlStatistics> {
    let mut stats = load_statistics(storage).await?;
    stats.parsed = state.processed();
    stats.urls_per_minute = rate_per_minute(stats.parsed, state.elapsed());
    stats.errors = state.consecutive_errors();
    Ok(stats)
}

/// Logs one stats line every `interval` until `shutdown` fires
pub async fn run_reporter(
    storage: Arc<dyn Storage>,
    state: Arc<CrawlState>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately; skip it so the first line has data
    ticker.tick().await;

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
            break;
        }

        match load_run_statistics(storage.as_ref(), &state).await {
            Ok(stats) => tracing::info!(target: "krill::stats", "{}", stats),
            Err(e) => tracing::debug!(target: "krill::stats", error = %e, "Stats sample failed"),
        }
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    let total = stats.total();
    let percent = |count: u64| {
        if total > 0 {
            count as f64 / total as f64 * 100.0
        } else {
            0.0
        }
    };

    println!("URLs by namespace:");
    for (name, count) in [
        ("todo", stats.todo),
        ("doing", stats.doing),
        ("done", stats.done),
        ("trash", stats.trash),
    ] {
        println!("  {:<6} {} ({:.1}%)", name, count, percent(count));
    }
    println!("  total  {}", total);

    if stats.parsed > 0 {
        println!();
        println!(
            "This run: {} parsed ({:.1}/min)",
            stats.parsed, stats.urls_per_minute
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_load_statistics_counts_namespaces() {
        let store = MemoryStorage::new();
        for url in ["http://x.test/1", "http://x.test/2", "http://x.test/3"] {
            store.insert_todo(url, false).await.unwrap();
        }
        let claimed = store.claim_batch(2).await.unwrap();
        store.mark_done(&claimed[0], "").await.unwrap();

        let stats = load_statistics(&store).await.unwrap();
        assert_eq!(stats.todo, 1);
        assert_eq!(stats.doing, 1);
        assert_eq!(stats.done, 1);
        assert_eq!(stats.trash, 0);
        assert_eq!(stats.total(), 3);
    }

    #[tokio::test]
    async fn test_run_statistics_include_counters() {
        let store = MemoryStorage::new();
        let state = CrawlState::new(10, 3);
        state.record_processed();
        state.record_soft_error();

        let stats = load_run_statistics(&store, &state).await.unwrap();
        assert_eq!(stats.parsed, 1);
        assert_eq!(stats.errors, 1);
        assert!(stats.urls_per_minute > 0.0);
    }

    #[test]
    fn test_display_line() {
        let stats = CrawlStatistics {
            parsed: 12,
            urls_per_minute: 6.0,
            todo: 3,
            doing: 1,
            done: 12,
            trash: 2,
            errors: 0,
        };
        assert_eq!(
            stats.to_string(),
            "parsed 12 (6.0/min), todo 3, doing 1, done 12, trash 2, errors 0"
        );
    }

    #[tokio::test]
    async fn test_reporter_stops_on_shutdown() {
        let store: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let state = Arc::new(CrawlState::new(10, 3));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(run_reporter(store, state, Duration::from_millis(10), rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
