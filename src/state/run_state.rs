//! Shared per-process crawl state
//!
//! One `CrawlState` is created per run and handed to the enqueuer, the
//! scheduler, every worker and the stats reporter behind an `Arc`. All
//! mutation goes through atomics or the attempts mutex.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Most URLs the attempt table tracks before it starts over
///
/// Entries for URLs a peer finished are never removed by this process, so the
/// table is bounded instead.
const ATTEMPT_TABLE_CAPACITY: usize = 65_536;

/// Result of recording one soft rejection against the error budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerStatus {
    /// Still within budget; carries the current consecutive count
    Counting(u64),

    /// Budget exceeded; the run must abort
    Tripped(u64),
}

/// Counters and flags shared by every task of one crawl run
#[derive(Debug)]
pub struct CrawlState {
    /// Consecutive soft rejections since the last non-soft response
    consecutive_errors: AtomicU64,

    /// Abort threshold for `consecutive_errors`
    max_errors: u64,

    /// Jobs handed to workers that have not finished writing their outcome
    in_flight: AtomicUsize,

    /// URLs fully processed by this process
    processed: AtomicU64,

    /// Set by the enqueuer once todo is empty and nothing is in flight
    exhausted: AtomicBool,

    /// Transient failures per URL seen by this process
    attempts: Mutex<HashMap<String, u32>>,

    max_attempts: u32,

    attempt_capacity: usize,

    started: Instant,
}

impl CrawlState {
    pub fn new(max_errors: u64, max_attempts: u32) -> Self {
        Self {
            consecutive_errors: AtomicU64::new(0),
            max_errors,
            in_flight: AtomicUsize::new(0),
            processed: AtomicU64::new(0),
            exhausted: AtomicBool::new(false),
            attempts: Mutex::new(HashMap::new()),
            max_attempts,
            attempt_capacity: ATTEMPT_TABLE_CAPACITY,
            started: Instant::now(),
        }
    }

    #[cfg(test)]
    fn with_attempt_capacity(mut self, capacity: usize) -> Self {
        self.attempt_capacity = capacity;
        self
    }

    #[cfg(test)]
    fn tracked_attempts(&self) -> usize {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    // ===== Error budget =====

    /// Counts one soft rejection and reports whether the breaker tripped
    ///
    /// The breaker trips once the count exceeds `max_errors`.
    pub fn record_soft_error(&self) -> BreakerStatus {
        let count = self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
        if count > self.max_errors {
            BreakerStatus::Tripped(count)
        } else {
            BreakerStatus::Counting(count)
        }
    }

    /// Resets the consecutive-error count after any non-soft response
    pub fn reset_errors(&self) {
        self.consecutive_errors.store(0, Ordering::SeqCst);
    }

    pub fn consecutive_errors(&self) -> u64 {
        self.consecutive_errors.load(Ordering::SeqCst)
    }

    pub fn max_errors(&self) -> u64 {
        self.max_errors
    }

    // ===== Busy tracking =====

    /// Marks `n` jobs as dispatched
    ///
    /// Callers do this while holding the staging lock so the enqueuer never
    /// sees an empty staging set and zero in-flight jobs in between.
    pub fn jobs_started(&self, n: usize) {
        self.in_flight.fetch_add(n, Ordering::SeqCst);
    }

    /// Marks one job as finished, after its outcome is written to the store
    pub fn job_finished(&self) {
        // Saturate instead of wrapping if a caller double-reports
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight() > 0
    }

    pub fn mark_exhausted(&self) {
        self.exhausted.store(true, Ordering::SeqCst);
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }

    // ===== Per-URL attempts =====

    /// Records one transient failure for `url`
    ///
    /// Returns true while the URL may be retried, false once it has used up
    /// its attempts (the entry is then forgotten).
    pub fn record_attempt(&self, url: &str) -> bool {
        let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        if attempts.len() >= self.attempt_capacity && !attempts.contains_key(url) {
            tracing::debug!(tracked = attempts.len(), "Attempt table full, starting over");
            attempts.clear();
        }
        let count = attempts.entry(url.to_string()).or_insert(0);
        *count += 1;
        if *count >= self.max_attempts {
            attempts.remove(url);
            false
        } else {
            true
        }
    }

    /// Drops the attempt count for a URL that reached a terminal namespace
    pub fn forget_attempts(&self, url: &str) {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url);
    }

    // ===== Throughput =====

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// URLs processed per minute, averaged over the whole run
    pub fn urls_per_minute(&self) -> f64 {
        rate_per_minute(self.processed(), self.elapsed())
    }
}

pub(crate) fn rate_per_minute(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        0.0
    } else {
        count as f64 * 60.0 / secs
    }
}
