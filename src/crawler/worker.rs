//! Worker protocol: fetch, extract, filter, write back
//!
//! Each job is one claimed URL. Its outcome is always written to the store
//! before the job is reported finished:
//!
//! | Fetch result | Store write | Error budget |
//! |--------------|-------------|--------------|
//! | 2xx, extraction ok | `mark_done` + discovered links into todo | reset |
//! | 2xx, extraction failed or required-but-empty | requeue (counts an attempt) | reset |
//! | hard-error status | `mark_trash` | reset |
//! | soft-error status | requeue (counts an attempt) | +1, may abort |
//! | other status | requeue (counts an attempt) | reset |
//! | network error | requeue (counts an attempt) | unchanged |
//!
//! A URL that runs out of attempts goes to trash instead of back to todo.

use crate::config::CrawlSettings;
use crate::crawler::extract::Extractor;
use crate::crawler::fetcher::{FetchResult, Fetcher};
use crate::crawler::parser::parse_links;
use crate::state::{BreakerStatus, CrawlState};
use crate::storage::{Storage, StorageResult};
use crate::url::normalize_and_filter;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Tries per store write before the job gives up
const STORE_ATTEMPTS: u32 = 3;

const STORE_RETRY_DELAY: Duration = Duration::from_millis(200);

/// What happened to one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Stored in done; `links_added` new URLs went into todo
    Done { links_added: usize },

    /// Sent back to todo for a later attempt
    Requeued { reason: String },

    /// Sent to trash
    Trashed { reason: String },

    /// Soft-error budget exceeded; the run must stop
    Aborted { count: u64 },

    /// The outcome could not be written; the URL stays in doing until a redo
    StoreFailed { error: String },
}

/// A finished job, sent back to the dispatcher
#[derive(Debug, Clone)]
pub struct JobReport {
    pub worker_id: usize,
    pub url: String,
    pub outcome: JobOutcome,
}

/// Everything a worker needs, shared by the whole pool
pub struct WorkerContext {
    pub store: Arc<dyn Storage>,
    pub fetcher: Fetcher,
    pub extractor: Arc<dyn Extractor>,
    pub settings: Arc<CrawlSettings>,
    pub state: Arc<CrawlState>,
}

impl WorkerContext {
    /// Runs the full protocol for one claimed URL
    pub async fn process(&self, url: &str) -> JobOutcome {
        let outcome = match self.fetcher.fetch(url).await {
            FetchResult::Success { body, .. } => {
                self.state.reset_errors();
                self.handle_page(url, &body).await
            }
            FetchResult::HardReject { status } => {
                self.state.reset_errors();
                self.trash(url, format!("HTTP {}", status)).await
            }
            FetchResult::SoftReject { status } => match self.state.record_soft_error() {
                BreakerStatus::Tripped(count) => {
                    tracing::error!(
                        url = %url,
                        status,
                        count,
                        max = self.state.max_errors(),
                        "Too many consecutive errors"
                    );
                    // Leave the URL retryable for whoever resumes the crawl
                    match self.write("requeue", url, || self.store.requeue(url)).await {
                        Ok(()) => JobOutcome::Aborted { count },
                        Err(e) => JobOutcome::StoreFailed {
                            error: e.to_string(),
                        },
                    }
                }
                BreakerStatus::Counting(count) => {
                    tracing::warn!(url = %url, status, count, "Soft rejection");
                    self.retry_later(url, format!("HTTP {}", status)).await
                }
            },
            FetchResult::Transient { status } => {
                self.state.reset_errors();
                tracing::debug!(url = %url, status, "Recoverable status");
                self.retry_later(url, format!("HTTP {}", status)).await
            }
            FetchResult::NetworkError { error } => {
                tracing::debug!(url = %url, error = %error, "Fetch failed");
                self.retry_later(url, error).await
            }
        };

        if matches!(outcome, JobOutcome::Done { .. }) {
            self.state.record_processed();
        }
        outcome
    }

    async fn handle_page(&self, url: &str, body: &str) -> JobOutcome {
        let extracted = match self.extractor.extract(body) {
            Ok(extracted) => extracted,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Extraction failed");
                return self.retry_later(url, e.to_string()).await;
            }
        };

        if extracted.is_none() && self.settings.require_extraction {
            tracing::warn!(url = %url, "Nothing extracted but extraction is required");
            return self
                .retry_later(url, "nothing extracted".to_string())
                .await;
        }

        let result = extracted.unwrap_or_default();
        if let Err(e) = self
            .write("mark_done", url, || self.store.mark_done(url, &result))
            .await
        {
            return JobOutcome::StoreFailed {
                error: e.to_string(),
            };
        }
        self.state.forget_attempts(url);

        let links_added = if self.settings.follow_links {
            self.enqueue_links(url, body).await
        } else {
            0
        };

        tracing::debug!(url = %url, links_added, "Page done");
        JobOutcome::Done { links_added }
    }

    /// Filters the page's links and adds the survivors to todo
    async fn enqueue_links(&self, url: &str, body: &str) -> usize {
        let mut added = 0;
        for raw in parse_links(body) {
            let Some(link) = normalize_and_filter(&raw, &self.settings.base_url, &self.settings)
            else {
                continue;
            };
            match self
                .write("insert_todo", &link, || self.store.insert_todo(&link, false))
                .await
            {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(url = %link, source = %url, error = %e, "Failed to add link");
                }
            }
        }
        added
    }

    /// Requeues `url`, or trashes it once its attempts are used up
    async fn retry_later(&self, url: &str, reason: String) -> JobOutcome {
        if !self.state.record_attempt(url) {
            return self.trash(url, format!("{} (out of attempts)", reason)).await;
        }
        match self.write("requeue", url, || self.store.requeue(url)).await {
            Ok(()) => JobOutcome::Requeued { reason },
            Err(e) => JobOutcome::StoreFailed {
                error: e.to_string(),
            },
        }
    }

    async fn trash(&self, url: &str, reason: String) -> JobOutcome {
        match self.write("mark_trash", url, || self.store.mark_trash(url)).await {
            Ok(()) => {
                self.state.forget_attempts(url);
                tracing::debug!(url = %url, reason = %reason, "Moved to trash");
                JobOutcome::Trashed { reason }
            }
            Err(e) => JobOutcome::StoreFailed {
                error: e.to_string(),
            },
        }
    }

    /// Runs a store write, retrying a few times before giving up
    async fn write<T, F, Fut>(&self, op: &str, url: &str, mut call: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < STORE_ATTEMPTS => {
                    tracing::warn!(op, url = %url, attempt, error = %e, "Store write failed, retrying");
                    tokio::time::sleep(STORE_RETRY_DELAY * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(op, url = %url, error = %e, "Store write failed");
                    return Err(e);
                }
            }
        }
    }
}

/// One worker of the fixed pool
///
/// Pulls jobs until the job channel closes. Every job is reported exactly
/// once, after its outcome is in the store.
pub async fn run_worker(
    worker_id: usize,
    ctx: Arc<WorkerContext>,
    jobs: Arc<Mutex<mpsc::Receiver<String>>>,
    results: mpsc::Sender<JobReport>,
) {
    tracing::trace!(worker_id, "Worker started");
    loop {
        let next = jobs.lock().await.recv().await;
        let Some(url) = next else {
            break;
        };

        let outcome = ctx.process(&url).await;
        ctx.state.job_finished();

        let report = JobReport {
            worker_id,
            url,
            outcome,
        };
        if results.send(report).await.is_err() {
            break;
        }
    }
    tracing::trace!(worker_id, "Worker stopped");
}
