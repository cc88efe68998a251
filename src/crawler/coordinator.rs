//! Crawler coordinator - run orchestration
//!
//! This module wires one crawl process together:
//! - Seeding the store's todo set
//! - Spawning the enqueuer, the stats reporter and a fixed worker pool
//! - Dispatching staged URLs in per-cycle batches and collecting every report
//! - Stopping on exhaustion or when the soft-error budget runs out
//! - Handing unprocessed staged URLs back to the store on the way out

use crate::config::{Config, CrawlSettings};
use crate::crawler::extract::build_extractor;
use crate::crawler::fetcher::{build_http_client, Fetcher};
use crate::crawler::scheduler::{Enqueuer, StagingQueue};
use crate::crawler::worker::{run_worker, JobOutcome, JobReport, WorkerContext};
use crate::output::{load_run_statistics, run_reporter, CrawlStatistics};
use crate::state::CrawlState;
use crate::storage::Storage;
use crate::url::canonicalize;
use crate::KrillError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

/// Main crawler coordinator structure
pub struct Coordinator {
    store: Arc<dyn Storage>,
    settings: Arc<CrawlSettings>,
    state: Arc<CrawlState>,
    staging: Arc<StagingQueue>,
    context: Arc<WorkerContext>,
    workers: usize,
    enqueue_interval: Duration,
    stats_interval: Duration,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - Process-local configuration (pool sizes, HTTP identity)
    /// * `store` - The shared URL state store
    /// * `settings` - The crawl settings shared by every cooperating process
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to seed and run
    /// * `Err(KrillError)` - The HTTP client or the extraction rules could not be built
    pub fn new(
        config: &Config,
        store: Arc<dyn Storage>,
        settings: CrawlSettings,
    ) -> Result<Self, KrillError> {
        let client = build_http_client(&config.crawler, &config.http)?;
        let extractor = build_extractor(settings.extraction_rules.as_deref())?;
        let settings = Arc::new(settings);
        let state = Arc::new(CrawlState::new(
            config.crawler.max_errors,
            config.crawler.max_attempts,
        ));

        let context = Arc::new(WorkerContext {
            store: store.clone(),
            fetcher: Fetcher::new(client, &config.crawler),
            extractor,
            settings: settings.clone(),
            state: state.clone(),
        });

        Ok(Self {
            store,
            settings,
            state,
            staging: Arc::new(StagingQueue::new(config.crawler.staging_capacity)),
            context,
            workers: config.crawler.workers.max(1),
            enqueue_interval: Duration::from_millis(config.crawler.enqueue_interval_ms.max(1)),
            stats_interval: Duration::from_secs(config.crawler.stats_interval),
        })
    }

    /// Force-inserts the base URL and any extra seeds into todo
    ///
    /// Seeds that are blank or fail to canonicalize are skipped.
    ///
    /// # Returns
    ///
    /// The number of URLs inserted
    pub async fn seed(&self, extra: &[String]) -> Result<usize, KrillError> {
        let base = canonicalize(&self.settings.base_url)?;
        self.store.insert_todo(&base, true).await?;
        let mut seeded = 1;

        for line in extra {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match canonicalize(line) {
                Ok(url) => {
                    self.store.insert_todo(&url, true).await?;
                    seeded += 1;
                }
                Err(e) => tracing::warn!(seed = %line, error = %e, "Skipping bad seed"),
            }
        }

        tracing::info!(seeded, base = %base, "Seeded todo");
        Ok(seeded)
    }

    /// Runs the crawl until todo is exhausted or the error budget is spent
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlStatistics)` - Final statistics for this process
    /// * `Err(KrillError::TooManyErrors)` - The soft-error budget ran out
    /// * `Err(KrillError)` - The worker pool or the store failed
    pub async fn run(&self) -> Result<CrawlStatistics, KrillError> {
        tracing::info!(
            base = %self.settings.base_url,
            workers = self.workers,
            "Starting crawl"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let enqueuer = Enqueuer::new(
            self.store.clone(),
            self.staging.clone(),
            self.state.clone(),
            self.workers,
            self.enqueue_interval,
        );
        let enqueuer_handle = tokio::spawn(enqueuer.run(shutdown_rx.clone()));

        let reporter_handle = if self.stats_interval.is_zero() {
            None
        } else {
            Some(tokio::spawn(run_reporter(
                self.store.clone(),
                self.state.clone(),
                self.stats_interval,
                shutdown_rx.clone(),
            )))
        };

        let (job_tx, job_rx) = mpsc::channel::<String>(self.workers);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<JobReport>(self.workers);

        let worker_handles: Vec<JoinHandle<()>> = (0..self.workers)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    self.context.clone(),
                    job_rx.clone(),
                    result_tx.clone(),
                ))
            })
            .collect();
        drop(result_tx);

        let outcome = self
            .dispatch(&job_tx, &mut result_rx, &enqueuer_handle)
            .await;

        // Closing the job channel lets idle workers exit
        drop(job_tx);
        let _ = shutdown_tx.send(true);

        for handle in worker_handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task failed");
            }
        }
        if let Err(e) = enqueuer_handle.await {
            tracing::error!(error = %e, "Enqueuer task failed");
        }
        if let Some(handle) = reporter_handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Stats task failed");
            }
        }

        self.return_staged().await;
        outcome?;

        let stats = load_run_statistics(self.store.as_ref(), &self.state).await?;
        tracing::info!(
            parsed = stats.parsed,
            elapsed = ?self.state.elapsed(),
            "Crawl finished"
        );
        Ok(stats)
    }

    /// Dispatch loop: one batch per cycle, every report collected before the next
    async fn dispatch(
        &self,
        job_tx: &mpsc::Sender<String>,
        result_rx: &mut mpsc::Receiver<JobReport>,
        enqueuer: &JoinHandle<()>,
    ) -> Result<(), KrillError> {
        loop {
            let batch = self.staging.drain_batch(self.workers, &self.state);
            if batch.is_empty() {
                let enqueuer_done = enqueuer.is_finished();
                if self.state.is_exhausted() {
                    return Ok(());
                }
                if enqueuer_done {
                    return Err(KrillError::WorkerPool(
                        "enqueuer stopped before the crawl was exhausted".to_string(),
                    ));
                }
                tokio::time::sleep(self.enqueue_interval).await;
                continue;
            }

            let dispatched = batch.len();
            let mut pending = batch.into_iter();
            while let Some(url) = pending.next() {
                if let Err(mpsc::error::SendError(url)) = job_tx.send(url).await {
                    let mut unsent = vec![url];
                    unsent.extend(pending.by_ref());
                    self.restage(unsent).await;
                    return Err(KrillError::WorkerPool("job channel closed".to_string()));
                }
            }

            let mut aborted = None;
            for _ in 0..dispatched {
                let Some(report) = result_rx.recv().await else {
                    return Err(KrillError::WorkerPool(
                        "all workers stopped mid-cycle".to_string(),
                    ));
                };
                if let Some(count) = self.handle_report(report) {
                    aborted = Some(count);
                }
            }

            if let Some(count) = aborted {
                return Err(KrillError::TooManyErrors {
                    count,
                    max: self.state.max_errors(),
                });
            }
        }
    }

    /// Logs one report; returns the error count if the job tripped the breaker
    fn handle_report(&self, report: JobReport) -> Option<u64> {
        let JobReport {
            worker_id,
            url,
            outcome,
        } = report;
        match outcome {
            JobOutcome::Done { links_added } => {
                tracing::trace!(worker_id, url = %url, links_added, "Job done");
            }
            JobOutcome::Requeued { reason } => {
                tracing::debug!(worker_id, url = %url, reason = %reason, "Job requeued");
            }
            JobOutcome::Trashed { reason } => {
                tracing::info!(worker_id, url = %url, reason = %reason, "Job trashed");
            }
            JobOutcome::StoreFailed { error } => {
                tracing::error!(
                    worker_id,
                    url = %url,
                    error = %error,
                    "Outcome not stored, URL stays in doing until a redo"
                );
            }
            JobOutcome::Aborted { count } => return Some(count),
        }
        None
    }

    /// Puts undispatched URLs back into staging, requeueing what no longer fits
    async fn restage(&self, urls: Vec<String>) {
        for url in self.staging.stage(urls) {
            if let Err(e) = self.store.requeue(&url).await {
                tracing::error!(url = %url, error = %e, "Failed to return unsent URL");
            }
        }
    }

    /// Requeues whatever is still staged after the loop ends
    async fn return_staged(&self) {
        let leftovers = self.staging.drain_all();
        if leftovers.is_empty() {
            return;
        }
        tracing::info!(count = leftovers.len(), "Returning staged URLs to todo");
        for url in leftovers {
            if let Err(e) = self.store.requeue(&url).await {
                tracing::error!(url = %url, error = %e, "Failed to return staged URL");
            }
        }
    }
}

/// Seeds and runs one crawl process
///
/// # Arguments
///
/// * `config` - Process-local configuration
/// * `store` - The shared URL state store
/// * `settings` - The published crawl settings
/// * `seeds` - Extra seed URLs on top of the base URL
///
/// # Example
///
/// ```no_run
/// use krill::config::{load_config, build_crawl_settings};
/// use krill::crawler::run_crawl;
/// use krill::storage::open_store;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("krill.toml"))?;
/// let settings = build_crawl_settings(&config.settings)?;
/// let store = open_store(&config.store).await?;
/// let stats = run_crawl(&config, store, settings, &[]).await?;
/// println!("{}", stats);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: &Config,
    store: Arc<dyn Storage>,
    settings: CrawlSettings,
    seeds: &[String],
) -> Result<CrawlStatistics, KrillError> {
    let coordinator = Coordinator::new(config, store, settings)?;
    coordinator.seed(seeds).await?;
    coordinator.run().await
}
