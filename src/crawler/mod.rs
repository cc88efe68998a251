//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching and status classification
//! - Link enumeration and page extraction
//! - The staging set and the enqueuer that fills it
//! - The worker protocol and overall crawl coordination

mod coordinator;
mod extract;
mod fetcher;
mod parser;
mod scheduler;
mod worker;

pub use coordinator::{run_crawl, Coordinator};
pub use extract::{build_extractor, ExtractError, Extractor, NoRules, Rule, RuleExtractor};
pub use fetcher::{build_http_client, classify_status, FetchResult, Fetcher, StatusClass};
pub use parser::parse_links;
pub use scheduler::{EnqueueCycle, Enqueuer, StagingQueue};
pub use worker::{run_worker, JobOutcome, JobReport, WorkerContext};
