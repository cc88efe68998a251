//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `Namespace`: the four disjoint sets a URL lives in (todo, doing, done, trash)
//! - `CrawlState`: per-process counters shared by all crawl tasks (error
//!   budget, in-flight jobs, throughput, per-URL attempts)

mod namespace;
mod run_state;

pub use namespace::Namespace;
pub use run_state::{BreakerStatus, CrawlState};
pub(crate) use run_state::rate_per_minute;
