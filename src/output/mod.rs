//! Output module for crawl statistics and exports
//!
//! This module handles:
//! - Periodic stats lines while a crawl runs
//! - The end-of-run statistics table
//! - Exporting the store's keys and the done map to files

mod dump;
pub mod stats;

pub use dump::{collect_keys, dump_done, dump_keys};
pub use stats::{
    load_run_statistics, load_statistics, print_statistics, run_reporter, CrawlStatistics,
};
