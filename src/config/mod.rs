//! Configuration module for Krill
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and turning the `[settings]` section into the [`CrawlSettings`] shared by
//! every process cooperating on a crawl.
//!
//! # Example
//!
//! ```no_run
//! use krill::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("krill.toml")).unwrap();
//! println!("Crawler will use {} workers", config.crawler.workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlSettings, CrawlerConfig, HttpConfig, SettingsConfig, StoreConfig,
};

// Re-export parser functions
pub use parser::{build_crawl_settings, compute_config_hash, load_config, load_config_with_hash};
pub use validation::{validate, validate_settings};
