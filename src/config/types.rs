use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure for Krill
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub crawler: CrawlerConfig,
    pub http: HttpConfig,
    pub settings: SettingsConfig,
}

/// Location of the shared URL state store
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store URL: `redis://host:port`, `sqlite://path` or `memory://`
    pub url: String,

    /// Key prefix that separates crawls sharing one store
    pub prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            prefix: "krill".to_string(),
        }
    }
}

/// Per-process crawler behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Number of concurrent workers (bounds in-flight fetches)
    pub workers: usize,

    /// Idle connections kept in the shared HTTP pool
    pub connections: usize,

    /// Consecutive soft rejections tolerated before the run aborts
    pub max_errors: u64,

    /// Transient failures allowed per URL before it is trashed
    pub max_attempts: u32,

    /// Upper bound on the in-memory staging set
    pub staging_capacity: usize,

    /// Sleep between enqueuer cycles (milliseconds)
    pub enqueue_interval_ms: u64,

    /// Seconds between stats lines; 0 disables the reporter
    pub stats_interval: u64,

    /// Per-request timeout in seconds
    pub timeout: u64,

    /// Statuses counted against the error budget
    pub soft_error_statuses: Vec<u16>,

    /// Statuses that send a URL straight to trash
    pub hard_error_statuses: Vec<u16>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            connections: 25,
            max_errors: 10,
            max_attempts: 3,
            staging_capacity: 64,
            enqueue_interval_ms: 50,
            stats_interval: 1,
            timeout: 15,
            soft_error_statuses: vec![403, 429],
            hard_error_statuses: vec![404, 410],
        }
    }
}

/// HTTP request identity and transport
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HttpConfig {
    pub user_agent: String,

    /// Raw `Cookie` header sent with every request (empty for none)
    pub cookie: String,

    /// SOCKS5 proxy address, used when `use_proxy` is set
    pub proxy: String,

    pub use_proxy: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("krill/{}", env!("CARGO_PKG_VERSION")),
            cookie: String::new(),
            proxy: "socks5://127.0.0.1:9050".to_string(),
            use_proxy: false,
        }
    }
}

/// Crawl settings as written in the config file
///
/// These become [`CrawlSettings`] once the extraction rule file is read.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SettingsConfig {
    pub base_url: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub allow_query: bool,
    pub allow_hash: bool,
    pub follow_links: bool,
    pub require_extraction: bool,
    pub extraction_rules: Option<PathBuf>,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            allow_query: false,
            allow_hash: false,
            follow_links: true,
            require_extraction: false,
            extraction_rules: None,
        }
    }
}

/// Settings shared by every process cooperating on one crawl
///
/// Published to the store once and loaded read-only by each worker, so no
/// locking is needed after startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlSettings {
    pub base_url: String,
    #[serde(default)]
    pub keywords_to_include: Vec<String>,
    #[serde(default)]
    pub keywords_to_exclude: Vec<String>,
    #[serde(default)]
    pub allow_query_parameters: bool,
    #[serde(default)]
    pub allow_hash_parameters: bool,
    #[serde(default = "default_true")]
    pub follow_links: bool,
    #[serde(default)]
    pub require_extraction: bool,
    /// Text of the page-extraction rule file, if any
    #[serde(default)]
    pub extraction_rules: Option<String>,
}

fn default_true() -> bool {
    true
}

impl CrawlSettings {
    /// Settings for `base_url` with every option at its default
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            keywords_to_include: Vec::new(),
            keywords_to_exclude: Vec::new(),
            allow_query_parameters: false,
            allow_hash_parameters: false,
            follow_links: true,
            require_extraction: false,
            extraction_rules: None,
        }
    }
}
