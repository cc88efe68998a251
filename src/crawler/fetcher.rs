//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the shared HTTP client (user agent, cookie, timeout, pool size,
//!   optional SOCKS5 proxy)
//! - GET requests for claimed URLs
//! - Classifying each response for the worker protocol

use crate::config::{CrawlerConfig, HttpConfig};
use crate::{ConfigError, KrillError};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::{Client, Proxy};
use std::time::Duration;

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchResult {
    /// 2xx response
    Success {
        /// HTTP status code
        status: u16,
        /// Page body, read once and shared by extraction and link enumeration
        body: String,
    },

    /// Status in the hard-error class; the URL goes straight to trash
    HardReject { status: u16 },

    /// Status in the soft-error class; counted against the error budget
    SoftReject { status: u16 },

    /// Any other non-2xx status; the URL is retried later
    Transient { status: u16 },

    /// Network error (connection refused, timeout, body read failure)
    NetworkError { error: String },
}

/// How a non-2xx status is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Hard,
    Soft,
    Transient,
}

/// Classifies an HTTP status against the configured soft and hard classes
pub fn classify_status(status: u16, soft: &[u16], hard: &[u16]) -> StatusClass {
    if (200..300).contains(&status) {
        StatusClass::Success
    } else if hard.contains(&status) {
        StatusClass::Hard
    } else if soft.contains(&status) {
        StatusClass::Soft
    } else {
        StatusClass::Transient
    }
}

/// Builds the HTTP client shared by every worker
///
/// # Arguments
///
/// * `crawler` - Timeout and pool size
/// * `http` - User agent, cookie and proxy
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(KrillError)` - Invalid cookie or proxy, or the client failed to build
///
/// # Example
///
/// ```no_run
/// use krill::config::{CrawlerConfig, HttpConfig};
/// use krill::crawler::build_http_client;
///
/// let client = build_http_client(&CrawlerConfig::default(), &HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(crawler: &CrawlerConfig, http: &HttpConfig) -> Result<Client, KrillError> {
    let mut headers = HeaderMap::new();
    if !http.cookie.is_empty() {
        let cookie = HeaderValue::from_str(&http.cookie)
            .map_err(|e| ConfigError::Validation(format!("invalid cookie header: {}", e)))?;
        headers.insert(COOKIE, cookie);
    }

    let mut builder = Client::builder()
        .user_agent(http.user_agent.as_str())
        .default_headers(headers)
        .timeout(Duration::from_secs(crawler.timeout))
        .pool_max_idle_per_host(crawler.connections)
        .pool_idle_timeout(Duration::from_secs(30))
        .gzip(true)
        .brotli(true);

    if http.use_proxy {
        tracing::info!(proxy = %http.proxy, "Routing requests through proxy");
        builder = builder.proxy(Proxy::all(http.proxy.as_str())?);
    }

    Ok(builder.build()?)
}

/// Issues one GET and classifies the outcome
///
/// Fetches are never cancelled; each runs to the client's timeout.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    soft_statuses: Vec<u16>,
    hard_statuses: Vec<u16>,
}

impl Fetcher {
    pub fn new(client: Client, crawler: &CrawlerConfig) -> Self {
        Self {
            client,
            soft_statuses: crawler.soft_error_statuses.clone(),
            hard_statuses: crawler.hard_error_statuses.clone(),
        }
    }

    /// Fetches `url`
    ///
    /// # Classification
    ///
    /// | Response | Result |
    /// |----------|--------|
    /// | 2xx | `Success` with the body |
    /// | hard-error status (404, 410) | `HardReject` |
    /// | soft-error status (403, 429) | `SoftReject` |
    /// | any other status | `Transient` |
    /// | timeout, connect or body error | `NetworkError` |
    pub async fn fetch(&self, url: &str) -> FetchResult {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                let error = if e.is_timeout() {
                    "Request timeout".to_string()
                } else if e.is_connect() {
                    format!("Connection failed: {}", e)
                } else {
                    e.to_string()
                };
                return FetchResult::NetworkError { error };
            }
        };

        let status = response.status().as_u16();
        match classify_status(status, &self.soft_statuses, &self.hard_statuses) {
            StatusClass::Hard => FetchResult::HardReject { status },
            StatusClass::Soft => FetchResult::SoftReject { status },
            StatusClass::Transient => FetchResult::Transient { status },
            StatusClass::Success => match response.text().await {
                Ok(body) => FetchResult::Success { status, body },
                Err(e) => FetchResult::NetworkError {
                    error: format!("Failed to read body: {}", e),
                },
            },
        }
    }
}
