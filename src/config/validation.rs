use crate::config::types::{Config, CrawlSettings, CrawlerConfig, HttpConfig, StoreConfig};
use crate::ConfigError;
use url::Url;

/// Store URL schemes understood by [`crate::storage::open_store`]
const STORE_SCHEMES: &[&str] = &["redis", "rediss", "sqlite", "memory"];

/// Validates the entire configuration
///
/// The `[settings]` section is checked separately by [`validate_settings`],
/// since a process that only loads published settings may leave it empty.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_store_config(&config.store)?;
    validate_crawler_config(&config.crawler)?;
    validate_http_config(&config.http)?;
    Ok(())
}

fn validate_store_config(config: &StoreConfig) -> Result<(), ConfigError> {
    let scheme = config
        .url
        .split_once("://")
        .map(|(scheme, _)| scheme)
        .ok_or_else(|| ConfigError::InvalidUrl(format!("Invalid store url '{}'", config.url)))?;

    if !STORE_SCHEMES.contains(&scheme) {
        return Err(ConfigError::Validation(format!(
            "store url scheme must be one of {:?}, got '{}'",
            STORE_SCHEMES, scheme
        )));
    }

    if config.prefix.is_empty() || config.prefix.contains(char::is_whitespace) {
        return Err(ConfigError::Validation(format!(
            "store prefix must be non-empty without whitespace, got '{}'",
            config.prefix
        )));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 256 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 256, got {}",
            config.workers
        )));
    }

    if config.connections < 1 {
        return Err(ConfigError::Validation(format!(
            "connections must be >= 1, got {}",
            config.connections
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.staging_capacity < 1 {
        return Err(ConfigError::Validation(format!(
            "staging-capacity must be >= 1, got {}",
            config.staging_capacity
        )));
    }

    if config.timeout < 1 {
        return Err(ConfigError::Validation(format!(
            "timeout must be >= 1 second, got {}",
            config.timeout
        )));
    }

    for status in config
        .soft_error_statuses
        .iter()
        .chain(config.hard_error_statuses.iter())
    {
        if !(100..=599).contains(status) {
            return Err(ConfigError::Validation(format!(
                "{} is not an HTTP status code",
                status
            )));
        }
    }

    if let Some(status) = config
        .soft_error_statuses
        .iter()
        .find(|s| config.hard_error_statuses.contains(s))
    {
        return Err(ConfigError::Validation(format!(
            "status {} cannot be both a soft and a hard error",
            status
        )));
    }

    Ok(())
}

fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.use_proxy {
        let proxy = Url::parse(&config.proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", config.proxy, e)))?;
        if !proxy.scheme().starts_with("socks5") {
            return Err(ConfigError::Validation(format!(
                "proxy must be a socks5:// address, got '{}'",
                config.proxy
            )));
        }
    }

    if config.cookie.contains(['\r', '\n']) {
        return Err(ConfigError::Validation(
            "cookie cannot contain line breaks".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawl settings before they are published or used
pub fn validate_settings(settings: &CrawlSettings) -> Result<(), ConfigError> {
    if settings.base_url.is_empty() {
        return Err(ConfigError::Validation(
            "base-url cannot be empty".to_string(),
        ));
    }

    let url = Url::parse(&settings.base_url).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid base url '{}': {}", settings.base_url, e))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "base url '{}' must use http or https",
            settings.base_url
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_invalid_store_scheme() {
        let mut config = Config::default();
        config.store.url = "postgres://localhost/db".to_string();
        assert!(matches!(
            validate(&config).unwrap_err(),
            ConfigError::Validation(_)
        ));
    }

    #[test]
    fn test_store_url_without_scheme() {
        let mut config = Config::default();
        config.store.url = "localhost:6379".to_string();
        assert!(matches!(
            validate(&config).unwrap_err(),
            ConfigError::InvalidUrl(_)
        ));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = Config::default();
        config.crawler.workers = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_overlapping_status_classes_rejected() {
        let mut config = Config::default();
        config.crawler.soft_error_statuses = vec![403, 404];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bogus_status_rejected() {
        let mut config = Config::default();
        config.crawler.hard_error_statuses = vec![4040];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_proxy_must_be_socks() {
        let mut config = Config::default();
        config.http.use_proxy = true;
        config.http.proxy = "http://127.0.0.1:8080".to_string();
        assert!(validate(&config).is_err());

        config.http.proxy = "socks5://127.0.0.1:9050".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_cookie_with_newline_rejected() {
        let mut config = Config::default();
        config.http.cookie = "a=b\r\nX-Evil: 1".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_settings_validation() {
        assert!(validate_settings(&CrawlSettings::new("http://example.com/")).is_ok());
        assert!(validate_settings(&CrawlSettings::new("")).is_err());
        assert!(validate_settings(&CrawlSettings::new("ftp://example.com/")).is_err());
        assert!(validate_settings(&CrawlSettings::new("not a url")).is_err());
    }
}
