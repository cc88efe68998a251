use crate::config::types::{Config, CrawlSettings, SettingsConfig};
use crate::config::validation::{validate, validate_settings};
use crate::crawler::RuleExtractor;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use krill::config::load_config;
///
/// let config = load_config(Path::new("krill.toml")).unwrap();
/// println!("Workers: {}", config.crawler.workers);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Turns the `[settings]` section into shareable crawl settings
///
/// Keywords are trimmed and lowercased, blank ones dropped, and the
/// extraction rule file (if named) is read so its text travels with the
/// settings to every cooperating process.
pub fn build_crawl_settings(section: &SettingsConfig) -> Result<CrawlSettings, ConfigError> {
    let extraction_rules = match &section.extraction_rules {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            // Reject broken rules here, before they can be published to peers
            RuleExtractor::from_toml(&text).map_err(|e| {
                ConfigError::Validation(format!(
                    "invalid extraction rules in '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            Some(text)
        }
        None => None,
    };

    let settings = CrawlSettings {
        base_url: section.base_url.trim().to_string(),
        keywords_to_include: clean_keywords(&section.include),
        keywords_to_exclude: clean_keywords(&section.exclude),
        allow_query_parameters: section.allow_query,
        allow_hash_parameters: section.allow_hash,
        follow_links: section.follow_links,
        require_extraction: section.require_extraction,
        extraction_rules,
    };

    validate_settings(&settings)?;
    Ok(settings)
}

fn clean_keywords(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[store]
url = "sqlite:///tmp/krill.db"
prefix = "blog"

[crawler]
workers = 4
max-errors = 3
soft-error-statuses = [403]

[http]
user-agent = "TestCrawler/1.0"
cookie = "session=abc"

[settings]
base-url = "http://example.com/"
exclude = ["/tag/"]
allow-query = true
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.store.prefix, "blog");
        assert_eq!(config.crawler.workers, 4);
        assert_eq!(config.crawler.max_errors, 3);
        assert_eq!(config.crawler.soft_error_statuses, vec![403]);
        // untouched keys keep their defaults
        assert_eq!(config.crawler.hard_error_statuses, vec![404, 410]);
        assert_eq!(config.http.cookie, "session=abc");
        assert!(config.settings.allow_query);
        assert!(config.settings.follow_links);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let file = create_temp_config("");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.crawler.workers, 8);
        assert_eq!(config.store.url, "redis://127.0.0.1:6379");
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/krill.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let file = create_temp_config("[crawler]\nworkers = 0\n");
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_build_crawl_settings_cleans_keywords() {
        let section = SettingsConfig {
            base_url: " http://example.com/ ".to_string(),
            include: vec!["Blog".to_string(), "  ".to_string()],
            exclude: vec![" /TAG/ ".to_string()],
            ..SettingsConfig::default()
        };

        let settings = build_crawl_settings(&section).unwrap();
        assert_eq!(settings.base_url, "http://example.com/");
        assert_eq!(settings.keywords_to_include, vec!["blog"]);
        assert_eq!(settings.keywords_to_exclude, vec!["/tag/"]);
        assert_eq!(settings.extraction_rules, None);
    }

    #[test]
    fn test_build_crawl_settings_reads_rule_file() {
        let rules = create_temp_config("[[rule]]\nname = \"title\"\nactivators = [\"<h1>\"]\ndeactivator = \"</h1>\"\n");
        let section = SettingsConfig {
            base_url: "http://example.com/".to_string(),
            extraction_rules: Some(rules.path().to_path_buf()),
            ..SettingsConfig::default()
        };

        let settings = build_crawl_settings(&section).unwrap();
        assert!(settings.extraction_rules.unwrap().contains("title"));
    }

    #[test]
    fn test_build_crawl_settings_rejects_broken_rule_file() {
        let rules = create_temp_config("[[rule]]\nactivators = \"not-a-list\"\n");
        let section = SettingsConfig {
            base_url: "http://example.com/".to_string(),
            extraction_rules: Some(rules.path().to_path_buf()),
            ..SettingsConfig::default()
        };

        let result = build_crawl_settings(&section);
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_build_crawl_settings_requires_base_url() {
        let result = build_crawl_settings(&SettingsConfig::default());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }
}
