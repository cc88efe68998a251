//! Page-content extraction
//!
//! The crawler core only needs to know whether a page yielded anything; the
//! result itself is an opaque JSON blob stored as the page's `done` value.
//!
//! The bundled [`RuleExtractor`] reads a small TOML rule file:
//!
//! ```toml
//! [[rule]]
//! name = "title"
//! activators = ["<h1", "post-title", ">"]
//! deactivator = "</"
//! limit = 1
//! ```
//!
//! For each rule the activators are found one after another in the body, then
//! the text up to the deactivator is captured. This repeats until `limit`
//! captures (0 for unlimited) or the body runs out.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while loading or running extraction rules
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Invalid extraction rules: {0}")]
    Rules(#[from] toml::de::Error),

    #[error("Invalid extraction rule {name}: {reason}")]
    InvalidRule { name: String, reason: String },

    #[error("Failed to encode extraction result: {0}")]
    Json(#[from] serde_json::Error),
}

/// Turns a page body into an extraction result
///
/// `Ok(None)` means nothing was extracted.
pub trait Extractor: Send + Sync {
    fn extract(&self, body: &str) -> Result<Option<String>, ExtractError>;
}

/// Extractor used when a crawl has no rule file; never extracts anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRules;

impl Extractor for NoRules {
    fn extract(&self, _body: &str) -> Result<Option<String>, ExtractError> {
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default, alias = "pluck")]
    rule: Vec<Rule>,
}

/// One capture rule
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    /// Key in the result object; defaults to the rule's position
    #[serde(default)]
    pub name: Option<String>,

    /// Markers that must appear, in order, before the captured text
    pub activators: Vec<String>,

    /// Marker that ends a capture
    pub deactivator: String,

    /// Maximum captures; 0 for unlimited
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    1
}

impl Rule {
    fn captures(&self, body: &str) -> Vec<String> {
        let mut captures = Vec::new();
        let mut pos = 0;

        'scan: while self.limit == 0 || captures.len() < self.limit {
            let mut cursor = pos;
            for activator in &self.activators {
                match body[cursor..].find(activator.as_str()) {
                    Some(offset) => cursor += offset + activator.len(),
                    None => break 'scan,
                }
            }
            match body[cursor..].find(self.deactivator.as_str()) {
                Some(offset) => {
                    captures.push(body[cursor..cursor + offset].trim().to_string());
                    pos = cursor + offset + self.deactivator.len();
                }
                None => break,
            }
        }

        captures
    }
}

/// Extractor driven by a TOML rule file
#[derive(Debug, Clone)]
pub struct RuleExtractor {
    rules: Vec<(String, Rule)>,
}

impl RuleExtractor {
    /// Parses and validates a rule file
    ///
    /// Rules need at least one activator, no empty markers, and a unique name.
    pub fn from_toml(text: &str) -> Result<Self, ExtractError> {
        let file: RuleFile = toml::from_str(text)?;

        let mut rules: Vec<(String, Rule)> = Vec::with_capacity(file.rule.len());
        for (index, rule) in file.rule.into_iter().enumerate() {
            let name = rule.name.clone().unwrap_or_else(|| index.to_string());
            let invalid = |reason: &str| ExtractError::InvalidRule {
                name: name.clone(),
                reason: reason.to_string(),
            };

            if rule.activators.is_empty() {
                return Err(invalid("needs at least one activator"));
            }
            if rule.activators.iter().any(String::is_empty) || rule.deactivator.is_empty() {
                return Err(invalid("markers must not be empty"));
            }
            if rules.iter().any(|(existing, _)| *existing == name) {
                return Err(invalid("duplicate name"));
            }
            rules.push((name, rule));
        }

        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Extractor for RuleExtractor {
    /// Runs every rule against `body`
    ///
    /// The result is a JSON object with one entry per rule that captured
    /// something: a string for `limit = 1`, otherwise an array of strings.
    fn extract(&self, body: &str) -> Result<Option<String>, ExtractError> {
        let mut result = Map::new();

        for (name, rule) in &self.rules {
            let mut captures = rule.captures(body);
            captures.retain(|c| !c.is_empty());
            if captures.is_empty() {
                continue;
            }
            let value = if rule.limit == 1 {
                Value::String(captures.swap_remove(0))
            } else {
                Value::from(captures)
            };
            result.insert(name.clone(), value);
        }

        if result.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::to_string(&Value::Object(result))?))
    }
}

/// Builds the extractor for a crawl from its rule text, if any
pub fn build_extractor(rules: Option<&str>) -> Result<Arc<dyn Extractor>, ExtractError> {
    match rules {
        Some(text) if !text.trim().is_empty() => {
            let extractor = RuleExtractor::from_toml(text)?;
            if extractor.is_empty() {
                return Ok(Arc::new(NoRules));
            }
            tracing::debug!(rules = extractor.len(), "Loaded extraction rules");
            Ok(Arc::new(extractor))
        }
        _ => Ok(Arc::new(NoRules)),
    }
}
