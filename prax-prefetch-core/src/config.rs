//! Configuration for prefetch resolution, loaded from the `[prefetch]` and
//! `[debug]` tables of a TOML file.
//!
//! ```toml
//! [prefetch]
//! max_in_list = 500
//! validate_empty_levels = true
//! follow_default_prefetches = true
//!
//! [debug]
//! log_queries = true
//! log_level = "${PRAX_LOG_LEVEL}"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{QueryError, QueryResult};

/// Top-level prefetch configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrefetchConfig {
    /// Resolution settings.
    #[serde(default)]
    pub prefetch: PrefetchSettings,

    /// Debug/logging settings.
    #[serde(default)]
    pub debug: DebugConfig,
}

impl PrefetchConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> QueryResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            QueryError::configuration(format!("Failed to read {}: {}", path.display(), e))
                .with_source(e)
        })?;

        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> QueryResult<Self> {
        let expanded = expand_env_vars(content);

        let config: Self = toml::from_str(&expanded).map_err(|e| {
            QueryError::configuration(format!("Invalid prefetch configuration: {}", e)).with_source(e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> QueryResult<()> {
        if self.prefetch.max_in_list == Some(0) {
            return Err(QueryError::configuration("prefetch.max_in_list must be at least 1")
                .with_field("max_in_list"));
        }
        Ok(())
    }

    /// Builder-style override of the IN-list chunk size.
    pub fn with_max_in_list(mut self, size: usize) -> Self {
        self.prefetch.max_in_list = Some(size.max(1));
        self
    }
}

/// Resolution settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrefetchSettings {
    /// Largest number of keys bound in one `IN (...)` list. Unset means unbounded.
    #[serde(default)]
    pub max_in_list: Option<usize>,

    /// Keep validating deeper lookups against the schema when a level is empty.
    #[serde(default = "default_true")]
    pub validate_empty_levels: bool,

    /// Run a target model's default prefetch lookups on related querysets.
    #[serde(default = "default_true")]
    pub follow_default_prefetches: bool,
}

impl Default for PrefetchSettings {
    fn default() -> Self {
        Self {
            max_in_list: None,
            validate_empty_levels: true,
            follow_default_prefetches: true,
        }
    }
}

/// Debug/logging settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DebugConfig {
    /// Log every prefetch query at debug level.
    #[serde(default)]
    pub log_queries: bool,

    /// Log level used when initialising the subscriber.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Output format: json, pretty or compact.
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_queries: false,
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Expand `${VAR}` references from the process environment. Unset variables
/// are left as written.
fn expand_env_vars(content: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([^}]+)\}") else {
        return content.to_string();
    };

    re.replace_all(content, |caps: &regex_lite::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
