use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::cache::Key;
use crate::error::{Error, Result};
use crate::format_type::FormatType;

/// Language code of a rendered record (ISO 639-2 in practice, e.g. "eng", "fre")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lang(pub String);

impl Lang {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Lang {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Lang {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Connection settings for the catalog API that renders records and answers
/// change-date, access and popularity calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl CatalogConfig {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_key,
            timeout_secs: default_timeout_secs(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

const fn default_timeout_secs() -> u64 {
    60
}

const fn default_retry_count() -> u32 {
    3
}

const fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self::new("http://localhost:8080/geonetwork/api", None)
    }
}

/// Which keys may be stored at all.
///
/// Keys matching any deny-list are still rendered (and coalesced) but never
/// written to a storage tier, and never answered with "not modified".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachePolicy {
    #[serde(default)]
    pub deny_format_types: Vec<FormatType>,
    #[serde(default)]
    pub deny_languages: Vec<Lang>,
    #[serde(default)]
    pub deny_formatters: Vec<String>,
}

impl CachePolicy {
    pub fn allow_caching(&self, key: &Key) -> bool {
        if self.deny_format_types.contains(&key.format_type) {
            return false;
        }
        if self.deny_languages.contains(&key.language) {
            return false;
        }
        match key.formatter_id {
            Some(ref id) => !self.deny_formatters.iter().any(|f| f == id),
            None => true,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable memory cache
    #[serde(default = "default_true")]
    pub memory_enabled: bool,

    /// Memory cache budget in megabytes of rendered output
    #[serde(default = "default_memory_max_mb")]
    pub memory_max_mb: u64,

    /// Memory cache TTL in seconds (0 = no expiry)
    #[serde(default)]
    pub memory_ttl_seconds: u64,

    /// Enable disk cache
    #[serde(default = "default_true")]
    pub disk_enabled: bool,

    /// Disk cache directory (defaults to $XDG_CACHE_HOME/formatter-cache)
    pub disk_path: Option<PathBuf>,

    /// Upper bound on a single render in seconds (0 = unbounded)
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,

    /// Populate the public variant after a private render of a published record
    #[serde(default = "default_true")]
    pub derive_public: bool,

    /// Public variants rendered concurrently
    #[serde(default = "default_derive_concurrency")]
    pub derive_concurrency: usize,

    /// Pending public derivations before new ones are dropped
    #[serde(default = "default_derive_queue_size")]
    pub derive_queue_size: usize,

    #[serde(default)]
    pub policy: CachePolicy,
}

const fn default_true() -> bool {
    true
}

const fn default_memory_max_mb() -> u64 {
    256
}

const fn default_render_timeout_secs() -> u64 {
    120
}

const fn default_derive_concurrency() -> usize {
    4
}

const fn default_derive_queue_size() -> usize {
    256
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_enabled: true,
            memory_max_mb: default_memory_max_mb(),
            memory_ttl_seconds: 0,
            disk_enabled: true,
            disk_path: None,
            render_timeout_secs: default_render_timeout_secs(),
            derive_public: true,
            derive_concurrency: default_derive_concurrency(),
            derive_queue_size: default_derive_queue_size(),
            policy: CachePolicy::default(),
        }
    }
}

impl CacheConfig {
    /// In-memory only configuration, handy for tests and one-shot tools.
    pub fn memory_only() -> Self {
        Self {
            disk_enabled: false,
            ..Self::default()
        }
    }
}

/// Request-layer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Query parameters that may be present on a cacheable request.
    /// Anything else makes the request bypass the cache.
    #[serde(default = "default_allowed_parameters")]
    pub allowed_parameters: Vec<String>,
}

fn default_allowed_parameters() -> Vec<String> {
    ["id", "uuid", "xsl", "skippopularity", "hide_withheld"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            allowed_parameters: default_allowed_parameters(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Catalog API configuration
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Request-layer configuration
    #[serde(default)]
    pub service: ServiceConfig,
}

impl AppConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigLoad(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the cache cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.catalog.api_base.trim().is_empty() {
            return Err(Error::ConfigInvalid {
                field: "catalog.api_base".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.catalog.retry_count == 0 {
            return Err(Error::ConfigInvalid {
                field: "catalog.retry_count".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }
        if self.cache.derive_public && self.cache.derive_concurrency == 0 {
            return Err(Error::ConfigInvalid {
                field: "cache.derive_concurrency".to_string(),
                reason: "must be positive when derive_public is enabled".to_string(),
            });
        }
        if self.cache.derive_queue_size == 0 {
            return Err(Error::ConfigInvalid {
                field: "cache.derive_queue_size".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Load from default locations (~/.config/formatter-cache/config.toml, ./config.toml)
    pub fn load() -> Self {
        // Try user config
        if let Some(config_dir) = crate::util::config_dir() {
            let user_config = config_dir.join("formatter-cache").join("config.toml");
            if user_config.exists() {
                match Self::from_file(&user_config) {
                    Ok(config) => {
                        tracing::debug!("Loaded config from {}", user_config.display());
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // Try local config
        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            match Self::from_file(&local_config) {
                Ok(config) => {
                    tracing::debug!("Loaded config from ./config.toml");
                    return config;
                }
                Err(e) => {
                    tracing::warn!("Failed to load ./config.toml: {}", e);
                }
            }
        }

        tracing::debug!("No config file found, using defaults");
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(format_type: FormatType, lang: &str, formatter: Option<&str>) -> Key {
        Key::new(1, Lang::new(lang), format_type, formatter.map(String::from), false)
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [catalog]
            api_base = "https://catalog.example.org/api"

            [cache]
            disk_enabled = false
            memory_max_mb = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.catalog.api_base, "https://catalog.example.org/api");
        assert_eq!(config.catalog.retry_count, 3);
        assert!(!config.cache.disk_enabled);
        assert_eq!(config.cache.memory_max_mb, 16);
        assert!(config.cache.derive_public);
        assert_eq!(config.service.allowed_parameters.len(), 5);
    }

    #[test]
    fn test_policy_from_toml() {
        let config = AppConfig::from_toml(
            r#"
            [cache.policy]
            deny_format_types = ["pdf"]
            deny_languages = ["ger"]
            deny_formatters = ["full_view"]
            "#,
        )
        .unwrap();

        let policy = &config.cache.policy;
        assert!(policy.allow_caching(&key(FormatType::Html, "eng", None)));
        assert!(!policy.allow_caching(&key(FormatType::Pdf, "eng", None)));
        assert!(!policy.allow_caching(&key(FormatType::Html, "ger", None)));
        assert!(!policy.allow_caching(&key(FormatType::Html, "eng", Some("full_view"))));
        assert!(policy.allow_caching(&key(FormatType::Html, "eng", Some("short"))));
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let err = AppConfig::from_toml(
            r#"
            [catalog]
            api_base = "http://localhost"
            retry_count = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid { field, .. } if field == "catalog.retry_count"));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            AppConfig::from_toml("[cache\nmemory_enabled = "),
            Err(Error::ConfigLoad(_))
        ));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }
}
