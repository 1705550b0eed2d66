//! Configuration management for Ferret
//!
//! Loads the TOML configuration, applies profiles and `FERRET_SECTION__KEY`
//! environment overrides, and validates the result.

use crate::correlation::DepthLimits;
use crate::error::{FerretError, Result};
use crate::executor::ExecutionSettings;
use crate::router::FallbackPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Hybrid search settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_max_results: usize,
    pub default_similarity_threshold: f32,
    pub step_timeout: String,
    pub query_deadline: String,
    pub fallback_min_results: usize,
    pub fallback_min_top_score: f32,
    pub key_findings: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_max_results: 20,
            default_similarity_threshold: 0.3,
            step_timeout: "5s".to_string(),
            query_deadline: "15s".to_string(),
            fallback_min_results: 3,
            fallback_min_top_score: 0.8,
            key_findings: 3,
        }
    }
}

/// Correlation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    pub default_confidence_threshold: f32,
    pub shallow_limit: usize,
    pub medium_limit: usize,
    pub deep_limit: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            default_confidence_threshold: 0.5,
            shallow_limit: 10,
            medium_limit: 25,
            deep_limit: 50,
        }
    }
}

/// Tool scoring settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub recommend_threshold: f32,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            recommend_threshold: 0.6,
        }
    }
}

/// Result cache settings; the cache is off unless enabled
///
/// Only engines held by a long-lived library caller use it (see
/// `SearchEngine::with_configured_cache`); the CLI never attaches one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    pub ttl: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: 256,
            ttl: "5m".to_string(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("~/.ferret/records.sqlite"),
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// "hashing" or "fastembed"
    pub provider: String,
    pub model: String,
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hashing".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            dimension: 384,
        }
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_deadline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_enabled: Option<bool>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FerretError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| FerretError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load configuration and apply a named profile
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        Ok(config)
    }

    /// Load from `path`, or fall back to defaults (plus env overrides) when it is absent
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(FerretError::ConfigNotFound { .. }) => {
                tracing::debug!(path = ?path, "No config file, using defaults");
                let mut config = Self::default();
                config.apply_env_overrides();
                ConfigValidator::validate(&config)?;
                Ok(config)
            }
            other => other,
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FerretError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| FerretError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| FerretError::Config(format!("Unknown profile '{}'", profile)))?;

        if let Some(v) = overrides.step_timeout {
            self.search.step_timeout = v;
        }
        if let Some(v) = overrides.query_deadline {
            self.search.query_deadline = v;
        }
        if let Some(v) = overrides.embedding_provider {
            self.embedding.provider = v;
        }
        if let Some(v) = overrides.database_path {
            self.storage.database_path = v;
        }
        if let Some(v) = overrides.cache_enabled {
            self.cache.enabled = v;
        }
        ConfigValidator::validate(self)
    }

    /// Apply environment variable overrides
    /// Environment variables in format: FERRET_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("FERRET_") {
                if let Err(e) = self.set_value(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    /// Set one value by its `SECTION__KEY` path (case-insensitive)
    pub fn set_value(&mut self, path: &str, value: &str) -> Result<()> {
        let path_upper = path.to_uppercase();
        match path_upper.as_str() {
            "SEARCH__DEFAULT_MAX_RESULTS" => {
                self.search.default_max_results = parse_value(path, value)?
            }
            "SEARCH__DEFAULT_SIMILARITY_THRESHOLD" => {
                self.search.default_similarity_threshold = parse_value(path, value)?
            }
            "SEARCH__STEP_TIMEOUT" => self.search.step_timeout = value.to_string(),
            "SEARCH__QUERY_DEADLINE" => self.search.query_deadline = value.to_string(),
            "SEARCH__FALLBACK_MIN_RESULTS" => {
                self.search.fallback_min_results = parse_value(path, value)?
            }
            "SEARCH__FALLBACK_MIN_TOP_SCORE" => {
                self.search.fallback_min_top_score = parse_value(path, value)?
            }
            "SEARCH__KEY_FINDINGS" => self.search.key_findings = parse_value(path, value)?,
            "CORRELATION__DEFAULT_CONFIDENCE_THRESHOLD" => {
                self.correlation.default_confidence_threshold = parse_value(path, value)?
            }
            "CORRELATION__SHALLOW_LIMIT" => self.correlation.shallow_limit = parse_value(path, value)?,
            "CORRELATION__MEDIUM_LIMIT" => self.correlation.medium_limit = parse_value(path, value)?,
            "CORRELATION__DEEP_LIMIT" => self.correlation.deep_limit = parse_value(path, value)?,
            "TOOLS__RECOMMEND_THRESHOLD" => {
                self.tools.recommend_threshold = parse_value(path, value)?
            }
            "CACHE__ENABLED" => self.cache.enabled = parse_value(path, value)?,
            "CACHE__MAX_ENTRIES" => self.cache.max_entries = parse_value(path, value)?,
            "CACHE__TTL" => self.cache.ttl = value.to_string(),
            "STORAGE__DATABASE_PATH" => self.storage.database_path = PathBuf::from(value),
            "EMBEDDING__PROVIDER" => self.embedding.provider = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__DIMENSION" => self.embedding.dimension = parse_value(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Orchestrator timing derived from `[search]`
    pub fn execution_settings(&self) -> Result<ExecutionSettings> {
        Ok(ExecutionSettings {
            step_timeout: parse_duration(&self.search.step_timeout)?,
            query_deadline: parse_duration(&self.search.query_deadline)?,
        })
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        FallbackPolicy {
            min_results: self.search.fallback_min_results,
            min_top_score: self.search.fallback_min_top_score,
        }
    }

    pub fn depth_limits(&self) -> DepthLimits {
        DepthLimits {
            shallow: self.correlation.shallow_limit,
            medium: self.correlation.medium_limit,
            deep: self.correlation.deep_limit,
        }
    }

    pub fn cache_ttl(&self) -> Result<Duration> {
        parse_duration(&self.cache.ttl)
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| FerretError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("ferret").join("config.toml"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            search: SearchConfig::default(),
            correlation: CorrelationConfig::default(),
            tools: ToolsConfig::default(),
            cache: CacheConfig::default(),
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            profiles: HashMap::new(),
        }
    }
}

fn parse_value<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| FerretError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

/// Parse a duration string such as `250ms`, `5s`, `10m` or `1h`; bare numbers are seconds
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let invalid = || FerretError::InvalidConfigValue {
        path: "duration".to_string(),
        message: format!("Invalid duration format: '{}'", s),
    };

    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let n: u64 = number.parse().map_err(|_| invalid())?;

    match unit.trim() {
        "ms" => Ok(Duration::from_millis(n)),
        "" | "s" => Ok(Duration::from_secs(n)),
        "m" => Ok(Duration::from_secs(n * 60)),
        "h" => Ok(Duration::from_secs(n * 3600)),
        _ => Err(invalid()),
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_path(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("7").unwrap(), Duration::from_secs(7));
        assert!(parse_duration("5 days").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.search.default_max_results = 40;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.search.default_max_results, 40);
        assert_eq!(loaded.meta.schema_version, "1.0.0");
    }

    #[test]
    fn test_partial_file_uses_section_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[_meta]\nschema_version = \"1.0.0\"\n\n[cache]\nenabled = true\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.max_entries, 256);
        assert_eq!(config.search.step_timeout, "5s");
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Config::load(&missing),
            Err(FerretError::ConfigNotFound { .. })
        ));
        assert!(Config::load_or_default(&missing).is_ok());
    }

    #[test]
    fn test_set_value() {
        let mut config = Config::default();
        config.set_value("search__step_timeout", "250ms").unwrap();
        config.set_value("CACHE__ENABLED", "true").unwrap();
        assert_eq!(
            config.execution_settings().unwrap().step_timeout,
            Duration::from_millis(250)
        );
        assert!(config.cache.enabled);
        assert!(config.set_value("CACHE__MAX_ENTRIES", "lots").is_err());
    }

    #[test]
    fn test_profiles() {
        let mut config = Config::default();
        config.profiles.insert(
            "fast".to_string(),
            ProfileOverrides {
                step_timeout: Some("1s".to_string()),
                cache_enabled: Some(true),
                ..Default::default()
            },
        );
        config.apply_profile("fast").unwrap();
        assert_eq!(config.search.step_timeout, "1s");
        assert!(config.cache.enabled);
        assert!(config.apply_profile("slow").is_err());
    }

    #[test]
    fn test_expand_path() {
        let p = expand_path(Path::new("/tmp/x.sqlite"));
        assert_eq!(p, PathBuf::from("/tmp/x.sqlite"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path(Path::new("~/a")), home.join("a"));
        }
    }
}
