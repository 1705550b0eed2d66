use crate::config::{parse_duration, Config};
use crate::error::{FerretError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every violation
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_search(config, &mut errors);
        Self::validate_correlation(config, &mut errors);
        Self::validate_tools(config, &mut errors);
        Self::validate_cache(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(FerretError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_search(config: &Config, errors: &mut Vec<ValidationError>) {
        let search = &config.search;
        if !(5..=100).contains(&search.default_max_results) {
            errors.push(ValidationError::new(
                "search.default_max_results",
                format!("Must be within 5..=100, got {}", search.default_max_results),
            ));
        }
        if !(0.1..=1.0).contains(&search.default_similarity_threshold) {
            errors.push(ValidationError::new(
                "search.default_similarity_threshold",
                format!(
                    "Must be within 0.1..=1.0, got {}",
                    search.default_similarity_threshold
                ),
            ));
        }

        let step = Self::check_duration("search.step_timeout", &search.step_timeout, errors);
        let deadline = Self::check_duration("search.query_deadline", &search.query_deadline, errors);
        if let (Some(step), Some(deadline)) = (step, deadline) {
            if step.is_zero() || deadline.is_zero() {
                errors.push(ValidationError::new(
                    "search.step_timeout",
                    "Timeouts must be greater than 0",
                ));
            }
            if step > deadline {
                errors.push(ValidationError::new(
                    "search.step_timeout",
                    "Step timeout cannot exceed the query deadline",
                ));
            }
        }

        if !(0.0..=1.0).contains(&search.fallback_min_top_score) {
            errors.push(ValidationError::new(
                "search.fallback_min_top_score",
                format!("Must be within 0.0..=1.0, got {}", search.fallback_min_top_score),
            ));
        }
    }

    fn validate_correlation(config: &Config, errors: &mut Vec<ValidationError>) {
        let c = &config.correlation;
        if !(0.0..=1.0).contains(&c.default_confidence_threshold) {
            errors.push(ValidationError::new(
                "correlation.default_confidence_threshold",
                format!("Must be within 0.0..=1.0, got {}", c.default_confidence_threshold),
            ));
        }
        if c.shallow_limit == 0 || c.shallow_limit > c.medium_limit || c.medium_limit > c.deep_limit {
            errors.push(ValidationError::new(
                "correlation",
                "Depth limits must satisfy 0 < shallow <= medium <= deep",
            ));
        }
    }

    fn validate_tools(config: &Config, errors: &mut Vec<ValidationError>) {
        if !(0.0..=1.0).contains(&config.tools.recommend_threshold) {
            errors.push(ValidationError::new(
                "tools.recommend_threshold",
                format!("Must be within 0.0..=1.0, got {}", config.tools.recommend_threshold),
            ));
        }
    }

    fn validate_cache(config: &Config, errors: &mut Vec<ValidationError>) {
        Self::check_duration("cache.ttl", &config.cache.ttl, errors);
        if config.cache.enabled && config.cache.max_entries == 0 {
            errors.push(ValidationError::new(
                "cache.max_entries",
                "Must be greater than 0 when the cache is enabled",
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.database_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.database_path",
                "Database path cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let provider = &config.embedding.provider;
        let valid_providers = ["hashing", "fastembed"];
        if !valid_providers.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "embedding.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, provider
                ),
            ));
        }

        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Dimension must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn check_duration(
        path: &str,
        value: &str,
        errors: &mut Vec<ValidationError>,
    ) -> Option<std::time::Duration> {
        match parse_duration(value) {
            Ok(d) => Some(d),
            Err(_) => {
                errors.push(ValidationError::new(
                    path,
                    format!("Invalid duration format: {}", value),
                ));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = Config::default();
        config.search.default_max_results = 2;
        config.search.step_timeout = "soon".to_string();
        config.embedding.provider = "word2vec".to_string();

        match ConfigValidator::validate(&config) {
            Err(FerretError::ConfigValidation { errors }) => {
                let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
                assert!(paths.contains(&"search.default_max_results"));
                assert!(paths.contains(&"search.step_timeout"));
                assert!(paths.contains(&"embedding.provider"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_step_timeout_within_deadline() {
        let mut config = Config::default();
        config.search.step_timeout = "20s".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_depth_limit_order() {
        let mut config = Config::default();
        config.correlation.medium_limit = 100;
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
