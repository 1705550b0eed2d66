//! Hybrid search request and response types

use crate::cache::cache_key;
use crate::classifier::Classification;
use crate::consolidate::ConsolidatedResult;
use crate::error::{FerretError, Result, ValidationError};
use crate::router::{requested_sources, Strategy};
use crate::sources::SourceKind;
use serde::{Deserialize, Serialize};

pub const MAX_RESULTS_RANGE: std::ops::RangeInclusive<usize> = 5..=100;
pub const SIMILARITY_THRESHOLD_RANGE: std::ops::RangeInclusive<f32> = 0.1..=1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub organization_id: String,
    /// Empty means every source kind
    #[serde(default)]
    pub data_sources: Vec<SourceKind>,
    pub max_results: usize,
    pub similarity_threshold: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced_strategy: Option<Strategy>,
}

impl Query {
    /// Query over every source with 20 results and a 0.3 similarity threshold
    pub fn new(text: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            organization_id: organization_id.into(),
            data_sources: Vec::new(),
            max_results: 20,
            similarity_threshold: 0.3,
            forced_strategy: None,
        }
    }

    pub fn with_sources(mut self, sources: impl IntoIterator<Item = SourceKind>) -> Self {
        self.data_sources = sources.into_iter().collect();
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.forced_strategy = Some(strategy);
        self
    }

    /// Reject malformed input before anything runs
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.text.trim().is_empty() {
            errors.push(ValidationError::new("text", "must not be empty"));
        }
        if self.organization_id.trim().is_empty() {
            errors.push(ValidationError::new("organization_id", "must not be empty"));
        }
        if !MAX_RESULTS_RANGE.contains(&self.max_results) {
            errors.push(ValidationError::new(
                "max_results",
                format!("{} is outside 5..=100", self.max_results),
            ));
        }
        if !SIMILARITY_THRESHOLD_RANGE.contains(&self.similarity_threshold) {
            errors.push(ValidationError::new(
                "similarity_threshold",
                format!("{} is outside 0.1..=1.0", self.similarity_threshold),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(FerretError::InvalidQuery { errors })
        }
    }

    /// Cache key over the normalized query
    pub fn cache_key(&self) -> String {
        let text = self.text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        let mut sources: Vec<&str> = requested_sources(&self.data_sources)
            .iter()
            .map(|s| s.as_str())
            .collect();
        sources.sort_unstable();
        let sources = sources.join(",");
        let max_results = self.max_results.to_string();
        let threshold = format!("{:.3}", self.similarity_threshold);
        let strategy = self.forced_strategy.map(|s| s.as_str()).unwrap_or("auto");

        cache_key([
            text.as_str(),
            self.organization_id.as_str(),
            sources.as_str(),
            max_results.as_str(),
            threshold.as_str(),
            strategy,
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridSearchResponse {
    /// False only when every requested source failed
    pub success: bool,
    pub results: ConsolidatedResult,
    pub classification: Classification,
    /// Flattened per-source error messages
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub cached: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_query() {
        assert!(Query::new("show alerts", "org-1").validate().is_ok());
    }

    #[test]
    fn test_validation_collects_errors() {
        let q = Query::new("   ", "org-1")
            .with_max_results(101)
            .with_similarity_threshold(0.05);
        match q.validate() {
            Err(FerretError::InvalidQuery { errors }) => {
                let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
                assert_eq!(paths, vec!["text", "max_results", "similarity_threshold"]);
            }
            other => panic!("expected InvalidQuery, got {:?}", other),
        }
    }

    #[test]
    fn test_range_edges() {
        assert!(Query::new("x", "o").with_max_results(5).validate().is_ok());
        assert!(Query::new("x", "o").with_max_results(100).validate().is_ok());
        assert!(Query::new("x", "o").with_max_results(4).validate().is_err());
        assert!(Query::new("x", "o").with_similarity_threshold(1.0).validate().is_ok());
        assert!(Query::new("x", "").validate().is_err());
    }

    #[test]
    fn test_cache_key_normalizes() {
        let a = Query::new("Show  critical alerts", "org-1");
        let b = Query::new("show critical ALERTS ", "org-1");
        assert_eq!(a.cache_key(), b.cache_key());

        let all = Query::new("x", "org-1").with_sources(SourceKind::ALL);
        assert_eq!(Query::new("x", "org-1").cache_key(), all.cache_key());

        let other_org = Query::new("show critical alerts", "org-2");
        assert_ne!(a.cache_key(), other_org.cache_key());
    }
}
