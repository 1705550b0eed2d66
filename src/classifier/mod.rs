//! Query classification
//!
//! Maps raw query text to a [`Classification`] with an explicit, ordered rule
//! table. Classification is pure and never fails.

mod criteria;
mod tags;

pub use criteria::CriteriaExtractor;
pub use tags::{EntityTag, TagDetector};

use crate::router::Strategy;
use crate::sources::FilterCriteria;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    General,
    SpecificRecord,
    StructuredFilter,
    FilteredSearch,
    Analytical,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::SpecificRecord => "specific_record",
            Self::StructuredFilter => "structured_filter",
            Self::FilteredSearch => "filtered_search",
            Self::Analytical => "analytical",
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub query_type: QueryType,
    pub confidence: f32,
    pub detected_entities: BTreeSet<EntityTag>,
    pub suggested_strategy: Strategy,
    pub has_exact_identifier: bool,
}

impl Classification {
    pub fn has_tag(&self, tag: EntityTag) -> bool {
        self.detected_entities.contains(&tag)
    }
}

/// What the rules look at
#[derive(Debug, Clone, Default)]
pub struct Evidence {
    pub tags: BTreeSet<EntityTag>,
    pub has_identifier: bool,
}

impl Evidence {
    fn has(&self, tag: EntityTag) -> bool {
        self.tags.contains(&tag)
    }
}

/// One row of the decision table
pub struct Rule {
    pub name: &'static str,
    pub query_type: QueryType,
    pub strategy: Strategy,
    pub confidence: f32,
    pub applies: fn(&Evidence) -> bool,
}

/// Decision table, evaluated top to bottom; the first rule that applies wins.
/// The last rule always applies.
pub const RULES: &[Rule] = &[
    Rule {
        name: "exact_identifier",
        query_type: QueryType::SpecificRecord,
        strategy: Strategy::SpecificRecord,
        confidence: 0.95,
        applies: |e| e.has_identifier,
    },
    Rule {
        name: "alert_with_severity_or_window",
        query_type: QueryType::StructuredFilter,
        strategy: Strategy::StructuredFilter,
        confidence: 0.85,
        applies: |e| {
            e.has(EntityTag::AlertRelated)
                && (e.has(EntityTag::SeverityRelated) || e.has(EntityTag::TimeRelated))
        },
    },
    Rule {
        name: "search_verb_with_target",
        query_type: QueryType::FilteredSearch,
        strategy: Strategy::HybridParallel,
        confidence: 0.75,
        applies: |e| {
            e.has(EntityTag::SearchVerb)
                && (e.has(EntityTag::AlertRelated) || e.has(EntityTag::AssetRelated))
        },
    },
    Rule {
        name: "analysis_verb",
        query_type: QueryType::Analytical,
        strategy: Strategy::SemanticSearch,
        confidence: 0.70,
        applies: |e| e.has(EntityTag::AnalysisVerb),
    },
    Rule {
        name: "general",
        query_type: QueryType::General,
        strategy: Strategy::SemanticSearch,
        confidence: 0.50,
        applies: |_| true,
    },
];

/// Apply the decision table to already-gathered evidence
pub fn decide(evidence: Evidence) -> Classification {
    let rule = RULES
        .iter()
        .find(|r| (r.applies)(&evidence))
        .unwrap_or(&RULES[RULES.len() - 1]);

    tracing::debug!(rule = rule.name, confidence = rule.confidence, "Classified query");

    Classification {
        query_type: rule.query_type,
        confidence: rule.confidence,
        detected_entities: evidence.tags,
        suggested_strategy: rule.strategy,
        has_exact_identifier: evidence.has_identifier,
    }
}

/// Compiled detectors for classification and criteria extraction
pub struct QueryClassifier {
    tags: TagDetector,
    criteria: CriteriaExtractor,
}

impl QueryClassifier {
    pub fn new() -> Self {
        Self {
            tags: TagDetector::new(),
            criteria: CriteriaExtractor::new(),
        }
    }

    /// Process-wide instance; compiled on first use
    pub fn shared() -> &'static QueryClassifier {
        static SHARED: OnceLock<QueryClassifier> = OnceLock::new();
        SHARED.get_or_init(QueryClassifier::new)
    }

    pub fn classify(&self, text: &str) -> Classification {
        decide(Evidence {
            tags: self.tags.detect(text),
            has_identifier: !self.criteria.identifiers(text).is_empty(),
        })
    }

    pub fn extract_identifiers(&self, text: &str) -> Vec<String> {
        self.criteria.identifiers(text)
    }

    pub fn extract_criteria(&self, text: &str, now: DateTime<Utc>) -> FilterCriteria {
        self.criteria.criteria(text, &self.tags, now)
    }
}

impl Default for QueryClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify query text
pub fn classify(text: &str) -> Classification {
    QueryClassifier::shared().classify(text)
}

/// Canonical identifiers present in the text
pub fn extract_identifiers(text: &str) -> Vec<String> {
    QueryClassifier::shared().extract_identifiers(text)
}

/// Structured criteria implied by the text, with time windows relative to `now`
pub fn extract_criteria(text: &str, now: DateTime<Utc>) -> FilterCriteria {
    QueryClassifier::shared().extract_criteria(text, now)
}

// Patterns are compile-time constants; a failure here is a programming error.
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {}: {}", pattern, e))
}
