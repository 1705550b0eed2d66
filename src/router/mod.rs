//! Strategy routing
//!
//! Turns a [`Classification`] (or an explicit override) and a set of requested
//! sources into an [`ExecutionPlan`]. Routing is pure: no I/O, no clock.

use crate::classifier::Classification;
use crate::error::{FerretError, Result};
use crate::sources::{SearchMode, SourceKind};
use serde::{Deserialize, Serialize};

/// Retrieval strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    SpecificRecord,
    StructuredFilter,
    SemanticSearch,
    HybridParallel,
    HybridSequential,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::SpecificRecord,
        Strategy::StructuredFilter,
        Strategy::SemanticSearch,
        Strategy::HybridParallel,
        Strategy::HybridSequential,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpecificRecord => "specific_record",
            Self::StructuredFilter => "structured_filter",
            Self::SemanticSearch => "semantic_search",
            Self::HybridParallel => "hybrid_parallel",
            Self::HybridSequential => "hybrid_sequential",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Strategy {
    type Err = FerretError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Strategy::ALL
            .into_iter()
            .find(|st| st.as_str() == normalized)
            .ok_or_else(|| FerretError::UnknownValue {
                kind: "strategy",
                value: s.to_string(),
            })
    }
}

/// How step results become the final list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consolidation {
    /// Merge every step's contribution and rank
    Rank,
    /// Run tiers in order; a later tier replaces an earlier one when it runs
    FirstSuccess,
}

/// One source call in a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub source: SourceKind,
    pub mode: SearchMode,
    /// 1-based tier; all steps of a `Rank` plan are tier 1
    pub tier: u8,
}

/// Predicate deciding whether a `FirstSuccess` plan moves to its next tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FallbackPolicy {
    pub min_results: usize,
    pub min_top_score: f32,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            min_results: 3,
            min_top_score: 0.8,
        }
    }
}

impl FallbackPolicy {
    /// True when the tier yield is too thin: too few results or a weak top score
    pub fn should_fall_back(&self, result_count: usize, top_score: Option<f32>) -> bool {
        result_count < self.min_results || top_score.map_or(true, |s| s < self.min_top_score)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub strategy: Strategy,
    pub steps: Vec<PlanStep>,
    pub consolidation: Consolidation,
    pub fallback: FallbackPolicy,
}

impl ExecutionPlan {
    /// Steps of one tier, in plan order
    pub fn tier(&self, tier: u8) -> impl Iterator<Item = &PlanStep> {
        self.steps.iter().filter(move |s| s.tier == tier)
    }

    pub fn tier_count(&self) -> u8 {
        self.steps.iter().map(|s| s.tier).max().unwrap_or(0)
    }

    /// Distinct sources touched by the plan, in first-seen order
    pub fn sources(&self) -> Vec<SourceKind> {
        let mut out = Vec::new();
        for step in &self.steps {
            if !out.contains(&step.source) {
                out.push(step.source);
            }
        }
        out
    }
}

/// Builds execution plans
#[derive(Debug, Clone, Default)]
pub struct StrategyRouter {
    fallback: FallbackPolicy,
}

impl StrategyRouter {
    pub fn new(fallback: FallbackPolicy) -> Self {
        Self { fallback }
    }

    /// Plan a query. An empty `sources` list means every kind.
    pub fn route(
        &self,
        classification: &Classification,
        forced: Option<Strategy>,
        sources: &[SourceKind],
    ) -> ExecutionPlan {
        let strategy = forced.unwrap_or(classification.suggested_strategy);
        let sources = requested_sources(sources);

        let per_source = |mode: SearchMode, tier: u8| {
            sources
                .iter()
                .map(move |&source| PlanStep { source, mode, tier })
                .collect::<Vec<_>>()
        };

        let (steps, consolidation) = match strategy {
            Strategy::SpecificRecord => (per_source(SearchMode::IdLookup, 1), Consolidation::Rank),
            Strategy::StructuredFilter => {
                (per_source(SearchMode::FilterQuery, 1), Consolidation::Rank)
            }
            Strategy::SemanticSearch => (
                per_source(SearchMode::SimilaritySearch, 1),
                Consolidation::Rank,
            ),
            Strategy::HybridParallel => {
                let mut steps = per_source(SearchMode::FilterQuery, 1);
                steps.extend(per_source(SearchMode::SimilaritySearch, 1));
                (steps, Consolidation::Rank)
            }
            Strategy::HybridSequential => {
                let first = if classification.has_exact_identifier {
                    SearchMode::IdLookup
                } else {
                    SearchMode::FilterQuery
                };
                let mut steps = per_source(first, 1);
                steps.extend(per_source(SearchMode::SimilaritySearch, 2));
                (steps, Consolidation::FirstSuccess)
            }
        };

        tracing::debug!(%strategy, steps = steps.len(), ?consolidation, "Routed query");

        ExecutionPlan {
            strategy,
            steps,
            consolidation,
            fallback: self.fallback,
        }
    }
}

/// De-duplicated sources in request order, or every kind when none were requested
pub fn requested_sources(sources: &[SourceKind]) -> Vec<SourceKind> {
    if sources.is_empty() {
        return SourceKind::ALL.to_vec();
    }
    let mut out = Vec::with_capacity(sources.len());
    for s in sources {
        if !out.contains(s) {
            out.push(*s);
        }
    }
    out
}
