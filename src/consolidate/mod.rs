//! Result consolidation
//!
//! Normalizes per-source scores onto `[0, 1]`, merges duplicates returned by
//! different strategies, ranks deterministically and truncates.

use crate::router::Strategy;
use crate::sources::{Record, SearchResult, SourceKind};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One consolidated entry; identity key is `(source_kind, source_id)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub source_kind: SourceKind,
    pub source_id: String,
    pub record: Record,
    pub native_score: f32,
    pub normalized_score: f32,
    /// Strategy of the best-scoring contribution
    pub strategy_used: Strategy,
    /// Every strategy that returned this record
    pub strategies: BTreeSet<Strategy>,
}

/// Short preview of a top result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFinding {
    pub source_kind: SourceKind,
    pub source_id: String,
    pub title: String,
    pub normalized_score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationMetadata {
    pub per_source_counts: BTreeMap<SourceKind, usize>,
    pub per_source_errors: BTreeMap<SourceKind, Vec<String>>,
    pub search_time_ms: u64,
    pub strategies_used: BTreeSet<Strategy>,
    /// Contributions received before de-duplication and truncation
    pub total_candidates: usize,
    #[serde(default)]
    pub tiers_attempted: Vec<u8>,
    #[serde(default)]
    pub fell_back: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedResult {
    pub results: Vec<RankedResult>,
    pub strategy: Strategy,
    pub key_findings: Vec<KeyFinding>,
    pub metadata: ConsolidationMetadata,
}

impl ConsolidatedResult {
    pub fn empty(strategy: Strategy) -> Self {
        Self {
            results: Vec::new(),
            strategy,
            key_findings: Vec::new(),
            metadata: ConsolidationMetadata::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Map a native score onto the common scale
///
/// Lookup and filter hits are binary matches and always score 1.0. Similarity
/// scores pass through, clipped; non-finite scores become 0.
pub fn normalize_score(native: f32, strategy: Strategy) -> f32 {
    match strategy {
        Strategy::SpecificRecord | Strategy::StructuredFilter => 1.0,
        _ if native.is_finite() => native.clamp(0.0, 1.0),
        _ => 0.0,
    }
}

#[derive(Debug, Clone)]
pub struct ResultConsolidator {
    key_findings: usize,
}

impl Default for ResultConsolidator {
    fn default() -> Self {
        Self { key_findings: 3 }
    }
}

impl ResultConsolidator {
    pub fn new(key_findings: usize) -> Self {
        Self { key_findings }
    }

    pub fn consolidate(
        &self,
        contributions: Vec<SearchResult>,
        strategy: Strategy,
        max_results: usize,
    ) -> ConsolidatedResult {
        let total_candidates = contributions.len();
        let mut merged: Vec<RankedResult> = Vec::with_capacity(contributions.len());
        let mut index: AHashMap<(SourceKind, String), usize> = AHashMap::new();

        for result in contributions {
            let score = normalize_score(result.native_score, result.strategy_used);
            let key = (result.source_kind, result.source_id.clone());

            match index.get(&key) {
                Some(&i) => {
                    let existing = &mut merged[i];
                    existing.strategies.insert(result.strategy_used);
                    if score > existing.normalized_score {
                        existing.record = result.record;
                        existing.native_score = result.native_score;
                        existing.normalized_score = score;
                        existing.strategy_used = result.strategy_used;
                    }
                }
                None => {
                    index.insert(key, merged.len());
                    merged.push(RankedResult {
                        source_kind: result.source_kind,
                        source_id: result.source_id,
                        record: result.record,
                        native_score: result.native_score,
                        normalized_score: score,
                        strategy_used: result.strategy_used,
                        strategies: BTreeSet::from([result.strategy_used]),
                    });
                }
            }
        }

        merged.sort_by(|a, b| {
            b.normalized_score
                .total_cmp(&a.normalized_score)
                .then_with(|| a.source_kind.cmp(&b.source_kind))
                .then_with(|| a.source_id.cmp(&b.source_id))
        });
        merged.truncate(max_results);

        let mut metadata = ConsolidationMetadata {
            total_candidates,
            ..Default::default()
        };
        for r in &merged {
            *metadata.per_source_counts.entry(r.source_kind).or_default() += 1;
            metadata.strategies_used.extend(r.strategies.iter().copied());
        }

        let key_findings = merged
            .iter()
            .take(self.key_findings)
            .map(|r| KeyFinding {
                source_kind: r.source_kind,
                source_id: r.source_id.clone(),
                title: r.record.display_name().to_string(),
                normalized_score: r.normalized_score,
            })
            .collect();

        tracing::debug!(
            candidates = total_candidates,
            kept = merged.len(),
            "Consolidated results"
        );

        ConsolidatedResult {
            results: merged,
            strategy,
            key_findings,
            metadata,
        }
    }
}
