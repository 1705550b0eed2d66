//! Source executors: one per entity kind, each offering identifier lookup,
//! structured filtering and similarity search against its own backing store.
//!
//! Executors never fail towards the caller. [`SourceExecutor::execute`] wraps the
//! three retrieval primitives, enforces organization scoping and `max_results`,
//! and turns internal errors into an empty [`SourceOutcome`] carrying the error.

mod filter;
mod memory;
mod record;
mod sqlite;

pub use filter::FilterCriteria;
pub use memory::MemorySource;
pub use record::Record;
pub use sqlite::SqliteSource;

use crate::error::{FerretError, Result};
use crate::router::Strategy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Entity kinds that have their own backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Alert,
    Incident,
    Asset,
    Indicator,
    Playbook,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Alert,
        SourceKind::Incident,
        SourceKind::Asset,
        SourceKind::Indicator,
        SourceKind::Playbook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::Incident => "incident",
            Self::Asset => "asset",
            Self::Indicator => "indicator",
            Self::Playbook => "playbook",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = FerretError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().trim_end_matches('s') {
            "alert" => Ok(Self::Alert),
            "incident" => Ok(Self::Incident),
            "asset" => Ok(Self::Asset),
            "indicator" | "ioc" => Ok(Self::Indicator),
            "playbook" => Ok(Self::Playbook),
            _ => Err(FerretError::UnknownValue {
                kind: "source kind",
                value: s.to_string(),
            }),
        }
    }
}

/// Retrieval mode a source is asked to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    IdLookup,
    FilterQuery,
    SimilaritySearch,
}

impl SearchMode {
    /// The single-mode strategy that produces results in this mode
    pub fn strategy(&self) -> Strategy {
        match self {
            Self::IdLookup => Strategy::SpecificRecord,
            Self::FilterQuery => Strategy::StructuredFilter,
            Self::SimilaritySearch => Strategy::SemanticSearch,
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IdLookup => write!(f, "id_lookup"),
            Self::FilterQuery => write!(f, "filter_query"),
            Self::SimilaritySearch => write!(f, "similarity_search"),
        }
    }
}

/// One record returned by one source in one mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub source_kind: SourceKind,
    pub source_id: String,
    pub record: Record,
    /// Score in the mode's own convention (1.0 for lookup/filter, cosine for similarity)
    pub native_score: f32,
    /// Score on the common `[0, 1]` scale, filled in by consolidation
    pub normalized_score: f32,
    pub strategy_used: Strategy,
}

impl SearchResult {
    pub fn new(record: Record, native_score: f32, mode: SearchMode) -> Self {
        Self {
            source_kind: record.kind,
            source_id: record.id.clone(),
            record,
            native_score,
            normalized_score: 0.0,
            strategy_used: mode.strategy(),
        }
    }

    /// Identity key used for deduplication
    pub fn key(&self) -> (SourceKind, &str) {
        (self.source_kind, self.source_id.as_str())
    }
}

/// Everything a source needs to run any of its modes, computed once per query
#[derive(Debug, Clone, Default)]
pub struct SourceRequest {
    pub text: String,
    pub organization_id: String,
    /// Canonical identifiers found in the query text (lowercased)
    pub identifiers: Vec<String>,
    pub criteria: FilterCriteria,
    pub max_results: usize,
    pub similarity_threshold: f32,
}

/// Result of one `execute` call; `error` is the executor's metadata channel
#[derive(Debug, Clone, Default)]
pub struct SourceOutcome {
    pub results: Vec<SearchResult>,
    pub error: Option<String>,
}

/// A retrieval backend for one [`SourceKind`]
///
/// Implementors provide the three primitives; callers use [`execute`](Self::execute).
#[async_trait]
pub trait SourceExecutor: Send + Sync {
    /// Kind of entity this executor serves
    fn kind(&self) -> SourceKind;

    /// Fetch records by exact identifier
    async fn lookup(&self, request: &SourceRequest) -> Result<Vec<Record>>;

    /// Fetch records matching the structured criteria
    async fn filter(&self, request: &SourceRequest) -> Result<Vec<Record>>;

    /// Fetch records by similarity, with a cosine-like score in `[0, 1]`
    async fn similar(&self, request: &SourceRequest) -> Result<Vec<(Record, f32)>>;

    /// Run one mode; never fails, errors are reported in the outcome
    async fn execute(&self, mode: SearchMode, request: &SourceRequest) -> SourceOutcome {
        let kind = self.kind();
        let fetched: Result<Vec<(Record, f32)>> = match mode {
            SearchMode::IdLookup => self
                .lookup(request)
                .await
                .map(|rs| rs.into_iter().map(|r| (r, 1.0)).collect()),
            SearchMode::FilterQuery => self
                .filter(request)
                .await
                .map(|rs| rs.into_iter().map(|r| (r, 1.0)).collect()),
            SearchMode::SimilaritySearch => self.similar(request).await,
        };

        match fetched {
            Ok(records) => {
                let results: Vec<SearchResult> = records
                    .into_iter()
                    .filter(|(r, _)| r.organization_id == request.organization_id && r.kind == kind)
                    .take(request.max_results)
                    .map(|(r, score)| SearchResult::new(r, score, mode))
                    .collect();
                tracing::debug!(source = %kind, %mode, count = results.len(), "Source executed");
                SourceOutcome {
                    results,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(source = %kind, %mode, error = %e, "Source execution failed");
                SourceOutcome {
                    results: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Executors keyed by the kind they serve
#[derive(Clone, Default)]
pub struct SourceRegistry {
    executors: BTreeMap<SourceKind, Arc<dyn SourceExecutor>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor, replacing any previous one for the same kind
    pub fn register(&mut self, executor: Arc<dyn SourceExecutor>) -> &mut Self {
        self.executors.insert(executor.kind(), executor);
        self
    }

    pub fn with(mut self, executor: Arc<dyn SourceExecutor>) -> Self {
        self.register(executor);
        self
    }

    pub fn get(&self, kind: SourceKind) -> Option<Arc<dyn SourceExecutor>> {
        self.executors.get(&kind).cloned()
    }

    /// Registered kinds in stable order
    pub fn kinds(&self) -> Vec<SourceKind> {
        self.executors.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_parse() {
        assert_eq!("alerts".parse::<SourceKind>().unwrap(), SourceKind::Alert);
        assert_eq!("IOC".parse::<SourceKind>().unwrap(), SourceKind::Indicator);
        assert!("tickets".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_source_kind_display_roundtrip() {
        for kind in SourceKind::ALL {
            assert_eq!(kind.to_string().parse::<SourceKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_mode_strategy_mapping() {
        assert_eq!(SearchMode::IdLookup.strategy(), Strategy::SpecificRecord);
        assert_eq!(SearchMode::FilterQuery.strategy(), Strategy::StructuredFilter);
        assert_eq!(
            SearchMode::SimilaritySearch.strategy(),
            Strategy::SemanticSearch
        );
    }

    struct BrokenSource;

    #[async_trait]
    impl SourceExecutor for BrokenSource {
        fn kind(&self) -> SourceKind {
            SourceKind::Asset
        }

        async fn lookup(&self, _request: &SourceRequest) -> Result<Vec<Record>> {
            Err(FerretError::source(SourceKind::Asset, "store offline"))
        }

        async fn filter(&self, _request: &SourceRequest) -> Result<Vec<Record>> {
            Ok(vec![
                Record::new(SourceKind::Asset, "a1", "org-a"),
                Record::new(SourceKind::Asset, "a2", "org-b"),
                Record::new(SourceKind::Asset, "a3", "org-a"),
            ])
        }

        async fn similar(&self, _request: &SourceRequest) -> Result<Vec<(Record, f32)>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_execute_absorbs_errors() {
        let request = SourceRequest {
            organization_id: "org-a".into(),
            max_results: 10,
            ..Default::default()
        };
        let outcome = BrokenSource.execute(SearchMode::IdLookup, &request).await;
        assert!(outcome.results.is_empty());
        assert!(outcome.error.unwrap().contains("store offline"));
    }

    #[tokio::test]
    async fn test_execute_scopes_and_truncates() {
        let request = SourceRequest {
            organization_id: "org-a".into(),
            max_results: 1,
            ..Default::default()
        };
        let outcome = BrokenSource.execute(SearchMode::FilterQuery, &request).await;
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].source_id, "a1");
        assert_eq!(outcome.results[0].native_score, 1.0);
        assert_eq!(outcome.results[0].strategy_used, Strategy::StructuredFilter);
    }
}
