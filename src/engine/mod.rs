//! Search engine facade
//!
//! Wires classifier, router, orchestrator, consolidator, correlation and tool
//! scoring behind the four boundary operations.

mod query;

pub use query::{HybridSearchResponse, Query, MAX_RESULTS_RANGE, SIMILARITY_THRESHOLD_RANGE};

use crate::cache::QueryCache;
use crate::classifier::{Classification, QueryClassifier};
use crate::config::Config;
use crate::consolidate::ResultConsolidator;
use crate::correlation::{CorrelationEngine, CorrelationReport, CorrelationRequest};
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::executor::Orchestrator;
use crate::router::StrategyRouter;
use crate::sources::{SourceKind, SourceRegistry, SourceRequest, SqliteSource};
use crate::storage::RecordStore;
use crate::tools::{ToolDescriptor, ToolRelevanceScorer, ToolScore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One SQLite-backed executor per source kind over a shared store
pub fn build_registry(store: Arc<RecordStore>, embedder: Arc<dyn EmbeddingProvider>) -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    for kind in SourceKind::ALL {
        registry.register(Arc::new(SqliteSource::new(
            kind,
            Arc::clone(&store),
            Arc::clone(&embedder),
        )));
    }
    registry
}

pub struct SearchEngine {
    classifier: &'static QueryClassifier,
    router: StrategyRouter,
    orchestrator: Orchestrator,
    consolidator: ResultConsolidator,
    correlation: CorrelationEngine,
    scorer: ToolRelevanceScorer,
    cache: Option<Arc<QueryCache<HybridSearchResponse>>>,
}

impl SearchEngine {
    pub fn new(registry: SourceRegistry, config: &Config) -> Result<Self> {
        let orchestrator = Orchestrator::new(registry, config.execution_settings()?);
        Ok(Self {
            classifier: QueryClassifier::shared(),
            router: StrategyRouter::new(config.fallback_policy()),
            correlation: CorrelationEngine::new(orchestrator.clone(), config.depth_limits()),
            orchestrator,
            consolidator: ResultConsolidator::new(config.search.key_findings),
            scorer: ToolRelevanceScorer::new(config.tools.recommend_threshold),
            cache: None,
        })
    }

    /// Consult and fill `cache` on every hybrid search
    pub fn with_cache(mut self, cache: Arc<QueryCache<HybridSearchResponse>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach a fresh cache sized from `[cache]` when it is enabled
    ///
    /// For long-lived library callers; a one-shot process gains nothing from it.
    pub fn with_configured_cache(self, config: &Config) -> Result<Self> {
        if !config.cache.enabled {
            return Ok(self);
        }
        let cache = QueryCache::new(config.cache.max_entries, config.cache_ttl()?);
        Ok(self.with_cache(Arc::new(cache)))
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    pub fn registry(&self) -> &SourceRegistry {
        self.orchestrator.registry()
    }

    pub fn classify(&self, text: &str) -> Classification {
        self.classifier.classify(text)
    }

    pub async fn hybrid_search(&self, query: &Query) -> Result<HybridSearchResponse> {
        self.hybrid_search_with_cancel(query, &CancellationToken::new())
            .await
    }

    /// Classify, route, execute and consolidate one query
    ///
    /// Fails only on malformed input. Source failures land in
    /// `results.metadata.per_source_errors`; `success` is false only when every
    /// requested source failed.
    pub async fn hybrid_search_with_cancel(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<HybridSearchResponse> {
        query.validate()?;

        let cache_key = self.cache.as_ref().map(|_| query.cache_key());
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(mut hit) = cache.get(key) {
                debug!("Serving hybrid search from cache");
                hit.cached = true;
                return Ok(hit);
            }
        }

        let classification = self.classifier.classify(&query.text);
        let plan = self
            .router
            .route(&classification, query.forced_strategy, &query.data_sources);

        let request = SourceRequest {
            text: query.text.clone(),
            organization_id: query.organization_id.clone(),
            identifiers: self.classifier.extract_identifiers(&query.text),
            criteria: self
                .classifier
                .extract_criteria(&query.text, chrono::Utc::now()),
            max_results: query.max_results,
            similarity_threshold: query.similarity_threshold,
        };

        let report = self.orchestrator.run(&plan, &request, cancel).await;
        let success = !report.all_sources_failed();
        let per_source_errors = report.per_source_errors();
        let errors: Vec<String> = per_source_errors.values().flatten().cloned().collect();
        let elapsed_ms = report.elapsed_ms;
        let tiers_attempted = report.tiers_attempted.clone();
        let fell_back = report.fell_back;

        let mut results =
            self.consolidator
                .consolidate(report.results, plan.strategy, query.max_results);
        results.metadata.per_source_errors = per_source_errors;
        results.metadata.search_time_ms = elapsed_ms;
        results.metadata.tiers_attempted = tiers_attempted;
        results.metadata.fell_back = fell_back;

        info!(
            query_type = %classification.query_type,
            strategy = %plan.strategy,
            results = results.len(),
            errors = errors.len(),
            elapsed_ms,
            "Hybrid search completed"
        );

        let response = HybridSearchResponse {
            success,
            results,
            classification,
            errors,
            cached: false,
        };

        if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
            if response.success {
                cache.insert(key, response.clone());
            }
        }

        Ok(response)
    }

    pub async fn find_related(&self, request: &CorrelationRequest) -> Result<CorrelationReport> {
        self.correlation.find_related(request).await
    }

    pub async fn find_related_with_cancel(
        &self,
        request: &CorrelationRequest,
        cancel: &CancellationToken,
    ) -> Result<CorrelationReport> {
        self.correlation.find_related_with_cancel(request, cancel).await
    }

    pub fn score_tools(&self, classification: &Classification, tools: &[ToolDescriptor]) -> Vec<ToolScore> {
        self.scorer.score(classification, tools)
    }

    pub fn recommend_tools(
        &self,
        classification: &Classification,
        tools: &[ToolDescriptor],
    ) -> Vec<ToolScore> {
        self.scorer.recommend(classification, tools)
    }
}
