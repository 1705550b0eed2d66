//! Entity correlation
//!
//! Given a typed entity value, fans a substring filter out to every registered
//! source, scores each hit, and builds a timeline and pattern summary.

pub mod indicators;

pub use indicators::{extract_indicators, EntityKind, Indicator, IndicatorExtractor};

use crate::error::{FerretError, Result, ValidationError};
use crate::executor::Orchestrator;
use crate::router::{Consolidation, ExecutionPlan, FallbackPolicy, PlanStep, Strategy};
use crate::sources::{FilterCriteria, Record, SearchMode, SourceKind, SourceRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Shallow,
    Medium,
    Deep,
}

impl std::fmt::Display for Depth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shallow => write!(f, "shallow"),
            Self::Medium => write!(f, "medium"),
            Self::Deep => write!(f, "deep"),
        }
    }
}

impl std::str::FromStr for Depth {
    type Err = FerretError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "shallow" => Ok(Self::Shallow),
            "medium" => Ok(Self::Medium),
            "deep" => Ok(Self::Deep),
            _ => Err(FerretError::UnknownValue {
                kind: "depth",
                value: s.to_string(),
            }),
        }
    }
}

/// Per-source hit caps for each depth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthLimits {
    pub shallow: usize,
    pub medium: usize,
    pub deep: usize,
}

impl Default for DepthLimits {
    fn default() -> Self {
        Self {
            shallow: 10,
            medium: 25,
            deep: 50,
        }
    }
}

impl DepthLimits {
    pub fn limit(&self, depth: Depth) -> usize {
        match depth {
            Depth::Shallow => self.shallow,
            Depth::Medium => self.medium,
            Depth::Deep => self.deep,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRequest {
    pub entity_kind: EntityKind,
    pub entity_value: String,
    pub depth: Depth,
    pub include_timeline: bool,
    pub confidence_threshold: f32,
    pub organization_id: String,
}

impl CorrelationRequest {
    /// Medium depth, timeline on, threshold 0.5
    pub fn new(
        entity_kind: EntityKind,
        entity_value: impl Into<String>,
        organization_id: impl Into<String>,
    ) -> Self {
        Self {
            entity_kind,
            entity_value: entity_value.into(),
            depth: Depth::Medium,
            include_timeline: true,
            confidence_threshold: 0.5,
            organization_id: organization_id.into(),
        }
    }

    pub fn with_depth(mut self, depth: Depth) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_timeline(mut self, include: bool) -> Self {
        self.include_timeline = include;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.entity_value.trim().is_empty() {
            errors.push(ValidationError::new("entity_value", "must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            errors.push(ValidationError::new(
                "confidence_threshold",
                format!("{} is outside [0, 1]", self.confidence_threshold),
            ));
        }
        if self.organization_id.trim().is_empty() {
            errors.push(ValidationError::new("organization_id", "must not be empty"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(FerretError::InvalidQuery { errors })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationHit {
    pub source_kind: SourceKind,
    pub source_id: String,
    pub record: Record,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceBuckets {
    /// confidence >= 0.8
    pub high: usize,
    /// 0.6 <= confidence < 0.8
    pub medium: usize,
    /// confidence < 0.6
    pub low: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timespan {
    pub earliest: DateTime<Utc>,
    pub latest: DateTime<Utc>,
    pub span_days: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternSummary {
    pub source_distribution: BTreeMap<SourceKind, usize>,
    pub confidence_buckets: ConfidenceBuckets,
    pub timespan: Option<Timespan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationReport {
    pub entity_kind: EntityKind,
    pub entity_value: String,
    pub depth: Depth,
    /// Hits at or above the threshold, by confidence desc then `(source_kind, source_id)`
    pub hits: Vec<CorrelationHit>,
    /// Same hits by record timestamp ascending; empty unless requested
    pub timeline: Vec<CorrelationHit>,
    pub pattern_summary: PatternSummary,
    pub per_source_errors: BTreeMap<SourceKind, Vec<String>>,
    pub search_time_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// 0.5 base, +0.3 when the record contains the value verbatim, +0.1 for severity >= 3
pub fn correlation_confidence(record: &Record, entity_value: &str) -> f32 {
    // tenths keep the sums exact
    let mut tenths: u8 = 5;
    if record.contains_verbatim(entity_value) {
        tenths += 3;
    }
    if record.severity.map_or(false, |s| s >= 3) {
        tenths += 1;
    }
    f32::from(tenths.min(10)) / 10.0
}

pub fn summarize(hits: &[CorrelationHit]) -> PatternSummary {
    let mut summary = PatternSummary::default();
    for hit in hits {
        *summary.source_distribution.entry(hit.source_kind).or_default() += 1;
        if hit.confidence >= 0.8 {
            summary.confidence_buckets.high += 1;
        } else if hit.confidence >= 0.6 {
            summary.confidence_buckets.medium += 1;
        } else {
            summary.confidence_buckets.low += 1;
        }
    }

    let stamps: Vec<DateTime<Utc>> = hits.iter().filter_map(|h| h.timestamp).collect();
    if stamps.len() >= 2 {
        if let (Some(earliest), Some(latest)) = (stamps.iter().min(), stamps.iter().max()) {
            let span = *latest - *earliest;
            summary.timespan = Some(Timespan {
                earliest: *earliest,
                latest: *latest,
                span_days: span.num_milliseconds() as f64 / 86_400_000.0,
            });
        }
    }
    summary
}

/// Hits ordered by timestamp ascending; untimestamped hits go last
pub fn build_timeline(hits: &[CorrelationHit]) -> Vec<CorrelationHit> {
    let mut timeline = hits.to_vec();
    timeline.sort_by(|a, b| {
        match (a.timestamp, b.timestamp) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
        .then_with(|| a.source_kind.cmp(&b.source_kind))
        .then_with(|| a.source_id.cmp(&b.source_id))
    });
    timeline
}

pub struct CorrelationEngine {
    orchestrator: Orchestrator,
    limits: DepthLimits,
}

impl CorrelationEngine {
    pub fn new(orchestrator: Orchestrator, limits: DepthLimits) -> Self {
        Self {
            orchestrator,
            limits,
        }
    }

    pub async fn find_related(&self, request: &CorrelationRequest) -> Result<CorrelationReport> {
        self.find_related_with_cancel(request, &CancellationToken::new())
            .await
    }

    #[tracing::instrument(skip(self, request, cancel), fields(kind = %request.entity_kind, depth = %request.depth))]
    pub async fn find_related_with_cancel(
        &self,
        request: &CorrelationRequest,
        cancel: &CancellationToken,
    ) -> Result<CorrelationReport> {
        request.validate()?;
        let value = request.entity_value.trim().to_string();

        let mut warnings = Vec::new();
        if !request.entity_kind.accepts(&value) {
            tracing::warn!(value = %value, "Value does not look like the declared entity kind");
            warnings.push(format!(
                "'{}' does not look like a {}",
                value, request.entity_kind
            ));
        }

        let plan = ExecutionPlan {
            strategy: Strategy::StructuredFilter,
            steps: self
                .orchestrator
                .registry()
                .kinds()
                .into_iter()
                .map(|source| PlanStep {
                    source,
                    mode: SearchMode::FilterQuery,
                    tier: 1,
                })
                .collect(),
            consolidation: Consolidation::Rank,
            fallback: FallbackPolicy::default(),
        };
        let source_request = SourceRequest {
            text: value.clone(),
            organization_id: request.organization_id.clone(),
            identifiers: Vec::new(),
            criteria: FilterCriteria::containing(value.clone()),
            max_results: self.limits.limit(request.depth),
            similarity_threshold: 0.0,
        };

        let report = self.orchestrator.run(&plan, &source_request, cancel).await;
        let per_source_errors = report.per_source_errors();
        let search_time_ms = report.elapsed_ms;

        let mut seen = BTreeSet::new();
        let mut hits: Vec<CorrelationHit> = report
            .results
            .into_iter()
            .filter(|r| seen.insert((r.source_kind, r.source_id.clone())))
            .map(|r| CorrelationHit {
                confidence: correlation_confidence(&r.record, &value),
                timestamp: r.record.timestamp(),
                source_kind: r.source_kind,
                source_id: r.source_id,
                record: r.record,
            })
            .filter(|h| h.confidence >= request.confidence_threshold)
            .collect();

        hits.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.source_kind.cmp(&b.source_kind))
                .then_with(|| a.source_id.cmp(&b.source_id))
        });

        let timeline = if request.include_timeline {
            build_timeline(&hits)
        } else {
            Vec::new()
        };
        let pattern_summary = summarize(&hits);

        tracing::info!(hits = hits.len(), elapsed_ms = search_time_ms, "Correlation complete");

        Ok(CorrelationReport {
            entity_kind: request.entity_kind,
            entity_value: value,
            depth: request.depth,
            hits,
            timeline,
            pattern_summary,
            per_source_errors,
            search_time_ms,
            warnings,
        })
    }
}
