//! Executor orchestrator
//!
//! Runs an [`ExecutionPlan`] against the registered sources. Steps of a tier are
//! dispatched concurrently and joined before anything is aggregated; each step
//! carries its own timeout bounded by the overall query deadline, and every step
//! observes the caller's cancellation token. Failures of any kind become an
//! empty contribution plus a [`SourceFailure`] in the step report.

use crate::router::{Consolidation, ExecutionPlan, PlanStep};
use crate::sources::{SearchMode, SearchResult, SourceKind, SourceRegistry, SourceRequest};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSettings {
    /// Budget for one dispatched step
    pub step_timeout: Duration,
    /// Budget for the whole plan
    pub query_deadline: Duration,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(5),
            query_deadline: Duration::from_secs(15),
        }
    }
}

/// Why a step contributed nothing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SourceFailure {
    /// The step's own timeout elapsed
    Timeout,
    /// The overall query deadline elapsed first
    DeadlineExceeded,
    /// The caller cancelled the query
    Cancelled,
    /// The executor reported an internal error
    Internal(String),
    /// No executor is registered for the requested source
    NotRegistered,
}

impl std::fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out"),
            Self::DeadlineExceeded => write!(f, "query deadline exceeded"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Internal(msg) => write!(f, "internal error: {}", msg),
            Self::NotRegistered => write!(f, "no executor registered"),
        }
    }
}

/// Timing and outcome of one dispatched step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub source: SourceKind,
    pub mode: SearchMode,
    pub tier: u8,
    pub result_count: usize,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<SourceFailure>,
}

impl StepReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Everything the orchestrator produced for one plan
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    /// Contributions of the chosen tier, in step order
    pub results: Vec<SearchResult>,
    /// Every step attempted, across tiers
    pub steps: Vec<StepReport>,
    pub tiers_attempted: Vec<u8>,
    /// A `FirstSuccess` plan moved past its first tier
    pub fell_back: bool,
    pub elapsed_ms: u64,
}

impl ExecutionReport {
    /// Error messages per source, in step order
    pub fn per_source_errors(&self) -> BTreeMap<SourceKind, Vec<String>> {
        let mut errors: BTreeMap<SourceKind, Vec<String>> = BTreeMap::new();
        for step in &self.steps {
            if let Some(failure) = &step.failure {
                errors
                    .entry(step.source)
                    .or_default()
                    .push(format!("{} ({}): {}", step.mode, step.source, failure));
            }
        }
        errors
    }

    /// Sources with at least one failed step and no successful step
    pub fn failed_sources(&self) -> Vec<SourceKind> {
        let mut by_source: BTreeMap<SourceKind, (bool, bool)> = BTreeMap::new();
        for step in &self.steps {
            let entry = by_source.entry(step.source).or_default();
            if step.succeeded() {
                entry.0 = true;
            } else {
                entry.1 = true;
            }
        }
        by_source
            .into_iter()
            .filter(|(_, (ok, failed))| *failed && !*ok)
            .map(|(kind, _)| kind)
            .collect()
    }

    /// True when every source that was attempted failed
    pub fn all_sources_failed(&self) -> bool {
        let attempted: std::collections::BTreeSet<SourceKind> =
            self.steps.iter().map(|s| s.source).collect();
        !attempted.is_empty() && self.failed_sources().len() == attempted.len()
    }
}

/// Runs execution plans against a source registry
#[derive(Clone)]
pub struct Orchestrator {
    registry: SourceRegistry,
    settings: ExecutionSettings,
}

impl Orchestrator {
    pub fn new(registry: SourceRegistry, settings: ExecutionSettings) -> Self {
        Self { registry, settings }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn settings(&self) -> ExecutionSettings {
        self.settings
    }

    pub async fn run(
        &self,
        plan: &ExecutionPlan,
        request: &SourceRequest,
        cancel: &CancellationToken,
    ) -> ExecutionReport {
        let started = Instant::now();
        let deadline = started + self.settings.query_deadline;
        let mut report = ExecutionReport::default();

        match plan.consolidation {
            Consolidation::Rank => {
                let steps: Vec<PlanStep> = plan.steps.clone();
                let (results, reports) = self.run_tier(&steps, request, deadline, cancel).await;
                report.results = results;
                report.steps = reports;
                report.tiers_attempted = vec![1];
            }
            Consolidation::FirstSuccess => {
                for tier in 1..=plan.tier_count() {
                    let steps: Vec<PlanStep> = plan.tier(tier).copied().collect();
                    if steps.is_empty() {
                        continue;
                    }
                    if tier > 1 {
                        let top = report
                            .results
                            .iter()
                            .map(|r| r.native_score)
                            .fold(None, |acc: Option<f32>, s| Some(acc.map_or(s, |a| a.max(s))));
                        if !plan.fallback.should_fall_back(report.results.len(), top) {
                            break;
                        }
                        debug!(tier, yielded = report.results.len(), "Falling back to next tier");
                        report.fell_back = true;

                        let skipped = if cancel.is_cancelled() {
                            Some(SourceFailure::Cancelled)
                        } else if Instant::now() >= deadline {
                            Some(SourceFailure::DeadlineExceeded)
                        } else {
                            None
                        };
                        if let Some(failure) = skipped {
                            // the earlier tier's contribution stands; the skipped steps are reported
                            warn!(tier, %failure, "Fallback tier not dispatched");
                            report.steps.extend(steps.iter().map(|step| StepReport {
                                source: step.source,
                                mode: step.mode,
                                tier: step.tier,
                                result_count: 0,
                                elapsed_ms: 0,
                                failure: Some(failure.clone()),
                            }));
                            report.tiers_attempted.push(tier);
                            break;
                        }
                    }

                    let (results, reports) = self.run_tier(&steps, request, deadline, cancel).await;
                    // a tier that runs replaces the previous tier's contribution
                    report.results = results;
                    report.steps.extend(reports);
                    report.tiers_attempted.push(tier);
                }
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(
            steps = report.steps.len(),
            results = report.results.len(),
            failed = report.steps.iter().filter(|s| !s.succeeded()).count(),
            elapsed_ms = report.elapsed_ms,
            "Plan executed"
        );
        report
    }

    /// Dispatch a tier's steps concurrently and join them; aggregation happens after the join
    async fn run_tier(
        &self,
        steps: &[PlanStep],
        request: &SourceRequest,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> (Vec<SearchResult>, Vec<StepReport>) {
        let futures = steps
            .iter()
            .map(|step| self.run_step(*step, request, deadline, cancel));
        let settled = join_all(futures).await;

        let mut results = Vec::new();
        let mut reports = Vec::with_capacity(settled.len());
        for (contribution, step_report) in settled {
            results.extend(contribution);
            reports.push(step_report);
        }
        (results, reports)
    }

    async fn run_step(
        &self,
        step: PlanStep,
        request: &SourceRequest,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> (Vec<SearchResult>, StepReport) {
        let started = Instant::now();

        let outcome: Result<Vec<SearchResult>, SourceFailure> = match self.registry.get(step.source) {
            None => Err(SourceFailure::NotRegistered),
            Some(executor) => {
                let step_deadline = std::cmp::min(started + self.settings.step_timeout, deadline);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(SourceFailure::Cancelled),
                    r = tokio::time::timeout_at(step_deadline, executor.execute(step.mode, request)) => {
                        match r {
                            Ok(out) => match out.error {
                                Some(e) => Err(SourceFailure::Internal(e)),
                                None => Ok(out.results),
                            },
                            Err(_) if step_deadline == deadline => Err(SourceFailure::DeadlineExceeded),
                            Err(_) => Err(SourceFailure::Timeout),
                        }
                    }
                }
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(results) => {
                let report = StepReport {
                    source: step.source,
                    mode: step.mode,
                    tier: step.tier,
                    result_count: results.len(),
                    elapsed_ms,
                    failure: None,
                };
                (results, report)
            }
            Err(failure) => {
                warn!(source = %step.source, mode = %step.mode, %failure, elapsed_ms, "Step failed");
                (
                    Vec::new(),
                    StepReport {
                        source: step.source,
                        mode: step.mode,
                        tier: step.tier,
                        result_count: 0,
                        elapsed_ms,
                        failure: Some(failure),
                    },
                )
            }
        }
    }
}
