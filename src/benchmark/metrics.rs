//! Aggregated benchmark metrics
//!
//! Computes per-run and cross-run statistics over executed cases.
//!
//! ## Metrics Overview
//!
//! - **Hit rate**: share of `should_hit` cases answered with a confident match. Computed per
//!   run; the spread `max - min` across runs is reported as the repeatability "variance", so a
//!   single run always has variance 0.
//! - **Wrong-hit rate**: share of `should_miss` cases that matched anyway. Both the pooled mean
//!   and the per-run maximum are kept; the maximum is what gates.
//! - **Edge-clarify rate**: share of `edge_unclear` cases answered with a clarification.
//! - **Latency**: nearest-rank p50/p95 of the HTTP round trip (gated) and of the whole case
//!   including pacing (informational).
//!
//! Rates are percentages and degrade to 0 on empty subsets. The selector-count bound is the
//! one check that always hard-fails.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{HarnessError, Result};
use crate::executor::CaseResult;
use crate::pack::Category;

/// Case-insensitive phrases that mark a clarification answer
pub const CLARIFY_LEXICON: &[&str] = &[
    "could you clarify",
    "can you clarify",
    "please clarify",
    "did you mean",
    "be more specific",
    "which one",
    "could you provide more",
    "can you rephrase",
];

/// Branch label substring that marks a clarification answer
pub const CLARIFY_BRANCH_MARKER: &str = "clarify";

// =============================================================================
// PRIMITIVES
// =============================================================================

/// Percentage `numerator / denominator * 100`, 0 when the denominator is 0
pub fn rate(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64 * 100.0
    }
}

/// Nearest-rank percentile of an ascending-sorted slice: `sorted[floor(n * p)]`.
///
/// Not interpolated. Returns 0 for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64) * p).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// p50/p95 pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub p50: f64,
    pub p95: f64,
}

impl LatencyStats {
    /// Percentiles of a latency sample; fails on non-finite values
    pub fn from_samples(stage: &str, samples: impl IntoIterator<Item = f64>) -> Result<Self> {
        let mut values: Vec<f64> = samples.into_iter().collect();
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(HarnessError::metrics(stage, format!("non-finite latency sample: {}", bad)));
        }
        values.sort_by(|a, b| a.total_cmp(b));
        Ok(Self {
            p50: percentile(&values, 0.50),
            p95: percentile(&values, 0.95),
        })
    }
}

/// Whether a case counts as a successful clarification
///
/// Requires a clean 200, no confident hit, and either the lexicon or the branch marker.
/// Either detector may be unavailable depending on which endpoint variant answered.
pub fn is_edge_clarify(case: &CaseResult) -> bool {
    if case.client_error || case.status_code != 200 || case.faq_hit {
        return false;
    }

    let lexicon_match = case.response_text.as_deref().is_some_and(|text| {
        let lower = text.to_lowercase();
        CLARIFY_LEXICON.iter().any(|phrase| lower.contains(phrase))
    });

    let branch_match = case
        .debug_branch
        .as_deref()
        .is_some_and(|b| b.to_lowercase().contains(CLARIFY_BRANCH_MARKER));

    lexicon_match || branch_match
}

/// Fail if more cases report a selector call than were executed.
pub fn check_selector_bound(selector_called_cases: usize, total_cases: usize) -> Result<()> {
    if selector_called_cases > total_cases {
        return Err(HarnessError::InvariantViolation {
            selector_called_cases,
            total_cases,
        });
    }
    Ok(())
}

// =============================================================================
// PER-RUN METRICS
// =============================================================================

/// Metrics snapshot for one sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub run_number: usize,
    pub case_count: usize,
    pub hit_rate: f64,
    pub wrong_hit_rate: f64,
    pub edge_clarify_rate: f64,
    pub http_latency: LatencyStats,
    pub selector_called_cases: usize,
    pub non_200_count: usize,
    pub client_error_count: usize,
}

impl RunMetrics {
    pub fn compute<'a>(run_number: usize, cases: impl IntoIterator<Item = &'a CaseResult>) -> Self {
        let cases: Vec<&CaseResult> = cases.into_iter().collect();
        let counts = CategoryCounts::tally(cases.iter().copied());

        Self {
            run_number,
            case_count: cases.len(),
            hit_rate: counts.hit_rate(),
            wrong_hit_rate: counts.wrong_hit_rate(),
            edge_clarify_rate: counts.edge_clarify_rate(),
            // A broken sample degrades the snapshot; the aggregate reports the failure
            http_latency: LatencyStats::from_samples("run_http_latency", cases.iter().map(|c| c.http_latency_ms))
                .unwrap_or_default(),
            selector_called_cases: cases.iter().filter(|c| c.selector_called).count(),
            non_200_count: cases.iter().filter(|c| is_non_200(c)).count(),
            client_error_count: cases.iter().filter(|c| c.client_error).count(),
        }
    }

    /// Format as a summary string
    pub fn format_summary(&self) -> String {
        format!(
            "Hit: {:.1}% | Wrong-hit: {:.1}% | Clarify: {:.1}% | p50: {:.0}ms | p95: {:.0}ms | Errors: {} non-200, {} client",
            self.hit_rate,
            self.wrong_hit_rate,
            self.edge_clarify_rate,
            self.http_latency.p50,
            self.http_latency.p95,
            self.non_200_count,
            self.client_error_count
        )
    }
}

/// Server answered, but not with 200. Transport failures are counted separately.
fn is_non_200(case: &CaseResult) -> bool {
    !case.client_error && case.status_code != 200
}

#[derive(Debug, Default, Clone, Copy)]
struct CategoryCounts {
    hit_cases: usize,
    hits: usize,
    miss_cases: usize,
    wrong_hits: usize,
    edge_cases: usize,
    clarified: usize,
}

impl CategoryCounts {
    fn tally<'a>(cases: impl IntoIterator<Item = &'a CaseResult>) -> Self {
        let mut counts = Self::default();
        for case in cases {
            match case.category {
                Category::ShouldHit => {
                    counts.hit_cases += 1;
                    counts.hits += usize::from(case.faq_hit);
                }
                Category::ShouldMiss => {
                    counts.miss_cases += 1;
                    counts.wrong_hits += usize::from(case.faq_hit);
                }
                Category::EdgeUnclear => {
                    counts.edge_cases += 1;
                    counts.clarified += usize::from(is_edge_clarify(case));
                }
            }
        }
        counts
    }

    fn hit_rate(&self) -> f64 {
        rate(self.hits, self.hit_cases)
    }

    fn wrong_hit_rate(&self) -> f64 {
        rate(self.wrong_hits, self.miss_cases)
    }

    fn edge_clarify_rate(&self) -> f64 {
        rate(self.clarified, self.edge_cases)
    }
}

// =============================================================================
// AGGREGATE METRICS
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HitRateStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// `max - min` across runs (percentage points)
    pub variance: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WrongHitStats {
    /// Pooled over every should-miss case
    pub mean: f64,
    /// Worst single run
    pub max: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MeanRate {
    pub mean: f64,
}

/// Cross-run metrics; every field is defaulted to zero when its stage failed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub hit_rate: HitRateStats,
    pub wrong_hit_rate: WrongHitStats,
    pub edge_clarify_rate: MeanRate,
    pub http_latency: LatencyStats,
    pub total_case_latency: LatencyStats,
    pub selector_called_rate: f64,
    pub selector_called_cases: usize,
    pub total_cases: usize,
    pub runs: usize,
    pub non_200_count: usize,
    pub client_error_count: usize,
}

/// Value of one aggregation stage, or the reason it could not be computed
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Computed(T),
    Failed { stage: String, message: String },
}

impl<T: Default> StageOutcome<T> {
    fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Computed(value),
            Err(HarnessError::MetricsComputation { stage, message }) => Self::Failed { stage, message },
            Err(other) => Self::Failed {
                stage: "unknown".to_string(),
                message: other.to_string(),
            },
        }
    }

    /// Computed value or the default, recording the failure in `errors`
    fn value_or_default(self, errors: &mut Vec<StageFailure>) -> T {
        match self {
            Self::Computed(value) => value,
            Self::Failed { stage, message } => {
                tracing::warn!(stage = %stage, "metrics stage failed: {}", message);
                errors.push(StageFailure { stage, message });
                T::default()
            }
        }
    }
}

/// A recorded aggregation failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: String,
    pub message: String,
}

/// Partial-success summary: metrics plus any stage failures behind defaulted values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetrics {
    #[serde(flatten)]
    pub metrics: AggregateMetrics,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stage_errors: Vec<StageFailure>,
}

impl SummaryMetrics {
    pub fn is_degraded(&self) -> bool {
        !self.stage_errors.is_empty()
    }
}

/// Group results by run number, in run order
fn by_run(results: &[CaseResult]) -> BTreeMap<usize, Vec<&CaseResult>> {
    let mut runs: BTreeMap<usize, Vec<&CaseResult>> = BTreeMap::new();
    for result in results {
        runs.entry(result.run_number).or_default().push(result);
    }
    runs
}

fn rate_stages(results: &[CaseResult]) -> (HitRateStats, WrongHitStats, MeanRate) {
    let pooled = CategoryCounts::tally(results);
    let per_run: Vec<CategoryCounts> = by_run(results)
        .into_values()
        .map(|cases| CategoryCounts::tally(cases))
        .collect();

    let run_hit_rates: Vec<f64> = per_run.iter().map(|c| c.hit_rate()).collect();
    let (min, max) = if run_hit_rates.is_empty() {
        (0.0, 0.0)
    } else {
        run_hit_rates
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| (lo.min(r), hi.max(r)))
    };

    let hit_rate = HitRateStats {
        mean: pooled.hit_rate(),
        min,
        max,
        variance: max - min,
    };

    let wrong_hit_rate = WrongHitStats {
        mean: pooled.wrong_hit_rate(),
        max: per_run.iter().map(|c| c.wrong_hit_rate()).fold(0.0, f64::max),
    };

    let edge_clarify_rate = MeanRate {
        mean: pooled.edge_clarify_rate(),
    };

    (hit_rate, wrong_hit_rate, edge_clarify_rate)
}

/// Aggregate a flat list of case results into summary metrics.
///
/// Always recomputed from the complete list, never from running counters. Latency stages
/// that cannot be computed degrade to zero with the failure attached. The selector bound is
/// checked first and aborts with `InvariantViolation`.
pub fn aggregate(results: &[CaseResult]) -> Result<SummaryMetrics> {
    let total_cases = results.len();
    let selector_called_cases = results.iter().filter(|r| r.selector_called).count();
    check_selector_bound(selector_called_cases, total_cases)?;

    let mut errors = Vec::new();

    let (hit_rate, wrong_hit_rate, edge_clarify_rate) = rate_stages(results);

    let http_latency = StageOutcome::from_result(LatencyStats::from_samples(
        "http_latency",
        results.iter().map(|r| r.http_latency_ms),
    ))
    .value_or_default(&mut errors);

    let total_case_latency = StageOutcome::from_result(LatencyStats::from_samples(
        "total_case_latency",
        results.iter().map(|r| r.total_case_ms),
    ))
    .value_or_default(&mut errors);

    let metrics = AggregateMetrics {
        hit_rate,
        wrong_hit_rate,
        edge_clarify_rate,
        http_latency,
        total_case_latency,
        selector_called_rate: rate(selector_called_cases, total_cases),
        selector_called_cases,
        total_cases,
        runs: by_run(results).len(),
        non_200_count: results.iter().filter(|r| is_non_200(r)).count(),
        client_error_count: results.iter().filter(|r| r.client_error).count(),
    };

    Ok(SummaryMetrics {
        metrics,
        stage_errors: errors,
    })
}
