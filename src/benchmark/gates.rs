//! Release-readiness gates
//!
//! Six fixed thresholds over the aggregate metrics, each reported independently. Overall
//! readiness is the logical AND of all six; there is no partial credit.

use serde::{Deserialize, Serialize};

use super::metrics::AggregateMetrics;
use crate::config::GateThresholds;

/// How an actual value is compared to its threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = ">=")]
    AtLeast,
    #[serde(rename = "<=")]
    AtMost,
    #[serde(rename = "==")]
    Equal,
}

impl Comparator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::AtLeast => ">=",
            Self::AtMost => "<=",
            Self::Equal => "==",
        }
    }

    fn holds(&self, actual: f64, threshold: f64) -> bool {
        match self {
            Self::AtLeast => actual >= threshold,
            Self::AtMost => actual <= threshold,
            Self::Equal => actual == threshold,
        }
    }
}

/// One evaluated gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateCheck {
    pub name: String,
    pub actual: f64,
    pub comparator: Comparator,
    pub threshold: f64,
    pub unit: String,
    pub passed: bool,
}

impl GateCheck {
    fn new(name: &str, actual: f64, comparator: Comparator, threshold: f64, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            actual,
            comparator,
            threshold,
            unit: unit.to_string(),
            passed: comparator.holds(actual, threshold),
        }
    }
}

/// Gate outcome: one flag per threshold plus the overall verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub hit_rate: bool,
    pub wrong_hit_rate: bool,
    pub edge_clarify_rate: bool,
    pub hit_rate_variance: bool,
    pub http_p50: bool,
    pub http_p95: bool,
    pub all_passed: bool,
    /// Per-gate detail in evaluation order
    pub checks: Vec<GateCheck>,
}

impl GateResult {
    pub fn failed_checks(&self) -> impl Iterator<Item = &GateCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

/// Apply the thresholds to aggregate metrics
pub fn evaluate(metrics: &AggregateMetrics, thresholds: &GateThresholds) -> GateResult {
    let checks = vec![
        GateCheck::new("hit_rate", metrics.hit_rate.mean, Comparator::AtLeast, thresholds.min_hit_rate, "%"),
        GateCheck::new("wrong_hit_rate", metrics.wrong_hit_rate.max, Comparator::Equal, thresholds.max_wrong_hit_rate, "%"),
        GateCheck::new("edge_clarify_rate", metrics.edge_clarify_rate.mean, Comparator::AtLeast, thresholds.min_edge_clarify_rate, "%"),
        GateCheck::new("hit_rate_variance", metrics.hit_rate.variance, Comparator::AtMost, thresholds.max_hit_rate_variance, "pts"),
        GateCheck::new("http_p50", metrics.http_latency.p50, Comparator::AtMost, thresholds.max_http_p50_ms, "ms"),
        GateCheck::new("http_p95", metrics.http_latency.p95, Comparator::AtMost, thresholds.max_http_p95_ms, "ms"),
    ];

    let flag = |name: &str| checks.iter().any(|c| c.name == name && c.passed);

    GateResult {
        hit_rate: flag("hit_rate"),
        wrong_hit_rate: flag("wrong_hit_rate"),
        edge_clarify_rate: flag("edge_clarify_rate"),
        hit_rate_variance: flag("hit_rate_variance"),
        http_p50: flag("http_p50"),
        http_p95: flag("http_p95"),
        all_passed: checks.iter().all(|c| c.passed),
        checks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::metrics::{HitRateStats, LatencyStats, MeanRate, WrongHitStats};

    fn boundary_metrics() -> AggregateMetrics {
        AggregateMetrics {
            hit_rate: HitRateStats {
                mean: 85.0,
                min: 85.0,
                max: 85.0,
                variance: 5.0,
            },
            wrong_hit_rate: WrongHitStats { mean: 0.0, max: 0.0 },
            edge_clarify_rate: MeanRate { mean: 70.0 },
            http_latency: LatencyStats { p50: 2500.0, p95: 6000.0 },
            ..AggregateMetrics::default()
        }
    }

    fn failing(result: &GateResult) -> Vec<String> {
        result.failed_checks().map(|c| c.name.clone()).collect()
    }

    #[test]
    fn test_boundary_values_pass() {
        let result = evaluate(&boundary_metrics(), &GateThresholds::default());
        assert!(result.all_passed);
        assert!(failing(&result).is_empty());
        assert_eq!(result.checks.len(), 6);
    }

    #[test]
    fn test_each_gate_flips_alone() {
        let thresholds = GateThresholds::default();

        let mut m = boundary_metrics();
        m.hit_rate.mean = 84.9;
        let r = evaluate(&m, &thresholds);
        assert!(!r.hit_rate && !r.all_passed);
        assert_eq!(failing(&r), vec!["hit_rate"]);

        let mut m = boundary_metrics();
        m.wrong_hit_rate.max = 0.1;
        let r = evaluate(&m, &thresholds);
        assert!(!r.wrong_hit_rate);
        assert_eq!(failing(&r), vec!["wrong_hit_rate"]);

        let mut m = boundary_metrics();
        m.edge_clarify_rate.mean = 69.9;
        let r = evaluate(&m, &thresholds);
        assert!(!r.edge_clarify_rate);
        assert_eq!(failing(&r), vec!["edge_clarify_rate"]);

        let mut m = boundary_metrics();
        m.hit_rate.variance = 5.1;
        let r = evaluate(&m, &thresholds);
        assert!(!r.hit_rate_variance);
        assert_eq!(failing(&r), vec!["hit_rate_variance"]);

        let mut m = boundary_metrics();
        m.http_latency.p50 = 2500.1;
        let r = evaluate(&m, &thresholds);
        assert!(!r.http_p50);
        assert_eq!(failing(&r), vec!["http_p50"]);

        let mut m = boundary_metrics();
        m.http_latency.p95 = 6000.1;
        let r = evaluate(&m, &thresholds);
        assert!(!r.http_p95);
        assert_eq!(failing(&r), vec!["http_p95"]);
    }

    #[test]
    fn test_wrong_hit_gate_uses_max_not_mean() {
        let mut m = boundary_metrics();
        m.wrong_hit_rate.mean = 0.0;
        m.wrong_hit_rate.max = 33.3;
        assert!(!evaluate(&m, &GateThresholds::default()).wrong_hit_rate);
    }

    #[test]
    fn test_defaulted_metrics_fail() {
        let r = evaluate(&AggregateMetrics::default(), &GateThresholds::default());
        assert!(!r.all_passed);
        assert!(!r.hit_rate);
        assert!(r.wrong_hit_rate);
    }

    #[test]
    fn test_comparator_serializes_as_symbol() {
        let json = serde_json::to_string(&Comparator::AtLeast).unwrap();
        assert_eq!(json, "\">=\"");
        assert_eq!(Comparator::AtMost.symbol(), "<=");
    }
}
