//! Benchmark evaluation
//!
//! Turns executed cases into metrics and a release verdict.
//!
//! ## Modules
//!
//! - `metrics` - per-run and cross-run statistics (hit/wrong-hit/clarify rates, p50/p95)
//! - `gates` - fixed release-readiness thresholds over the aggregate

pub mod gates;
pub mod metrics;

pub use gates::{evaluate, Comparator, GateCheck, GateResult};
pub use metrics::{
    // Aggregation
    aggregate, AggregateMetrics, RunMetrics, StageFailure, StageOutcome, SummaryMetrics,
    // Statistics
    HitRateStats, LatencyStats, MeanRate, WrongHitStats,
    // Utilities
    check_selector_bound, is_edge_clarify, percentile, rate,
};
