//! Benchmark orchestration
//!
//! `RunAccumulator` drives one sweep over the pack in fixed category order, one request at a
//! time, with a fixed pacing delay after every case. `run_benchmark` repeats the sweep, then
//! aggregates, evaluates gates and writes the terminal envelope.
//!
//! ## Latency accounting
//!
//! The pacing delay is recorded as `sleep_ms` and folded into `total_case_ms` only. The gated
//! `http_latency_ms` is the request round trip and nothing else.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::benchmark::{aggregate, evaluate, GateResult, RunMetrics, SummaryMetrics};
use crate::config::HarnessConfig;
use crate::error::Result;
use crate::executor::traits::QueryTransport;
use crate::executor::QueryExecutor;
use crate::pack::TestPack;
use crate::persist::{ProgressPersister, RunRecord};

/// Drives sweeps over a test pack against one transport
pub struct RunAccumulator<'a> {
    executor: QueryExecutor<'a>,
    pack: &'a TestPack,
    pacing: Duration,
}

impl<'a> RunAccumulator<'a> {
    pub fn new(config: &'a HarnessConfig, pack: &'a TestPack, transport: &'a dyn QueryTransport) -> Self {
        Self {
            executor: QueryExecutor::new(transport, config),
            pack,
            pacing: Duration::from_millis(config.pacing_ms),
        }
    }

    /// Execute every case once, in category order.
    ///
    /// Each finished case goes to the persister before the next request is issued. Failed
    /// cases are recorded once and never retried.
    pub async fn sweep(&self, run_number: usize, persister: &mut ProgressPersister) -> RunRecord {
        let timestamp = Utc::now().to_rfc3339();
        let first_result = persister.results().len();
        let total = self.pack.total_cases();
        let mut current = None;

        for (done, (category, input)) in self.pack.cases().enumerate() {
            if current != Some(category) {
                eprintln!("  [{}] {} cases", category.name(), self.pack.inputs(category).len());
                current = Some(category);
            }

            let mut case = self.executor.execute(input, category, run_number).await;

            let slept = Instant::now();
            if !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
            case.sleep_ms = slept.elapsed().as_secs_f64() * 1000.0;
            case.total_case_ms = case.http_latency_ms + case.sleep_ms;

            persister.record_case(case);

            if (done + 1) % 10 == 0 || done + 1 == total {
                eprint!("\r    Progress: {}/{}", done + 1, total);
            }
        }
        eprintln!();

        let metrics = RunMetrics::compute(run_number, &persister.results()[first_result..]);
        RunRecord {
            run_number,
            timestamp,
            first_result,
            metrics,
        }
    }
}

/// Final outcome of a completed benchmark
#[derive(Debug, Clone)]
pub struct BenchmarkOutcome {
    pub summary: SummaryMetrics,
    pub gates: GateResult,
    pub runs: Vec<RunMetrics>,
    pub artifact: PathBuf,
}

/// Run `config.runs` sweeps, aggregate, gate, and persist.
///
/// Every exit path leaves a terminal envelope on disk: `completed` on success, `error` with
/// the partial results when aggregation aborts. Anything else that escapes is caught by the
/// persister's drop.
pub async fn run_benchmark(
    config: &HarnessConfig,
    pack: &TestPack,
    transport: &dyn QueryTransport,
    persister: &mut ProgressPersister,
) -> Result<BenchmarkOutcome> {
    persister.start()?;

    let accumulator = RunAccumulator::new(config, pack, transport);
    let mut runs = Vec::with_capacity(config.runs);

    for run_number in 1..=config.runs {
        eprintln!("\n▶ Run {}/{}", run_number, config.runs);
        let record = accumulator.sweep(run_number, persister).await;
        eprintln!("  {}", record.metrics.format_summary());
        tracing::info!(
            run = run_number,
            cases = record.metrics.case_count,
            hit_rate = record.metrics.hit_rate,
            "sweep finished"
        );
        runs.push(record.metrics.clone());
        persister.record_run(record);
    }

    let summary = match aggregate(persister.results()) {
        Ok(summary) => summary,
        Err(e) => {
            if let Err(write_err) = persister.fail(&e.to_string()) {
                tracing::error!("failed to write error envelope: {}", write_err);
            }
            return Err(e);
        }
    };

    if summary.is_degraded() {
        for failure in &summary.stage_errors {
            tracing::warn!(stage = %failure.stage, "metrics stage degraded: {}", failure.message);
        }
    }

    let gates = evaluate(&summary.metrics, &config.gates);
    persister.complete(summary.clone(), gates.clone())?;

    Ok(BenchmarkOutcome {
        summary,
        gates,
        runs,
        artifact: persister.path().to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarnessError;
    use crate::executor::scripted::{Scripted, ScriptedTransport};
    use crate::executor::traits::{RawResponse, TransportFailure};
    use crate::persist::{ConfigSnapshot, ReportEnvelope, RunStatus};
    use tempfile::TempDir;

    fn config(dir: &TempDir, runs: usize, checkpoint_every: usize) -> HarnessConfig {
        HarnessConfig {
            tenant_id: "acme".to_string(),
            runs,
            pacing_ms: 0,
            checkpoint_every,
            output_dir: dir.path().to_path_buf(),
            ..HarnessConfig::default()
        }
    }

    fn persister(config: &HarnessConfig, pack: &TestPack) -> ProgressPersister {
        let snapshot = ConfigSnapshot::from_config(config, "scripted");
        ProgressPersister::new(config, snapshot, pack.digest(), pack.total_cases() * config.runs)
    }

    fn read(path: &std::path::Path) -> ReportEnvelope {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    fn pack() -> TestPack {
        TestPack {
            should_hit: (1..=4).map(|i| format!("hit {}", i)).collect(),
            should_miss: vec!["miss 1".to_string(), "miss 2".to_string()],
            edge_unclear: vec!["edge 1".to_string(), "edge 2".to_string()],
            placeholder: false,
        }
    }

    fn hit() -> Scripted {
        Scripted::Respond(RawResponse::new(200).with_body(r#"{"faq_hit": true, "debug_branch": "faq"}"#))
    }

    fn clarify() -> Scripted {
        Scripted::Respond(
            RawResponse::new(200)
                .with_body(r#"{"faq_hit": false, "response": "Could you clarify what you mean?"}"#),
        )
    }

    fn miss() -> Scripted {
        Scripted::Respond(RawResponse::new(200).with_body(r#"{"faq_hit": false, "debug_branch": "fallback"}"#))
    }

    #[tokio::test]
    async fn test_full_run_passes_gates() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, 3, 10);
        let pack = pack();
        let transport = ScriptedTransport::new()
            .on("miss 1", miss())
            .on("miss 2", miss())
            .on("edge 1", clarify())
            .on("edge 2", clarify())
            .otherwise(hit());
        let mut persister = persister(&config, &pack);

        let outcome = run_benchmark(&config, &pack, &transport, &mut persister).await.unwrap();

        assert_eq!(outcome.runs.len(), 3);
        assert_eq!(outcome.summary.metrics.total_cases, 24);
        assert_eq!(outcome.summary.metrics.hit_rate.mean, 100.0);
        assert_eq!(outcome.summary.metrics.hit_rate.variance, 0.0);
        assert_eq!(outcome.summary.metrics.wrong_hit_rate.max, 0.0);
        assert_eq!(outcome.summary.metrics.edge_clarify_rate.mean, 100.0);
        assert!(outcome.gates.all_passed);

        let env = read(&outcome.artifact);
        assert_eq!(env.status, RunStatus::Completed);
        assert_eq!(env.results_count, 24);
        assert_eq!(env.runs.len(), 3);
        assert!(env.gates.unwrap().all_passed);

        // Each case is stored once; runs point into the flat list
        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&outcome.artifact).unwrap()).unwrap();
        assert!(raw["runs"][0].get("results").is_none());
        for (i, run) in env.runs.iter().enumerate() {
            assert_eq!(run.first_result, i * 8);
            let cases = run.results(&env.results);
            assert_eq!(cases.len(), 8);
            assert!(cases.iter().all(|c| c.run_number == i + 1));
        }
    }

    #[tokio::test]
    async fn test_mixed_shape_scenario_fails_wrong_hit_gate() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, 1, 10);
        let pack = TestPack {
            should_hit: vec!["a".to_string(), "b".to_string()],
            should_miss: vec!["c".to_string()],
            edge_unclear: vec!["d".to_string()],
            placeholder: false,
        };
        let transport = ScriptedTransport::new()
            .on("a", Scripted::Respond(RawResponse::new(200).with_body(r#"{"faq_hit": true}"#)))
            .on("b", Scripted::Respond(RawResponse::new(200).with_header("x-faq-hit", "false")))
            .on("c", Scripted::Respond(RawResponse::new(200).with_header("x-faq-hit", "true")))
            .on(
                "d",
                Scripted::Respond(
                    RawResponse::new(200)
                        .with_header("x-faq-hit", "false")
                        .with_header("x-debug-branch", "clarify"),
                ),
            );
        let mut persister = persister(&config, &pack);

        let outcome = run_benchmark(&config, &pack, &transport, &mut persister).await.unwrap();
        let m = &outcome.summary.metrics;

        assert_eq!(m.hit_rate.mean, 50.0);
        assert_eq!(m.wrong_hit_rate.max, 100.0);
        assert_eq!(m.edge_clarify_rate.mean, 100.0);
        assert!(!outcome.gates.wrong_hit_rate);
        assert!(!outcome.gates.hit_rate);
        assert!(outcome.gates.edge_clarify_rate);
        assert!(!outcome.gates.all_passed);

        let env = read(&outcome.artifact);
        assert_eq!(env.status, RunStatus::Completed);
        assert!(!env.gates.unwrap().all_passed);
    }

    #[tokio::test]
    async fn test_category_order_and_no_retries() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, 2, 10);
        let pack = pack();
        let transport = ScriptedTransport::new()
            .otherwise(Scripted::Fail(TransportFailure::new("Timeout", "request timed out")));
        let mut persister = persister(&config, &pack);

        run_benchmark(&config, &pack, &transport, &mut persister).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 16);
        assert_eq!(&calls[..8], &["hit 1", "hit 2", "hit 3", "hit 4", "miss 1", "miss 2", "edge 1", "edge 2"]);
        assert_eq!(&calls[8..], &calls[..8]);
    }

    #[tokio::test]
    async fn test_all_connections_reset_still_completes() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, 1, 3);
        let pack = pack();
        let transport = ScriptedTransport::new()
            .otherwise(Scripted::Fail(TransportFailure::new("ConnectionReset", "connection reset by peer")));
        let mut persister = persister(&config, &pack);

        let outcome = run_benchmark(&config, &pack, &transport, &mut persister).await.unwrap();

        let env = read(&outcome.artifact);
        assert_eq!(env.status, RunStatus::Completed);
        assert_eq!(env.results_count, 8);
        assert!(env.results.iter().all(|r| r.client_error && r.status_code == 0));
        assert_eq!(outcome.summary.metrics.client_error_count, 8);
        assert_eq!(outcome.summary.metrics.non_200_count, 0);
        assert!(!outcome.gates.all_passed);
    }

    #[tokio::test]
    async fn test_pacing_excluded_from_http_latency() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, 1, 10);
        config.pacing_ms = 20;
        let pack = TestPack {
            should_hit: vec!["hit 1".to_string()],
            ..TestPack::default()
        };
        let transport = ScriptedTransport::new().otherwise(hit());
        let mut persister = persister(&config, &pack);

        let outcome = run_benchmark(&config, &pack, &transport, &mut persister).await.unwrap();

        let env = read(&outcome.artifact);
        let case = &env.results[0];
        assert!(case.sleep_ms >= 20.0);
        assert!(case.http_latency_ms < case.sleep_ms);
        assert!((case.total_case_ms - (case.http_latency_ms + case.sleep_ms)).abs() < 1e-9);
        assert!(outcome.summary.metrics.total_case_latency.p50 >= 20.0);
        assert!(outcome.summary.metrics.http_latency.p50 < 20.0);
    }

    #[tokio::test]
    async fn test_checkpoint_written_mid_run() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, 1, 4);
        let pack = pack();
        let transport = ScriptedTransport::new().otherwise(hit());
        let mut persister = persister(&config, &pack);
        persister.start().unwrap();

        let accumulator = RunAccumulator::new(&config, &pack, &transport);
        let record = accumulator.sweep(1, &mut persister).await;
        assert_eq!(record.first_result, 0);
        assert_eq!(record.metrics.case_count, 8);
        assert_eq!(record.results(persister.results()).len(), 8);

        // Last checkpoint at case 8, still running
        let env = read(persister.path());
        assert_eq!(env.status, RunStatus::Running);
        assert_eq!(env.results_count, 8);
        assert!(env.summary_metrics.is_some());

        persister.fail("test over").unwrap();
    }

    #[tokio::test]
    async fn test_error_envelope_keeps_partial_sweep() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, 1, 10);
        let pack = TestPack {
            should_hit: vec!["hit 1".to_string()],
            ..TestPack::default()
        };
        let transport = ScriptedTransport::new().otherwise(hit());
        let mut persister = persister(&config, &pack);
        persister.start().unwrap();

        let accumulator = RunAccumulator::new(&config, &pack, &transport);
        let record = accumulator.sweep(1, &mut persister).await;
        assert_eq!(record.results(persister.results()).len(), 1);

        let err = crate::benchmark::check_selector_bound(2, 1).unwrap_err();
        assert!(matches!(err, HarnessError::InvariantViolation { .. }));
        persister.fail(&err.to_string()).unwrap();

        let env = read(persister.path());
        assert_eq!(env.status, RunStatus::Error);
        assert!(env.error.unwrap().contains("selector_called_cases"));
        assert_eq!(env.results_count, 1);
    }
}
