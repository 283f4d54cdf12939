//! Durable result envelope
//!
//! One JSON artifact per invocation, keyed by tenant and start time. It is created with
//! `status = running` before the first case executes, rewritten every `checkpoint_every` cases
//! with provisional summary metrics, and rewritten a final time as `completed` or `error`.
//!
//! Every rewrite goes to a sibling temp file that is renamed over the artifact, so the file on
//! disk always parses into a valid partial or final report. If the persister is dropped while
//! still `running` (early return or panic), it writes a terminal `error` envelope on the way out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::benchmark::{aggregate, GateResult, RunMetrics, SummaryMetrics};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::executor::CaseResult;

/// Lifecycle state of the artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Error,
}

/// One full sweep over the pack
///
/// Cases live once, in the envelope's flat `results`; a run refers to its contiguous slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_number: usize,
    pub timestamp: String,
    /// Index of this run's first case in `results`
    pub first_result: usize,
    pub metrics: RunMetrics,
}

impl RunRecord {
    /// This run's cases within the flat result list
    pub fn results<'a>(&self, all: &'a [CaseResult]) -> &'a [CaseResult] {
        let start = self.first_result.min(all.len());
        let end = (self.first_result + self.metrics.case_count).min(all.len());
        &all[start..end]
    }
}

/// Settings that shaped the run (never the credential)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub endpoint: String,
    pub transport: String,
    pub runs: usize,
    pub pacing_ms: u64,
    pub checkpoint_every: usize,
    pub request_timeout_secs: u64,
    pub capture_timing: bool,
}

impl ConfigSnapshot {
    pub fn from_config(config: &HarnessConfig, transport: &str) -> Self {
        Self {
            endpoint: config.endpoint.url(),
            transport: transport.to_string(),
            runs: config.runs,
            pacing_ms: config.pacing_ms,
            checkpoint_every: config.checkpoint_every,
            request_timeout_secs: config.request_timeout_secs,
            capture_timing: config.capture_timing,
        }
    }
}

/// Self-describing result artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEnvelope {
    pub tenant_id: String,
    /// Run start (RFC 3339)
    pub timestamp: String,
    pub status: RunStatus,
    pub results: Vec<CaseResult>,
    pub results_count: usize,
    pub planned_cases: usize,
    pub runs: Vec<RunRecord>,
    /// Provisional while running, final once completed
    pub summary_metrics: Option<SummaryMetrics>,
    pub gates: Option<GateResult>,
    pub error: Option<String>,
    pub pack_digest: String,
    pub config: ConfigSnapshot,
    pub updated_at: String,
    pub finished_at: Option<String>,
}

/// Owner of the in-memory result list and the artifact on disk
pub struct ProgressPersister {
    path: PathBuf,
    envelope: ReportEnvelope,
    checkpoint_every: usize,
}

impl ProgressPersister {
    /// Create the persister for a new invocation; nothing is written until `start`.
    pub fn new(config: &HarnessConfig, snapshot: ConfigSnapshot, pack_digest: String, planned_cases: usize) -> Self {
        let started = Utc::now();
        let path = artifact_path(&config.output_dir, &config.tenant_id, started);
        Self::with_path(path, config, snapshot, pack_digest, planned_cases, started)
    }

    fn with_path(
        path: PathBuf,
        config: &HarnessConfig,
        snapshot: ConfigSnapshot,
        pack_digest: String,
        planned_cases: usize,
        started: DateTime<Utc>,
    ) -> Self {
        let envelope = ReportEnvelope {
            tenant_id: config.tenant_id.clone(),
            timestamp: started.to_rfc3339(),
            status: RunStatus::Running,
            results: Vec::new(),
            results_count: 0,
            planned_cases,
            runs: Vec::new(),
            summary_metrics: None,
            gates: None,
            error: None,
            pack_digest,
            config: snapshot,
            updated_at: started.to_rfc3339(),
            finished_at: None,
        };

        Self {
            path,
            envelope,
            checkpoint_every: config.checkpoint_every.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn results(&self) -> &[CaseResult] {
        &self.envelope.results
    }

    /// Write the initial `running` envelope
    pub fn start(&mut self) -> Result<()> {
        tracing::info!(path = %self.path.display(), "writing initial result envelope");
        self.write()
    }

    /// Append a finished case; checkpoint when the cadence is reached.
    ///
    /// A failed checkpoint write is logged and the run continues; the terminal write reports
    /// persistence errors.
    pub fn record_case(&mut self, case: CaseResult) {
        self.envelope.results.push(case);
        self.envelope.results_count = self.envelope.results.len();

        if self.envelope.results_count % self.checkpoint_every == 0 {
            if let Err(e) = self.checkpoint() {
                tracing::warn!("checkpoint write failed: {}", e);
            }
        }
    }

    pub fn record_run(&mut self, run: RunRecord) {
        self.envelope.runs.push(run);
    }

    /// Rewrite the artifact with provisional metrics over the results so far
    pub fn checkpoint(&mut self) -> Result<()> {
        self.envelope.summary_metrics = provisional_summary(&self.envelope.results);
        tracing::debug!(
            cases = self.envelope.results_count,
            planned = self.envelope.planned_cases,
            "checkpoint"
        );
        self.write()
    }

    /// Terminal `completed` envelope
    pub fn complete(&mut self, summary: SummaryMetrics, gates: GateResult) -> Result<()> {
        self.envelope.status = RunStatus::Completed;
        self.envelope.summary_metrics = Some(summary);
        self.envelope.gates = Some(gates);
        self.envelope.finished_at = Some(Utc::now().to_rfc3339());
        self.write()
    }

    /// Terminal `error` envelope carrying partial results and the message
    pub fn fail(&mut self, message: &str) -> Result<()> {
        tracing::error!("run aborted: {}", message);
        self.envelope.status = RunStatus::Error;
        self.envelope.error = Some(message.to_string());
        self.envelope.summary_metrics = provisional_summary(&self.envelope.results);
        self.envelope.finished_at = Some(Utc::now().to_rfc3339());
        self.write()
    }

    fn write(&mut self) -> Result<()> {
        self.envelope.updated_at = Utc::now().to_rfc3339();
        let json = serde_json::to_vec_pretty(&self.envelope)?;
        write_atomic(&self.path, &json)
    }
}

impl Drop for ProgressPersister {
    fn drop(&mut self) {
        if self.envelope.status != RunStatus::Running {
            return;
        }
        let message = if std::thread::panicking() {
            "harness panicked before the run completed"
        } else {
            "harness exited before the run completed"
        };
        if let Err(e) = self.fail(message) {
            tracing::error!("failed to write terminal error envelope: {}", e);
        }
    }
}

/// Best-effort metrics over partial results. An invariant violation here is left to the
/// final aggregation to report.
fn provisional_summary(results: &[CaseResult]) -> Option<SummaryMetrics> {
    match aggregate(results) {
        Ok(summary) => Some(summary),
        Err(e) => {
            tracing::warn!("provisional metrics unavailable: {}", e);
            None
        }
    }
}

/// `{output_dir}/{tenant}_{YYYYmmddTHHMMSSZ}.json`, tenant reduced to filename-safe chars
pub fn artifact_path(output_dir: &Path, tenant_id: &str, started: DateTime<Utc>) -> PathBuf {
    let tenant: String = tenant_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    output_dir.join(format!("{}_{}.json", tenant, started.format("%Y%m%dT%H%M%SZ")))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let persist_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| HarnessError::Persist { path, source }
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(persist_err(parent))?;
    }

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes).map_err(persist_err(&tmp))?;
    std::fs::rename(&tmp, path).map_err(persist_err(path))?;
    Ok(())
}
