//! Query execution
//!
//! Issues one diagnostic request per case and turns whatever comes back (a JSON body, a
//! header-only answer, a non-2xx status, or a transport failure) into a uniform `CaseResult`.
//! `execute` never fails: expected transport problems become results with `client_error`.

pub mod extract;
pub mod http_backend;
pub mod traits;

#[cfg(test)]
pub mod scripted;

use serde::{Deserialize, Serialize};

use crate::config::HarnessConfig;
use crate::pack::Category;
use extract::{ResponseView, SelectorSignal, StageTimings};
use traits::{header_lines, measure_async, snippet, QueryTransport, RawResponse, TransportFailure, BODY_SNIPPET_CHARS};

pub use http_backend::HttpTransport;

/// Result of one executed case
///
/// Created once by `QueryExecutor::execute`. The run accumulator fills in `sleep_ms` and
/// `total_case_ms` after pacing; nothing else changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    /// Sweep this case belongs to (1-indexed)
    pub run_number: usize,
    pub input: String,
    pub category: Category,

    /// Request round trip only (gated)
    pub http_latency_ms: f64,
    /// Round trip plus pacing delay (informational)
    pub total_case_ms: f64,
    /// Pacing delay applied after this case
    pub sleep_ms: f64,

    pub faq_hit: bool,
    pub debug_branch: Option<String>,
    pub retrieval_score: Option<f64>,
    pub candidates_count: Option<u64>,
    pub retrieval_stage: Option<String>,
    pub normalized_input: Option<String>,
    pub chosen_faq_id: Option<String>,
    pub selector_called: bool,
    /// Tier that resolved `selector_called`, if any did
    pub selector_signal: Option<SelectorSignal>,
    /// Answer text (bounded), used for clarify detection
    pub response_text: Option<String>,

    /// HTTP status, 0 when none was received
    pub status_code: u16,
    pub client_error: bool,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    /// First 500 characters of the body for failed or non-2xx cases
    pub body_snippet: Option<String>,
    /// First 30 header lines for failed or non-2xx cases
    #[serde(default)]
    pub header_snippet: Vec<String>,

    #[serde(flatten)]
    pub timings: StageTimings,
}

/// Transport outcome class of a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseOutcome {
    Success,
    /// Non-2xx status; counted, not fatal
    ServerError,
    /// Timeout, refused or reset connection; counted, not fatal
    TransportError,
}

impl CaseResult {
    pub fn outcome(&self) -> CaseOutcome {
        if self.client_error {
            CaseOutcome::TransportError
        } else if (200..300).contains(&self.status_code) {
            CaseOutcome::Success
        } else {
            CaseOutcome::ServerError
        }
    }

    /// Empty result for a case, before anything is known
    pub(crate) fn blank(run_number: usize, input: &str, category: Category, http_latency_ms: f64) -> Self {
        Self {
            run_number,
            input: input.to_string(),
            category,
            http_latency_ms,
            total_case_ms: http_latency_ms,
            sleep_ms: 0.0,
            faq_hit: false,
            debug_branch: None,
            retrieval_score: None,
            candidates_count: None,
            retrieval_stage: None,
            normalized_input: None,
            chosen_faq_id: None,
            selector_called: false,
            selector_signal: None,
            response_text: None,
            status_code: 0,
            client_error: false,
            error_kind: None,
            error_message: None,
            body_snippet: None,
            header_snippet: Vec::new(),
            timings: StageTimings::default(),
        }
    }
}

/// Runs single cases against a transport
pub struct QueryExecutor<'a> {
    transport: &'a dyn QueryTransport,
    config: &'a HarnessConfig,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(transport: &'a dyn QueryTransport, config: &'a HarnessConfig) -> Self {
        Self { transport, config }
    }

    /// Execute one case. Never fails; transport problems are captured on the result.
    pub async fn execute(&self, input: &str, category: Category, run_number: usize) -> CaseResult {
        let (outcome, elapsed) =
            measure_async(self.transport.send(&self.config.tenant_id, input)).await;
        let http_latency_ms = elapsed.as_secs_f64() * 1000.0;

        let result = match outcome {
            Ok(raw) => self.interpret(&raw, input, category, run_number, http_latency_ms),
            Err(failure) => Self::from_failure(failure, input, category, run_number, http_latency_ms),
        };

        tracing::debug!(
            run = run_number,
            category = category.name(),
            status = result.status_code,
            faq_hit = result.faq_hit,
            selector = result.selector_called,
            latency_ms = result.http_latency_ms,
            "case executed"
        );

        result
    }

    fn interpret(
        &self,
        raw: &RawResponse,
        input: &str,
        category: Category,
        run_number: usize,
        http_latency_ms: f64,
    ) -> CaseResult {
        let view = ResponseView::new(raw);
        let mut result = CaseResult::blank(run_number, input, category, http_latency_ms);

        result.status_code = raw.status;
        result.faq_hit = view.resolve_bool(&extract::FAQ_HIT).unwrap_or(false);
        result.debug_branch = view.resolve_string(&extract::DEBUG_BRANCH);
        result.retrieval_score = view.resolve_f64(&extract::RETRIEVAL_SCORE);
        result.candidates_count = view.resolve_u64(&extract::CANDIDATES_COUNT);
        result.retrieval_stage = view.resolve_string(&extract::RETRIEVAL_STAGE);
        result.normalized_input = view.resolve_string(&extract::NORMALIZED_INPUT);
        result.chosen_faq_id = view.resolve_string(&extract::CHOSEN_FAQ_ID);

        let (selector_called, signal) = view.resolve_selector();
        result.selector_called = selector_called;
        result.selector_signal = signal;

        // Header-only variants may answer in a plain-text body
        result.response_text = view
            .resolve_string(&extract::ANSWER_TEXT)
            .or_else(|| (!view.has_json_body() && !raw.body.is_empty()).then(|| raw.body.clone()))
            .map(|t| snippet(&t, BODY_SNIPPET_CHARS));

        if self.config.capture_timing {
            result.timings = view.stage_timings();
        }

        if !raw.is_success() {
            result.body_snippet = Some(snippet(&raw.body, BODY_SNIPPET_CHARS));
            result.header_snippet = header_lines(&raw.headers);
        }

        result
    }

    fn from_failure(
        failure: TransportFailure,
        input: &str,
        category: Category,
        run_number: usize,
        http_latency_ms: f64,
    ) -> CaseResult {
        tracing::warn!(
            run = run_number,
            kind = %failure.kind,
            "transport failure: {}",
            failure.message
        );

        let mut result = CaseResult::blank(run_number, input, category, http_latency_ms);
        result.client_error = true;
        result.status_code = failure.status.unwrap_or(0);
        result.error_kind = Some(failure.kind);
        result.error_message = Some(failure.message);
        result.body_snippet = failure
            .partial_body
            .as_deref()
            .map(|b| snippet(b, BODY_SNIPPET_CHARS));
        result.header_snippet = header_lines(&failure.headers);
        result
    }
}
