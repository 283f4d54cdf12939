//! Dual-channel diagnostic extraction
//!
//! Two endpoint variants answer the same query differently: one returns rich diagnostics in a
//! JSON body, the other only exposes them as response headers. Every field is described by an
//! ordered list of `FieldSource`s and resolved the same way, so both variants feed one pipeline.
//!
//! `selector_called` is the exception: it uses a fixed three-tier order where the first tier
//! that yields a signal wins and later tiers never override it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::traits::RawResponse;

/// One place a diagnostic value may live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// JSON pointer into the response body (e.g., "/debug/faq_hit")
    Body(&'static str),
    /// Response header name (lowercase)
    Header(&'static str),
}

/// Declarative, ordered resolver for one field
#[derive(Debug, Clone, Copy)]
pub struct FieldResolver {
    pub name: &'static str,
    pub sources: &'static [FieldSource],
}

pub const FAQ_HIT: FieldResolver = FieldResolver {
    name: "faq_hit",
    sources: &[
        FieldSource::Body("/faq_hit"),
        FieldSource::Body("/debug/faq_hit"),
        FieldSource::Header("x-faq-hit"),
    ],
};

pub const DEBUG_BRANCH: FieldResolver = FieldResolver {
    name: "debug_branch",
    sources: &[
        FieldSource::Body("/debug_branch"),
        FieldSource::Body("/debug/branch"),
        FieldSource::Body("/branch"),
        FieldSource::Header("x-debug-branch"),
    ],
};

pub const RETRIEVAL_SCORE: FieldResolver = FieldResolver {
    name: "retrieval_score",
    sources: &[
        FieldSource::Body("/retrieval_score"),
        FieldSource::Body("/debug/retrieval_score"),
        FieldSource::Header("x-retrieval-score"),
    ],
};

pub const CANDIDATES_COUNT: FieldResolver = FieldResolver {
    name: "candidates_count",
    sources: &[
        FieldSource::Body("/candidates_count"),
        FieldSource::Body("/debug/candidates_count"),
        FieldSource::Header("x-candidates-count"),
    ],
};

pub const RETRIEVAL_STAGE: FieldResolver = FieldResolver {
    name: "retrieval_stage",
    sources: &[
        FieldSource::Body("/retrieval_stage"),
        FieldSource::Body("/debug/retrieval_stage"),
        FieldSource::Header("x-retrieval-stage"),
    ],
};

pub const NORMALIZED_INPUT: FieldResolver = FieldResolver {
    name: "normalized_input",
    sources: &[
        FieldSource::Body("/normalized_input"),
        FieldSource::Body("/debug/normalized_input"),
        FieldSource::Header("x-normalized-input"),
    ],
};

pub const CHOSEN_FAQ_ID: FieldResolver = FieldResolver {
    name: "chosen_faq_id",
    sources: &[
        FieldSource::Body("/chosen_faq_id"),
        FieldSource::Body("/debug/chosen_faq_id"),
        FieldSource::Header("x-chosen-faq-id"),
    ],
};

pub const ANSWER_TEXT: FieldResolver = FieldResolver {
    name: "answer_text",
    sources: &[FieldSource::Body("/response"), FieldSource::Body("/answer")],
};

/// Tier 1: explicit boolean header
pub const SELECTOR_HEADER: &str = "x-selector-called";
/// Tier 2: pipeline stage header, inspected for `SELECTOR_STAGE_MARKER`
pub const PIPELINE_STAGE_HEADER: &str = "x-pipeline-stage";
pub const SELECTOR_STAGE_MARKER: &str = "selector";
/// Tier 3: legacy body field
pub const SELECTOR_LEGACY: FieldResolver = FieldResolver {
    name: "selector_called",
    sources: &[
        FieldSource::Body("/selector_called"),
        FieldSource::Body("/debug/selector_called"),
    ],
};

/// Millisecond stage timings, header name per field
pub const STAGE_TIMING_HEADERS: [(&str, &str); 6] = [
    ("embed_ms", "x-timing-embed-ms"),
    ("retrieval_ms", "x-timing-retrieval-ms"),
    ("rerank_ms", "x-timing-rerank-ms"),
    ("selector_ms", "x-timing-selector-ms"),
    ("generation_ms", "x-timing-generation-ms"),
    ("server_total_ms", "x-timing-total-ms"),
];
pub const CACHE_HIT_HEADER: &str = "x-cache-hit";

/// A response prepared for field resolution
pub struct ResponseView<'a> {
    body: Option<Value>,
    raw: &'a RawResponse,
}

impl<'a> ResponseView<'a> {
    /// Parse the body as JSON if possible; a non-JSON body simply has no body fields.
    pub fn new(raw: &'a RawResponse) -> Self {
        let body = serde_json::from_str::<Value>(&raw.body)
            .ok()
            .filter(|v| v.is_object());
        Self { body, raw }
    }

    pub fn has_json_body(&self) -> bool {
        self.body.is_some()
    }

    fn lookup(&self, source: FieldSource) -> Option<Value> {
        match source {
            FieldSource::Body(pointer) => self
                .body
                .as_ref()
                .and_then(|b| b.pointer(pointer))
                .filter(|v| !v.is_null())
                .cloned(),
            FieldSource::Header(name) => self
                .raw
                .header(name)
                .map(|v| Value::String(v.trim().to_string())),
        }
    }

    /// First source that yields a value convertible by `convert`
    fn resolve_with<T>(&self, resolver: &FieldResolver, convert: impl Fn(&Value) -> Option<T>) -> Option<T> {
        resolver
            .sources
            .iter()
            .find_map(|&source| self.lookup(source).as_ref().and_then(&convert))
    }

    pub fn resolve_bool(&self, resolver: &FieldResolver) -> Option<bool> {
        self.resolve_with(resolver, value_as_bool)
    }

    pub fn resolve_f64(&self, resolver: &FieldResolver) -> Option<f64> {
        self.resolve_with(resolver, value_as_f64)
    }

    pub fn resolve_u64(&self, resolver: &FieldResolver) -> Option<u64> {
        self.resolve_with(resolver, |v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn resolve_string(&self, resolver: &FieldResolver) -> Option<String> {
        self.resolve_with(resolver, |v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    /// Resolve `selector_called` through its three tiers.
    pub fn resolve_selector(&self) -> (bool, Option<SelectorSignal>) {
        if let Some(called) = self.raw.header(SELECTOR_HEADER).and_then(parse_bool) {
            return (called, Some(SelectorSignal::Header));
        }

        if let Some(stage) = self.raw.header(PIPELINE_STAGE_HEADER) {
            if !stage.trim().is_empty() {
                let called = stage.to_ascii_lowercase().contains(SELECTOR_STAGE_MARKER);
                return (called, Some(SelectorSignal::PipelineStage));
            }
        }

        if let Some(called) = self.resolve_bool(&SELECTOR_LEGACY) {
            return (called, Some(SelectorSignal::BodyLegacy));
        }

        (false, None)
    }

    /// Parse stage timing headers. Absent or non-numeric headers stay `None`.
    pub fn stage_timings(&self) -> StageTimings {
        let ms = |field: &str| {
            STAGE_TIMING_HEADERS
                .iter()
                .find(|(f, _)| *f == field)
                .and_then(|(_, header)| self.raw.header(header))
                .and_then(parse_ms)
        };

        StageTimings {
            embed_ms: ms("embed_ms"),
            retrieval_ms: ms("retrieval_ms"),
            rerank_ms: ms("rerank_ms"),
            selector_ms: ms("selector_ms"),
            generation_ms: ms("generation_ms"),
            server_total_ms: ms("server_total_ms"),
            cache_hit: self.raw.header(CACHE_HIT_HEADER).and_then(parse_bool),
        }
    }
}

/// Which tier decided `selector_called`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorSignal {
    Header,
    PipelineStage,
    BodyLegacy,
}

/// Server-reported stage timings
///
/// `None` means "not measured", which is distinct from a measured zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    pub embed_ms: Option<f64>,
    pub retrieval_ms: Option<f64>,
    pub rerank_ms: Option<f64>,
    pub selector_ms: Option<f64>,
    pub generation_ms: Option<f64>,
    pub server_total_ms: Option<f64>,
    pub cache_hit: Option<bool>,
}

pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Non-negative finite milliseconds
fn parse_ms(s: &str) -> Option<f64> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

fn value_as_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        Value::String(s) => parse_bool(s),
        _ => None,
    }
}

fn value_as_f64(v: &Value) -> Option<f64> {
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}
