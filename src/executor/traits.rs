//! Transport trait abstraction
//!
//! Separates issuing the diagnostic request from interpreting its answer, so the extraction
//! and classification logic runs the same against the HTTP backend and scripted test
//! endpoints.

use std::time::Duration;

/// Maximum characters of a response body kept in a result
pub const BODY_SNIPPET_CHARS: usize = 500;

/// Maximum response header lines kept in a result
pub const HEADER_SNIPPET_LINES: usize = 30;

/// A response that arrived with an HTTP status
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Header name/value pairs, names lowercased, in arrival order
    pub headers: Vec<(String, String)>,
    /// Full response body as text
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header (name matched case-insensitively)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A request that failed below the HTTP layer (timeout, refused, reset, unreadable body)
#[derive(Debug, Clone, Default)]
pub struct TransportFailure {
    /// Failure class (e.g., "Timeout", "ConnectError")
    pub kind: String,
    /// Human-readable message
    pub message: String,
    /// Status, if one was received before the failure
    pub status: Option<u16>,
    /// Headers received before the failure
    pub headers: Vec<(String, String)>,
    /// Any body text received before the failure
    pub partial_body: Option<String>,
}

impl TransportFailure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Unified trait for endpoint transports
///
/// Implementations issue exactly one request per call and never retry; a failed case is
/// recorded once so error and latency characteristics are not masked.
#[async_trait::async_trait]
pub trait QueryTransport: Send + Sync {
    /// Short name for logs and reports
    fn name(&self) -> &str;

    /// Send one diagnostic query for a tenant
    async fn send(&self, tenant_id: &str, message: &str) -> Result<RawResponse, TransportFailure>;
}

/// Helper to measure duration of an async operation
pub async fn measure_async<F, T>(f: F) -> (T, Duration)
where
    F: std::future::Future<Output = T>,
{
    let start = std::time::Instant::now();
    let result = f.await;
    let duration = start.elapsed();
    (result, duration)
}

/// First `max_chars` characters of `text` (char-boundary safe)
pub fn snippet(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// First `HEADER_SNIPPET_LINES` headers as "name: value" lines
pub fn header_lines(headers: &[(String, String)]) -> Vec<String> {
    headers
        .iter()
        .take(HEADER_SNIPPET_LINES)
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_case_insensitive() {
        let response = RawResponse::new(200).with_header("X-Faq-Hit", "true");
        assert_eq!(response.header("x-faq-hit"), Some("true"));
        assert_eq!(response.header("X-FAQ-HIT"), Some("true"));
        assert_eq!(response.header("x-missing"), None);
    }

    #[test]
    fn test_snippet_respects_char_boundaries() {
        let text = "é".repeat(600);
        let s = snippet(&text, BODY_SNIPPET_CHARS);
        assert_eq!(s.chars().count(), 500);
    }

    #[test]
    fn test_header_lines_bounded() {
        let headers: Vec<(String, String)> = (0..50)
            .map(|i| (format!("x-h{}", i), i.to_string()))
            .collect();
        let lines = header_lines(&headers);
        assert_eq!(lines.len(), HEADER_SNIPPET_LINES);
        assert_eq!(lines[0], "x-h0: 0");
    }

    #[test]
    fn test_is_success() {
        assert!(RawResponse::new(200).is_success());
        assert!(RawResponse::new(204).is_success());
        assert!(!RawResponse::new(500).is_success());
        assert!(!RawResponse::new(0).is_success());
    }
}
