//! HTTP transport for the endpoint under test
//!
//! Issues one `POST {base_url}{path}` per case with a bearer credential and a JSON body
//! `{"tenant_id": ..., "message": ...}`. Transport-level problems are classified and returned
//! as `TransportFailure`; they never panic and never retry.

use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::traits::{QueryTransport, RawResponse, TransportFailure};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};

/// Request body for the diagnostic query endpoint
#[derive(Debug, Clone, Serialize)]
struct QueryRequest<'a> {
    tenant_id: &'a str,
    message: &'a str,
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: Client,
    url: String,
    token: String,
}

impl HttpTransport {
    /// Build a transport from the harness config and an already-resolved credential
    pub fn new(config: &HarnessConfig, token: String) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(HarnessError::config("API credential is empty"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.endpoint.url(),
            token,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Map a reqwest error onto a failure class
fn classify(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "Timeout"
    } else if err.is_connect() {
        "ConnectError"
    } else if err.is_body() || err.is_decode() {
        "BodyError"
    } else if err.is_redirect() {
        "RedirectError"
    } else {
        "RequestError"
    }
}

fn collect_headers(headers: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_ascii_lowercase(),
                String::from_utf8_lossy(v.as_bytes()).into_owned(),
            )
        })
        .collect()
}

#[async_trait::async_trait]
impl QueryTransport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, tenant_id: &str, message: &str) -> std::result::Result<RawResponse, TransportFailure> {
        let request = QueryRequest { tenant_id, message };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let mut failure = TransportFailure::new(classify(&e), e.to_string());
                failure.status = e.status().map(|s| s.as_u16());
                failure
            })?;

        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());

        // Status and headers are in hand; a body that fails mid-stream is still a transport
        // failure, but the partial response is kept for diagnosis.
        match response.text().await {
            Ok(body) => Ok(RawResponse {
                status,
                headers,
                body,
            }),
            Err(e) => Err(TransportFailure {
                kind: classify(&e).to_string(),
                message: e.to_string(),
                status: Some(status),
                headers,
                partial_body: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;

    fn config(base_url: &str) -> HarnessConfig {
        HarnessConfig {
            tenant_id: "acme".to_string(),
            endpoint: EndpointConfig {
                base_url: base_url.to_string(),
                path: "/v1/chat/debug".to_string(),
            },
            request_timeout_secs: 1,
            ..HarnessConfig::default()
        }
    }

    #[test]
    fn test_rejects_empty_token() {
        let err = HttpTransport::new(&config("http://localhost:1"), " ".to_string())
            .err()
            .unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn test_url_joined_from_config() {
        let transport = HttpTransport::new(&config("http://localhost:9/"), "t".to_string()).unwrap();
        assert_eq!(transport.url(), "http://localhost:9/v1/chat/debug");
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_failure() {
        // Port 9 (discard) is essentially never listening on loopback
        let transport = HttpTransport::new(&config("http://127.0.0.1:9"), "t".to_string()).unwrap();
        let failure = transport.send("acme", "hello").await.unwrap_err();
        assert!(!failure.kind.is_empty());
        assert!(failure.status.is_none());
    }
}
