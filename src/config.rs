//! Configuration for the confidence-pack harness
//!
//! Defines the `bench.toml` schema. One `HarnessConfig` is built at startup and passed by
//! reference to every component; nothing reads ambient global state after that.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HarnessError, Result};

/// Endpoint under test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL (e.g., "https://qa.example.com")
    #[serde(default)]
    pub base_url: String,

    /// Diagnostic query path appended to the base URL
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            path: default_path(),
        }
    }
}

impl EndpointConfig {
    /// Full request URL
    pub fn url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.path.starts_with('/') {
            format!("{}{}", base, self.path)
        } else {
            format!("{}/{}", base, self.path)
        }
    }
}

/// Release-readiness thresholds
///
/// These are fixed; they are carried on the config so every component sees the same values,
/// but they are never read from a config file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateThresholds {
    /// Minimum mean hit rate (percent)
    pub min_hit_rate: f64,
    /// Maximum per-run wrong-hit rate (percent)
    pub max_wrong_hit_rate: f64,
    /// Minimum mean edge-clarify rate (percent)
    pub min_edge_clarify_rate: f64,
    /// Maximum hit-rate spread across runs (percentage points)
    pub max_hit_rate_variance: f64,
    /// Maximum HTTP p50 latency (ms)
    pub max_http_p50_ms: f64,
    /// Maximum HTTP p95 latency (ms)
    pub max_http_p95_ms: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            min_hit_rate: 85.0,
            max_wrong_hit_rate: 0.0,
            min_edge_clarify_rate: 70.0,
            max_hit_rate_variance: 5.0,
            max_http_p50_ms: 2500.0,
            max_http_p95_ms: 6000.0,
        }
    }
}

/// Harness configuration loaded from TOML and overridden by CLI flags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Tenant whose pack is exercised
    #[serde(default)]
    pub tenant_id: String,

    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Bearer credential; never serialized into any artifact
    #[serde(default, skip_serializing)]
    pub api_token: Option<String>,

    /// Environment variable consulted when `api_token` is unset
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Number of full sweeps over the pack
    #[serde(default = "default_runs")]
    pub runs: usize,

    /// Fixed delay after each case (ms), excluded from gated latency
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Rewrite the result artifact every N cases
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,

    /// Per-request transport timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Parse per-stage timing headers
    #[serde(default)]
    pub capture_timing: bool,

    /// Directory for result artifacts
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directory holding tenant-keyed packs (`<tenant>.json`)
    #[serde(default = "default_packs_dir")]
    pub packs_dir: PathBuf,

    #[serde(skip)]
    pub gates: GateThresholds,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            endpoint: EndpointConfig::default(),
            api_token: None,
            token_env: default_token_env(),
            runs: default_runs(),
            pacing_ms: default_pacing_ms(),
            checkpoint_every: default_checkpoint_every(),
            request_timeout_secs: default_timeout_secs(),
            capture_timing: false,
            output_dir: default_output_dir(),
            packs_dir: default_packs_dir(),
            gates: GateThresholds::default(),
        }
    }
}

impl HarnessConfig {
    /// Load config from TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            HarnessError::config(format!("Failed to parse config {}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    /// Load from the given location if it exists, otherwise defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        Ok(Self::default())
    }

    /// Check settings that must hold before any request is issued
    pub fn validate(&self) -> Result<()> {
        self.validate_tenant()?;
        if self.endpoint.base_url.trim().is_empty() {
            return Err(HarnessError::config("endpoint.base_url is required"));
        }
        if self.runs == 0 {
            return Err(HarnessError::config("runs must be at least 1"));
        }
        if self.checkpoint_every == 0 {
            return Err(HarnessError::config("checkpoint_every must be at least 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(HarnessError::config("request_timeout_secs must be at least 1"));
        }
        Ok(())
    }

    /// The tenant id names files under `packs_dir`, so it must be a single plain path component
    pub fn validate_tenant(&self) -> Result<()> {
        let tenant = self.tenant_id.trim();
        if tenant.is_empty() {
            return Err(HarnessError::config("tenant_id is required"));
        }
        if tenant.contains(['/', '\\']) || tenant.contains("..") || tenant != self.tenant_id {
            return Err(HarnessError::config(format!(
                "tenant_id '{}' must not contain path separators, '..' or surrounding whitespace",
                self.tenant_id
            )));
        }
        Ok(())
    }

    /// Resolve the bearer credential: explicit value first, then the configured env var.
    pub fn resolve_token(&self) -> Result<String> {
        let token = self
            .api_token
            .clone()
            .or_else(|| std::env::var(&self.token_env).ok())
            .filter(|t| !t.trim().is_empty());

        token.ok_or_else(|| {
            HarnessError::config(format!(
                "No API credential: set api_token in the config or export {}",
                self.token_env
            ))
        })
    }

    /// Conventional pack location for this tenant
    pub fn tenant_pack_path(&self) -> PathBuf {
        self.packs_dir.join(format!("{}.json", self.tenant_id))
    }
}

fn default_path() -> String { "/v1/chat/debug".to_string() }
fn default_token_env() -> String { "CONFIDENCE_BENCH_TOKEN".to_string() }
fn default_runs() -> usize { 3 }
fn default_pacing_ms() -> u64 { 1000 }
fn default_checkpoint_every() -> usize { 10 }
fn default_timeout_secs() -> u64 { 30 }
fn default_output_dir() -> PathBuf { PathBuf::from("results") }
fn default_packs_dir() -> PathBuf { PathBuf::from("packs") }
