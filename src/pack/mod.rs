//! Confidence packs: categorized benchmark inputs
//!
//! A pack holds three input lists, one per expected behavior of the endpoint:
//!
//! - `should_hit` - inputs that must produce a confident, correct match
//! - `should_miss` - inputs that must produce no match (a match is a wrong hit)
//! - `edge_unclear` - ambiguous inputs that should trigger a clarification
//!
//! ## Pack File Format (JSON)
//!
//! ```json
//! {
//!   "should_hit": ["what are your opening hours", "how do I reset my password"],
//!   "should_miss": ["what is the airspeed of a swallow"],
//!   "edge_unclear": ["hours"]
//! }
//! ```
//!
//! Missing categories are treated as empty, but the pack as a whole must hold at least one input.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};

/// Expected behavior of an input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ShouldHit,
    ShouldMiss,
    EdgeUnclear,
}

impl Category {
    /// Sweep order. Only affects progress reporting, never metrics.
    pub const ALL: [Category; 3] = [Self::ShouldHit, Self::ShouldMiss, Self::EdgeUnclear];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ShouldHit => "should_hit",
            Self::ShouldMiss => "should_miss",
            Self::EdgeUnclear => "edge_unclear",
        }
    }

}

/// A complete test pack that can be loaded from JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestPack {
    #[serde(default)]
    pub should_hit: Vec<String>,
    #[serde(default)]
    pub should_miss: Vec<String>,
    #[serde(default)]
    pub edge_unclear: Vec<String>,
    /// Set on generated packs; such a pack never loads for a run
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub placeholder: bool,
}

/// Where a pack came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackSource {
    /// Path given explicitly on the command line
    Explicit(PathBuf),
    /// Tenant-keyed conventional location
    Tenant(PathBuf),
}

impl PackSource {
    pub fn path(&self) -> &Path {
        match self {
            Self::Explicit(p) | Self::Tenant(p) => p,
        }
    }
}

impl TestPack {
    /// Load and validate a pack from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::config(format!("Failed to read test pack {}: {}", path.display(), e))
        })?;

        let pack: TestPack = serde_json::from_str(&content).map_err(|e| {
            HarnessError::config(format!(
                "Malformed test pack {} (each category must be a list of strings): {}",
                path.display(),
                e
            ))
        })?;

        pack.validate()
            .map_err(|e| HarnessError::config(format!("Invalid test pack {}: {}", path.display(), e)))?;

        Ok(pack)
    }

    /// Resolve the pack for a run.
    ///
    /// An explicit path is loaded as-is. Without one, the tenant-keyed location under
    /// `packs_dir` is used. When that is also absent a placeholder is written there and the
    /// call still fails, so a generated pack can never gate a release.
    pub fn resolve(explicit: Option<&Path>, config: &HarnessConfig) -> Result<(Self, PackSource)> {
        config.validate_tenant()?;

        if let Some(path) = explicit {
            let pack = Self::load(path)?;
            return Ok((pack, PackSource::Explicit(path.to_path_buf())));
        }

        let tenant_path = config.tenant_pack_path();
        if tenant_path.exists() {
            let pack = Self::load(&tenant_path)?;
            return Ok((pack, PackSource::Tenant(tenant_path)));
        }

        let placeholder = Self::placeholder(&config.tenant_id);
        match placeholder.save(&tenant_path) {
            Ok(()) => {
                tracing::warn!(path = %tenant_path.display(), "wrote placeholder test pack");
                Err(HarnessError::config(format!(
                    "No test pack for tenant '{}'. A placeholder was written to {}; replace its contents and re-run",
                    config.tenant_id,
                    tenant_path.display()
                )))
            }
            Err(e) => Err(HarnessError::config(format!(
                "No test pack for tenant '{}' and the placeholder could not be written: {}",
                config.tenant_id, e
            ))),
        }
    }

    /// Minimal pack with one obviously-generated input per category
    pub fn placeholder(tenant_id: &str) -> Self {
        Self {
            should_hit: vec![format!("PLACEHOLDER: a question {} answers", tenant_id)],
            should_miss: vec!["PLACEHOLDER: a question nobody answers".to_string()],
            edge_unclear: vec!["PLACEHOLDER: an ambiguous one-word question".to_string()],
            placeholder: true,
        }
    }

    /// Save pack to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| HarnessError::Persist {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        std::fs::write(path, content).map_err(|source| HarnessError::Persist {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check structural invariants
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.placeholder {
            return Err("generated placeholder; replace its inputs and remove `\"placeholder\": true`".to_string());
        }
        if self.total_cases() == 0 {
            return Err("pack contains no inputs".to_string());
        }
        for category in Category::ALL {
            if let Some(i) = self.inputs(category).iter().position(|s| s.trim().is_empty()) {
                return Err(format!("{}[{}] is empty", category.name(), i));
            }
        }
        Ok(())
    }

    pub fn inputs(&self, category: Category) -> &[String] {
        match category {
            Category::ShouldHit => &self.should_hit,
            Category::ShouldMiss => &self.should_miss,
            Category::EdgeUnclear => &self.edge_unclear,
        }
    }

    pub fn total_cases(&self) -> usize {
        self.should_hit.len() + self.should_miss.len() + self.edge_unclear.len()
    }

    /// All inputs in sweep order
    pub fn cases(&self) -> impl Iterator<Item = (Category, &str)> {
        Category::ALL
            .into_iter()
            .flat_map(move |c| self.inputs(c).iter().map(move |s| (c, s.as_str())))
    }

    /// Cycle each non-empty category until it holds at least `min_per_category` inputs.
    ///
    /// Empty categories stay empty; categories already large enough are untouched.
    pub fn scaled(&self, min_per_category: usize) -> Self {
        fn cycle(inputs: &[String], target: usize) -> Vec<String> {
            if inputs.is_empty() || inputs.len() >= target {
                return inputs.to_vec();
            }
            inputs.iter().cycle().take(target).cloned().collect()
        }

        Self {
            should_hit: cycle(&self.should_hit, min_per_category),
            should_miss: cycle(&self.should_miss, min_per_category),
            edge_unclear: cycle(&self.edge_unclear, min_per_category),
            placeholder: self.placeholder,
        }
    }

    /// SHA-256 of the canonical pack content (hex)
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for category in Category::ALL {
            hasher.update(category.name());
            for input in self.inputs(category) {
                hasher.update([0u8]);
                hasher.update(input);
            }
            hasher.update([1u8]);
        }
        format!("{:x}", hasher.finalize())
    }
}
