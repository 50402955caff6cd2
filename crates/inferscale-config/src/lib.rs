//! inferscale-config — per-model scaling policy.
//!
//! The decision engine consults one narrow interface per cycle: given a
//! model identifier, is scale-to-zero enabled and how long must a workload
//! stay warm after load drops to zero. Policy lives outside the engine
//! (typically a mounted config file) and is pulled once at the start of
//! each evaluation cycle; there is no file watching or push notification
//! in the engine itself.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::Deserialize;
use tracing::{debug, warn};

/// Retention period applied when a model has no policy entry, seconds.
pub const DEFAULT_RETENTION_SECS: u64 = 300;

/// Scaling policy for one model identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelConfig {
    /// Whether the model's workloads may be reduced to zero replicas.
    pub enable_scale_to_zero: bool,
    /// Minimum time a workload stays at >= 1 replica after load drops to
    /// zero, seconds. Also the bootstrap grace window after (re)creation.
    pub retention_period_secs: u64,
}

impl Default for ModelConfig {
    /// Policy applied when a model has no entry: never scale to zero.
    fn default() -> Self {
        Self {
            enable_scale_to_zero: false,
            retention_period_secs: DEFAULT_RETENTION_SECS,
        }
    }
}

/// Read-only source of per-model scaling policy.
///
/// `refresh` is called once at the start of each evaluation cycle; a
/// failed refresh keeps the previously loaded entries so one bad read
/// never blocks a cycle.
pub trait ConfigProvider: Send + Sync {
    /// Re-read the backing data. Default is a no-op for in-memory sources.
    fn refresh(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Policy for the given model; absent entries yield the default.
    fn model_config(&self, model_id: &str) -> ModelConfig;
}

// ── Static provider ───────────────────────────────────────────────

/// Fixed in-memory policy table (tests, or deployments without a file).
#[derive(Default)]
pub struct StaticConfigProvider {
    entries: RwLock<HashMap<String, ModelConfig>>,
}

impl StaticConfigProvider {
    pub fn new(entries: HashMap<String, ModelConfig>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Insert or replace a model entry.
    pub fn set(&self, model_id: &str, config: ModelConfig) {
        self.entries
            .write()
            .expect("policy table lock poisoned")
            .insert(model_id.to_string(), config);
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn model_config(&self, model_id: &str) -> ModelConfig {
        self.entries
            .read()
            .expect("policy table lock poisoned")
            .get(model_id)
            .copied()
            .unwrap_or_default()
    }
}

// ── File provider ─────────────────────────────────────────────────

/// TOML file layout:
///
/// ```toml
/// [models."llama-3-70b"]
/// enable_scale_to_zero = true
/// retention_period = "4m"
/// ```
#[derive(Debug, Deserialize, Default)]
struct PolicyFile {
    #[serde(default)]
    models: HashMap<String, PolicyEntry>,
}

#[derive(Debug, Deserialize)]
struct PolicyEntry {
    #[serde(default)]
    enable_scale_to_zero: bool,
    retention_period: Option<String>,
}

/// Policy provider backed by a TOML file, re-read on each `refresh`.
pub struct FileConfigProvider {
    path: PathBuf,
    entries: RwLock<HashMap<String, ModelConfig>>,
}

impl FileConfigProvider {
    /// Create a provider for the given path and load it once.
    ///
    /// A missing or unreadable file is not fatal: the provider starts
    /// empty and every model gets the default policy until a refresh
    /// succeeds.
    pub fn new(path: &Path) -> Self {
        let provider = Self {
            path: path.to_path_buf(),
            entries: RwLock::new(HashMap::new()),
        };
        if let Err(e) = provider.refresh() {
            warn!(path = ?provider.path, error = %e, "initial policy load failed; using defaults");
        }
        provider
    }

    fn parse(content: &str) -> anyhow::Result<HashMap<String, ModelConfig>> {
        let file: PolicyFile = toml::from_str(content)?;
        let mut entries = HashMap::new();
        for (model_id, entry) in file.models {
            let retention_period_secs = entry
                .retention_period
                .as_deref()
                .map(parse_duration_secs)
                .unwrap_or(DEFAULT_RETENTION_SECS);
            entries.insert(
                model_id,
                ModelConfig {
                    enable_scale_to_zero: entry.enable_scale_to_zero,
                    retention_period_secs,
                },
            );
        }
        Ok(entries)
    }
}

impl ConfigProvider for FileConfigProvider {
    fn refresh(&self) -> anyhow::Result<()> {
        let content = std::fs::read_to_string(&self.path)?;
        let parsed = Self::parse(&content)?;
        let mut entries = self.entries.write().expect("policy table lock poisoned");
        *entries = parsed;
        debug!(path = ?self.path, models = entries.len(), "scaling policy refreshed");
        Ok(())
    }

    fn model_config(&self, model_id: &str) -> ModelConfig {
        self.entries
            .read()
            .expect("policy table lock poisoned")
            .get(model_id)
            .copied()
            .unwrap_or_default()
    }
}

/// Parse a duration string like "30s", "4m", "1h" into seconds.
pub fn parse_duration_secs(s: &str) -> u64 {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().unwrap_or(DEFAULT_RETENTION_SECS)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().unwrap_or(5) * 60
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.parse::<u64>().unwrap_or(1) * 3600
    } else {
        s.parse::<u64>().unwrap_or(DEFAULT_RETENTION_SECS)
    }
}
