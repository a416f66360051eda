use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterConfig {
    /// Host runs sandboxed; integrations that are not sandbox-compatible are skipped
    #[serde(default)]
    pub sandboxed: bool,
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Domains offered as fuzzy-match suggestions when resolving browse targets
    #[serde(default = "default_known_domains")]
    pub known_domains: Vec<String>,
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
}

fn default_locale() -> String {
    "pl-PL".to_string()
}

fn default_known_domains() -> Vec<String> {
    [
        "onet.pl", "wp.pl", "interia.pl", "allegro.pl", "wikipedia.org",
        "github.com", "google.com", "youtube.com", "reddit.com", "bbc.com",
    ]
    .iter()
    .map(|d| d.to_string())
    .collect()
}

fn default_fuzzy_threshold() -> f64 {
    0.55
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            sandboxed: false,
            locale: default_locale(),
            known_domains: default_known_domains(),
            fuzzy_threshold: default_fuzzy_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchConfig {
    /// Intents that start an automatic watch after a successful query
    #[serde(default = "default_watchable_intents")]
    pub watchable_intents: Vec<String>,
    #[serde(default = "default_max_active_watches")]
    pub max_active_watches: usize,
    #[serde(default = "default_duration_secs")]
    pub default_duration_secs: u64,
    /// Floor applied to every poll interval
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_interval_ms")]
    pub default_interval_ms: u64,
    /// Per-intent poll interval overrides
    #[serde(default = "default_poll_intervals")]
    pub poll_intervals: HashMap<String, u64>,
}

fn default_watchable_intents() -> Vec<String> {
    ["browse", "camera:describe", "iot:read", "network:scan"]
        .iter()
        .map(|i| i.to_string())
        .collect()
}

fn default_max_active_watches() -> usize {
    20
}

fn default_duration_secs() -> u64 {
    60 * 60 // 1 hour
}

fn default_min_interval_ms() -> u64 {
    1_000
}

fn default_interval_ms() -> u64 {
    60_000
}

fn default_poll_intervals() -> HashMap<String, u64> {
    let mut intervals = HashMap::new();
    intervals.insert("browse".to_string(), 300_000);
    intervals.insert("camera:describe".to_string(), 3_000);
    intervals.insert("iot:read".to_string(), 30_000);
    intervals.insert("network:scan".to_string(), 120_000);
    intervals
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            watchable_intents: default_watchable_intents(),
            max_active_watches: default_max_active_watches(),
            default_duration_secs: default_duration_secs(),
            min_interval_ms: default_min_interval_ms(),
            default_interval_ms: default_interval_ms(),
            poll_intervals: default_poll_intervals(),
        }
    }
}

impl WatchConfig {
    pub fn is_watchable(&self, intent: &str) -> bool {
        self.watchable_intents.iter().any(|i| i == intent)
    }

    /// Per-intent interval (or the default), never below the floor.
    pub fn interval_for(&self, intent: &str) -> u64 {
        let interval = self
            .poll_intervals
            .get(intent)
            .copied()
            .unwrap_or(self.default_interval_ms);
        self.clamp_interval(interval)
    }

    /// Applies the configured floor; a zero floor still yields at least 1ms.
    pub fn clamp_interval(&self, interval_ms: u64) -> u64 {
        interval_ms.max(self.min_interval_ms).max(1)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintAlgorithm {
    #[default]
    Sha256,
    Rolling,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcilerConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Minimum change ratio that produces a change record
    #[serde(default = "default_change_threshold")]
    pub change_threshold: f64,
    #[serde(default = "default_max_snapshot_chars")]
    pub max_snapshot_chars: usize,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
    #[serde(default)]
    pub fingerprint: FingerprintAlgorithm,
}

fn default_tick_interval_ms() -> u64 {
    5_000
}

fn default_change_threshold() -> f64 {
    0.15
}

fn default_max_snapshot_chars() -> usize {
    10_000
}

fn default_preview_chars() -> usize {
    200
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            change_threshold: default_change_threshold(),
            max_snapshot_chars: default_max_snapshot_chars(),
            preview_chars: default_preview_chars(),
            fingerprint: FingerprintAlgorithm::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}
