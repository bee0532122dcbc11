use std::{env, fs, path::PathBuf, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

fn default_watch_dir() -> PathBuf {
    dirs_fallback_watch_dir()
}

fn dirs_fallback_watch_dir() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Pictures/Screenshots")
}

fn default_extensions() -> Vec<String> {
    vec![".png".into(), ".jpg".into(), ".jpeg".into()]
}

fn default_language() -> String {
    "eng".into()
}

fn default_bulk_workers() -> usize {
    2
}

fn default_debounce_window_ms() -> u64 {
    2_000
}

fn default_debounce_retention_ms() -> u64 {
    60_000
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_event_capacity() -> usize {
    256
}

/// Source that produced the pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
}

/// Top-level pipeline settings. Use these to point the watcher at a
/// directory, tune debounce behaviour, and size the bulk worker pool.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory observed for new screenshots. Created at startup when
    /// missing.
    pub watch_dir: PathBuf,
    /// Extension allow-list, matched as a case-insensitive suffix.
    pub extensions: Vec<String>,
    /// Language passed to the tesseract CLI.
    pub ocr_language: String,
    /// Number of concurrent workers during the startup bulk phase. Steady
    /// state always reduces to a single consumer.
    pub bulk_workers: usize,
    /// Duplicate creation notifications for one path inside this window are
    /// discarded.
    pub debounce_window_ms: u64,
    /// Debounce registry entries older than this are purged opportunistically.
    pub debounce_retention_ms: u64,
    /// Wait after a creation event before reading the file, so partially
    /// written screenshots settle.
    pub settle_delay_ms: u64,
    /// Per-subscriber event buffer; a subscriber lagging past this loses the
    /// oldest events.
    pub event_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            watch_dir: default_watch_dir(),
            extensions: default_extensions(),
            ocr_language: default_language(),
            bulk_workers: default_bulk_workers(),
            debounce_window_ms: default_debounce_window_ms(),
            debounce_retention_ms: default_debounce_retention_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration overrides using environment variables.
    /// Evaluation order:
    /// 1) `$SCRY_CONFIG_PATH` (JSON file),
    /// 2) `$SCRY_CONFIG_JSON` (inline JSON),
    /// 3) defaults if neither is set.
    pub fn load_from_env() -> anyhow::Result<(Self, ConfigSource)> {
        if let Ok(path_str) = env::var("SCRY_CONFIG_PATH") {
            if !path_str.trim().is_empty() {
                let path = PathBuf::from(path_str);
                let raw = fs::read_to_string(&path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                let config: Self = serde_json::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?;
                return Ok((config, ConfigSource::EnvPath(path)));
            }
        }

        if let Ok(inline) = env::var("SCRY_CONFIG_JSON") {
            if !inline.trim().is_empty() {
                let config: Self =
                    serde_json::from_str(&inline).context("parsing SCRY_CONFIG_JSON")?;
                return Ok((config, ConfigSource::EnvInline));
            }
        }

        Ok((Self::default(), ConfigSource::Default))
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    pub fn debounce_retention(&self) -> Duration {
        Duration::from_millis(self.debounce_retention_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Case-insensitive suffix match against the allow-list.
    pub fn matches_extension(&self, path: &std::path::Path) -> bool {
        let lowered = path.to_string_lossy().to_lowercase();
        self.extensions
            .iter()
            .any(|ext| lowered.ends_with(&ext.to_lowercase()))
    }
}
