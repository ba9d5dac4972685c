use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Engine configuration, serialisable en TOML.
///
/// Every field has a sane default so a missing or partial file still yields
/// a working engine. Consumers read values at the call site; the config is
/// pass-through state, not engine-owned state.
///
/// # Example
/// ```
/// use vc_core::config::EngineConfig;
/// let config = EngineConfig::default();
/// assert_eq!(config.block_size, 512);
/// assert_eq!(config.window_capacity, 128);
/// ```
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EngineConfig {
    // === Analysis ===
    /// Samples per analysis block (one FeatureFrame per block).
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Total-loudness floor below which frames are dropped as silence.
    #[serde(default = "default_silence_floor")]
    pub silence_floor: f32,

    // === Prediction ===
    /// Inference tick period in milliseconds (clamped to [400, 5000]).
    #[serde(default = "default_prediction_interval_ms")]
    pub prediction_interval_ms: u64,
    /// Feature window capacity M (frames retained for the windowed mean).
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
    /// Minimum admitted frames before inference yields a real prediction.
    #[serde(default = "default_min_window_frames")]
    pub min_window_frames: usize,
    /// Prediction history capacity N (oldest evicted first).
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Path to a JSON classifier model. None = classifier unavailable.
    #[serde(default)]
    pub model_path: Option<PathBuf>,

    // === Transport ===
    /// Whether scrubbing plays a short audible preview.
    #[serde(default = "default_true")]
    pub scrubber_preview: bool,
    /// Preview length in seconds for non-committing scrubs.
    #[serde(default = "default_scrub_preview_secs")]
    pub scrub_preview_secs: f64,
    /// Cooperative transport poll period in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    // === UI ===
    /// Redraw rate of the front-end.
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
}

fn default_block_size() -> usize {
    512
}
fn default_silence_floor() -> f32 {
    10.0
}
fn default_prediction_interval_ms() -> u64 {
    1000
}
fn default_window_capacity() -> usize {
    128
}
fn default_min_window_frames() -> usize {
    10
}
fn default_history_capacity() -> usize {
    125
}
fn default_scrub_preview_secs() -> f64 {
    0.3
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_target_fps() -> u32 {
    30
}

#[must_use]
pub fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            silence_floor: default_silence_floor(),
            prediction_interval_ms: default_prediction_interval_ms(),
            window_capacity: default_window_capacity(),
            min_window_frames: default_min_window_frames(),
            history_capacity: default_history_capacity(),
            model_path: None,
            scrubber_preview: true,
            scrub_preview_secs: default_scrub_preview_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            target_fps: default_target_fps(),
        }
    }
}

impl EngineConfig {
    /// Inference tick period, clamped to the supported range.
    #[must_use]
    pub fn prediction_interval(&self) -> Duration {
        Duration::from_millis(self.prediction_interval_ms.clamp(400, 5000))
    }

    /// Transport poll period.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Load a config from a TOML file.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read config file: {}", path.display()))?;
    let config: EngineConfig = toml::from_str(&text)
        .with_context(|| format!("Invalid config file: {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.prediction_interval_ms, 1000);
        assert_eq!(config.min_window_frames, 10);
        assert_eq!(config.history_capacity, 125);
        assert!(config.scrubber_preview);
        assert!((config.scrub_preview_secs - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: EngineConfig = toml::from_str("window_capacity = 64").unwrap();
        assert_eq!(config.window_capacity, 64);
        assert_eq!(config.block_size, 512);
        assert!(config.model_path.is_none());
    }

    #[test]
    fn prediction_interval_is_clamped() {
        let fast = EngineConfig {
            prediction_interval_ms: 50,
            ..EngineConfig::default()
        };
        assert_eq!(fast.prediction_interval(), Duration::from_millis(400));
        let slow = EngineConfig {
            prediction_interval_ms: 60_000,
            ..EngineConfig::default()
        };
        assert_eq!(slow.prediction_interval(), Duration::from_millis(5000));
    }
}
