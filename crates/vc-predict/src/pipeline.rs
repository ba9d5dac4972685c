use std::time::Instant;

use vc_core::config::EngineConfig;
use vc_core::frame::{FeatureFrame, PredictionSample};

use crate::classifier::Classifier;
use crate::history::PredictionHistory;
use crate::window::FeatureWindow;

/// Emitted when there is no confident signal: window below minimum, or no
/// classifier loaded. Not an error, and never recorded in the history.
pub const NEUTRAL_PREDICTION: f32 = 0.5;

/// Sliding-window inference over admitted feature frames.
///
/// Frames gated by the silence floor fill a bounded window; on each
/// inference tick the classifier runs ONCE against the column-wise mean of
/// the window. Averaging before inference (rather than averaging per-frame
/// predictions afterwards) trades responsiveness for stability and is the
/// intended numeric design, not an approximation.
pub struct PredictionPipeline {
    window: FeatureWindow,
    history: PredictionHistory,
    classifier: Option<Box<dyn Classifier>>,
    silence_floor: f32,
    min_frames: usize,
    interval: std::time::Duration,
    last_tick: Instant,
    seq: u64,
    latest: f32,
}

impl PredictionPipeline {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            window: FeatureWindow::new(config.window_capacity),
            history: PredictionHistory::new(config.history_capacity),
            classifier: None,
            silence_floor: config.silence_floor,
            min_frames: config.min_window_frames,
            interval: config.prediction_interval(),
            last_tick: Instant::now(),
            seq: 0,
            latest: NEUTRAL_PREDICTION,
        }
    }

    /// Install (or replace) the classifier.
    pub fn set_classifier(&mut self, classifier: Box<dyn Classifier>) {
        self.classifier = Some(classifier);
    }

    /// `true` once a classifier is available. Its absence is a valid state:
    /// ticks emit the neutral prediction until a model is loaded.
    #[must_use]
    pub fn classifier_ready(&self) -> bool {
        self.classifier.is_some()
    }

    /// Admit one feature frame.
    ///
    /// Frames whose loudness is below the silence floor are dropped
    /// entirely: not buffered, not counted.
    pub fn on_feature_frame(&mut self, frame: &FeatureFrame) {
        if frame.loudness >= self.silence_floor {
            self.window.push(*frame);
        }
    }

    /// Interval-gated inference: runs one tick when the configured period
    /// has elapsed, otherwise does nothing.
    pub fn poll(&mut self) -> Option<PredictionSample> {
        if self.last_tick.elapsed() < self.interval {
            return None;
        }
        self.last_tick = Instant::now();
        Some(self.tick())
    }

    /// Run one inference against the current window.
    ///
    /// With at least `min_frames` admitted frames and a classifier loaded,
    /// the classifier is invoked once with the windowed mean vector and the
    /// result is appended to the history. Otherwise the neutral prediction
    /// is emitted and nothing is recorded.
    pub fn tick(&mut self) -> PredictionSample {
        let value = match (&self.classifier, self.window.mean_vector()) {
            (Some(classifier), Some(mean)) if self.window.len() >= self.min_frames => {
                let raw = classifier.predict(&mean);
                if raw.is_finite() {
                    raw.clamp(0.0, 1.0)
                } else {
                    log::warn!("Classifier produced a non-finite score; emitting neutral");
                    NEUTRAL_PREDICTION
                }
            }
            _ => NEUTRAL_PREDICTION,
        };

        let sample = PredictionSample {
            value,
            seq: self.seq,
        };
        self.seq += 1;
        self.latest = value;

        if (value - NEUTRAL_PREDICTION).abs() > f32::EPSILON {
            self.history.push(sample);
        }
        sample
    }

    /// Empty the feature window. The prediction history is untouched.
    pub fn clear_buffer(&mut self) {
        self.window.clear();
    }

    /// Remove the `k` oldest history entries; returns how many were removed.
    pub fn purge_history(&mut self, k: usize) -> usize {
        self.history.purge_oldest(k)
    }

    /// Most recently emitted value (neutral included).
    #[must_use]
    pub fn latest(&self) -> f32 {
        self.latest
    }

    #[must_use]
    pub fn history(&self) -> &PredictionHistory {
        &self.history
    }

    /// Current window occupancy.
    #[must_use]
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Configured window capacity M.
    #[must_use]
    pub fn window_capacity(&self) -> usize {
        self.window.capacity()
    }
}
