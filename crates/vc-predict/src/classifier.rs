use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Maps a feature vector to a scalar score in [0, 1].
///
/// Implementations must be cheap enough to run on the engine tick; the
/// pipeline invokes `predict` at most once per inference interval.
pub trait Classifier: Send {
    fn predict(&self, features: &[f32]) -> f32;
}

/// Errors loading a classifier model file.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Cannot read model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed model file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Model has no weights")]
    Empty,
}

/// Logistic-regression classifier over the flattened feature vector.
///
/// Loaded from a JSON file of the form
/// `{ "weights": [ ... ], "bias": 0.0 }`. Extra vector dimensions beyond
/// the weight count are ignored, missing ones contribute nothing, so a
/// model trained against an older feature layout degrades instead of
/// crashing.
#[derive(Debug, Clone, Deserialize)]
pub struct LogisticModel {
    weights: Vec<f32>,
    #[serde(default)]
    bias: f32,
}

impl LogisticModel {
    /// Parse a model from JSON text.
    ///
    /// # Errors
    /// Returns an error on malformed JSON or an empty weight vector.
    pub fn from_json(text: &str) -> Result<Self, ModelError> {
        let model: Self = serde_json::from_str(text)?;
        if model.weights.is_empty() {
            return Err(ModelError::Empty);
        }
        Ok(model)
    }

    /// Load a model from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

impl Classifier for LogisticModel {
    fn predict(&self, features: &[f32]) -> f32 {
        let z: f32 = self.bias
            + self
                .weights
                .iter()
                .zip(features)
                .map(|(w, x)| w * x)
                .sum::<f32>();
        1.0 / (1.0 + (-z).exp())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn logistic_output_is_bounded_and_monotonic() {
        let model = LogisticModel {
            weights: vec![1.0, -2.0],
            bias: 0.5,
        };
        let low = model.predict(&[-10.0, 10.0]);
        let mid = model.predict(&[0.0, 0.0]);
        let high = model.predict(&[10.0, -10.0]);
        assert!(low < mid && mid < high);
        assert!((0.0..=1.0).contains(&low));
        assert!((0.0..=1.0).contains(&high));
        // Zero input → sigmoid(bias).
        assert!((mid - 1.0 / (1.0 + (-0.5f32).exp())).abs() < 1e-6);
    }

    #[test]
    fn json_round_trip_and_validation() {
        let model = LogisticModel::from_json(r#"{ "weights": [0.1, 0.2], "bias": -1.0 }"#).unwrap();
        assert!((model.predict(&[0.0, 0.0]) - 1.0 / (1.0 + 1.0f32.exp())).abs() < 1e-6);

        // Bias defaults to zero.
        let model = LogisticModel::from_json(r#"{ "weights": [1.0] }"#).unwrap();
        assert!((model.predict(&[0.0]) - 0.5).abs() < 1e-6);

        assert!(matches!(
            LogisticModel::from_json(r#"{ "weights": [] }"#),
            Err(ModelError::Empty)
        ));
        assert!(matches!(
            LogisticModel::from_json("not json"),
            Err(ModelError::Parse(_))
        ));
    }

    #[test]
    fn dimension_mismatch_degrades_gracefully() {
        let model = LogisticModel {
            weights: vec![1.0, 1.0],
            bias: 0.0,
        };
        // Longer input: extra dimensions ignored.
        let long = model.predict(&[1.0, 1.0, 99.0]);
        // Shorter input: missing dimensions contribute nothing.
        let short = model.predict(&[1.0]);
        assert!((long - model.predict(&[1.0, 1.0])).abs() < 1e-6);
        assert!((short - 1.0 / (1.0 + (-1.0f32).exp())).abs() < 1e-6);
    }
}
