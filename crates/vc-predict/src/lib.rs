// Windowed feature buffering and periodic classifier inference for vocalis.

pub mod classifier;
pub mod history;
pub mod pipeline;
pub mod window;

pub use classifier::{Classifier, LogisticModel, ModelError};
pub use history::PredictionHistory;
pub use pipeline::{PredictionPipeline, NEUTRAL_PREDICTION};
pub use window::FeatureWindow;
