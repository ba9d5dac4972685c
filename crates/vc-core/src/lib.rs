/// Configuration, shared types, and error definitions for vocalis.
///
/// This crate contains the types exchanged between the audio layer, the
/// prediction layer, and the application front-end.

pub mod config;
pub mod error;
pub mod frame;

pub use config::EngineConfig;
pub use error::CoreError;
pub use frame::{FeatureFrame, PredictionSample, FEATURE_DIM, N_CHROMA, N_MFCC};
