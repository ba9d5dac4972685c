// Audio transport, capture, decoding, and feature extraction for vocalis.

pub mod broker;
pub mod capture;
pub mod decode;
pub mod error;
pub mod features;
pub mod fft;
pub mod output;
pub mod transport;

pub use broker::{FeatureBroker, SubscriptionHandle};
pub use error::TransportError;
pub use transport::{AudioSession, PlaybackState, SessionKind, TransportEngine};
