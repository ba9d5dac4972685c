use thiserror::Error;

/// Errors originating from the audio layer.
///
/// Teardown failures have no variant here: closing a context or
/// disconnecting a voice never propagates; it is logged and the engine
/// forces itself back to a clean idle state.
#[derive(Error, Debug)]
pub enum TransportError {
    /// No audio input device found.
    #[error("No audio input device found")]
    NoInputDevice,

    /// No audio output device found.
    #[error("No audio output device found")]
    NoOutputDevice,

    /// Audio stream error.
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// Malformed or unsupported audio data.
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Operation not permitted in the current playback state.
    #[error("Invalid transport state: {0}")]
    InvalidState(&'static str),
}
