use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use arc_swap::ArcSwapOption;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::error::TransportError;

/// One playback voice shared with the output callback.
struct Voice {
    samples: Arc<Vec<f32>>,
    /// Absolute read position into `samples`.
    pos: AtomicUsize,
    /// Exclusive stop boundary (`samples.len()` for unbounded playback).
    end: usize,
    active: Arc<AtomicBool>,
}

/// Handle to a started voice. Stopping is idempotent; the handle can be
/// dropped freely; the callback side holds its own Arc.
pub struct VoiceHandle {
    active: Arc<AtomicBool>,
}

impl VoiceHandle {
    /// Silence this voice. Safe to call repeatedly.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    /// `true` while the voice has not been stopped or exhausted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

/// A playback destination owning the device-side resources.
///
/// Exactly one voice plays at a time: starting a voice replaces the
/// previous one in the graph. `close` releases the device; the context is
/// unusable afterwards and must be rebuilt for a new session.
pub trait OutputContext: Send {
    /// Begin playing `samples` at `offset`; the voice self-stops at `end`.
    ///
    /// # Errors
    /// Returns an error if the context has been closed.
    fn start_voice(
        &mut self,
        samples: Arc<Vec<f32>>,
        offset: usize,
        end: usize,
    ) -> Result<VoiceHandle, TransportError>;

    /// Remove the current voice from the graph.
    fn clear_voice(&mut self);

    /// Output sample rate.
    fn sample_rate(&self) -> u32;

    /// `true` until `close` has been called.
    fn is_running(&self) -> bool;

    /// Release the device stream.
    ///
    /// # Errors
    /// Returns an error if the underlying stream refuses to stop. Callers
    /// must still treat the context as closed.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Real device output via cpal.
///
/// The callback reads the active voice through an `ArcSwapOption` slot, so
/// voice replacement never blocks the audio thread and a stopped voice can
/// never be observed half-torn-down.
pub struct CpalOutput {
    stream: Option<cpal::Stream>,
    slot: Arc<ArcSwapOption<Voice>>,
    sample_rate: u32,
}

impl CpalOutput {
    /// Open the default output device at `sample_rate`.
    ///
    /// # Errors
    /// Returns an error if no output device exists or the stream cannot be
    /// built or started.
    pub fn open(sample_rate: u32) -> Result<Self, TransportError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(TransportError::NoOutputDevice)?;

        let config = cpal::StreamConfig {
            channels: 2,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let slot: Arc<ArcSwapOption<Voice>> = Arc::new(ArcSwapOption::new(None));
        let callback_slot = Arc::clone(&slot);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let guard = callback_slot.load();
                    let Some(voice) = guard.as_ref() else {
                        data.fill(0.0);
                        return;
                    };
                    if !voice.active.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }

                    let mut pos = voice.pos.load(Ordering::Relaxed);
                    let limit = voice.end.min(voice.samples.len());
                    for frame in data.chunks_mut(2) {
                        if pos >= limit {
                            // Exhausted: self-stop and pad with silence.
                            voice.active.store(false, Ordering::Relaxed);
                            frame.fill(0.0);
                            continue;
                        }
                        let sample = voice.samples[pos];
                        frame[0] = sample;
                        if frame.len() > 1 {
                            frame[1] = sample;
                        }
                        pos += 1;
                    }
                    voice.pos.store(pos, Ordering::Relaxed);
                },
                |err| {
                    log::error!("Audio output error: {err}");
                },
                None,
            )
            .map_err(|e| TransportError::Stream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| TransportError::Stream(e.to_string()))?;

        Ok(Self {
            stream: Some(stream),
            slot,
            sample_rate,
        })
    }
}

impl OutputContext for CpalOutput {
    fn start_voice(
        &mut self,
        samples: Arc<Vec<f32>>,
        offset: usize,
        end: usize,
    ) -> Result<VoiceHandle, TransportError> {
        if self.stream.is_none() {
            return Err(TransportError::Stream("output context closed".to_string()));
        }
        let active = Arc::new(AtomicBool::new(true));
        let voice = Voice {
            samples,
            pos: AtomicUsize::new(offset),
            end,
            active: Arc::clone(&active),
        };
        self.slot.store(Some(Arc::new(voice)));
        Ok(VoiceHandle { active })
    }

    fn clear_voice(&mut self) {
        self.slot.store(None);
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.slot.store(None);
        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| TransportError::Stream(e.to_string()))?;
        }
        Ok(())
    }
}

/// Headless output for environments without an audio device (CI, `--mute`).
///
/// Voices exist and carry the usual lifecycle, but render nowhere; position
/// bookkeeping stays wall-clock driven in the transport, so the analysis
/// tap behaves identically to device output.
pub struct SilentOutput {
    sample_rate: u32,
    running: bool,
}

impl SilentOutput {
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            running: true,
        }
    }
}

impl OutputContext for SilentOutput {
    fn start_voice(
        &mut self,
        _samples: Arc<Vec<f32>>,
        _offset: usize,
        _end: usize,
    ) -> Result<VoiceHandle, TransportError> {
        if !self.running {
            return Err(TransportError::Stream("output context closed".to_string()));
        }
        Ok(VoiceHandle {
            active: Arc::new(AtomicBool::new(true)),
        })
    }

    fn clear_voice(&mut self) {}

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.running = false;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn silent_voice_lifecycle() {
        let mut out = SilentOutput::new(44_100);
        let voice = out
            .start_voice(Arc::new(vec![0.0; 16]), 0, 16)
            .unwrap();
        assert!(voice.is_active());
        voice.stop();
        voice.stop(); // idempotent
        assert!(!voice.is_active());

        out.close().unwrap();
        assert!(!out.is_running());
        assert!(out.start_voice(Arc::new(vec![]), 0, 0).is_err());
    }
}
