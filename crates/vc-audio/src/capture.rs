use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rtrb::{Consumer, RingBuffer};

use crate::error::TransportError;

/// A live input stream: mono f32 samples flowing through a lock-free ring
/// buffer, written by the device callback and drained by the engine.
///
/// This is the acquisition side of the transport's `LiveStream` session.
/// Dropping the value stops the device stream and releases the capture.
pub struct CaptureStream {
    /// Kept alive for the duration of the capture; `None` for ring-fed
    /// synthetic streams.
    _stream: Option<cpal::Stream>,
    consumer: Consumer<f32>,
    sample_rate: u32,
}

impl CaptureStream {
    /// Open the default input device and start capturing.
    ///
    /// # Errors
    /// Returns an error if no input device exists or the stream cannot be
    /// built or started.
    pub fn open_default() -> Result<Self, TransportError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(TransportError::NoInputDevice)?;

        let config = device
            .default_input_config()
            .map_err(|e| TransportError::Stream(e.to_string()))?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        // Ring buffer: 2 seconds of audio @ sample_rate
        let buf_size = sample_rate as usize * 2;
        let (mut producer, consumer) = RingBuffer::new(buf_size);

        let stream = device
            .build_input_stream(
                &config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Downmix to mono and push into the ring buffer
                    for chunk in data.chunks(channels) {
                        let mono: f32 = chunk.iter().sum::<f32>() / channels as f32;
                        let _ = producer.push(mono);
                    }
                },
                |err| {
                    log::error!("Capture stream error: {err}");
                },
                None,
            )
            .map_err(|e| TransportError::Stream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| TransportError::Stream(e.to_string()))?;

        Ok(Self {
            _stream: Some(stream),
            consumer,
            sample_rate,
        })
    }

    /// Wrap an externally fed ring buffer as a capture stream.
    ///
    /// Used for synthetic sources: anything that can produce mono f32
    /// samples can stand in for a microphone.
    #[must_use]
    pub fn from_ring(consumer: Consumer<f32>, sample_rate: u32) -> Self {
        Self {
            _stream: None,
            consumer,
            sample_rate,
        }
    }

    /// Drain available samples from the ring buffer into `out`.
    ///
    /// Clears `out` first; returns how many samples were read.
    pub fn read_samples(&mut self, out: &mut Vec<f32>) -> usize {
        let available = self.consumer.slots();
        out.clear();
        out.reserve(available);
        let mut count = 0;
        while let Ok(sample) = self.consumer.pop() {
            out.push(sample);
            count += 1;
        }
        count
    }

    /// The sample rate of the capture stream.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
