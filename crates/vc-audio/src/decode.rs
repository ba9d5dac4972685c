use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::TransportError;

/// A fully decoded audio file: mono f32 samples, shareable with the output
/// callback without copying.
#[derive(Clone, Debug)]
pub struct DecodedBuffer {
    /// Mono samples, normalized [-1, 1].
    pub samples: Arc<Vec<f32>>,
    /// Source sample rate.
    pub sample_rate: u32,
}

impl DecodedBuffer {
    /// Buffer duration in seconds.
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Decode raw audio bytes (WAV, MP3, FLAC, OGG, AAC) into mono f32 samples.
///
/// The container is probed from the content; pass `hint_ext` when the file
/// extension is known to speed probing up.
///
/// # Errors
/// Returns `TransportError::Decode` if the bytes are not a supported audio
/// format or the stream is empty.
pub fn decode_bytes(bytes: Vec<u8>, hint_ext: Option<&str>) -> Result<DecodedBuffer, TransportError> {
    let mss = MediaSourceStream::new(
        Box::new(Cursor::new(bytes)),
        symphonia::core::io::MediaSourceStreamOptions::default(),
    );

    let mut hint = Hint::new();
    if let Some(ext) = hint_ext {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| TransportError::Decode(format!("unrecognized audio data: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| TransportError::Decode("no default audio track".to_string()))?;

    let sample_rate = track.codec_params.sample_rate.unwrap_or(44_100);
    let channels = track
        .codec_params
        .channels
        .map_or(1, symphonia::core::audio::Channels::count);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| TransportError::Decode(format!("unsupported codec: {e}")))?;

    let track_id = track.id;
    let mut all_samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut max_sample_frames: usize = 0;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                log::warn!("Audio decode packet error: {e}");
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("Audio decode frame error: {e}");
                continue;
            }
        };

        let spec = *decoded.spec();
        let num_frames = decoded.capacity();
        // Reuse SampleBuffer: only reallocate if this packet is bigger than current capacity
        if sample_buf.is_none() || num_frames > max_sample_frames {
            sample_buf = Some(SampleBuffer::<f32>::new(num_frames as u64, spec));
            max_sample_frames = num_frames;
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);

        // Downmix to mono
        for chunk in buf.samples().chunks(channels) {
            let mono: f32 = chunk.iter().sum::<f32>() / channels as f32;
            all_samples.push(mono);
        }
    }

    if all_samples.is_empty() {
        return Err(TransportError::Decode(
            "decoded stream contains no samples".to_string(),
        ));
    }

    log::info!(
        "Decoded {} samples @ {sample_rate}Hz ({channels} channel source)",
        all_samples.len(),
    );

    Ok(DecodedBuffer {
        samples: Arc::new(all_samples),
        sample_rate,
    })
}

/// Read and decode an audio file from disk.
///
/// # Errors
/// Returns `TransportError::Decode` on read or decode failure.
pub fn decode_file(path: impl AsRef<Path>) -> Result<DecodedBuffer, TransportError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| TransportError::Decode(format!("cannot read {}: {e}", path.display())))?;
    let ext = path.extension().and_then(|e| e.to_str());
    decode_bytes(bytes, ext)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    /// Render a mono 16-bit PCM WAV entirely in memory.
    pub(crate) fn wav_bytes(samples: &[f32], sample_rate: u32) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let mut out = Vec::with_capacity(44 + samples.len() * 2);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&1u16.to_le_bytes()); // mono
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
        out.extend_from_slice(&2u16.to_le_bytes()); // block align
        out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for &s in samples {
            let q = (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
            out.extend_from_slice(&q.to_le_bytes());
        }
        out
    }

    /// A short sine tone as a decodable WAV.
    pub(crate) fn tone_wav(duration_secs: f64, sample_rate: u32) -> Vec<u8> {
        let n = (duration_secs * f64::from(sample_rate)) as usize;
        let samples: Vec<f32> = (0..n)
            .map(|i| {
                0.5 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / sample_rate as f32).sin()
            })
            .collect();
        wav_bytes(&samples, sample_rate)
    }

    #[test]
    fn wav_round_trip() {
        let rate = 22_050;
        let bytes = tone_wav(0.5, rate);
        let decoded = decode_bytes(bytes, Some("wav")).unwrap();
        assert_eq!(decoded.sample_rate, rate);
        assert!((decoded.duration_secs() - 0.5).abs() < 0.05);
        assert!(decoded.samples.iter().any(|&s| s.abs() > 0.1));
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let err = decode_bytes(vec![0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01], None).unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }
}
