use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::capture::CaptureStream;
use crate::decode::{self, DecodedBuffer};
use crate::error::TransportError;
use crate::output::{CpalOutput, OutputContext, SilentOutput, VoiceHandle};

/// What kind of source the active session is built on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionKind {
    /// Live capture (microphone). Always audible, no transport position.
    LiveStream,
    /// Decoded file buffer with play/pause/scrub semantics.
    DecodedFile,
}

/// The single currently active audio source.
///
/// Exactly one session exists at a time; installing a new one always tears
/// the previous one down first. Owned exclusively by the transport engine.
#[derive(Clone, Copy, Debug)]
pub struct AudioSession {
    pub kind: SessionKind,
    pub sample_rate: u32,
    /// Defined only for decoded files.
    pub duration_secs: Option<f64>,
}

/// Transport state machine. Transitions happen only through the guarded
/// operations below; there are no free-floating mutable flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    /// No session.
    Idle,
    /// File decoded, not yet playing.
    Loaded,
    /// Audible: live stream, file playback, or a full-seek scrub.
    Playing,
    /// File session stopped at a resume position.
    Paused,
    /// Transient: a bounded scrub preview is audible; a deferred auto-pause
    /// is armed.
    Scrubbing,
}

/// Output destination selector for new file sessions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputKind {
    /// Default cpal output device.
    Device,
    /// Headless output (CI, `--mute`).
    Silent,
}

/// The single-slot deferred scrub auto-pause.
struct PendingPause {
    deadline: Instant,
    /// Position the transport rests at once the preview ends.
    resume_to: f64,
}

/// Owns the audio graph: the active session, the output context, the
/// current playback voice, and the wall-clock reference that playback
/// position is derived from.
///
/// All methods are synchronous; the engine is designed to live on one
/// thread and be driven by a serialized command stream plus a periodic
/// `poll()`. The device callbacks only ever communicate through atomics.
pub struct TransportEngine {
    output_kind: OutputKind,
    state: PlaybackState,
    session: Option<AudioSession>,
    buffer: Option<DecodedBuffer>,
    capture: Option<CaptureStream>,
    output: Option<Box<dyn OutputContext>>,
    voice: Option<VoiceHandle>,
    /// Buffer position (secs) at the moment `started_at` was taken.
    origin_secs: f64,
    /// Wall-clock reference while audible.
    started_at: Option<Instant>,
    /// Rest position while `Loaded`/`Paused`.
    position_secs: f64,
    pending_pause: Option<PendingPause>,
    /// Analyzer tap: next unread sample index into the decoded buffer.
    tap_pos: usize,
    /// Tap boundary for bounded preview voices.
    tap_end: usize,
}

impl TransportEngine {
    #[must_use]
    pub fn new(output_kind: OutputKind) -> Self {
        Self {
            output_kind,
            state: PlaybackState::Idle,
            session: None,
            buffer: None,
            capture: None,
            output: None,
            voice: None,
            origin_secs: 0.0,
            started_at: None,
            position_secs: 0.0,
            pending_pause: None,
            tap_pos: 0,
            tap_end: 0,
        }
    }

    /// Current transport state.
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// The active session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&AudioSession> {
        self.session.as_ref()
    }

    /// Duration of the decoded buffer, if a file session is active.
    #[must_use]
    pub fn duration_secs(&self) -> Option<f64> {
        self.session.and_then(|s| s.duration_secs)
    }

    /// `true` while a playback voice is connected and audible.
    #[must_use]
    pub fn voice_active(&self) -> bool {
        self.voice.as_ref().is_some_and(VoiceHandle::is_active)
    }

    /// `true` while the session's underlying processing context is alive,
    /// the broker's precondition for running an analyzer.
    #[must_use]
    pub fn is_context_running(&self) -> bool {
        match self.session.map(|s| s.kind) {
            Some(SessionKind::LiveStream) => self.capture.is_some(),
            Some(SessionKind::DecodedFile) => {
                self.output.as_ref().is_some_and(|o| o.is_running())
            }
            None => false,
        }
    }

    /// Current playback position in seconds.
    ///
    /// Derived from the wall clock while audible, clamped to the buffer
    /// duration; the rest position otherwise.
    #[must_use]
    pub fn elapsed_secs(&self) -> f64 {
        match self.state {
            PlaybackState::Playing | PlaybackState::Scrubbing => {
                let running = self
                    .started_at
                    .map_or(0.0, |t| t.elapsed().as_secs_f64());
                let elapsed = self.origin_secs + running;
                match self.duration_secs() {
                    Some(duration) => elapsed.min(duration),
                    None => elapsed,
                }
            }
            _ => self.position_secs,
        }
    }

    /// Decode `bytes` and install a file session in `Loaded`.
    ///
    /// The previous session (file or stream) is torn down only after the
    /// decode succeeds, so a failed load leaves the prior state intact.
    ///
    /// # Errors
    /// `TransportError::Decode` on malformed data; device errors if the
    /// output context cannot be opened.
    pub fn load_file(
        &mut self,
        bytes: Vec<u8>,
        hint_ext: Option<&str>,
    ) -> Result<&AudioSession, TransportError> {
        let decoded = decode::decode_bytes(bytes, hint_ext)?;

        self.teardown_session();

        let output: Box<dyn OutputContext> = match self.output_kind {
            OutputKind::Device => Box::new(CpalOutput::open(decoded.sample_rate)?),
            OutputKind::Silent => Box::new(SilentOutput::new(decoded.sample_rate)),
        };
        self.output = Some(output);

        let session = AudioSession {
            kind: SessionKind::DecodedFile,
            sample_rate: decoded.sample_rate,
            duration_secs: Some(decoded.duration_secs()),
        };
        self.buffer = Some(decoded);
        self.state = PlaybackState::Loaded;
        Ok(self.session.insert(session))
    }

    /// Read a file from disk and load it.
    ///
    /// # Errors
    /// See [`TransportEngine::load_file`].
    pub fn load_path(&mut self, path: impl AsRef<Path>) -> Result<&AudioSession, TransportError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| TransportError::Decode(format!("cannot read {}: {e}", path.display())))?;
        let ext = path.extension().and_then(|e| e.to_str()).map(str::to_owned);
        self.load_file(bytes, ext.as_deref())
    }

    /// Install a live capture stream as the session.
    ///
    /// A live stream is audible immediately: there is no separate
    /// loaded-but-not-playing state. Any existing file session is torn down
    /// first.
    pub fn attach_stream(&mut self, capture: CaptureStream) -> &AudioSession {
        self.teardown_session();

        let session = AudioSession {
            kind: SessionKind::LiveStream,
            sample_rate: capture.sample_rate(),
            duration_secs: None,
        };
        self.capture = Some(capture);
        self.origin_secs = 0.0;
        self.started_at = Some(Instant::now());
        self.state = PlaybackState::Playing;
        self.session.insert(session)
    }

    /// Tear down the current session and return to `Idle`. Idempotent.
    pub fn unload(&mut self) {
        self.teardown_session();
    }

    /// Start (or restart) file playback at `from_secs`.
    ///
    /// Stops any current voice first; the wall-clock reference is reset so
    /// `elapsed_secs` tracks the new start point.
    ///
    /// # Errors
    /// `InvalidState` unless a decoded file session is active.
    pub fn play(&mut self, from_secs: f64) -> Result<(), TransportError> {
        if self.session.map(|s| s.kind) != Some(SessionKind::DecodedFile) {
            return Err(TransportError::InvalidState(
                "play requires a decoded file session",
            ));
        }
        if let Some(voice) = self.voice.take() {
            voice.stop();
        }

        let Some(buffer) = self.buffer.clone() else {
            return Err(TransportError::InvalidState("no decoded buffer"));
        };
        let rate = f64::from(buffer.sample_rate);
        let len = buffer.samples.len();
        let offset = ((from_secs.max(0.0) * rate) as usize).min(len);

        let Some(output) = self.output.as_mut() else {
            return Err(TransportError::InvalidState("no output context"));
        };
        let voice = output.start_voice(Arc::clone(&buffer.samples), offset, len)?;

        self.voice = Some(voice);
        self.pending_pause = None;
        self.origin_secs = offset as f64 / rate;
        self.started_at = Some(Instant::now());
        self.tap_pos = offset;
        self.tap_end = len;
        self.state = PlaybackState::Playing;
        Ok(())
    }

    /// Stop playback, keeping the session and the current position.
    ///
    /// No-op when already paused, merely loaded, or on a live session.
    pub fn pause(&mut self) {
        if self.session.map(|s| s.kind) != Some(SessionKind::DecodedFile) {
            return;
        }
        if matches!(
            self.state,
            PlaybackState::Playing | PlaybackState::Scrubbing
        ) {
            let at = self.elapsed_secs();
            self.silence_voice();
            self.pending_pause = None;
            self.started_at = None;
            self.position_secs = at;
            self.state = PlaybackState::Paused;
        }
    }

    /// Seek to `time_secs`, audibly.
    ///
    /// The voice starts at `max(time - preview/2, 0)`. With
    /// `resume_playing` the seek commits and playback continues
    /// indefinitely. Without it this is a bounded preview: the engine arms
    /// a deferred auto-pause that rests the transport at `time_secs` after
    /// `preview_secs`. Arming replaces any previously armed auto-pause;
    /// at most one is ever outstanding, so a stale preview can never pause
    /// a newer scrub.
    ///
    /// # Errors
    /// `InvalidState` unless a decoded file session is active.
    pub fn scrub(
        &mut self,
        time_secs: f64,
        resume_playing: bool,
        preview_secs: f64,
    ) -> Result<(), TransportError> {
        if self.session.map(|s| s.kind) != Some(SessionKind::DecodedFile) {
            return Err(TransportError::InvalidState(
                "scrub requires a decoded file session",
            ));
        }
        if let Some(voice) = self.voice.take() {
            voice.stop();
        }

        let Some(buffer) = self.buffer.clone() else {
            return Err(TransportError::InvalidState("no decoded buffer"));
        };
        let rate = f64::from(buffer.sample_rate);
        let len = buffer.samples.len();
        let preview = preview_secs.max(0.0);
        let start_secs = (time_secs - preview / 2.0).max(0.0);
        let offset = ((start_secs * rate) as usize).min(len);
        let end = if resume_playing {
            len
        } else {
            (offset + (preview * rate) as usize).min(len)
        };

        let Some(output) = self.output.as_mut() else {
            return Err(TransportError::InvalidState("no output context"));
        };
        let voice = output.start_voice(Arc::clone(&buffer.samples), offset, end)?;

        self.voice = Some(voice);
        self.origin_secs = offset as f64 / rate;
        self.started_at = Some(Instant::now());
        self.tap_pos = offset;
        self.tap_end = end;

        if resume_playing {
            self.pending_pause = None;
            self.state = PlaybackState::Playing;
        } else {
            let duration = self.duration_secs().unwrap_or(f64::MAX);
            self.pending_pause = Some(PendingPause {
                deadline: Instant::now() + Duration::from_secs_f64(preview),
                resume_to: time_secs.clamp(0.0, duration),
            });
            self.state = PlaybackState::Scrubbing;
        }
        Ok(())
    }

    /// Cooperative transport tick (call every ~100 ms).
    ///
    /// Fires the armed scrub auto-pause once its deadline has passed, and
    /// performs end-of-track detection for file sessions. End-of-track
    /// pauses and resets the position to 0; it cannot re-fire because the
    /// state leaves `Playing`.
    pub fn poll(&mut self) {
        let now = Instant::now();

        if self
            .pending_pause
            .as_ref()
            .is_some_and(|p| now >= p.deadline)
            && let Some(pending) = self.pending_pause.take()
        {
            self.silence_voice();
            self.started_at = None;
            self.position_secs = pending.resume_to;
            self.state = PlaybackState::Paused;
            log::debug!("Scrub preview ended; paused at {:.2}s", pending.resume_to);
        }

        if self.state == PlaybackState::Playing
            && let Some(duration) = self.duration_secs()
            && self.elapsed_secs() >= duration
        {
            self.silence_voice();
            self.started_at = None;
            self.position_secs = 0.0;
            self.state = PlaybackState::Paused;
            log::debug!("End of track at {duration:.2}s; paused and reset");
        }
    }

    /// Analyzer tap: move the samples that became audible since the last
    /// drain into `out`. Clears `out`; returns the sample count.
    ///
    /// Live sessions drain the capture ring buffer; file sessions follow
    /// the playback clock through the decoded buffer, bounded by the
    /// current voice's stop point.
    pub fn drain_audible(&mut self, out: &mut Vec<f32>) -> usize {
        match self.session.map(|s| s.kind) {
            Some(SessionKind::LiveStream) => self
                .capture
                .as_mut()
                .map_or(0, |capture| capture.read_samples(out)),
            Some(SessionKind::DecodedFile)
                if matches!(
                    self.state,
                    PlaybackState::Playing | PlaybackState::Scrubbing
                ) =>
            {
                out.clear();
                let Some(buffer) = &self.buffer else { return 0 };
                let rate = f64::from(buffer.sample_rate);
                let target = ((self.elapsed_secs() * rate) as usize)
                    .min(self.tap_end)
                    .min(buffer.samples.len());
                if target > self.tap_pos {
                    out.extend_from_slice(&buffer.samples[self.tap_pos..target]);
                    self.tap_pos = target;
                }
                out.len()
            }
            _ => {
                out.clear();
                0
            }
        }
    }

    /// Stop and disconnect the current voice, if any.
    fn silence_voice(&mut self) {
        if let Some(voice) = self.voice.take() {
            voice.stop();
        }
        if let Some(output) = self.output.as_mut() {
            output.clear_voice();
        }
    }

    /// Full teardown, in order: stop the voice, disconnect it, close the
    /// output context, then clear every session-scoped reference. A close
    /// failure is logged and the engine still ends up cleanly idle.
    fn teardown_session(&mut self) {
        if let Some(voice) = self.voice.take() {
            voice.stop();
        }
        if let Some(mut output) = self.output.take() {
            output.clear_voice();
            if let Err(e) = output.close() {
                log::warn!("Output context close failed (forcing idle): {e}");
            }
        }
        self.capture = None;
        self.buffer = None;
        self.session = None;
        self.pending_pause = None;
        self.started_at = None;
        self.origin_secs = 0.0;
        self.position_secs = 0.0;
        self.tap_pos = 0;
        self.tap_end = 0;
        self.state = PlaybackState::Idle;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::decode::tests::tone_wav;
    use rtrb::RingBuffer;
    use std::thread::sleep;

    const RATE: u32 = 22_050;

    fn loaded_engine(duration_secs: f64) -> TransportEngine {
        let mut engine = TransportEngine::new(OutputKind::Silent);
        engine
            .load_file(tone_wav(duration_secs, RATE), Some("wav"))
            .unwrap();
        engine
    }

    #[test]
    fn load_attach_unload_keep_at_most_one_session() {
        let mut engine = TransportEngine::new(OutputKind::Silent);
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert!(engine.session().is_none());

        engine.load_file(tone_wav(0.2, RATE), Some("wav")).unwrap();
        assert_eq!(engine.state(), PlaybackState::Loaded);
        assert_eq!(engine.session().unwrap().kind, SessionKind::DecodedFile);

        // File → file: previous session replaced, still exactly one.
        engine.load_file(tone_wav(0.3, RATE), Some("wav")).unwrap();
        assert!((engine.duration_secs().unwrap() - 0.3).abs() < 0.05);

        // File → stream: mandatory teardown of the file session.
        let (_producer, consumer) = RingBuffer::new(64);
        engine.attach_stream(CaptureStream::from_ring(consumer, 48_000));
        assert_eq!(engine.session().unwrap().kind, SessionKind::LiveStream);
        assert_eq!(engine.state(), PlaybackState::Playing);
        assert!(engine.duration_secs().is_none());

        engine.unload();
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert!(engine.session().is_none());
        assert!(!engine.voice_active());
        assert!(!engine.is_context_running());

        // Idempotent.
        engine.unload();
        assert_eq!(engine.state(), PlaybackState::Idle);
    }

    #[test]
    fn failed_decode_leaves_prior_session_intact() {
        let mut engine = loaded_engine(0.2);
        let err = engine.load_file(vec![1, 2, 3, 4], None).unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
        assert_eq!(engine.state(), PlaybackState::Loaded);
        assert!(engine.session().is_some());
    }

    #[test]
    fn play_and_pause_track_the_clock() {
        let mut engine = loaded_engine(1.0);
        engine.play(0.0).unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing);
        assert!(engine.voice_active());

        sleep(Duration::from_millis(60));
        engine.pause();
        assert_eq!(engine.state(), PlaybackState::Paused);
        let at = engine.elapsed_secs();
        assert!(at > 0.0 && at < 0.5, "paused at {at}");

        // Pause is a no-op when already paused.
        engine.pause();
        assert_eq!(engine.state(), PlaybackState::Paused);
        assert!((engine.elapsed_secs() - at).abs() < f64::EPSILON);

        // Resume from the stored position.
        engine.play(at).unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing);
        assert!(engine.elapsed_secs() >= at);
    }

    #[test]
    fn transport_ops_require_a_file_session() {
        let mut engine = TransportEngine::new(OutputKind::Silent);
        assert!(matches!(
            engine.play(0.0),
            Err(TransportError::InvalidState(_))
        ));
        assert!(matches!(
            engine.scrub(1.0, false, 0.3),
            Err(TransportError::InvalidState(_))
        ));

        let (_producer, consumer) = RingBuffer::new(64);
        engine.attach_stream(CaptureStream::from_ring(consumer, 48_000));
        assert!(matches!(
            engine.play(0.0),
            Err(TransportError::InvalidState(_))
        ));
        // Pause on a live session is a no-op, not a state change.
        engine.pause();
        assert_eq!(engine.state(), PlaybackState::Playing);
    }

    #[test]
    fn scrub_preview_auto_pauses_at_the_target() {
        let mut engine = loaded_engine(2.0);
        engine.scrub(1.0, false, 0.05).unwrap();
        assert_eq!(engine.state(), PlaybackState::Scrubbing);

        engine.poll();
        assert_eq!(engine.state(), PlaybackState::Scrubbing);

        sleep(Duration::from_millis(80));
        engine.poll();
        assert_eq!(engine.state(), PlaybackState::Paused);
        assert!((engine.elapsed_secs() - 1.0).abs() < 1e-9);
        assert!(!engine.voice_active());
    }

    #[test]
    fn rescrub_cancels_the_pending_auto_pause() {
        let mut engine = loaded_engine(2.0);
        engine.scrub(0.5, false, 0.05).unwrap();
        sleep(Duration::from_millis(20));
        // Re-scrub before the first preview ends: only the last armed
        // auto-pause may ever fire.
        engine.scrub(1.5, false, 0.2).unwrap();

        sleep(Duration::from_millis(80)); // past the first deadline
        engine.poll();
        assert_eq!(engine.state(), PlaybackState::Scrubbing);

        sleep(Duration::from_millis(180));
        engine.poll();
        assert_eq!(engine.state(), PlaybackState::Paused);
        assert!((engine.elapsed_secs() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn scrub_with_resume_commits_the_seek() {
        let mut engine = loaded_engine(2.0);
        engine.scrub(1.0, true, 0.05).unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing);

        sleep(Duration::from_millis(100));
        engine.poll();
        assert_eq!(engine.state(), PlaybackState::Playing);
        assert!(engine.elapsed_secs() > 0.9);
    }

    #[test]
    fn end_of_track_pauses_once_and_resets() {
        let mut engine = loaded_engine(0.15);
        engine.play(0.0).unwrap();

        sleep(Duration::from_millis(200));
        engine.poll();
        assert_eq!(engine.state(), PlaybackState::Paused);
        assert_eq!(engine.elapsed_secs(), 0.0);
        assert!(!engine.voice_active());

        engine.poll();
        assert_eq!(engine.state(), PlaybackState::Paused);
    }

    #[test]
    fn file_tap_follows_the_playback_clock() {
        let mut engine = loaded_engine(0.5);
        let mut out = Vec::new();

        // Nothing audible before play.
        assert_eq!(engine.drain_audible(&mut out), 0);

        engine.play(0.0).unwrap();
        sleep(Duration::from_millis(60));
        let first = engine.drain_audible(&mut out);
        assert!(first > 0);

        sleep(Duration::from_millis(60));
        let second = engine.drain_audible(&mut out);
        assert!(second > 0);

        // Monotonic, no overlap, never past the buffer.
        assert!(first + second <= (0.5 * f64::from(RATE)) as usize + 1);
    }

    #[test]
    fn live_tap_drains_the_ring() {
        let mut engine = TransportEngine::new(OutputKind::Silent);
        let (mut producer, consumer) = RingBuffer::new(16);
        engine.attach_stream(CaptureStream::from_ring(consumer, 48_000));

        for i in 0..8 {
            producer.push(i as f32).unwrap();
        }
        let mut out = Vec::new();
        assert_eq!(engine.drain_audible(&mut out), 8);
        assert_eq!(out[7], 7.0);
        assert_eq!(engine.drain_audible(&mut out), 0);
    }
}
