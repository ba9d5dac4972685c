use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use arc_swap::ArcSwap;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::DefaultTerminal;

use vc_audio::transport::{PlaybackState, SessionKind};
use vc_core::config::EngineConfig;

use crate::runtime::{EngineCommand, EngineSnapshot};
use crate::ui;

/// Seconds moved per arrow-key scrub.
const SCRUB_STEP_SECS: f64 = 5.0;

/// Front-end event loop: polls engine snapshots at the configured frame
/// rate, draws, and pushes transport commands back to the engine thread.
pub struct App {
    config: Arc<ArcSwap<EngineConfig>>,
    commands: flume::Sender<EngineCommand>,
    snapshots: triple_buffer::Output<EngineSnapshot>,
    source_name: Option<String>,
    quitting: bool,
}

impl App {
    #[must_use]
    pub fn new(
        config: Arc<ArcSwap<EngineConfig>>,
        commands: flume::Sender<EngineCommand>,
        snapshots: triple_buffer::Output<EngineSnapshot>,
        source_name: Option<String>,
    ) -> Self {
        Self {
            config,
            commands,
            snapshots,
            source_name,
            quitting: false,
        }
    }

    /// Main loop: frame-paced redraw, non-blocking event handling.
    ///
    /// The snapshot is re-read every frame; the engine's session can
    /// change or disappear between frames and the draw pass must cope.
    ///
    /// # Errors
    /// Returns an error if terminal operations fail.
    pub fn run(&mut self, mut terminal: DefaultTerminal) -> Result<()> {
        let mut last_frame = Instant::now();

        loop {
            if self.quitting {
                break;
            }

            let frame_duration =
                Duration::from_secs_f64(1.0 / f64::from(self.config.load().target_fps.max(1)));

            let now = Instant::now();
            let elapsed = now - last_frame;
            if elapsed < frame_duration {
                // Sleep out the frame budget, staying responsive to keys.
                let remaining = frame_duration.saturating_sub(elapsed);
                if event::poll(remaining)? {
                    self.handle_event(&event::read()?);
                }
                continue;
            }
            last_frame = now;

            while event::poll(Duration::ZERO)? {
                self.handle_event(&event::read()?);
            }

            let snapshot = self.snapshots.read().clone();
            let ctx = ui::DrawContext {
                snapshot: &snapshot,
                source_name: self.source_name.as_deref(),
            };
            terminal.draw(|frame| ui::draw(frame, &ctx))?;
        }

        Ok(())
    }

    fn handle_event(&mut self, event: &Event) {
        if let Event::Key(KeyEvent {
            code,
            kind: KeyEventKind::Press,
            ..
        }) = *event
        {
            match code {
                KeyCode::Char('q') | KeyCode::Esc => {
                    let _ = self.commands.send(EngineCommand::Quit);
                    self.quitting = true;
                }
                KeyCode::Char(' ') => self.toggle_playback(),
                KeyCode::Left => self.scrub_by(-SCRUB_STEP_SECS),
                KeyCode::Right => self.scrub_by(SCRUB_STEP_SECS),
                KeyCode::Char('c') => {
                    let _ = self.commands.send(EngineCommand::ClearBuffer);
                }
                KeyCode::Char('x') => {
                    let _ = self.commands.send(EngineCommand::PurgeHistory(10));
                }
                KeyCode::Char('u') => {
                    let _ = self.commands.send(EngineCommand::Unload);
                }
                _ => {}
            }
        }
    }

    fn toggle_playback(&mut self) {
        let snapshot = self.snapshots.read();
        if snapshot.session_kind != Some(SessionKind::DecodedFile) {
            return;
        }
        let cmd = match snapshot.state {
            PlaybackState::Playing | PlaybackState::Scrubbing => EngineCommand::Pause,
            PlaybackState::Loaded | PlaybackState::Paused => EngineCommand::Play,
            PlaybackState::Idle => return,
        };
        let _ = self.commands.send(cmd);
    }

    fn scrub_by(&mut self, delta_secs: f64) {
        let snapshot = self.snapshots.read();
        if snapshot.session_kind != Some(SessionKind::DecodedFile) {
            return;
        }
        let duration = snapshot.duration_secs.unwrap_or(0.0);
        let target = (snapshot.elapsed_secs + delta_secs).clamp(0.0, duration);
        // A scrub while playing commits the seek; while paused it is a
        // short audible preview that rests back at the target.
        let resume_playing = snapshot.state == PlaybackState::Playing;
        let _ = self.commands.send(EngineCommand::Scrub {
            time_secs: target,
            resume_playing,
        });
    }
}
