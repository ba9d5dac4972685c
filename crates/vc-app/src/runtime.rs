use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use anyhow::Result;
use arc_swap::ArcSwap;
use triple_buffer::TripleBuffer;

use vc_audio::broker::FeatureBroker;
use vc_audio::capture::CaptureStream;
use vc_audio::transport::{OutputKind, PlaybackState, SessionKind, TransportEngine};
use vc_core::config::EngineConfig;
use vc_predict::classifier::LogisticModel;
use vc_predict::pipeline::{PredictionPipeline, NEUTRAL_PREDICTION};

/// Commands accepted by the engine thread. The channel serializes every
/// audio-graph mutation onto that one thread.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Decode a file from disk and install it as the session.
    LoadPath(PathBuf),
    /// Capture from the default input device.
    AttachMic,
    /// Tear the current session down.
    Unload,
    /// Resume playback from the current position.
    Play,
    /// Stop playback, keeping the position.
    Pause,
    /// Seek, as a preview or a committed seek.
    Scrub { time_secs: f64, resume_playing: bool },
    /// Empty the feature window (prediction history is untouched).
    ClearBuffer,
    /// Drop the k oldest prediction history entries.
    PurgeHistory(usize),
    /// Tear everything down and exit the engine thread.
    Quit,
}

/// State published to the UI once per engine tick.
#[derive(Clone, Debug)]
pub struct EngineSnapshot {
    pub state: PlaybackState,
    pub session_kind: Option<SessionKind>,
    pub elapsed_secs: f64,
    pub duration_secs: Option<f64>,
    /// Latest emitted prediction (neutral included).
    pub prediction: f32,
    /// Prediction history values, oldest → newest.
    pub history: Vec<f32>,
    pub window_len: usize,
    pub window_capacity: usize,
    pub classifier_ready: bool,
    pub broker_active: bool,
    /// Loudness of the most recent feature frame.
    pub loudness: f32,
}

impl Default for EngineSnapshot {
    fn default() -> Self {
        Self {
            state: PlaybackState::Idle,
            session_kind: None,
            elapsed_secs: 0.0,
            duration_secs: None,
            prediction: NEUTRAL_PREDICTION,
            history: Vec::new(),
            window_len: 0,
            window_capacity: 0,
            classifier_ready: false,
            broker_active: false,
            loudness: 0.0,
        }
    }
}

/// Running engine thread: command channel in, snapshots out.
pub struct EngineHandle {
    pub commands: flume::Sender<EngineCommand>,
    pub snapshots: triple_buffer::Output<EngineSnapshot>,
    pub thread: thread::JoinHandle<()>,
}

/// Spawn the engine thread owning the transport, the broker, and the
/// prediction pipeline. Every graph mutation, feature callback, and
/// inference tick runs on this thread; callbacks from the audio device
/// only ever touch atomics.
///
/// # Errors
/// Returns an error if the thread cannot be spawned.
pub fn spawn_engine(
    config: Arc<ArcSwap<EngineConfig>>,
    output_kind: OutputKind,
    model: Option<LogisticModel>,
) -> Result<EngineHandle> {
    let (cmd_tx, cmd_rx) = flume::bounded(32);
    let (mut snap_in, snap_out) = TripleBuffer::new(&EngineSnapshot::default()).split();

    let handle = thread::Builder::new()
        .name("vc-engine".to_string())
        .spawn(move || {
            run_engine_loop(&config, output_kind, model, &cmd_rx, &mut snap_in);
        })?;

    Ok(EngineHandle {
        commands: cmd_tx,
        snapshots: snap_out,
        thread: handle,
    })
}

fn run_engine_loop(
    config: &Arc<ArcSwap<EngineConfig>>,
    output_kind: OutputKind,
    model: Option<LogisticModel>,
    cmd_rx: &flume::Receiver<EngineCommand>,
    snap_in: &mut triple_buffer::Input<EngineSnapshot>,
) {
    let startup = config.load();
    let mut engine = TransportEngine::new(output_kind);
    let mut broker = FeatureBroker::new(startup.block_size);
    let pipeline = Arc::new(Mutex::new(PredictionPipeline::new(&startup)));
    let poll_period = startup.poll_interval();
    drop(startup);

    if let Some(model) = model
        && let Ok(mut p) = pipeline.lock()
    {
        p.set_classifier(Box::new(model));
    }

    // Two independent broker consumers: the prediction pipeline, and a
    // loudness meter for the UI. Each holds its own handle.
    let sink = Arc::clone(&pipeline);
    let _prediction_sub = broker.subscribe(move |frame| {
        if let Ok(mut p) = sink.lock() {
            p.on_feature_frame(frame);
        }
    });
    let loudness = Arc::new(Mutex::new(0.0f32));
    let meter = Arc::clone(&loudness);
    let _meter_sub = broker.subscribe(move |frame| {
        if let Ok(mut m) = meter.lock() {
            *m = frame.loudness;
        }
    });

    let mut scratch: Vec<f32> = Vec::new();

    loop {
        // Drain commands until the tick deadline.
        let deadline = Instant::now() + poll_period;
        loop {
            match cmd_rx.recv_deadline(deadline) {
                Ok(EngineCommand::Quit) | Err(flume::RecvTimeoutError::Disconnected) => {
                    engine.unload();
                    return;
                }
                Ok(cmd) => handle_command(cmd, &mut engine, &mut broker, &pipeline, config),
                Err(flume::RecvTimeoutError::Timeout) => break,
            }
        }

        // Analyzer lifecycle follows the audible source: live only while
        // the session's processing context is running and consumers exist.
        if engine.is_context_running() {
            if let Some(session) = engine.session() {
                broker.bind_source(session.sample_rate);
            }
        } else {
            broker.clear_source();
        }

        // Tap the audible signal and fan the resulting frames out.
        if engine.drain_audible(&mut scratch) > 0 {
            broker.push_samples(&scratch);
        }

        // Cooperative ticks: scrub auto-pause, end-of-track, inference.
        engine.poll();
        if let Ok(mut p) = pipeline.lock() {
            p.poll();
        }

        snap_in.write(snapshot(&engine, &broker, &pipeline, &loudness));
    }
}

fn handle_command(
    cmd: EngineCommand,
    engine: &mut TransportEngine,
    broker: &mut FeatureBroker,
    pipeline: &Arc<Mutex<PredictionPipeline>>,
    config: &Arc<ArcSwap<EngineConfig>>,
) {
    let cfg = config.load();
    match cmd {
        EngineCommand::LoadPath(path) => {
            // Session swap: drop the analyzer with the old source so a
            // straddling partial block cannot leak into the new one.
            broker.clear_source();
            match engine.load_path(&path) {
                Ok(session) => log::info!(
                    "Loaded {} ({:.1}s @ {}Hz)",
                    path.display(),
                    session.duration_secs.unwrap_or(0.0),
                    session.sample_rate
                ),
                Err(e) => log::error!("Load failed for {}: {e}", path.display()),
            }
        }
        EngineCommand::AttachMic => {
            broker.clear_source();
            match CaptureStream::open_default() {
                Ok(stream) => {
                    let session = engine.attach_stream(stream);
                    log::info!("Capturing @ {}Hz", session.sample_rate);
                }
                Err(e) => log::error!("Microphone unavailable: {e}"),
            }
        }
        EngineCommand::Unload => {
            broker.clear_source();
            engine.unload();
        }
        EngineCommand::Play => {
            let at = engine.elapsed_secs();
            if let Err(e) = engine.play(at) {
                log::warn!("Play rejected: {e}");
            }
        }
        EngineCommand::Pause => engine.pause(),
        EngineCommand::Scrub {
            time_secs,
            resume_playing,
        } => {
            // Preview length comes from the settings at each call site; a
            // disabled preview degenerates to a zero-length one, which the
            // next poll resolves into a plain reposition.
            let preview = if cfg.scrubber_preview {
                cfg.scrub_preview_secs
            } else {
                0.0
            };
            if let Err(e) = engine.scrub(time_secs, resume_playing, preview) {
                log::warn!("Scrub rejected: {e}");
            }
        }
        EngineCommand::ClearBuffer => {
            if let Ok(mut p) = pipeline.lock() {
                p.clear_buffer();
            }
        }
        EngineCommand::PurgeHistory(k) => {
            if let Ok(mut p) = pipeline.lock() {
                let removed = p.purge_history(k);
                log::debug!("Purged {removed} prediction samples");
            }
        }
        EngineCommand::Quit => unreachable!("handled by the loop"),
    }
}

fn snapshot(
    engine: &TransportEngine,
    broker: &FeatureBroker,
    pipeline: &Arc<Mutex<PredictionPipeline>>,
    loudness: &Arc<Mutex<f32>>,
) -> EngineSnapshot {
    let (prediction, history, window_len, window_capacity, classifier_ready) =
        match pipeline.lock() {
            Ok(p) => (
                p.latest(),
                p.history().iter().map(|s| s.value).collect(),
                p.window_len(),
                p.window_capacity(),
                p.classifier_ready(),
            ),
            Err(_) => (NEUTRAL_PREDICTION, Vec::new(), 0, 0, false),
        };

    EngineSnapshot {
        state: engine.state(),
        session_kind: engine.session().map(|s| s.kind),
        elapsed_secs: engine.elapsed_secs(),
        duration_secs: engine.duration_secs(),
        prediction,
        history,
        window_len,
        window_capacity,
        classifier_ready,
        broker_active: broker.is_active(),
        loudness: loudness.lock().map(|l| *l).unwrap_or(0.0),
    }
}
