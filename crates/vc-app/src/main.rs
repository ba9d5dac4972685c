use std::sync::Arc;

use anyhow::Result;
use arc_swap::ArcSwap;
use clap::Parser;

use vc_audio::transport::OutputKind;
use vc_core::config::EngineConfig;
use vc_predict::classifier::LogisticModel;

pub mod app;
pub mod cli;
pub mod runtime;
pub mod ui;

fn main() -> Result<()> {
    // 1. Parse CLI
    let cli = cli::Cli::parse();

    // 2. Initialize logging
    env_logger::Builder::new()
        .filter_level(cli.log_level.parse().unwrap_or(log::LevelFilter::Warn))
        .init();

    // 3. Validate the source
    cli.validate_source()?;

    // 4. Load config
    let config = if cli.config.exists() {
        vc_core::config::load_config(&cli.config)?
    } else {
        log::warn!(
            "Config not found: {}. Using defaults.",
            cli.config.display()
        );
        EngineConfig::default()
    };
    let config = Arc::new(ArcSwap::from_pointee(config));

    // 5. Load the classifier model, if one is available. Its absence is a
    // valid state: the pipeline emits neutral predictions until then.
    let model_path = cli.model.clone().or_else(|| config.load().model_path.clone());
    let model = match model_path {
        Some(path) => match LogisticModel::from_path(&path) {
            Ok(model) => {
                log::info!("Classifier loaded: {}", path.display());
                Some(model)
            }
            Err(e) => {
                log::warn!("Classifier unavailable ({e}); predictions stay neutral");
                None
            }
        },
        None => {
            log::info!("No classifier model configured; predictions stay neutral");
            None
        }
    };

    // 6. Spawn the engine thread
    let output_kind = if cli.mute {
        OutputKind::Silent
    } else {
        OutputKind::Device
    };
    let engine = runtime::spawn_engine(Arc::clone(&config), output_kind, model)?;

    // 7. Install the requested source
    let source_name = match cli.source.as_deref() {
        Some("mic" | "microphone" | "default") => {
            let _ = engine.commands.send(runtime::EngineCommand::AttachMic);
            Some("microphone".to_string())
        }
        Some(path) => {
            let path = std::path::PathBuf::from(path);
            let name = path.file_name().and_then(|n| n.to_str()).map(String::from);
            let _ = engine
                .commands
                .send(runtime::EngineCommand::LoadPath(path));
            name
        }
        None => None,
    };

    // 8. Run the TUI
    let terminal = ratatui::init();
    let mut app_instance = app::App::new(
        config,
        engine.commands.clone(),
        engine.snapshots,
        source_name,
    );
    let result = app_instance.run(terminal);

    // 9. Restore the terminal (ALWAYS, even on error), then wind the
    // engine down so no audio context or capture stream outlives us.
    ratatui::restore();
    let _ = engine.commands.send(runtime::EngineCommand::Quit);
    let _ = engine.thread.join();

    result
}
