use std::path::PathBuf;

use clap::Parser;

/// vocalis — real-time voice timbre analysis and scoring.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Audio source: "mic" for microphone capture, or a path to an audio
    /// file (WAV, MP3, FLAC, OGG, AAC).
    #[arg(long)]
    pub source: Option<String>,

    /// Configuration TOML file. Default: config/vocalis.toml.
    #[arg(short, long, default_value = "config/vocalis.toml")]
    pub config: PathBuf,

    /// Classifier model JSON (overrides model_path from the config).
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Run without audible output; analysis and prediction still run.
    #[arg(long, default_value_t = false)]
    pub mute: bool,

    /// Log level: error, warn, info, debug, trace.
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Cli {
    /// Validate that an audio source was provided.
    ///
    /// # Errors
    /// Returns an error if no source is specified.
    pub fn validate_source(&self) -> anyhow::Result<()> {
        if self.source.is_none() {
            anyhow::bail!("No audio source specified. Use --source mic or --source <file>.");
        }
        Ok(())
    }
}
