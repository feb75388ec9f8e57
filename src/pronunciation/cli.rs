use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::EngineConfig;
use crate::pronunciation::{EvaluationMode, EvaluationRequest, ReferenceAudio, VoiceVariant};
use crate::types::AudioInput;

#[derive(Parser, Debug)]
#[command(
    name = "pronunciation",
    about = "Score a learner recording against a reference pronunciation"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Score a learner recording and print the result as JSON.
    Evaluate(EvaluateArgs),
    /// Render a slower or faster copy of a recording without changing its pitch.
    Stretch(StretchArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    /// One score per character.
    Word,
    /// One score per word plus fluency.
    Sentence,
    /// Whole-utterance DTW distance with a per-letter split.
    Legacy,
}

impl ModeArg {
    /// `None` selects the legacy scorer.
    pub fn evaluation_mode(self) -> Option<EvaluationMode> {
        match self {
            ModeArg::Word => Some(EvaluationMode::Word),
            ModeArg::Sentence => Some(EvaluationMode::Sentence),
            ModeArg::Legacy => None,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    /// Learner recording (WAV, MP3, OGG, FLAC, ...).
    #[arg(long)]
    pub learner: PathBuf,
    /// Reference recording to compare against.
    #[arg(long, conflicts_with = "reference_dir")]
    pub reference: Option<PathBuf>,
    /// Reference library laid out as `<voice>/<text>.<ext>`.
    #[arg(long = "reference-dir")]
    pub reference_dir: Option<PathBuf>,
    /// Reference voice variant (1 or 2) used with --reference-dir.
    #[arg(long, default_value_t = 2)]
    pub voice: u8,
    /// Text the learner was asked to say.
    #[arg(long, default_value = crate::pronunciation::DEFAULT_REFERENCE_TEXT)]
    pub text: String,
    #[arg(long, value_enum, default_value_t = ModeArg::Word)]
    pub mode: ModeArg,
    /// Engine configuration JSON.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Maximum frame skew allowed during alignment.
    #[arg(long)]
    pub band: Option<usize>,
    /// Pretty-print the JSON result.
    #[arg(long)]
    pub pretty: bool,
}

impl EvaluateArgs {
    /// File config (or defaults), then environment, then command-line flags.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let config = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };
        let mut config = config.with_env_overrides()?;
        if let Some(band) = self.band {
            config.alignment.band = Some(band);
        }
        if let Some(dir) = &self.reference_dir {
            config.reference.directory = Some(dir.clone());
        }
        Ok(config)
    }

    pub fn request(&self) -> Result<EvaluationRequest> {
        let candidate = read_audio(&self.learner)?;
        let reference = match (&self.reference, &self.reference_dir) {
            (Some(path), _) => ReferenceAudio::Provided(read_audio(path)?),
            (None, Some(_)) => ReferenceAudio::Fetch(VoiceVariant::from_code(self.voice)?),
            (None, None) => bail!("provide either --reference or --reference-dir"),
        };
        let mode = self.mode.evaluation_mode().unwrap_or_default();
        Ok(EvaluationRequest::new(candidate, reference)
            .with_text(self.text.clone())
            .with_mode(mode))
    }
}

#[derive(Args, Debug, Clone)]
pub struct StretchArgs {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,
    /// Destination WAV file.
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,
    /// Tempo multiplier: below 1.0 slows the recording down.
    #[arg(long, default_value_t = 0.75)]
    pub factor: f32,
}

impl StretchArgs {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.factor.is_finite() && self.factor > 0.0,
            "--factor must be a positive number, got {}",
            self.factor
        );
        ensure!(
            self.input.is_file(),
            "input file does not exist: {}",
            self.input.display()
        );
        Ok(())
    }
}

/// Reads an audio file, using its extension as the container hint.
pub fn read_audio(path: &Path) -> Result<AudioInput> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let input = AudioInput::new(bytes);
    Ok(match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => input.with_format_hint(ext.to_ascii_lowercase()),
        None => input,
    })
}
