use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::pronunciation::alignment::AlignmentConfig;
use crate::pronunciation::features::FrameParams;
use crate::pronunciation::loader::LoaderConfig;
use crate::pronunciation::metrics::ScoringConfig;
use crate::pronunciation::PronunciationError;
use crate::transcription::TranscriberConfig;

pub const ENV_SAMPLE_RATE: &str = "SPOKEN_EVALUATE_SAMPLE_RATE";
pub const ENV_WHISPER_MODEL: &str = "SPOKEN_EVALUATE_WHISPER_MODEL";
pub const ENV_LANGUAGE: &str = "SPOKEN_EVALUATE_LANGUAGE";
pub const ENV_DISABLE_WHISPER: &str = "DISABLE_WHISPER";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    /// Root of a `<voice>/<text>.<ext>` reference library.
    pub directory: Option<PathBuf>,
    pub cache_ttl_seconds: u64,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            directory: None,
            cache_ttl_seconds: 3_600,
        }
    }
}

/// Every tunable constant of the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub features: FrameParams,
    pub loader: LoaderConfig,
    pub alignment: AlignmentConfig,
    pub scoring: ScoringConfig,
    pub transcriber: TranscriberConfig,
    pub reference: ReferenceConfig,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw).context("failed to parse engine config")?;
        config.validate()?;
        Ok(config)
    }

    /// Applies the process environment on top of file values.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides read through `lookup`, keyed by environment variable name.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(rate) = lookup(ENV_SAMPLE_RATE) {
            self.features.sample_rate = rate
                .trim()
                .parse()
                .with_context(|| format!("{ENV_SAMPLE_RATE} must be an integer, got {rate:?}"))?;
        }
        if let Some(model) = lookup(ENV_WHISPER_MODEL).filter(|m| !m.trim().is_empty()) {
            self.transcriber.model_path = Some(PathBuf::from(model.trim()));
        }
        if let Some(language) = lookup(ENV_LANGUAGE).filter(|l| !l.trim().is_empty()) {
            self.transcriber.language = language.trim().to_string();
        }
        if let Some(flag) = lookup(ENV_DISABLE_WHISPER) {
            if matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes") {
                self.transcriber.enabled = false;
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> std::result::Result<(), PronunciationError> {
        let features = &self.features;
        if features.sample_rate < 8_000 {
            return Err(PronunciationError::config(format!(
                "features.sample_rate must be at least 8000 Hz, got {}",
                features.sample_rate
            )));
        }
        if features.window_ms == 0 || features.hop_ms == 0 {
            return Err(PronunciationError::config(
                "features.window_ms and features.hop_ms must be positive",
            ));
        }
        if features.mfcc_count == 0 || features.mel_bands <= features.mfcc_count {
            return Err(PronunciationError::config(format!(
                "features.mel_bands ({}) must exceed features.mfcc_count ({}) and both be positive",
                features.mel_bands, features.mfcc_count
            )));
        }
        let nyquist = features.sample_rate as f64 / 2.0;
        if !(features.pitch_min_hz > 0.0
            && features.pitch_min_hz < features.pitch_max_hz
            && features.pitch_max_hz <= nyquist)
        {
            return Err(PronunciationError::config(format!(
                "pitch range {}..{} Hz is invalid for {} Hz audio",
                features.pitch_min_hz, features.pitch_max_hz, features.sample_rate
            )));
        }
        if !(0.0..nyquist).contains(&features.min_frequency) {
            return Err(PronunciationError::config(format!(
                "features.min_frequency must lie below {nyquist} Hz"
            )));
        }
        let loader = &self.loader;
        if loader.trim_window_ms <= 0.0 || loader.trim_padding_ms < 0.0 {
            return Err(PronunciationError::config(
                "loader trim window must be positive and padding non-negative",
            ));
        }
        self.scoring.validate()
    }
}
