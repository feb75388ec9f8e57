use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::decoder;
use crate::audio::resample;
use crate::audio::trim::{trim_silence, TrimPolicy};
use crate::types::{AudioData, AudioInput};

use super::{AudioRole, AudioSignal, PronunciationError, Result};

/// Head/tail silence trimming applied after decoding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub trim_silence: bool,
    pub trim_window_ms: f64,
    pub trim_floor: f32,
    pub trim_relative: f32,
    pub trim_padding_ms: f64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        let policy = TrimPolicy::default();
        Self {
            trim_silence: true,
            trim_window_ms: policy.window_ms,
            trim_floor: policy.floor,
            trim_relative: policy.relative,
            trim_padding_ms: policy.padding_ms,
        }
    }
}

impl LoaderConfig {
    pub fn trim_policy(&self) -> TrimPolicy {
        TrimPolicy {
            window_ms: self.trim_window_ms,
            floor: self.trim_floor,
            relative: self.trim_relative,
            padding_ms: self.trim_padding_ms,
        }
    }
}

/// Turns encoded uploads into normalized mono signals at one fixed rate.
#[derive(Debug, Clone)]
pub struct SignalLoader {
    target_rate: u32,
    config: LoaderConfig,
}

impl SignalLoader {
    pub fn new(target_rate: u32, config: LoaderConfig) -> Self {
        Self {
            target_rate,
            config,
        }
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    pub fn load(&self, input: AudioInput, role: AudioRole) -> Result<AudioSignal> {
        if input.is_empty() {
            return Err(PronunciationError::input(format!("{role} is empty")));
        }
        let byte_len = input.bytes.len();
        let decoded = decoder::decode_bytes(input.bytes, input.format_hint.as_deref())
            .map_err(|err| PronunciationError::unsupported_audio(role, err))?;
        if decoded.is_empty() {
            return Err(PronunciationError::unsupported_audio(
                role,
                "container decoded to zero samples",
            ));
        }
        debug!(
            %role,
            bytes = byte_len,
            source_rate = decoded.sample_rate,
            samples = decoded.samples.len(),
            "audio decoded"
        );
        self.normalize(decoded, role)
    }

    /// Applies the resample and trim policy to PCM the caller already holds.
    pub fn load_samples(
        &self,
        samples: Vec<f32>,
        sample_rate: u32,
        role: AudioRole,
    ) -> Result<AudioSignal> {
        if samples.is_empty() {
            return Err(PronunciationError::input(format!("{role} contains no samples")));
        }
        if sample_rate == 0 {
            return Err(PronunciationError::input(format!(
                "{role} has a zero sample rate"
            )));
        }
        self.normalize(AudioData::new(samples, sample_rate), role)
    }

    fn normalize(&self, audio: AudioData, role: AudioRole) -> Result<AudioSignal> {
        let resampled = resample::to_rate(audio, self.target_rate)
            .map_err(|err| PronunciationError::unsupported_audio(role, err))?;
        let trimmed = if self.config.trim_silence {
            trim_silence(&resampled, &self.config.trim_policy())
        } else {
            resampled
        };
        debug!(
            %role,
            rate = trimmed.sample_rate,
            seconds = trimmed.duration_seconds(),
            "audio normalized"
        );
        AudioSignal::from_samples(trimmed.samples, trimmed.sample_rate)
    }
}

impl Default for SignalLoader {
    fn default() -> Self {
        Self::new(
            crate::pronunciation::features::TARGET_SAMPLE_RATE,
            LoaderConfig::default(),
        )
    }
}
