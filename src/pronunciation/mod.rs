pub mod alignment;
pub mod cli;
pub mod dispatcher;
pub mod features;
pub mod loader;
pub mod metrics;
pub mod pool;
pub mod reference;
pub mod result;

use std::fmt::{Display, Formatter};
use std::ops::Range;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use alignment::{AlignmentPath, SequenceAligner, UnitProjection, UnitSegmenter, UnitTiming};
pub use dispatcher::{
    CancellationToken, EvaluationRequest, FeatureSet, ModeDispatcher, PipelineStage,
    ReferenceAudio,
};
pub use features::{FeatureExtractor, FeatureSequence, FrameParams};
pub use loader::SignalLoader;
pub use metrics::{MetricCalculator, UnitMetrics, UnitScore};
pub use pool::{EvaluationPool, EvaluationTicket};
pub use reference::{ReferenceSource, ReferenceStore, VoiceVariant};
pub use result::{EvaluationResult, Outcome};

/// Reference text used when a request does not carry one.
pub const DEFAULT_REFERENCE_TEXT: &str = "Hello";

/// Convenient alias for results returned by pronunciation modules.
pub type Result<T> = std::result::Result<T, PronunciationError>;

/// Which side of the comparison an audio input belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioRole {
    Reference,
    Candidate,
}

impl Display for AudioRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioRole::Reference => write!(f, "reference audio"),
            AudioRole::Candidate => write!(f, "learner audio"),
        }
    }
}

/// Failure taxonomy surfaced to callers of the scoring engine.
///
/// Only structural failures appear here; numeric edge cases inside scoring are
/// absorbed as zero-valued terms.
#[derive(Debug, Clone, Error)]
pub enum PronunciationError {
    #[error("invalid input: {message}")]
    InputValidation { message: String },

    #[error("unsupported evaluation mode \"{mode}\" (expected WORD or SENTENCE)")]
    InvalidMode { mode: String },

    #[error("unsupported or corrupt {role}: {message}")]
    UnsupportedAudioFormat { role: AudioRole, message: String },

    #[error("feature extraction failed for {role}: {message}")]
    FeatureExtraction { role: AudioRole, message: String },

    #[error("reference audio unavailable: {message}")]
    ReferenceFetch { message: String },

    #[error(
        "reference ({reference_frames} frames) and learner ({candidate_frames} frames) \
         are too dissimilar to align within {band} frames"
    )]
    AlignmentWindowExceeded {
        band: usize,
        reference_frames: usize,
        candidate_frames: usize,
    },

    #[error("evaluation cancelled before {stage}")]
    Cancelled { stage: &'static str },

    #[error("configuration error: {message}")]
    Config { message: String },
}

impl PronunciationError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::InputValidation {
            message: message.into(),
        }
    }

    pub fn unsupported_audio(role: AudioRole, err: impl Display) -> Self {
        Self::UnsupportedAudioFormat {
            role,
            message: format!("{err:#}"),
        }
    }

    pub fn feature(role: AudioRole, err: impl Display) -> Self {
        Self::FeatureExtraction {
            role,
            message: format!("{err:#}"),
        }
    }

    pub fn reference_fetch(err: impl Display) -> Self {
        Self::ReferenceFetch {
            message: format!("{err:#}"),
        }
    }

    pub fn config(err: impl Display) -> Self {
        Self::Config {
            message: format!("{err:#}"),
        }
    }

    /// Whether the caller may resubmit the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ReferenceFetch { .. })
    }

    /// The audio input blamed for the failure, when there is one.
    pub fn audio_role(&self) -> Option<AudioRole> {
        match self {
            Self::UnsupportedAudioFormat { role, .. } | Self::FeatureExtraction { role, .. } => {
                Some(*role)
            }
            _ => None,
        }
    }
}

/// Evaluation granularity requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvaluationMode {
    /// One score per character of a single word.
    #[default]
    Word,
    /// One score per word of a sentence, plus fluency.
    Sentence,
}

impl EvaluationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationMode::Word => "WORD",
            EvaluationMode::Sentence => "SENTENCE",
        }
    }
}

impl Display for EvaluationMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvaluationMode {
    type Err = PronunciationError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "WORD" => Ok(EvaluationMode::Word),
            "SENTENCE" => Ok(EvaluationMode::Sentence),
            _ => Err(PronunciationError::InvalidMode {
                mode: value.to_string(),
            }),
        }
    }
}

/// Normalized mono signal at the engine's target sample rate.
#[derive(Debug, Clone)]
pub struct AudioSignal {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl AudioSignal {
    /// Wraps PCM samples, clamping them to [-1.0, 1.0].
    ///
    /// Zero-length signals and a zero sample rate are rejected.
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(PronunciationError::input("sample rate must be positive"));
        }
        if samples.is_empty() {
            return Err(PronunciationError::input("audio signal contains no samples"));
        }
        let clamped: Vec<f32> = samples
            .into_iter()
            .map(|s| if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 })
            .collect();
        Ok(Self {
            samples: Arc::from(clamped),
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_seconds())
    }

    pub fn rms(&self) -> f32 {
        crate::audio::trim::rms(&self.samples)
    }
}

/// One character (word mode) or word (sentence mode) of the reference text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringUnit {
    pub symbol: String,
    pub reference_frames: Range<usize>,
}

impl ScoringUnit {
    pub fn new(symbol: impl Into<String>, reference_frames: Range<usize>) -> Self {
        Self {
            symbol: symbol.into(),
            reference_frames,
        }
    }
}

/// Speech recognition outcome attached to a result when available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Transcript {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence: sanitize_confidence(confidence),
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        let language = language.into();
        self.language = (!language.is_empty()).then_some(language);
        self
    }

    pub(crate) fn sanitized(mut self) -> Self {
        self.confidence = sanitize_confidence(self.confidence);
        self
    }
}

fn sanitize_confidence(confidence: f32) -> f32 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
