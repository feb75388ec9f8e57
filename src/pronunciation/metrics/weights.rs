use serde::{Deserialize, Serialize};

use crate::pronunciation::{PronunciationError, Result};

/// Relative weight of each per-unit term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub mfcc: f32,
    pub energy: f32,
    pub duration: f32,
    pub pitch: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            mfcc: 0.5,
            energy: 0.15,
            duration: 0.15,
            pitch: 0.2,
        }
    }
}

/// Combination of whole-utterance terms into the word-mode `overall_score`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordOverallWeights {
    pub mfcc: f32,
    pub energy: f32,
    pub pitch: f32,
}

impl Default for WordOverallWeights {
    fn default() -> Self {
        Self {
            mfcc: 0.6,
            energy: 0.2,
            pitch: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentenceWeights {
    pub pronunciation: f32,
    pub fluency: f32,
    pub word_total: f32,
}

impl Default for SentenceWeights {
    fn default() -> Self {
        Self {
            pronunciation: 0.6,
            fluency: 0.2,
            word_total: 0.2,
        }
    }
}

/// Decay scales: a deviation equal to the scale scores about 37.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreScales {
    /// Mean cosine distance.
    pub mfcc: f32,
    /// Absolute log energy ratio.
    pub energy: f32,
    /// Absolute log duration ratio.
    pub duration: f32,
    /// Mean absolute deviation in semitones.
    pub pitch_semitones: f32,
}

impl Default for ScoreScales {
    fn default() -> Self {
        Self {
            mfcc: 0.5,
            energy: 1.0,
            duration: 1.0,
            pitch_semitones: 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluencyConfig {
    /// Pauses up to this multiple of the median pause go unpenalized.
    pub pause_multiple: f32,
    /// Lower bound on the pause allowance.
    pub min_pause_ms: f32,
    /// Frames below this fraction of the mean candidate energy count as silence.
    pub silence_ratio: f32,
    /// Share of pause regularity in the fluency score; tempo takes the rest.
    pub pause_weight: f32,
}

impl Default for FluencyConfig {
    fn default() -> Self {
        Self {
            pause_multiple: 2.0,
            min_pause_ms: 150.0,
            silence_ratio: 0.1,
            pause_weight: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub unit_weights: ScoringWeights,
    pub word_weights: WordOverallWeights,
    pub sentence_weights: SentenceWeights,
    pub scales: ScoreScales,
    pub fluency: FluencyConfig,
    /// Minimum alignment confidence for a word to count as recognized.
    pub recognition_threshold: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            unit_weights: ScoringWeights::default(),
            word_weights: WordOverallWeights::default(),
            sentence_weights: SentenceWeights::default(),
            scales: ScoreScales::default(),
            fluency: FluencyConfig::default(),
            recognition_threshold: 0.35,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        let weights = [
            ("unit_weights.mfcc", self.unit_weights.mfcc),
            ("unit_weights.energy", self.unit_weights.energy),
            ("unit_weights.duration", self.unit_weights.duration),
            ("unit_weights.pitch", self.unit_weights.pitch),
            ("word_weights.mfcc", self.word_weights.mfcc),
            ("word_weights.energy", self.word_weights.energy),
            ("word_weights.pitch", self.word_weights.pitch),
            ("sentence_weights.pronunciation", self.sentence_weights.pronunciation),
            ("sentence_weights.fluency", self.sentence_weights.fluency),
            ("sentence_weights.word_total", self.sentence_weights.word_total),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(PronunciationError::config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        let sums = [
            (
                "unit_weights",
                self.unit_weights.mfcc
                    + self.unit_weights.energy
                    + self.unit_weights.duration
                    + self.unit_weights.pitch,
            ),
            (
                "word_weights",
                self.word_weights.mfcc + self.word_weights.energy + self.word_weights.pitch,
            ),
            (
                "sentence_weights",
                self.sentence_weights.pronunciation
                    + self.sentence_weights.fluency
                    + self.sentence_weights.word_total,
            ),
        ];
        for (name, sum) in sums {
            if sum <= 0.0 {
                return Err(PronunciationError::config(format!(
                    "{name} must not all be zero"
                )));
            }
        }
        let positive = [
            ("scales.mfcc", self.scales.mfcc),
            ("scales.energy", self.scales.energy),
            ("scales.duration", self.scales.duration),
            ("scales.pitch_semitones", self.scales.pitch_semitones),
            ("fluency.pause_multiple", self.fluency.pause_multiple),
            ("fluency.min_pause_ms", self.fluency.min_pause_ms),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(PronunciationError::config(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        let fractions = [
            ("fluency.silence_ratio", self.fluency.silence_ratio),
            ("fluency.pause_weight", self.fluency.pause_weight),
            ("recognition_threshold", self.recognition_threshold),
        ];
        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(PronunciationError::config(format!(
                    "{name} must lie in [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ScoringConfig::default().validate().unwrap();
    }

    #[test]
    fn negative_weight_is_rejected() {
        let mut config = ScoringConfig::default();
        config.unit_weights.pitch = -0.1;
        assert!(matches!(
            config.validate(),
            Err(PronunciationError::Config { .. })
        ));
    }

    #[test]
    fn all_zero_sentence_weights_are_rejected() {
        let mut config = ScoringConfig::default();
        config.sentence_weights = SentenceWeights {
            pronunciation: 0.0,
            fluency: 0.0,
            word_total: 0.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let config: ScoringConfig =
            serde_json::from_str(r#"{"scales": {"mfcc": 0.25}, "recognition_threshold": 0.5}"#)
                .unwrap();
        assert_eq!(config.scales.mfcc, 0.25);
        assert_eq!(config.scales.pitch_semitones, 4.0);
        assert_eq!(config.recognition_threshold, 0.5);
        assert_eq!(config.unit_weights, ScoringWeights::default());
    }
}
