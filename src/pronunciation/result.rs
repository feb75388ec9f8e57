use serde::{Deserialize, Serialize};

use super::metrics::{UnitMetrics, UnitScore};
use super::{EvaluationMode, Transcript};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterScore {
    pub symbol: String,
    pub frame_start: usize,
    pub frame_end: usize,
    pub score: f32,
    pub metrics: UnitMetrics,
}

impl From<UnitScore> for CharacterScore {
    fn from(unit: UnitScore) -> Self {
        Self {
            symbol: unit.symbol,
            frame_start: unit.frame_start,
            frame_end: unit.frame_end,
            score: unit.score,
            metrics: unit.metrics,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordScore {
    pub word: String,
    pub frame_start: usize,
    pub frame_end: usize,
    pub score: f32,
    pub metrics: UnitMetrics,
}

impl From<UnitScore> for WordScore {
    fn from(unit: UnitScore) -> Self {
        Self {
            word: unit.symbol,
            frame_start: unit.frame_start,
            frame_end: unit.frame_end,
            score: unit.score,
            metrics: unit.metrics,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordResult {
    pub character_scores: Vec<CharacterScore>,
    pub mfcc_score: f32,
    pub energy_score: f32,
    pub pitch_score: f32,
    pub composite_score: f32,
    pub overall_score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceResult {
    pub word_scores: Vec<WordScore>,
    pub pronunciation_score: f32,
    pub fluency_score: f32,
    pub word_total_score: f32,
    pub overall_score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LetterMetrics {
    /// Mean local path cost over the letter.
    pub avg_diff: f32,
    /// Number of path pairs that fell inside the letter.
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LetterScore {
    pub symbol: String,
    pub frame_start: usize,
    pub frame_end: usize,
    pub score: f32,
    pub metrics: LetterMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegacyMetrics {
    pub dtw_distance: f32,
    pub energy_ratio: f32,
    pub duration_ratio: f32,
    pub articulation_score: f32,
}

/// Whole-utterance DTW distance with a coarse per-letter split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyResult {
    pub overall_score: f32,
    pub normalized_score: f32,
    pub letter_scores: Vec<LetterScore>,
    pub metrics: LegacyMetrics,
}

/// Mode-specific payload; the `mode` tag selects the shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "UPPERCASE")]
pub enum Outcome {
    Word { word_result: WordResult },
    Sentence { sentence_result: SentenceResult },
    Legacy(LegacyResult),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    #[serde(flatten)]
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Transcript>,
}

impl EvaluationResult {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            transcript: None,
        }
    }

    pub fn with_transcript(mut self, transcript: Option<Transcript>) -> Self {
        self.transcript = transcript.map(Transcript::sanitized);
        self
    }

    /// `None` for the legacy shape, which predates evaluation modes.
    pub fn mode(&self) -> Option<EvaluationMode> {
        match self.outcome {
            Outcome::Word { .. } => Some(EvaluationMode::Word),
            Outcome::Sentence { .. } => Some(EvaluationMode::Sentence),
            Outcome::Legacy(_) => None,
        }
    }

    pub fn overall_score(&self) -> f32 {
        match &self.outcome {
            Outcome::Word { word_result } => word_result.overall_score,
            Outcome::Sentence { sentence_result } => sentence_result.overall_score,
            Outcome::Legacy(legacy) => legacy.overall_score,
        }
    }

    pub fn unit_count(&self) -> usize {
        match &self.outcome {
            Outcome::Word { word_result } => word_result.character_scores.len(),
            Outcome::Sentence { sentence_result } => sentence_result.word_scores.len(),
            Outcome::Legacy(legacy) => legacy.letter_scores.len(),
        }
    }

    /// Every 0–100 score in the result, unit-level and aggregate.
    pub fn scores(&self) -> Vec<f32> {
        match &self.outcome {
            Outcome::Word { word_result: w } => {
                let mut scores = vec![
                    w.mfcc_score,
                    w.energy_score,
                    w.pitch_score,
                    w.composite_score,
                    w.overall_score,
                ];
                for character in &w.character_scores {
                    scores.push(character.score);
                    scores.extend(character.metrics.terms());
                }
                scores
            }
            Outcome::Sentence { sentence_result: s } => {
                let mut scores = vec![
                    s.pronunciation_score,
                    s.fluency_score,
                    s.word_total_score,
                    s.overall_score,
                ];
                for word in &s.word_scores {
                    scores.push(word.score);
                    scores.extend(word.metrics.terms());
                }
                scores
            }
            Outcome::Legacy(legacy) => {
                let mut scores = vec![legacy.overall_score, legacy.metrics.articulation_score];
                scores.extend(legacy.letter_scores.iter().map(|letter| letter.score));
                scores
            }
        }
    }
}
