mod fluency;
mod terms;
mod weights;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pronunciation::result::{
    LegacyMetrics, LegacyResult, LetterMetrics, LetterScore, SentenceResult, WordResult,
};
use crate::pronunciation::{AlignmentPath, AudioSignal, FeatureSequence, UnitProjection};

pub use weights::{
    FluencyConfig, ScoreScales, ScoringConfig, ScoringWeights, SentenceWeights,
    WordOverallWeights,
};

use terms::{clamp_score, decay, duration_term, energy_term, mean, pitch_term, weighted};

const MAX_ENERGY_RATIO: f32 = 10.0;
const SILENT_RMS: f32 = 1e-6;

/// The four independent per-unit terms, each in `[0, 100]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitMetrics {
    pub mfcc: f32,
    pub energy: f32,
    pub duration: f32,
    pub pitch: f32,
}

impl UnitMetrics {
    pub fn terms(&self) -> [f32; 4] {
        [self.mfcc, self.energy, self.duration, self.pitch]
    }
}

/// Score for one character or word. Frame bounds refer to the reference.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitScore {
    pub symbol: String,
    pub frame_start: usize,
    pub frame_end: usize,
    pub score: f32,
    pub metrics: UnitMetrics,
}

/// Everything the scorer reads for one request.
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput<'a> {
    pub reference: &'a FeatureSequence,
    pub candidate: &'a FeatureSequence,
    pub path: &'a AlignmentPath,
    pub projections: &'a [UnitProjection],
}

/// Whole-utterance analogues of the per-unit terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtteranceTerms {
    pub mfcc: f32,
    pub energy: f32,
    pub duration: f32,
    pub pitch: f32,
}

#[derive(Debug, Clone, Default)]
pub struct MetricCalculator {
    config: ScoringConfig,
}

impl MetricCalculator {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn score_unit(&self, input: &ScoringInput<'_>, projection: &UnitProjection) -> UnitScore {
        let reference_frames = projection.unit.reference_frames.clone();
        let metrics = match &projection.candidate_frames {
            Some(candidate_frames) => {
                let scales = &self.config.scales;
                UnitMetrics {
                    mfcc: input
                        .path
                        .mean_cost_over(&projection.path_span)
                        .map_or(0.0, |cost| decay(cost, scales.mfcc)),
                    energy: energy_term(
                        input.reference,
                        reference_frames.clone(),
                        input.candidate,
                        candidate_frames.clone(),
                        scales.energy,
                    ),
                    duration: duration_term(
                        projection.reference_len(),
                        projection.candidate_len(),
                        scales.duration,
                    ),
                    pitch: pitch_term(
                        input.path,
                        projection.path_span.clone(),
                        input.reference,
                        input.candidate,
                        scales.pitch_semitones,
                    ),
                }
            }
            None => UnitMetrics::default(),
        };
        let score = if projection.candidate_frames.is_some() {
            self.combine_unit(&metrics)
        } else {
            0.0
        };
        UnitScore {
            symbol: projection.unit.symbol.clone(),
            frame_start: reference_frames.start,
            frame_end: reference_frames.end,
            score,
            metrics,
        }
    }

    pub fn score_units(&self, input: &ScoringInput<'_>) -> Vec<UnitScore> {
        input
            .projections
            .iter()
            .map(|projection| self.score_unit(input, projection))
            .collect()
    }

    pub fn utterance_terms(&self, input: &ScoringInput<'_>) -> UtteranceTerms {
        let scales = &self.config.scales;
        let reference_frames = input.reference.frame_count();
        let candidate_frames = input.candidate.frame_count();
        UtteranceTerms {
            mfcc: decay(input.path.mean_cost(), scales.mfcc),
            energy: energy_term(
                input.reference,
                0..reference_frames,
                input.candidate,
                0..candidate_frames,
                scales.energy,
            ),
            duration: duration_term(reference_frames, candidate_frames, scales.duration),
            pitch: pitch_term(
                input.path,
                0..input.path.len(),
                input.reference,
                input.candidate,
                scales.pitch_semitones,
            ),
        }
    }

    pub fn word(&self, input: &ScoringInput<'_>) -> WordResult {
        let units = self.score_units(input);
        let utterance = self.utterance_terms(input);
        let weights = &self.config.word_weights;
        let composite_score = self.combine_unit(&UnitMetrics {
            mfcc: utterance.mfcc,
            energy: utterance.energy,
            duration: utterance.duration,
            pitch: utterance.pitch,
        });
        let overall_score = weighted(&[
            (utterance.mfcc, weights.mfcc),
            (utterance.energy, weights.energy),
            (utterance.pitch, weights.pitch),
        ]);
        debug!(
            units = units.len(),
            composite_score, overall_score, "word scored"
        );
        WordResult {
            character_scores: units.into_iter().map(Into::into).collect(),
            mfcc_score: utterance.mfcc,
            energy_score: utterance.energy,
            pitch_score: utterance.pitch,
            composite_score,
            overall_score,
        }
    }

    pub fn sentence(&self, input: &ScoringInput<'_>) -> SentenceResult {
        let units = self.score_units(input);
        let utterance = self.utterance_terms(input);
        let fluency_config = &self.config.fluency;

        let pronunciation_score =
            clamp_score(mean(units.iter().map(|u| u.score)).unwrap_or(0.0));
        let pauses = fluency::boundary_pauses_ms(
            input.projections,
            input.path,
            input.candidate,
            fluency_config,
        );
        let regularity = fluency::pause_regularity(&pauses, fluency_config);
        let fluency_score = fluency::fluency_score(regularity, utterance.duration, fluency_config);

        let recognized = input
            .projections
            .iter()
            .filter(|projection| self.is_recognized(input.path, projection))
            .count();
        let word_total_score = if input.projections.is_empty() {
            0.0
        } else {
            clamp_score(100.0 * recognized as f32 / input.projections.len() as f32)
        };

        let weights = &self.config.sentence_weights;
        let overall_score = weighted(&[
            (pronunciation_score, weights.pronunciation),
            (fluency_score, weights.fluency),
            (word_total_score, weights.word_total),
        ]);
        debug!(
            words = units.len(),
            recognized,
            pauses = pauses.len(),
            pronunciation_score,
            fluency_score,
            overall_score,
            "sentence scored"
        );
        SentenceResult {
            word_scores: units.into_iter().map(Into::into).collect(),
            pronunciation_score,
            fluency_score,
            word_total_score,
            overall_score,
        }
    }

    /// Whole-utterance DTW scoring: letters are judged on path cost alone.
    pub fn legacy(
        &self,
        input: &ScoringInput<'_>,
        reference_signal: &AudioSignal,
        candidate_signal: &AudioSignal,
    ) -> LegacyResult {
        let scale = self.config.scales.mfcc;
        let mean_cost = input.path.mean_cost();
        let letter_scores: Vec<LetterScore> = input
            .projections
            .iter()
            .map(|projection| {
                // A letter no path pair landed in is judged on the whole path.
                let avg_diff = input
                    .path
                    .mean_cost_over(&projection.path_span)
                    .unwrap_or(mean_cost);
                LetterScore {
                    symbol: projection.unit.symbol.clone(),
                    frame_start: projection.unit.reference_frames.start,
                    frame_end: projection.unit.reference_frames.end,
                    score: decay(avg_diff, scale),
                    metrics: LetterMetrics {
                        avg_diff,
                        support: projection.path_span.len(),
                    },
                }
            })
            .collect();
        let overall_score =
            clamp_score(mean(letter_scores.iter().map(|l| l.score)).unwrap_or(0.0));

        LegacyResult {
            overall_score,
            normalized_score: overall_score / 100.0,
            letter_scores,
            metrics: LegacyMetrics {
                dtw_distance: finite_or_zero(input.path.total_cost),
                energy_ratio: energy_ratio(reference_signal, candidate_signal),
                duration_ratio: finite_or_zero(
                    (candidate_signal.duration_seconds() / reference_signal.duration_seconds())
                        as f32,
                ),
                articulation_score: decay(mean_cost, scale * 2.0),
            },
        }
    }

    /// Alignment confidence of one unit in `[0, 1]`.
    pub fn alignment_confidence(&self, path: &AlignmentPath, projection: &UnitProjection) -> f32 {
        projection
            .candidate_frames
            .as_ref()
            .and(path.mean_cost_over(&projection.path_span))
            .map_or(0.0, |cost| decay(cost, self.config.scales.mfcc) / 100.0)
    }

    fn is_recognized(&self, path: &AlignmentPath, projection: &UnitProjection) -> bool {
        projection.candidate_frames.is_some()
            && self.alignment_confidence(path, projection) >= self.config.recognition_threshold
    }

    fn combine_unit(&self, metrics: &UnitMetrics) -> f32 {
        let weights = &self.config.unit_weights;
        weighted(&[
            (metrics.mfcc, weights.mfcc),
            (metrics.energy, weights.energy),
            (metrics.duration, weights.duration),
            (metrics.pitch, weights.pitch),
        ])
    }
}

fn energy_ratio(reference: &AudioSignal, candidate: &AudioSignal) -> f32 {
    let reference_rms = reference.rms();
    if !reference_rms.is_finite() || reference_rms <= SILENT_RMS {
        return 0.0;
    }
    finite_or_zero(candidate.rms() / reference_rms).clamp(0.0, MAX_ENERGY_RATIO)
}

fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use std::ops::Range;

    use approx::assert_relative_eq;
    use ndarray::{Array1, Array2};

    use super::*;
    use crate::pronunciation::{FrameParams, ScoringUnit};

    fn features(frames: usize, energy: f32, pitch: Option<f32>) -> FeatureSequence {
        FeatureSequence::new(
            FrameParams::default(),
            Array2::ones((frames, 3)),
            Array1::from_elem(frames, energy),
            vec![pitch; frames],
        )
        .unwrap()
    }

    fn diagonal(frames: usize, cost: f32) -> AlignmentPath {
        AlignmentPath {
            pairs: (0..frames).map(|i| (i, i)).collect(),
            local_costs: vec![cost; frames],
            total_cost: cost * frames as f32,
        }
    }

    fn projection(symbol: &str, frames: Range<usize>) -> UnitProjection {
        UnitProjection {
            unit: ScoringUnit::new(symbol, frames.clone()),
            candidate_frames: Some(frames.clone()),
            path_span: frames,
        }
    }

    #[test]
    fn identical_unit_scores_full_marks() {
        let reference = features(10, 2.0, Some(200.0));
        let path = diagonal(10, 0.0);
        let projections = [projection("a", 0..10)];
        let input = ScoringInput {
            reference: &reference,
            candidate: &reference,
            path: &path,
            projections: &projections,
        };
        let unit = MetricCalculator::default().score_unit(&input, &projections[0]);
        assert_eq!(unit.metrics.terms(), [100.0; 4]);
        assert!((unit.score - 100.0).abs() < 1e-4);
    }

    #[test]
    fn empty_projection_scores_zero_but_is_kept() {
        let reference = features(4, 1.0, None);
        let path = diagonal(4, 0.0);
        let projections = [
            projection("a", 0..4),
            UnitProjection {
                unit: ScoringUnit::new("b", 4..4),
                candidate_frames: None,
                path_span: 4..4,
            },
        ];
        let input = ScoringInput {
            reference: &reference,
            candidate: &reference,
            path: &path,
            projections: &projections,
        };
        let units = MetricCalculator::default().score_units(&input);
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].score, 0.0);
        assert_eq!(units[1].metrics, UnitMetrics::default());
    }

    #[test]
    fn word_overall_follows_configured_weights() {
        let reference = features(6, 1.0, Some(200.0));
        let candidate = features(6, 2.0, Some(200.0));
        let path = diagonal(6, 0.1);
        let projections = [projection("h", 0..3), projection("i", 3..6)];
        let input = ScoringInput {
            reference: &reference,
            candidate: &candidate,
            path: &path,
            projections: &projections,
        };
        let result = MetricCalculator::default().word(&input);
        let expected =
            0.6 * result.mfcc_score + 0.2 * result.energy_score + 0.2 * result.pitch_score;
        assert!((result.overall_score - expected).abs() < 1e-3);
        assert!(result.energy_score < 100.0);
        assert_eq!(result.pitch_score, 100.0);
    }

    #[test]
    fn word_composite_weights_all_four_utterance_terms() {
        let reference = features(6, 1.0, Some(200.0));
        let candidate = features(6, 2.0, Some(200.0));
        let path = diagonal(6, 0.1);
        let projections = [projection("h", 0..3), projection("i", 3..6)];
        let input = ScoringInput {
            reference: &reference,
            candidate: &candidate,
            path: &path,
            projections: &projections,
        };
        let result = MetricCalculator::default().word(&input);

        let mfcc = 100.0 * (-0.1_f32 / 0.5).exp();
        let energy = 100.0 * (-(2.0_f32).ln()).exp();
        let expected = 0.5 * mfcc + 0.15 * energy + 0.15 * 100.0 + 0.2 * 100.0;
        assert_relative_eq!(result.composite_score, expected, epsilon = 1e-3);
    }

    #[test]
    fn stretched_utterance_lowers_the_word_composite() {
        let reference = features(6, 1.0, None);
        let candidate = features(12, 1.0, None);
        let path = AlignmentPath {
            pairs: (0..12).map(|j| (j / 2, j)).collect(),
            local_costs: vec![0.0; 12],
            total_cost: 0.0,
        };
        let projections = [UnitProjection {
            unit: ScoringUnit::new("a", 0..6),
            candidate_frames: Some(0..12),
            path_span: 0..12,
        }];
        let input = ScoringInput {
            reference: &reference,
            candidate: &candidate,
            path: &path,
            projections: &projections,
        };
        let result = MetricCalculator::default().word(&input);
        // duration term is 50 for a doubled length
        assert_relative_eq!(result.composite_score, 100.0 - 0.15 * 50.0, epsilon = 1e-3);
        assert_relative_eq!(result.overall_score, 100.0, epsilon = 1e-3);
    }

    #[test]
    fn sentence_counts_recognized_words() {
        let reference = features(8, 1.0, None);
        let mut path = diagonal(8, 0.0);
        for cost in &mut path.local_costs[4..] {
            *cost = 1.5;
        }
        path.total_cost = path.local_costs.iter().sum();
        let projections = [projection("hello", 0..4), projection("world", 4..8)];
        let input = ScoringInput {
            reference: &reference,
            candidate: &reference,
            path: &path,
            projections: &projections,
        };
        let result = MetricCalculator::default().sentence(&input);
        assert_eq!(result.word_total_score, 50.0);
        assert_eq!(result.word_scores.len(), 2);
        assert_eq!(result.word_scores[1].word, "world");
    }

    #[test]
    fn legacy_ratio_against_silent_reference_is_zero() {
        let silent = AudioSignal::from_samples(vec![0.0; 160], 16_000).unwrap();
        let loud = AudioSignal::from_samples(vec![0.5; 320], 16_000).unwrap();
        let reference = features(2, 1.0, None);
        let path = diagonal(2, 0.2);
        let projections = [projection("a", 0..2)];
        let input = ScoringInput {
            reference: &reference,
            candidate: &reference,
            path: &path,
            projections: &projections,
        };
        let result = MetricCalculator::default().legacy(&input, &silent, &loud);
        assert_eq!(result.metrics.energy_ratio, 0.0);
        assert!((result.metrics.duration_ratio - 2.0).abs() < 1e-6);
        assert!((result.normalized_score * 100.0 - result.overall_score).abs() < 1e-4);
        assert!((result.metrics.dtw_distance - 0.4).abs() < 1e-6);
        assert!(result.metrics.articulation_score > result.overall_score);
    }

    #[test]
    fn legacy_letter_without_path_support_takes_the_whole_path_score() {
        let signal = AudioSignal::from_samples(vec![0.3; 320], 16_000).unwrap();
        let reference = features(4, 1.0, None);
        let path = diagonal(4, 0.25);
        let projections = [
            projection("a", 0..4),
            UnitProjection {
                unit: ScoringUnit::new("b", 4..4),
                candidate_frames: None,
                path_span: 4..4,
            },
        ];
        let input = ScoringInput {
            reference: &reference,
            candidate: &reference,
            path: &path,
            projections: &projections,
        };
        let result = MetricCalculator::default().legacy(&input, &signal, &signal);
        let unsupported = &result.letter_scores[1];
        assert_eq!(unsupported.metrics.support, 0);
        assert_relative_eq!(unsupported.metrics.avg_diff, 0.25, epsilon = 1e-6);
        assert_relative_eq!(unsupported.score, result.letter_scores[0].score, epsilon = 1e-4);
    }
}
