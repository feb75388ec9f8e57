use std::ops::Range;

use crate::pronunciation::{AlignmentPath, FeatureSequence, UnitProjection};

use super::terms::{clamp_score, mean, MAX_SCORE};
use super::weights::FluencyConfig;

/// Pause length in milliseconds at each word boundary of the candidate.
///
/// A pause is the run of low-energy candidate frames touching the frame where
/// the next word's aligned region begins. Words with no aligned region open no
/// boundary, and a run shared by consecutive boundaries is counted once.
pub(crate) fn boundary_pauses_ms(
    projections: &[UnitProjection],
    path: &AlignmentPath,
    candidate: &FeatureSequence,
    config: &FluencyConfig,
) -> Vec<f32> {
    let frames = candidate.frame_count();
    let mean_energy = candidate.mean_energy(0..frames).unwrap_or(0.0);
    let threshold = mean_energy * config.silence_ratio;
    let silent: Vec<bool> = candidate.energy.iter().map(|&e| e < threshold).collect();

    let mut previous: Option<Range<usize>> = None;
    projections
        .iter()
        .skip(1)
        .filter(|next| next.candidate_frames.is_some())
        .filter_map(|next| path.pairs.get(next.path_span.start).map(|&(_, c)| c))
        .filter_map(|boundary| {
            let run = silent_run_around(&silent, boundary);
            if previous.as_ref() == Some(&run) {
                return None;
            }
            previous = Some(run.clone());
            Some(candidate.params.frames_to_ms(run.len()) as f32)
        })
        .collect()
}

fn silent_run_around(silent: &[bool], boundary: usize) -> Range<usize> {
    let before = silent[..boundary].iter().rev().take_while(|&&s| s).count();
    let after = silent[boundary..].iter().take_while(|&&s| s).count();
    boundary - before..boundary + after
}

/// 100 when every pause stays within the allowance; each longer pause costs up
/// to one full share of the score.
pub(crate) fn pause_regularity(pauses_ms: &[f32], config: &FluencyConfig) -> f32 {
    if pauses_ms.is_empty() {
        return MAX_SCORE;
    }
    let allowance = (config.pause_multiple * median(pauses_ms)).max(config.min_pause_ms);
    let penalty = mean(pauses_ms.iter().map(|&pause| {
        if pause > allowance {
            ((pause - allowance) / allowance).min(1.0)
        } else {
            0.0
        }
    }))
    .unwrap_or(0.0);
    clamp_score(MAX_SCORE * (1.0 - penalty))
}

pub(crate) fn fluency_score(regularity: f32, tempo: f32, config: &FluencyConfig) -> f32 {
    let weight = config.pause_weight.clamp(0.0, 1.0);
    clamp_score(weight * regularity + (1.0 - weight) * tempo)
}

fn median(values: &[f32]) -> f32 {
    let mut sorted: Vec<f32> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(f32::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array2};

    use super::*;
    use crate::pronunciation::{FrameParams, ScoringUnit};

    #[test]
    fn single_word_is_perfectly_regular() {
        assert_eq!(pause_regularity(&[], &FluencyConfig::default()), 100.0);
    }

    #[test]
    fn short_pauses_are_free() {
        let score = pause_regularity(&[0.0, 40.0, 120.0], &FluencyConfig::default());
        assert_eq!(score, 100.0);
    }

    #[test]
    fn long_outlier_pause_is_penalized() {
        // median 100 -> allowance 200; 500 ms pause is penalized fully
        let score = pause_regularity(&[100.0, 100.0, 500.0], &FluencyConfig::default());
        assert!((score - 100.0 * (1.0 - 1.0 / 3.0)).abs() < 1e-3);
    }

    #[test]
    fn fluency_blends_regularity_and_tempo() {
        let score = fluency_score(100.0, 50.0, &FluencyConfig::default());
        assert!((score - 85.0).abs() < 1e-4);
    }

    fn gapped_candidate() -> (FeatureSequence, AlignmentPath) {
        let energy = vec![1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0];
        let frames = energy.len();
        let candidate = FeatureSequence::new(
            FrameParams::default(),
            Array2::ones((frames, 2)),
            Array1::from(energy),
            vec![None; frames],
        )
        .unwrap();
        let path = AlignmentPath {
            pairs: (0..frames).map(|i| (i, i)).collect(),
            local_costs: vec![0.0; frames],
            total_cost: 0.0,
        };
        (candidate, path)
    }

    fn projection(symbol: &str, frames: Option<Range<usize>>, span: Range<usize>) -> UnitProjection {
        UnitProjection {
            unit: ScoringUnit::new(symbol, span.clone()),
            candidate_frames: frames,
            path_span: span,
        }
    }

    #[test]
    fn pause_is_measured_around_the_boundary() {
        let energy = vec![1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0];
        let frames = energy.len();
        let candidate = FeatureSequence::new(
            FrameParams::default(),
            Array2::ones((frames, 2)),
            Array1::from(energy),
            vec![None; frames],
        )
        .unwrap();
        let path = AlignmentPath {
            pairs: (0..frames).map(|i| (i, i)).collect(),
            local_costs: vec![0.0; frames],
            total_cost: 0.0,
        };
        let projections = vec![
            projection("one", Some(0..4), 0..4),
            projection("two", Some(4..7), 4..7),
        ];
        let pauses =
            boundary_pauses_ms(&projections, &path, &candidate, &FluencyConfig::default());
        assert_eq!(pauses.len(), 1);
        assert!((pauses[0] - 30.0).abs() < 1e-3);
    }

    #[test]
    fn unaligned_middle_word_does_not_repeat_the_pause() {
        let (candidate, path) = gapped_candidate();
        let projections = vec![
            projection("one", Some(0..4), 0..4),
            projection("two", None, 4..4),
            projection("three", Some(4..8), 4..8),
        ];
        let pauses =
            boundary_pauses_ms(&projections, &path, &candidate, &FluencyConfig::default());
        assert_eq!(pauses.len(), 1);
        assert!((pauses[0] - 40.0).abs() < 1e-3);
    }

    #[test]
    fn word_inside_a_silent_run_shares_one_pause() {
        let (candidate, path) = gapped_candidate();
        let projections = vec![
            projection("one", Some(0..3), 0..3),
            projection("two", Some(3..4), 3..4),
            projection("three", Some(4..8), 4..8),
        ];
        let pauses =
            boundary_pauses_ms(&projections, &path, &candidate, &FluencyConfig::default());
        assert_eq!(pauses, vec![candidate.params.frames_to_ms(4) as f32]);
    }
}
