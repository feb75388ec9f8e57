use std::ops::Range;

use crate::pronunciation::features::semitone_distance;
use crate::pronunciation::{AlignmentPath, FeatureSequence};

pub(crate) const MAX_SCORE: f32 = 100.0;

/// `100·exp(−value/scale)`; undefined inputs score 0.
pub(crate) fn decay(value: f32, scale: f32) -> f32 {
    if !value.is_finite() || !scale.is_finite() || scale <= 0.0 {
        return 0.0;
    }
    clamp_score(MAX_SCORE * (-value.max(0.0) / scale).exp())
}

/// Symmetric penalty on a ratio: louder and quieter are punished alike.
pub(crate) fn ratio_term(numerator: f32, denominator: f32, scale: f32) -> f32 {
    if !(numerator.is_finite() && denominator.is_finite()) || numerator <= 0.0 || denominator <= 0.0
    {
        return 0.0;
    }
    decay((numerator / denominator).ln().abs(), scale)
}

pub(crate) fn clamp_score(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, MAX_SCORE)
    } else {
        0.0
    }
}

pub(crate) fn weighted(pairs: &[(f32, f32)]) -> f32 {
    let total: f32 = pairs.iter().map(|(_, weight)| weight).sum();
    if total <= 0.0 {
        return 0.0;
    }
    clamp_score(pairs.iter().map(|(score, weight)| score * weight).sum::<f32>() / total)
}

pub(crate) fn mean(values: impl Iterator<Item = f32>) -> Option<f32> {
    let (sum, count) = values.fold((0.0_f32, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f32)
}

pub(crate) fn energy_term(
    reference: &FeatureSequence,
    reference_frames: Range<usize>,
    candidate: &FeatureSequence,
    candidate_frames: Range<usize>,
    scale: f32,
) -> f32 {
    match (
        candidate.mean_energy(candidate_frames),
        reference.mean_energy(reference_frames),
    ) {
        (Some(cand), Some(reference)) => ratio_term(cand, reference, scale),
        _ => 0.0,
    }
}

pub(crate) fn duration_term(reference_len: usize, candidate_len: usize, scale: f32) -> f32 {
    ratio_term(candidate_len as f32, reference_len as f32, scale)
}

/// Pitch agreement over aligned pairs.
///
/// Deviation is measured only where both frames are voiced, then discounted by
/// how often the two sides agree on voicing at all.
pub(crate) fn pitch_term(
    path: &AlignmentPath,
    span: Range<usize>,
    reference: &FeatureSequence,
    candidate: &FeatureSequence,
    scale: f32,
) -> f32 {
    let Some(pairs) = path.pairs.get(span) else {
        return 0.0;
    };
    let mut both_voiced = 0usize;
    let mut any_voiced = 0usize;
    let mut deviation = 0.0_f32;
    for &(r, c) in pairs {
        let reference_hz = reference.pitch.get(r).copied().flatten();
        let candidate_hz = candidate.pitch.get(c).copied().flatten();
        match (reference_hz, candidate_hz) {
            (Some(reference_hz), Some(candidate_hz)) => {
                both_voiced += 1;
                any_voiced += 1;
                deviation += semitone_distance(reference_hz, candidate_hz);
            }
            (None, None) => {}
            _ => any_voiced += 1,
        }
    }
    if any_voiced == 0 {
        return MAX_SCORE;
    }
    if both_voiced == 0 {
        return 0.0;
    }
    let agreement = both_voiced as f32 / any_voiced as f32;
    clamp_score(decay(deviation / both_voiced as f32, scale) * agreement)
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array2};

    use super::*;
    use crate::pronunciation::FrameParams;

    fn with_pitch(pitch: Vec<Option<f32>>) -> FeatureSequence {
        let frames = pitch.len();
        FeatureSequence::new(
            FrameParams::default(),
            Array2::ones((frames, 2)),
            Array1::ones(frames),
            pitch,
        )
        .unwrap()
    }

    fn diagonal(frames: usize) -> AlignmentPath {
        AlignmentPath {
            pairs: (0..frames).map(|i| (i, i)).collect(),
            local_costs: vec![0.0; frames],
            total_cost: 0.0,
        }
    }

    #[test]
    fn decay_is_bounded_and_absorbs_nan() {
        assert_eq!(decay(0.0, 1.0), 100.0);
        assert_eq!(decay(f32::NAN, 1.0), 0.0);
        assert_eq!(decay(1.0, 0.0), 0.0);
        assert!((decay(1.0, 1.0) - 36.787_94).abs() < 1e-3);
    }

    #[test]
    fn ratio_term_is_symmetric() {
        let louder = ratio_term(2.0, 1.0, 1.0);
        let quieter = ratio_term(1.0, 2.0, 1.0);
        assert!((louder - quieter).abs() < 1e-4);
        assert_eq!(ratio_term(1.0, 0.0, 1.0), 0.0);
        assert_eq!(ratio_term(0.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn weighted_normalizes_by_weight_total() {
        assert!((weighted(&[(100.0, 1.0), (0.0, 3.0)]) - 25.0).abs() < 1e-4);
        assert_eq!(weighted(&[(100.0, 0.0)]), 0.0);
    }

    #[test]
    fn pitch_without_voicing_scores_full() {
        let seq = with_pitch(vec![None; 4]);
        assert_eq!(pitch_term(&diagonal(4), 0..4, &seq, &seq, 4.0), 100.0);
    }

    #[test]
    fn pitch_disagreement_on_voicing_is_discounted() {
        let reference = with_pitch(vec![Some(200.0), Some(200.0), None, None]);
        let candidate = with_pitch(vec![Some(200.0), None, Some(200.0), None]);
        let score = pitch_term(&diagonal(4), 0..4, &reference, &candidate, 4.0);
        assert!((score - 100.0 / 3.0).abs() < 1e-3);
    }

    #[test]
    fn octave_jump_scores_low() {
        let reference = with_pitch(vec![Some(110.0); 3]);
        let candidate = with_pitch(vec![Some(220.0); 3]);
        let score = pitch_term(&diagonal(3), 0..3, &reference, &candidate, 4.0);
        assert!((score - decay(12.0, 4.0)).abs() < 1e-3);
    }
}
