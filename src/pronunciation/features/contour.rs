use aus::analysis;

use super::FrameParams;

const SMOOTH_WINDOW: usize = 3;
/// pYIN needs several analysis windows of audio before it reports anything useful.
const MIN_WINDOWS_FOR_PITCH: usize = 4;

/// Per-frame fundamental frequency in Hz, `None` where the frame is unvoiced.
pub(super) fn extract_pitch_track(
    samples: &[f32],
    params: &FrameParams,
    frame_count: usize,
) -> Vec<Option<f32>> {
    let frame_len = params.window_samples();
    if frame_count == 0 || samples.len() < frame_len * MIN_WINDOWS_FOR_PITCH {
        return vec![None; frame_count];
    }
    let audio: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
    let (_timestamps, pitches, voiced_flags, _confidence) = analysis::pyin_pitch_estimator(
        &audio,
        params.sample_rate,
        params.pitch_min_hz,
        params.pitch_max_hz,
        frame_len,
    );
    let track = voiced_track(&pitches, &voiced_flags);
    let smoothed = smooth_voiced_runs(&track, SMOOTH_WINDOW);
    align_to_frames(&smoothed, frame_count)
}

fn voiced_track(pitches: &[f64], voiced: &[bool]) -> Vec<Option<f32>> {
    pitches
        .iter()
        .zip(voiced.iter())
        .map(|(&pitch, &flag)| (flag && pitch.is_finite() && pitch > 0.0).then_some(pitch as f32))
        .collect()
}

/// Moving average that never mixes voiced values with unvoiced gaps.
fn smooth_voiced_runs(values: &[Option<f32>], window: usize) -> Vec<Option<f32>> {
    if values.is_empty() || window < 2 {
        return values.to_vec();
    }
    let radius = window / 2;
    (0..values.len())
        .map(|idx| {
            values[idx]?;
            let start = idx.saturating_sub(radius);
            let end = (idx + radius + 1).min(values.len());
            let voiced: Vec<f32> = values[start..end].iter().flatten().copied().collect();
            Some(voiced.iter().sum::<f32>() / voiced.len() as f32)
        })
        .collect()
}

/// Maps the pitch tracker's frame grid onto the spectral frame grid by nearest position.
fn align_to_frames(series: &[Option<f32>], frame_count: usize) -> Vec<Option<f32>> {
    match (frame_count, series.len()) {
        (0, _) => Vec::new(),
        (_, 0) => vec![None; frame_count],
        (count, len) if count == len => series.to_vec(),
        (count, len) => {
            let denom = (count - 1).max(1) as f32;
            (0..count)
                .map(|frame| {
                    let position = frame as f32 * (len - 1) as f32 / denom;
                    series[(position.round() as usize).min(len - 1)]
                })
                .collect()
        }
    }
}

/// Pitch difference in semitones between two voiced frequencies.
pub fn semitone_distance(reference_hz: f32, candidate_hz: f32) -> f32 {
    (12.0 * (candidate_hz / reference_hz).log2()).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unvoiced_frames_stay_marked() {
        let track = voiced_track(&[220.0, f64::NAN, 230.0, 0.0], &[true, true, false, true]);
        assert_eq!(track, vec![Some(220.0), None, None, None]);
    }

    #[test]
    fn smoothing_skips_gaps() {
        let smoothed = smooth_voiced_runs(&[Some(100.0), Some(200.0), None, Some(300.0)], 3);
        assert_eq!(smoothed[0], Some(150.0));
        assert_eq!(smoothed[1], Some(150.0));
        assert_eq!(smoothed[2], None);
        assert_eq!(smoothed[3], Some(300.0));
    }

    #[test]
    fn alignment_stretches_to_frame_count() {
        let aligned = align_to_frames(&[Some(1.0), None], 4);
        assert_eq!(aligned.len(), 4);
        assert_eq!(aligned[0], Some(1.0));
        assert_eq!(aligned[3], None);
    }

    #[test]
    fn octave_is_twelve_semitones() {
        assert!((semitone_distance(220.0, 440.0) - 12.0).abs() < 1e-4);
        assert!((semitone_distance(440.0, 220.0) - 12.0).abs() < 1e-4);
    }

    #[test]
    fn short_signals_are_fully_unvoiced() {
        let params = FrameParams::default();
        let track = extract_pitch_track(&[0.1; 100], &params, 3);
        assert_eq!(track, vec![None, None, None]);
    }
}
