use crate::types::AudioData;

/// Energy-gated silence trimming policy for recording head/tail latency.
#[derive(Debug, Clone, Copy)]
pub struct TrimPolicy {
    /// Analysis window in milliseconds
    pub window_ms: f64,
    /// Absolute RMS floor below which a window is always silence
    pub floor: f32,
    /// Fraction of the loudest window's RMS a window must reach to count as speech
    pub relative: f32,
    /// Audio kept on both sides of the detected speech region
    pub padding_ms: f64,
}

impl Default for TrimPolicy {
    fn default() -> Self {
        Self {
            window_ms: 10.0,
            floor: 1e-3,
            relative: 0.05,
            padding_ms: 30.0,
        }
    }
}

/// Remove leading and trailing silence from `audio`.
///
/// Returns the audio unchanged when no window rises above the threshold, so a
/// quiet recording is scored rather than emptied.
pub fn trim_silence(audio: &AudioData, policy: &TrimPolicy) -> AudioData {
    match speech_bounds(audio, policy) {
        Some((start, end)) => AudioData::new(audio.samples[start..end].to_vec(), audio.sample_rate),
        None => audio.clone(),
    }
}

/// Sample range `[start, end)` spanning detected speech plus padding.
pub fn speech_bounds(audio: &AudioData, policy: &TrimPolicy) -> Option<(usize, usize)> {
    if audio.samples.is_empty() {
        return None;
    }
    let sample_rate = audio.sample_rate as f64;
    let window_size = ((policy.window_ms / 1000.0) * sample_rate).max(1.0) as usize;
    let energies: Vec<f32> = audio
        .samples
        .chunks(window_size)
        .map(window_rms)
        .collect();

    let peak = energies.iter().copied().fold(0.0_f32, f32::max);
    let threshold = policy.floor.max(peak * policy.relative);
    let first = energies.iter().position(|&energy| energy > threshold)?;
    let last = energies.iter().rposition(|&energy| energy > threshold)?;

    let padding = ((policy.padding_ms / 1000.0) * sample_rate) as usize;
    let start = (first * window_size).saturating_sub(padding);
    let end = ((last + 1) * window_size + padding).min(audio.samples.len());
    (start < end).then_some((start, end))
}

fn window_rms(window: &[f32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    let sum: f32 = window.iter().map(|sample| sample * sample).sum();
    (sum / window.len() as f32).sqrt()
}

/// Root-mean-square level of an entire signal.
pub fn rms(samples: &[f32]) -> f32 {
    window_rms(samples)
}
