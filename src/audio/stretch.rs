//! Pitch-preserving tempo change
//!
//! Produces uniformly time-stretched takes of a recording: practice-tempo
//! references for the CLI, and slowed or hurried learners when checking that
//! the duration terms react while the spectral match holds. Backed by
//! ssstretch (Signalsmith Stretch).

use crate::types::AudioData;
use anyhow::{ensure, Result};
use ssstretch::Stretch;

/// A validated tempo factor.
///
/// Below 1.0 slows the recording down (0.5 doubles its duration), above 1.0
/// speeds it up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoChange {
    tempo: f32,
}

impl TempoChange {
    pub fn new(tempo: f32) -> Result<Self> {
        ensure!(
            tempo.is_finite() && tempo > 0.0,
            "tempo must be a positive finite factor, got {tempo}"
        );
        Ok(Self { tempo })
    }

    pub fn tempo(&self) -> f32 {
        self.tempo
    }

    pub fn is_identity(&self) -> bool {
        (self.tempo - 1.0).abs() < 1e-6
    }

    /// Sample count a stretched take of `input_len` samples ends up with.
    pub fn output_len(&self, input_len: usize) -> usize {
        if input_len == 0 {
            return 0;
        }
        ((input_len as f64 / self.tempo as f64).ceil() as usize).max(1)
    }

    pub fn apply(&self, audio: &AudioData) -> AudioData {
        if self.is_identity() || audio.samples.is_empty() {
            return audio.clone();
        }
        let samples = self.render(&audio.samples, audio.sample_rate);
        AudioData::new(samples, audio.sample_rate)
    }

    /// Runs the stretcher, then drops its leading latency so the take starts
    /// on the first input sample and is exactly `output_len` long.
    fn render(&self, input: &[f32], sample_rate: u32) -> Vec<f32> {
        let target = self.output_len(input.len());
        let mut stretch = Stretch::new();
        stretch.preset_default(1, sample_rate as f32);
        let latency = stretch.output_latency().max(0) as usize;

        let inputs = vec![input.to_vec()];
        let mut processed = vec![Vec::new()];
        stretch.process_vec(
            &inputs,
            input.len() as i32,
            &mut processed,
            (target + latency) as i32,
        );
        let mut tail = vec![Vec::new()];
        stretch.flush_vec(&mut tail, latency as i32);

        let mut samples: Vec<f32> = processed
            .into_iter()
            .chain(tail)
            .flatten()
            .skip(latency)
            .take(target)
            .collect();
        samples.resize(target, 0.0);
        samples
    }
}

/// Changes the tempo of `audio` without changing its pitch.
pub fn change_tempo(audio: &AudioData, tempo: f32) -> Result<AudioData> {
    Ok(TempoChange::new(tempo)?.apply(audio))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(num_samples: usize, sample_rate: u32) -> AudioData {
        let samples = (0..num_samples)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (t * 2.0 * std::f32::consts::PI * 220.0).sin() * 0.5
            })
            .collect();
        AudioData::new(samples, sample_rate)
    }

    #[test]
    fn identity_tempo_returns_same_audio() {
        let audio = tone(1_000, 16_000);
        let result = change_tempo(&audio, 1.0).unwrap();
        assert_eq!(result.samples, audio.samples);
    }

    #[test]
    fn half_tempo_doubles_the_length() {
        let audio = tone(8_000, 16_000);
        let slower = change_tempo(&audio, 0.5).unwrap();
        assert_eq!(slower.sample_rate, 16_000);
        assert_eq!(slower.samples.len(), 16_000);
        assert!(slower.samples.iter().any(|s| s.abs() > 0.0));
    }

    #[test]
    fn faster_tempo_shortens_the_take() {
        let audio = tone(9_000, 16_000);
        let faster = change_tempo(&audio, 1.5).unwrap();
        assert_eq!(faster.samples.len(), 6_000);
    }

    #[test]
    fn output_len_rounds_up() {
        let change = TempoChange::new(0.75).unwrap();
        assert_eq!(change.output_len(0), 0);
        assert_eq!(change.output_len(3), 4);
        assert_eq!(change.output_len(300), 400);
    }

    #[test]
    fn empty_audio_stays_empty() {
        let audio = AudioData::new(Vec::new(), 16_000);
        assert!(change_tempo(&audio, 0.5).unwrap().samples.is_empty());
    }

    #[test]
    fn rejects_non_positive_tempo() {
        assert!(TempoChange::new(0.0).is_err());
        assert!(TempoChange::new(-1.0).is_err());
        assert!(TempoChange::new(f32::NAN).is_err());
    }
}
