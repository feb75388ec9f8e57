mod contour;
mod mel;
mod statistics;

use std::ops::Range;

use mel::{compute_spectrograms, ensure_sample_rate};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use statistics::assemble_features;
use tracing::debug;

use crate::pronunciation::{AudioRole, AudioSignal, PronunciationError, Result};

pub use contour::semitone_distance;

pub const TARGET_SAMPLE_RATE: u32 = 16_000;
pub const WINDOW_MS: usize = 25;
pub const HOP_MS: usize = 10;
pub const MEL_BANDS: usize = 80;
pub const MFCC_COUNT: usize = 13;

/// Frame layout shared by every extraction run.
///
/// Reference and learner features are only comparable when both were produced
/// with the same parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameParams {
    pub sample_rate: u32,
    pub window_ms: usize,
    pub hop_ms: usize,
    pub mel_bands: usize,
    pub mfcc_count: usize,
    pub min_frequency: f64,
    pub pitch_min_hz: f64,
    pub pitch_max_hz: f64,
}

impl Default for FrameParams {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_SAMPLE_RATE,
            window_ms: WINDOW_MS,
            hop_ms: HOP_MS,
            mel_bands: MEL_BANDS,
            mfcc_count: MFCC_COUNT,
            min_frequency: 20.0,
            pitch_min_hz: 55.0,
            pitch_max_hz: 1_200.0,
        }
    }
}

impl FrameParams {
    pub fn window_samples(&self) -> usize {
        ((self.sample_rate as usize * self.window_ms) / 1000).max(1)
    }

    pub fn hop_samples(&self) -> usize {
        ((self.sample_rate as usize * self.hop_ms) / 1000).max(1)
    }

    pub fn hop_seconds(&self) -> f64 {
        self.hop_samples() as f64 / self.sample_rate as f64
    }

    pub fn frames_to_ms(&self, frames: usize) -> f64 {
        frames as f64 * self.hop_seconds() * 1000.0
    }

    /// Frame index containing the instant `seconds`.
    pub fn seconds_to_frame(&self, seconds: f64) -> usize {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        (seconds / self.hop_seconds()).round() as usize
    }
}

/// Time-ordered acoustic frames derived from one signal.
#[derive(Debug, Clone)]
pub struct FeatureSequence {
    pub params: FrameParams,
    /// frames × coefficients
    pub mfcc: Array2<f32>,
    pub energy: Array1<f32>,
    /// Fundamental frequency in Hz, `None` for unvoiced frames.
    pub pitch: Vec<Option<f32>>,
}

impl FeatureSequence {
    pub fn new(
        params: FrameParams,
        mfcc: Array2<f32>,
        energy: Array1<f32>,
        pitch: Vec<Option<f32>>,
    ) -> Result<Self> {
        let frames = mfcc.len_of(Axis(0));
        if frames == 0 {
            return Err(PronunciationError::input(
                "feature sequence must contain at least one frame",
            ));
        }
        if energy.len() != frames || pitch.len() != frames {
            return Err(PronunciationError::input(format!(
                "feature columns disagree: {frames} MFCC frames, {} energy values, {} pitch values",
                energy.len(),
                pitch.len()
            )));
        }
        Ok(Self {
            params,
            mfcc,
            energy,
            pitch,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.mfcc.len_of(Axis(0))
    }

    pub fn dimension(&self) -> usize {
        self.mfcc.len_of(Axis(1))
    }

    pub fn mfcc_frame(&self, index: usize) -> ArrayView1<'_, f32> {
        self.mfcc.row(index)
    }

    /// Mean energy across `frames`, `None` for an empty range.
    pub fn mean_energy(&self, frames: Range<usize>) -> Option<f32> {
        let end = frames.end.min(self.energy.len());
        let start = frames.start.min(end);
        if start == end {
            return None;
        }
        let slice = self.energy.slice(ndarray::s![start..end]);
        Some(slice.sum() / (end - start) as f32)
    }

    pub fn voiced_fraction(&self) -> f32 {
        let voiced = self.pitch.iter().filter(|p| p.is_some()).count();
        voiced as f32 / self.pitch.len().max(1) as f32
    }
}

/// Responsible for preparing spectral features from normalized audio.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    params: FrameParams,
}

impl FeatureExtractor {
    pub fn new(params: FrameParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &FrameParams {
        &self.params
    }

    pub fn extract(&self, signal: &AudioSignal, role: AudioRole) -> Result<FeatureSequence> {
        let spectrograms = compute_spectrograms(signal, &self.params)
            .map_err(|err| PronunciationError::feature(role, err))?;
        let matrices = assemble_features(
            &spectrograms.mel,
            &spectrograms.power,
            self.params.mfcc_count,
        )
        .map_err(|err| PronunciationError::feature(role, err))?;

        let frame_count = matrices.mfcc.len_of(Axis(0));
        let samples = ensure_sample_rate(signal, self.params.sample_rate)
            .map_err(|err| PronunciationError::feature(role, err))?;
        let pitch = contour::extract_pitch_track(&samples, &self.params, frame_count);

        let features = FeatureSequence::new(self.params, matrices.mfcc, matrices.energy, pitch)
            .map_err(|err| PronunciationError::feature(role, err))?;
        debug!(
            %role,
            frames = features.frame_count(),
            voiced = features.voiced_fraction(),
            "features extracted"
        );
        Ok(features)
    }
}
