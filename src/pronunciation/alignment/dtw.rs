use std::ops::Range;

use ndarray::ArrayView1;
use tracing::debug;

use crate::pronunciation::{FeatureSequence, PronunciationError, Result};

use super::AlignmentConfig;

const NORM_EPSILON: f32 = 1e-9;

/// Optimal monotonic correspondence between reference and candidate frames.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentPath {
    /// `(reference_frame, candidate_frame)` pairs, starting at `(0, 0)`.
    pub pairs: Vec<(usize, usize)>,
    /// Local cost of each pair, parallel to `pairs`.
    pub local_costs: Vec<f32>,
    pub total_cost: f32,
}

impl AlignmentPath {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn mean_cost(&self) -> f32 {
        if self.local_costs.is_empty() {
            return 0.0;
        }
        self.total_cost / self.local_costs.len() as f32
    }

    /// Indices into `pairs` whose reference frame falls in `reference`.
    ///
    /// Reference indices never decrease along the path, so the matching pairs
    /// form one contiguous run.
    pub fn span_for_reference(&self, reference: &Range<usize>) -> Range<usize> {
        let start = self.pairs.partition_point(|&(r, _)| r < reference.start);
        let end = self.pairs.partition_point(|&(r, _)| r < reference.end);
        start..end.max(start)
    }

    /// Mean local cost over a run of path indices, `None` if the run is empty.
    pub fn mean_cost_over(&self, span: &Range<usize>) -> Option<f32> {
        let costs = self.local_costs.get(span.clone())?;
        if costs.is_empty() {
            return None;
        }
        Some(costs.iter().sum::<f32>() / costs.len() as f32)
    }
}

/// Dynamic time warping over MFCC frames with cosine local cost.
#[derive(Debug, Clone, Default)]
pub struct SequenceAligner {
    band: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Start,
    Diagonal,
    Vertical,
    Horizontal,
}

impl SequenceAligner {
    pub fn new(config: &AlignmentConfig) -> Self {
        Self { band: config.band }
    }

    pub fn with_band(band: Option<usize>) -> Self {
        Self { band }
    }

    pub fn band(&self) -> Option<usize> {
        self.band
    }

    pub fn align(
        &self,
        reference: &FeatureSequence,
        candidate: &FeatureSequence,
    ) -> Result<AlignmentPath> {
        ensure_comparable(reference, candidate)?;
        let rows = reference.frame_count();
        let cols = candidate.frame_count();
        if let Some(band) = self.band {
            if rows.abs_diff(cols) > band {
                return Err(window_exceeded(band, rows, cols));
            }
        }

        let mut cost = vec![vec![f32::INFINITY; cols + 1]; rows + 1];
        let mut steps = vec![vec![Step::Start; cols + 1]; rows + 1];
        cost[0][0] = 0.0;
        for i in 1..=rows {
            let (lo, hi) = self.column_bounds(i, cols);
            for j in lo..=hi {
                let local = cosine_distance(
                    reference.mfcc_frame(i - 1),
                    candidate.mfcc_frame(j - 1),
                );
                let (previous, step) = best_predecessor(&cost, i, j);
                if previous.is_finite() {
                    cost[i][j] = previous + local;
                    steps[i][j] = step;
                }
            }
        }

        let total_cost = cost[rows][cols];
        if !total_cost.is_finite() {
            return Err(window_exceeded(self.band.unwrap_or(0), rows, cols));
        }
        let path = backtrack(&steps, reference, candidate)?;
        debug!(
            reference_frames = rows,
            candidate_frames = cols,
            path_len = path.len(),
            total_cost = path.total_cost,
            "alignment complete"
        );
        Ok(path)
    }

    fn column_bounds(&self, row: usize, cols: usize) -> (usize, usize) {
        match self.band {
            Some(band) => (row.saturating_sub(band).max(1), (row + band).min(cols)),
            None => (1, cols),
        }
    }
}

fn ensure_comparable(reference: &FeatureSequence, candidate: &FeatureSequence) -> Result<()> {
    if reference.params != candidate.params {
        return Err(PronunciationError::input(
            "reference and learner features were extracted with different frame parameters",
        ));
    }
    if reference.dimension() != candidate.dimension() {
        return Err(PronunciationError::input(format!(
            "MFCC dimension mismatch: reference {} vs learner {}",
            reference.dimension(),
            candidate.dimension()
        )));
    }
    if reference.frame_count() == 0 || candidate.frame_count() == 0 {
        return Err(PronunciationError::input(
            "alignment requires at least one frame on each side",
        ));
    }
    Ok(())
}

/// Ties resolve diagonal first, then vertical, then horizontal.
fn best_predecessor(cost: &[Vec<f32>], i: usize, j: usize) -> (f32, Step) {
    let mut best = (cost[i - 1][j - 1], Step::Diagonal);
    let vertical = cost[i - 1][j];
    if vertical < best.0 {
        best = (vertical, Step::Vertical);
    }
    let horizontal = cost[i][j - 1];
    if horizontal < best.0 {
        best = (horizontal, Step::Horizontal);
    }
    best
}

fn backtrack(
    steps: &[Vec<Step>],
    reference: &FeatureSequence,
    candidate: &FeatureSequence,
) -> Result<AlignmentPath> {
    let mut i = reference.frame_count();
    let mut j = candidate.frame_count();
    let mut pairs = Vec::with_capacity(i + j);
    while i > 0 && j > 0 {
        pairs.push((i - 1, j - 1));
        match steps[i][j] {
            Step::Diagonal => {
                i -= 1;
                j -= 1;
            }
            Step::Vertical => i -= 1,
            Step::Horizontal => j -= 1,
            Step::Start => break,
        }
    }
    if i != 0 || j != 0 {
        return Err(PronunciationError::input(
            "alignment backtrack did not reach the origin",
        ));
    }
    pairs.reverse();

    let local_costs: Vec<f32> = pairs
        .iter()
        .map(|&(r, c)| cosine_distance(reference.mfcc_frame(r), candidate.mfcc_frame(c)))
        .collect();
    let total_cost = local_costs.iter().sum();
    Ok(AlignmentPath {
        pairs,
        local_costs,
        total_cost,
    })
}

fn window_exceeded(band: usize, reference_frames: usize, candidate_frames: usize) -> PronunciationError {
    PronunciationError::AlignmentWindowExceeded {
        band,
        reference_frames,
        candidate_frames,
    }
}

/// Cosine distance in `[0, 2]`.
///
/// Two silent (all-zero) frames are identical; a silent frame against a
/// non-silent one is treated as orthogonal.
pub fn cosine_distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    let dot = a.dot(&b);
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    let silent_a = norm_a <= NORM_EPSILON;
    let silent_b = norm_b <= NORM_EPSILON;
    if silent_a && silent_b {
        return 0.0;
    }
    if silent_a || silent_b {
        return 1.0;
    }
    let distance = 1.0 - dot / (norm_a * norm_b);
    if distance.is_finite() {
        distance.clamp(0.0, 2.0)
    } else {
        1.0
    }
}
