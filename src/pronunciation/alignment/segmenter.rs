use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::pronunciation::{
    EvaluationMode, FrameParams, PronunciationError, Result, ScoringUnit,
};

use super::AlignmentPath;

/// Externally supplied reference timing for one unit, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitTiming {
    pub start_seconds: f64,
    pub end_seconds: f64,
}

impl UnitTiming {
    pub fn new(start_seconds: f64, end_seconds: f64) -> Self {
        Self {
            start_seconds,
            end_seconds,
        }
    }
}

/// A scoring unit together with the candidate frames the path maps onto it.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitProjection {
    pub unit: ScoringUnit,
    /// `None` when no candidate frame aligns to the unit.
    pub candidate_frames: Option<Range<usize>>,
    /// Indices into the alignment path covering the unit.
    pub path_span: Range<usize>,
}

impl UnitProjection {
    pub fn symbol(&self) -> &str {
        &self.unit.symbol
    }

    pub fn reference_len(&self) -> usize {
        self.unit.reference_frames.len()
    }

    pub fn candidate_len(&self) -> usize {
        self.candidate_frames.as_ref().map_or(0, |range| range.len())
    }
}

/// Splits reference text into scoring units for `mode`.
pub fn split_units(text: &str, mode: EvaluationMode) -> Result<Vec<String>> {
    if text.trim().is_empty() {
        return Err(PronunciationError::input("reference text must not be empty"));
    }
    let units = match mode {
        EvaluationMode::Word => text
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(String::from)
            .collect(),
        EvaluationMode::Sentence => text.split_whitespace().map(str::to_string).collect(),
    };
    Ok(units)
}

/// Allocates `frame_count` frames to units in proportion to their character length.
///
/// Boundaries come from rounding the cumulative share. A unit whose share
/// rounds to nothing still gets one frame, so with more units than frames
/// neighbouring ranges overlap instead of going empty.
pub fn partition_frames(units: &[String], frame_count: usize) -> Vec<Range<usize>> {
    let weights: Vec<usize> = units.iter().map(|u| u.chars().count().max(1)).collect();
    let total: usize = weights.iter().sum();
    if total == 0 {
        return Vec::new();
    }
    let mut ranges = Vec::with_capacity(units.len());
    let mut cumulative = 0usize;
    let mut start = 0usize;
    for weight in weights {
        cumulative += weight;
        let end = ((cumulative as f64 / total as f64) * frame_count as f64).round() as usize;
        let end = end.clamp(start, frame_count);
        ranges.push(at_least_one_frame(start..end, frame_count));
        start = end;
    }
    ranges
}

fn at_least_one_frame(range: Range<usize>, frame_count: usize) -> Range<usize> {
    if !range.is_empty() || frame_count == 0 {
        return range;
    }
    let start = range.start.min(frame_count - 1);
    start..start + 1
}

/// Maps reference text onto frame ranges and projects them through the path.
#[derive(Debug, Clone, Default)]
pub struct UnitSegmenter {
    params: FrameParams,
}

impl UnitSegmenter {
    pub fn new(params: FrameParams) -> Self {
        Self { params }
    }

    pub fn build_units(
        &self,
        text: &str,
        mode: EvaluationMode,
        reference_frames: usize,
        timings: Option<&[UnitTiming]>,
    ) -> Result<Vec<ScoringUnit>> {
        let symbols = split_units(text, mode)?;
        let ranges = match timings {
            Some(timings) => self.timed_ranges(timings, symbols.len(), reference_frames)?,
            None => partition_frames(&symbols, reference_frames),
        };
        Ok(symbols
            .into_iter()
            .zip(ranges)
            .map(|(symbol, range)| ScoringUnit::new(symbol, range))
            .collect())
    }

    pub fn project(&self, units: Vec<ScoringUnit>, path: &AlignmentPath) -> Vec<UnitProjection> {
        units
            .into_iter()
            .map(|unit| {
                let path_span = path.span_for_reference(&unit.reference_frames);
                let candidate_frames = candidate_range(path, &path_span);
                UnitProjection {
                    unit,
                    candidate_frames,
                    path_span,
                }
            })
            .collect()
    }

    pub fn segment(
        &self,
        text: &str,
        mode: EvaluationMode,
        reference_frames: usize,
        path: &AlignmentPath,
        timings: Option<&[UnitTiming]>,
    ) -> Result<Vec<UnitProjection>> {
        let units = self.build_units(text, mode, reference_frames, timings)?;
        Ok(self.project(units, path))
    }

    fn timed_ranges(
        &self,
        timings: &[UnitTiming],
        unit_count: usize,
        frame_count: usize,
    ) -> Result<Vec<Range<usize>>> {
        if timings.len() != unit_count {
            return Err(PronunciationError::input(format!(
                "{} unit timings supplied for {unit_count} units",
                timings.len()
            )));
        }
        timings
            .iter()
            .map(|timing| {
                if !(timing.start_seconds.is_finite() && timing.end_seconds.is_finite())
                    || timing.end_seconds < timing.start_seconds
                {
                    return Err(PronunciationError::input(format!(
                        "invalid unit timing {:.3}s..{:.3}s",
                        timing.start_seconds, timing.end_seconds
                    )));
                }
                let start = self.params.seconds_to_frame(timing.start_seconds).min(frame_count);
                let end = self
                    .params
                    .seconds_to_frame(timing.end_seconds)
                    .clamp(start, frame_count);
                Ok(at_least_one_frame(start..end, frame_count))
            })
            .collect()
    }
}

fn candidate_range(path: &AlignmentPath, span: &Range<usize>) -> Option<Range<usize>> {
    let pairs = path.pairs.get(span.clone())?;
    let first = pairs.iter().map(|&(_, c)| c).min()?;
    let last = pairs.iter().map(|&(_, c)| c).max()?;
    Some(first..last + 1)
}
