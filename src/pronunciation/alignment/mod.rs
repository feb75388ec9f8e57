pub mod dtw;
pub mod segmenter;

use serde::{Deserialize, Serialize};

pub use dtw::{cosine_distance, AlignmentPath, SequenceAligner};
pub use segmenter::{partition_frames, split_units, UnitProjection, UnitSegmenter, UnitTiming};

/// Search constraints for the aligner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Maximum allowed |reference frame − candidate frame| skew. `None` runs full DTW.
    pub band: Option<usize>,
}
