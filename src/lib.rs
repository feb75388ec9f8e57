//! Pronunciation scoring: compares a learner recording against a reference
//! pronunciation and reports per-character or per-word scores.

pub mod audio;
pub mod config;
pub mod pronunciation;
pub mod transcription;
pub mod types;
