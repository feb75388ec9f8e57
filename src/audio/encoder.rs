//! 16-bit mono WAV output
//!
//! Stretched takes leave the engine either as a file for the CLI or as an
//! in-memory [`AudioInput`] that goes straight back into an evaluation.

use crate::types::{AudioData, AudioInput};
use anyhow::{Context, Result};
use std::io::{Cursor, Seek, Write};
use std::path::Path;

fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn write_samples<W: Write + Seek>(audio: &AudioData, sink: W) -> Result<()> {
    let mut writer =
        hound::WavWriter::new(sink, wav_spec(audio.sample_rate)).context("wav header")?;
    for &sample in &audio.samples {
        writer
            .write_sample(to_i16(sample))
            .context("failed to write audio sample")?;
    }
    writer.finalize().context("failed to finalize wav")
}

/// Encodes `audio` as WAV bytes.
pub fn wav_bytes(audio: &AudioData) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    write_samples(audio, &mut cursor)?;
    Ok(cursor.into_inner())
}

/// Wraps `audio` as a WAV-hinted input ready for evaluation.
pub fn to_wav_input(audio: &AudioData) -> Result<AudioInput> {
    Ok(AudioInput::new(wav_bytes(audio)?).with_format_hint("wav"))
}

pub fn encode_wav<P: AsRef<Path>>(audio: &AudioData, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_samples(audio, std::io::BufWriter::new(file))
        .with_context(|| format!("failed to write {}", path.display()))
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
