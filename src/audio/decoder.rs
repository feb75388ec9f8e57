use crate::types::AudioData;
use anyhow::{ensure, Context, Result};
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use tracing::debug;

/// Decode an audio file to raw PCM samples (mono, f32)
pub fn decode_file<P: AsRef<Path>>(path: P) -> Result<AudioData> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
    let extension = path.extension().and_then(|e| e.to_str());
    decode_bytes(bytes, extension)
}

/// Decode an in-memory audio container to raw PCM samples (mono, f32)
///
/// `format_hint` may be a file extension ("wav") or a mime type ("audio/wav");
/// the container is sniffed either way.
pub fn decode_bytes(bytes: Vec<u8>, format_hint: Option<&str>) -> Result<AudioData> {
    ensure!(!bytes.is_empty(), "audio payload is empty");

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    match format_hint {
        Some(mime) if mime.contains('/') => {
            hint.mime_type(mime);
        }
        Some(extension) => {
            hint.with_extension(extension.trim_start_matches('.'));
        }
        None => {}
    }

    let probe_result = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Failed to probe audio format")?;

    let mut format = probe_result.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio tracks found in payload")?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .context("Sample rate not specified in audio payload")?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create decoder")?;

    let mut all_samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(err).context("Failed to read packet"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => all_samples.extend(convert_to_mono_f32(&decoded)),
            Err(SymphoniaError::DecodeError(reason)) => {
                debug!(reason, "skipping undecodable packet");
            }
            Err(err) => return Err(err).context("Failed to decode audio packet"),
        }
    }

    Ok(AudioData {
        samples: all_samples,
        sample_rate,
    })
}

/// Convert any audio buffer format to mono f32 samples in [-1.0, 1.0]
fn convert_to_mono_f32(buffer: &AudioBufferRef) -> Vec<f32> {
    const I8_SCALE: f32 = 128.0;
    const I16_SCALE: f32 = 32_768.0;
    const I24_SCALE: f32 = 8_388_608.0;
    const I32_SCALE: f64 = 2_147_483_648.0;

    match buffer {
        AudioBufferRef::U8(buf) => mix_down(&**buf, |s| (s as f32 - I8_SCALE) / I8_SCALE),
        AudioBufferRef::U16(buf) => mix_down(&**buf, |s| (s as f32 - I16_SCALE) / I16_SCALE),
        AudioBufferRef::U24(buf) => {
            mix_down(&**buf, |s| (s.inner() as f32 - I24_SCALE) / I24_SCALE)
        }
        AudioBufferRef::U32(buf) => {
            mix_down(&**buf, |s| ((s as f64 - I32_SCALE) / I32_SCALE) as f32)
        }
        AudioBufferRef::S8(buf) => mix_down(&**buf, |s| s as f32 / I8_SCALE),
        AudioBufferRef::S16(buf) => mix_down(&**buf, |s| s as f32 / I16_SCALE),
        AudioBufferRef::S24(buf) => mix_down(&**buf, |s| s.inner() as f32 / I24_SCALE),
        AudioBufferRef::S32(buf) => mix_down(&**buf, |s| (s as f64 / I32_SCALE) as f32),
        AudioBufferRef::F32(buf) => mix_down(&**buf, |s| s),
        AudioBufferRef::F64(buf) => mix_down(&**buf, |s| s as f32),
    }
}

/// Average all channels of a planar buffer into one channel.
fn mix_down<S: Sample>(buffer: &AudioBuffer<S>, convert: impl Fn(S) -> f32) -> Vec<f32> {
    let channels = buffer.spec().channels.count().max(1);
    let frames = buffer.frames();
    if channels == 1 {
        return buffer.chan(0).iter().map(|&s| convert(s)).collect();
    }
    (0..frames)
        .map(|index| {
            let sum: f32 = (0..channels)
                .map(|channel| convert(buffer.chan(channel)[index]))
                .sum();
            sum / channels as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &sample in samples {
                writer.write_sample(sample).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_mono_wav_from_memory() {
        let bytes = wav_bytes(&[0, 16_384, -16_384, 0], 1, 8_000);
        let audio = decode_bytes(bytes, Some("wav")).unwrap();
        assert_eq!(audio.sample_rate, 8_000);
        assert_eq!(audio.samples.len(), 4);
        assert!((audio.samples[1] - 0.5).abs() < 1e-3);
        assert!((audio.samples[2] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn averages_stereo_channels() {
        // interleaved L/R pairs
        let bytes = wav_bytes(&[16_384, 0, 16_384, 0], 2, 8_000);
        let audio = decode_bytes(bytes, None).unwrap();
        assert_eq!(audio.samples.len(), 2);
        assert!(audio.samples.iter().all(|s| (s - 0.25).abs() < 1e-3));
    }

    #[test]
    fn rejects_empty_and_garbage_payloads() {
        assert!(decode_bytes(Vec::new(), Some("wav")).is_err());
        assert!(decode_bytes(b"definitely not audio".to_vec(), Some("wav")).is_err());
    }
}
