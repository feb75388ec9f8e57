#![allow(dead_code)]

use std::f32::consts::PI;
use std::path::Path;

use spoken_eval::audio::encoder;
use spoken_eval::types::AudioData;

pub const SAMPLE_RATE: u32 = 16_000;

/// Fundamental frequency and length of one synthetic "sound".
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub freq: f32,
    pub seconds: f32,
}

pub fn segment(freq: f32, seconds: f32) -> Segment {
    Segment { freq, seconds }
}

/// Five distinct voiced segments standing in for H, e, l, l, o.
pub fn hello_segments() -> Vec<Segment> {
    vec![
        segment(150.0, 0.2),
        segment(260.0, 0.2),
        segment(340.0, 0.2),
        segment(340.0, 0.2),
        segment(200.0, 0.2),
    ]
}

pub fn world_segments() -> Vec<Segment> {
    vec![
        segment(180.0, 0.15),
        segment(300.0, 0.15),
        segment(240.0, 0.15),
        segment(400.0, 0.15),
        segment(160.0, 0.15),
    ]
}

/// Renders segments back to back as harmonic tones with continuous phase.
pub fn render(segments: &[Segment], amplitude: f32) -> Vec<f32> {
    let mut samples = Vec::new();
    let mut phase = 0.0_f32;
    let dt = 1.0 / SAMPLE_RATE as f32;
    for seg in segments {
        let count = (seg.seconds * SAMPLE_RATE as f32) as usize;
        for _ in 0..count {
            phase = (phase + 2.0 * PI * seg.freq * dt) % (2.0 * PI * 64.0);
            let value: f32 = (1..=4)
                .map(|k| (phase * k as f32).sin() / k as f32)
                .sum();
            samples.push(value * amplitude * 0.5);
        }
    }
    samples
}

pub fn silence(seconds: f32) -> Vec<f32> {
    vec![0.0; (seconds * SAMPLE_RATE as f32) as usize]
}

/// Every segment lengthened by `factor`, content unchanged.
pub fn stretched(segments: &[Segment], factor: f32) -> Vec<Segment> {
    segments
        .iter()
        .map(|s| segment(s.freq, s.seconds * factor))
        .collect()
}

pub fn wav_bytes(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    encoder::wav_bytes(&AudioData::new(samples.to_vec(), sample_rate)).expect("encode wav")
}

pub fn write_wav(path: &Path, samples: &[f32]) {
    std::fs::write(path, wav_bytes(samples, SAMPLE_RATE)).expect("write wav file");
}
