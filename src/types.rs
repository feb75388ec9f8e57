//! Raw PCM containers shared by the audio helpers

/// Decoded audio at its native sample rate (mono, f32 samples)
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Audio samples, normalized to [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g., 44100)
    pub sample_rate: u32,
}

impl AudioData {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Raw encoded audio handed to the engine (an upload, a fetched reference, a file)
#[derive(Debug, Clone, Default)]
pub struct AudioInput {
    pub bytes: Vec<u8>,
    /// File extension or mime type used as a probe hint ("wav", "audio/mpeg")
    pub format_hint: Option<String>,
}

impl AudioInput {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            format_hint: None,
        }
    }

    pub fn with_format_hint(mut self, hint: impl Into<String>) -> Self {
        self.format_hint = Some(hint.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
