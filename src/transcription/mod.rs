//! Optional speech recognition attached to evaluation results.
//!
//! The dispatcher only ever sees the [`Transcriber`] trait. Whisper support is
//! compiled in with the `whisper` cargo feature; without it (or when the model
//! is disabled in configuration) the [`NullTranscriber`] is used and results
//! simply carry no transcript.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::pronunciation::{AudioSignal, Transcript};

/// Converts a normalized signal into text.
pub trait Transcriber: Send + Sync {
    /// `Ok(None)` means no transcript is available; errors are logged by the
    /// caller and never fail an evaluation.
    fn transcribe(&self, signal: &AudioSignal) -> Result<Option<Transcript>>;

    fn name(&self) -> &str;
}

/// Transcriber used when no ASR backend is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTranscriber;

impl Transcriber for NullTranscriber {
    fn transcribe(&self, _signal: &AudioSignal) -> Result<Option<Transcript>> {
        Ok(None)
    }

    fn name(&self) -> &str {
        "none"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    pub enabled: bool,
    pub model_path: Option<PathBuf>,
    /// Language code passed to the recognizer; `auto` lets it detect.
    pub language: String,
    pub threads: Option<usize>,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_path: None,
            language: "en".to_string(),
            threads: None,
        }
    }
}

/// Builds the transcriber described by `config`, falling back to
/// [`NullTranscriber`] when recognition is unavailable.
pub fn from_config(config: &TranscriberConfig) -> Arc<dyn Transcriber> {
    if !config.enabled {
        info!("speech recognition disabled");
        return Arc::new(NullTranscriber);
    }
    let Some(model_path) = config.model_path.as_ref() else {
        info!("no whisper model configured; transcripts will be omitted");
        return Arc::new(NullTranscriber);
    };
    build_whisper(model_path, config)
}

#[cfg(feature = "whisper")]
fn build_whisper(model_path: &std::path::Path, config: &TranscriberConfig) -> Arc<dyn Transcriber> {
    match whisper::WhisperTranscriber::new(model_path, config) {
        Ok(transcriber) => {
            info!(model = %model_path.display(), "whisper transcriber ready");
            Arc::new(transcriber)
        }
        Err(err) => {
            warn!(model = %model_path.display(), error = %format!("{err:#}"), "whisper unavailable");
            Arc::new(NullTranscriber)
        }
    }
}

#[cfg(not(feature = "whisper"))]
fn build_whisper(model_path: &std::path::Path, _config: &TranscriberConfig) -> Arc<dyn Transcriber> {
    warn!(
        model = %model_path.display(),
        "built without the `whisper` feature; transcripts will be omitted"
    );
    Arc::new(NullTranscriber)
}

/// Log probability credited to a segment that produced no tokens.
const EMPTY_SEGMENT_LOG_PROB: f32 = -9.0;

/// Mean log probability of a segment's tokens.
#[cfg_attr(not(feature = "whisper"), allow(dead_code))]
fn segment_log_prob(token_probs: impl IntoIterator<Item = f32>) -> f32 {
    let (sum, count) = token_probs
        .into_iter()
        .fold((0.0_f32, 0u32), |(sum, count), p| {
            (sum + p.max(f32::MIN_POSITIVE).ln(), count + 1)
        });
    if count == 0 {
        EMPTY_SEGMENT_LOG_PROB
    } else {
        sum / count as f32
    }
}

/// exp of the mean segment log probability, clipped to [0, 1].
#[cfg_attr(not(feature = "whisper"), allow(dead_code))]
fn confidence_from_log_probs(segment_log_probs: &[f32]) -> Option<f32> {
    if segment_log_probs.is_empty() {
        return None;
    }
    let mean = segment_log_probs.iter().sum::<f32>() / segment_log_probs.len() as f32;
    Some(mean.exp().clamp(0.0, 1.0))
}

#[cfg(feature = "whisper")]
pub mod whisper {
    use std::path::Path;
    use std::sync::Mutex;

    use anyhow::{anyhow, Context, Result};
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    use super::{confidence_from_log_probs, segment_log_prob, Transcriber, TranscriberConfig};
    use crate::audio::resample::linear_resample;
    use crate::pronunciation::{AudioSignal, Transcript};

    const WHISPER_SAMPLE_RATE: u32 = 16_000;
    const AUTO_LANGUAGE: &str = "auto";

    pub struct WhisperTranscriber {
        context: Mutex<WhisperContext>,
        language: String,
        threads: Option<usize>,
        model_name: String,
    }

    impl WhisperTranscriber {
        pub fn new(model_path: &Path, config: &TranscriberConfig) -> Result<Self> {
            let path = model_path
                .to_str()
                .ok_or_else(|| anyhow!("model path is not valid UTF-8"))?;
            let context =
                WhisperContext::new_with_params(path, WhisperContextParameters::default())
                    .map_err(|err| anyhow!("failed to load whisper model {path}: {err}"))?;
            let model_name = model_path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("whisper")
                .to_string();
            Ok(Self {
                context: Mutex::new(context),
                language: config.language.clone(),
                threads: config.threads,
                model_name,
            })
        }
    }

    impl Transcriber for WhisperTranscriber {
        fn transcribe(&self, signal: &AudioSignal) -> Result<Option<Transcript>> {
            let samples = if signal.sample_rate() == WHISPER_SAMPLE_RATE {
                signal.samples().to_vec()
            } else {
                linear_resample(signal.samples(), signal.sample_rate(), WHISPER_SAMPLE_RATE)?
            };
            let context = self
                .context
                .lock()
                .map_err(|err| anyhow!("whisper context lock poisoned: {err}"))?;
            let mut state = context
                .create_state()
                .map_err(|err| anyhow!("failed to create whisper state: {err}"))?;

            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            if self.language == AUTO_LANGUAGE {
                params.set_language(None);
            } else {
                params.set_language(Some(&self.language));
            }
            if let Some(threads) = self.threads {
                params.set_n_threads(threads as i32);
            }
            params.set_print_special(false);
            params.set_print_progress(false);
            params.set_print_realtime(false);
            params.set_print_timestamps(false);

            state
                .full(params, &samples)
                .map_err(|err| anyhow!("{err}"))
                .context("whisper inference failed")?;

            let lang_id = state.full_lang_id_from_state();
            let language = whisper_rs::get_lang_str(lang_id).unwrap_or("").to_string();

            let mut text = String::new();
            let mut log_probs = Vec::new();
            for segment in state.as_iter() {
                text.push_str(&segment.to_string());
                let tokens = (0..segment.n_tokens())
                    .filter_map(|i| segment.get_token(i))
                    .map(|token| token.token_probability());
                log_probs.push(segment_log_prob(tokens));
            }
            let text = text.trim();
            let Some(confidence) = confidence_from_log_probs(&log_probs) else {
                return Ok(None);
            };
            if text.is_empty() {
                return Ok(None);
            }
            let transcript = Transcript::new(text, confidence).with_language(language);
            Ok(Some(transcript))
        }

        fn name(&self) -> &str {
            &self.model_name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_the_exp_of_the_mean_segment_log_prob() {
        let confidence = confidence_from_log_probs(&[-0.2, -0.4]).unwrap();
        assert!((confidence - (-0.3_f32).exp()).abs() < 1e-6);
        assert_eq!(confidence_from_log_probs(&[]), None);
        assert_eq!(confidence_from_log_probs(&[0.5]), Some(1.0));
    }

    #[test]
    fn segment_log_prob_averages_token_logs() {
        let log_prob = segment_log_prob([1.0, 0.25]);
        assert!((log_prob - 0.25_f32.ln() / 2.0).abs() < 1e-6);
        assert_eq!(segment_log_prob(std::iter::empty()), EMPTY_SEGMENT_LOG_PROB);
        assert!(segment_log_prob([0.0]).is_finite());
    }

    #[test]
    fn null_transcriber_yields_nothing() {
        let signal = AudioSignal::from_samples(vec![0.1; 160], 16_000).unwrap();
        assert_eq!(NullTranscriber.transcribe(&signal).unwrap(), None);
        assert_eq!(NullTranscriber.name(), "none");
    }

    #[test]
    fn disabled_or_unconfigured_falls_back_to_null() {
        let disabled = TranscriberConfig {
            enabled: false,
            model_path: Some(PathBuf::from("/models/ggml-base.bin")),
            ..TranscriberConfig::default()
        };
        assert_eq!(from_config(&disabled).name(), "none");
        assert_eq!(from_config(&TranscriberConfig::default()).name(), "none");
    }
}
