use anyhow::{ensure, Context, Result};
use aus::analysis;
use aus::analysis::mel::MelFilterbank;
use aus::spectrum;
use aus::WindowType;

use crate::audio::resample;
use crate::pronunciation::AudioSignal;

use super::FrameParams;

pub(crate) struct SpectrogramBundle {
    pub mel: Vec<Vec<f64>>,
    pub power: Vec<Vec<f64>>,
}

pub(crate) fn compute_spectrograms(
    signal: &AudioSignal,
    params: &FrameParams,
) -> Result<SpectrogramBundle> {
    let mono = ensure_sample_rate(signal, params.sample_rate)?;
    let fft_size = params.window_samples();
    let hop_size = params.hop_samples();
    ensure!(
        mono.len() >= fft_size,
        "signal has {} samples, shorter than one {} ms analysis window ({} samples)",
        mono.len(),
        params.window_ms,
        fft_size
    );
    let audio_f64: Vec<f64> = mono.iter().map(|&s| s as f64).collect();

    let stft = spectrum::rstft(&audio_f64, fft_size, hop_size, WindowType::Hanning);
    let (magnitude, _) = spectrum::complex_to_polar_rstft(&stft);
    let power = analysis::make_power_spectrogram(&magnitude);
    ensure!(!power.is_empty(), "short-time transform produced no frames");

    let freqs = spectrum::rfftfreq(fft_size, params.sample_rate);
    let filterbank = MelFilterbank::new(
        params.min_frequency,
        (params.sample_rate as f64) / 2.0,
        params.mel_bands,
        &freqs,
        true,
    );
    let mel = analysis::mel::make_mel_spectrogram(&power, &filterbank);

    Ok(SpectrogramBundle { mel, power })
}

pub(crate) fn ensure_sample_rate(signal: &AudioSignal, target_rate: u32) -> Result<Vec<f32>> {
    if signal.sample_rate() == target_rate {
        Ok(signal.samples().to_vec())
    } else {
        resample::linear_resample(signal.samples(), signal.sample_rate(), target_rate)
            .with_context(|| {
                format!(
                    "failed to resample audio from {} Hz to {} Hz",
                    signal.sample_rate(),
                    target_rate
                )
            })
    }
}
