use anyhow::{anyhow, ensure, Result};
use aus::analysis;
use ndarray::{s, Array1, Array2, Axis};

pub(crate) struct FeatureMatrices {
    pub mfcc: Array2<f32>,
    pub energy: Array1<f32>,
}

/// Builds the per-frame MFCC matrix and raw frame energy.
///
/// Coefficient 0 tracks overall loudness, which the energy column already
/// carries, so the returned MFCC matrix holds coefficients `1..=mfcc_count`.
pub(crate) fn assemble_features(
    mel_spectrogram: &[Vec<f64>],
    power_spectrogram: &[Vec<f64>],
    mfcc_count: usize,
) -> Result<FeatureMatrices> {
    ensure!(mfcc_count > 0, "MFCC coefficient count must be positive");
    let mfcc_raw = analysis::mel::mfcc_spectrogram(mel_spectrogram, mfcc_count + 1, None);
    let mfcc_full = array_from_vec2(&mfcc_raw)?;
    ensure!(
        mfcc_full.len_of(Axis(1)) > mfcc_count,
        "MFCC computation returned {} coefficients, expected {}",
        mfcc_full.len_of(Axis(1)),
        mfcc_count + 1
    );
    let mfcc = mfcc_full.slice(s![.., 1..=mfcc_count]).to_owned();
    let energy = compute_energy(power_spectrogram);
    ensure!(
        mfcc.len_of(Axis(0)) == energy.len(),
        "MFCC frames ({}) and energy frames ({}) disagree",
        mfcc.len_of(Axis(0)),
        energy.len()
    );

    Ok(FeatureMatrices { mfcc, energy })
}

fn array_from_vec2(data: &[Vec<f64>]) -> Result<Array2<f32>> {
    if data.is_empty() {
        return Ok(Array2::zeros((0, 0)));
    }
    let rows = data.len();
    let cols = data[0].len();
    let mut flat = Vec::with_capacity(rows * cols);
    for row in data {
        ensure!(row.len() == cols, "ragged spectrogram row");
        flat.extend(row.iter().map(|&v| finite_or_zero(v as f32)));
    }
    Array2::from_shape_vec((rows, cols), flat).map_err(|err| anyhow!(err))
}

fn compute_energy(power: &[Vec<f64>]) -> Array1<f32> {
    power
        .iter()
        .map(|frame| finite_or_zero(frame.iter().sum::<f64>().max(0.0).sqrt() as f32))
        .collect()
}

fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn energy_is_root_of_summed_power() {
        let energy = compute_energy(&[vec![1.0, 3.0], vec![0.0, 0.0], vec![f64::NAN]]);
        assert_eq!(energy.to_vec(), vec![2.0, 0.0, 0.0]);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        assert!(array_from_vec2(&[vec![1.0, 2.0], vec![1.0]]).is_err());
    }

    #[test]
    fn non_finite_values_become_zero() {
        let matrix = array_from_vec2(&[vec![f64::NEG_INFINITY, 1.5]]).unwrap();
        assert_eq!(matrix[[0, 0]], 0.0);
        assert_eq!(matrix[[0, 1]], 1.5);
    }
}
