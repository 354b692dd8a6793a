//! Volume statistics: rolling volume mean and volume z-score.

use super::stddev::{rolling_mean, rolling_std};

/// Rolling mean of volume over `window` bars.
pub fn calculate_volume_sma(volumes: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling_mean(volumes, window)
}

/// (volume - rolling_mean) / rolling_std over `window` bars.
///
/// Undefined during warmup and whenever the window has zero dispersion.
pub fn calculate_volume_zscore(volumes: &[f64], window: usize) -> Vec<Option<f64>> {
    let mean = rolling_mean(volumes, window);
    let std = rolling_std(volumes, window);

    volumes
        .iter()
        .zip(mean.iter().zip(&std))
        .map(|(v, (m, s))| match (m, s) {
            (Some(m), Some(s)) if *s > 0.0 => Some((v - m) / s),
            _ => None,
        })
        .collect()
}
