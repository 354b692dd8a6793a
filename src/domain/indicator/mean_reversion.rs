//! Mean-reversion distance: how many standard deviations the close sits from
//! its rolling mean.
//!
//! z = (close - SMA(length)) / std(length)

use super::stddev::{rolling_mean, rolling_std};

pub fn calculate_mean_reversion_z(closes: &[f64], length: usize) -> Vec<Option<f64>> {
    let mean = rolling_mean(closes, length);
    let std = rolling_std(closes, length);

    closes
        .iter()
        .zip(mean.iter().zip(&std))
        .map(|(c, (m, s))| match (m, s) {
            (Some(m), Some(s)) if *s > 0.0 => Some((c - m) / s),
            _ => None,
        })
        .collect()
}
