//! Bollinger Bands indicator.
//!
//! - Middle: rolling mean over `window` closes
//! - Upper / Lower: middle ± 2 × rolling sample standard deviation
//! - Width: upper - lower
//!
//! The band state compares the width with its own rolling mean over the same
//! window: narrower is a squeeze, wider is an expansion, equal is neither.

use super::stddev::{rolling_mean, rolling_mean_opt, rolling_std};

pub const BAND_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandState {
    Squeeze,
    Expand,
    Neutral,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BollingerSeries {
    pub upper: Vec<Option<f64>>,
    pub middle: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
    pub width: Vec<Option<f64>>,
    pub state: Vec<Option<BandState>>,
}

pub fn calculate_bollinger(closes: &[f64], window: usize) -> BollingerSeries {
    let middle = rolling_mean(closes, window);
    let std = rolling_std(closes, window);

    let mut upper = Vec::with_capacity(closes.len());
    let mut lower = Vec::with_capacity(closes.len());
    let mut width = Vec::with_capacity(closes.len());

    for (m, s) in middle.iter().zip(&std) {
        match (m, s) {
            (Some(m), Some(s)) => {
                let u = m + BAND_MULTIPLIER * s;
                let l = m - BAND_MULTIPLIER * s;
                upper.push(Some(u));
                lower.push(Some(l));
                width.push(Some(u - l));
            }
            _ => {
                upper.push(None);
                lower.push(None);
                width.push(None);
            }
        }
    }

    let width_mean = rolling_mean_opt(&width, window);
    let state = width
        .iter()
        .zip(&width_mean)
        .map(|(w, avg)| Some(band_state((*w)?, (*avg)?)))
        .collect();

    BollingerSeries {
        upper,
        middle,
        lower,
        width,
        state,
    }
}

fn band_state(width: f64, mean_width: f64) -> BandState {
    if width < mean_width {
        BandState::Squeeze
    } else if width > mean_width {
        BandState::Expand
    } else {
        BandState::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn bollinger_warmup() {
        let out = calculate_bollinger(&[10.0, 20.0, 30.0, 40.0, 50.0], 3);
        assert!(out.upper[0].is_none());
        assert!(out.upper[1].is_none());
        assert!(out.upper[2].is_some());
        // state needs `window` widths
        assert!(out.state[3].is_none());
        assert!(out.state[4].is_some());
    }

    #[test]
    fn bollinger_basic_calculation() {
        let out = calculate_bollinger(&[10.0, 20.0, 30.0], 3);
        // mean 20, sample std 10
        assert_relative_eq!(out.middle[2].unwrap(), 20.0);
        assert_relative_eq!(out.upper[2].unwrap(), 40.0, epsilon = 1e-12);
        assert_relative_eq!(out.lower[2].unwrap(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(out.width[2].unwrap(), 40.0, epsilon = 1e-12);
    }

    #[test]
    fn constant_prices_resolve_to_neutral() {
        let out = calculate_bollinger(&[100.0; 8], 3);
        assert_relative_eq!(out.width[7].unwrap(), 0.0);
        assert_eq!(out.state[7], Some(BandState::Neutral));
    }

    #[test]
    fn calm_after_volatility_is_squeeze() {
        let closes = [100.0, 120.0, 80.0, 120.0, 80.0, 100.0, 100.5, 100.0, 100.5];
        let out = calculate_bollinger(&closes, 3);
        assert_eq!(out.state[8], Some(BandState::Squeeze));
    }

    #[test]
    fn breakout_after_calm_is_expand() {
        let closes = [100.0, 100.5, 100.0, 100.5, 100.0, 100.5, 120.0];
        let out = calculate_bollinger(&closes, 3);
        assert_eq!(out.state[6], Some(BandState::Expand));
    }

    #[test]
    fn too_short_is_undefined() {
        let out = calculate_bollinger(&[1.0, 2.0], 20);
        assert!(out.width.iter().all(Option::is_none));
        assert!(out.state.iter().all(Option::is_none));
    }
}
