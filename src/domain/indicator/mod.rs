//! Technical indicator implementations.
//!
//! Every indicator is a pure function over an ordered series returning one
//! `Option<f64>` per input bar; `None` marks a bar without enough history.
//! [`compute_snapshots`] gathers them into one [`IndicatorSnapshot`] per bar.

pub mod adx;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod mean_reversion;
pub mod rsi;
pub mod stddev;
pub mod volume;
pub mod vwap;

use chrono::NaiveDateTime;

use crate::domain::ohlcv::{Bar, closes, volumes};
use bollinger::BandState;

/// Lookback lengths for every indicator in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorParams {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub rsi_length: usize,
    pub volume_window: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_window: usize,
    pub adx_length: usize,
    pub mean_rev_length: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            ema_fast: 8,
            ema_slow: 21,
            rsi_length: 14,
            volume_window: 20,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger_window: 20,
            adx_length: 14,
            mean_rev_length: 20,
        }
    }
}

impl IndicatorParams {
    /// Bars needed before every indicator in the snapshot is defined.
    pub fn longest_lookback(&self) -> usize {
        [
            self.ema_fast,
            self.ema_slow,
            self.rsi_length + 1,
            self.volume_window,
            (self.macd_slow + self.macd_signal).saturating_sub(1),
            (self.bollinger_window * 2).saturating_sub(1),
            self.adx_length * 2,
            self.mean_rev_length,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

/// Indicator values attached to one bar.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSnapshot {
    pub timestamp: NaiveDateTime,
    pub close: f64,
    pub volume: f64,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub rsi: Option<f64>,
    pub vwap: Option<f64>,
    pub volume_sma: Option<f64>,
    pub volume_zscore: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_hist: Option<f64>,
    pub bollinger_upper: Option<f64>,
    pub bollinger_lower: Option<f64>,
    pub bollinger_width: Option<f64>,
    pub band_state: Option<BandState>,
    pub adx: Option<f64>,
    pub mean_rev_z: Option<f64>,
}

impl IndicatorSnapshot {
    /// A snapshot with price and volume only and every indicator undefined.
    pub fn bare(timestamp: NaiveDateTime, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            close,
            volume,
            ema_fast: None,
            ema_slow: None,
            rsi: None,
            vwap: None,
            volume_sma: None,
            volume_zscore: None,
            macd: None,
            macd_signal: None,
            macd_hist: None,
            bollinger_upper: None,
            bollinger_lower: None,
            bollinger_width: None,
            band_state: None,
            adx: None,
            mean_rev_z: None,
        }
    }

    pub fn is_squeeze(&self) -> bool {
        self.band_state == Some(BandState::Squeeze)
    }

    pub fn is_expand(&self) -> bool {
        self.band_state == Some(BandState::Expand)
    }
}

/// One snapshot per bar, in bar order.
pub fn compute_snapshots(bars: &[Bar], params: &IndicatorParams) -> Vec<IndicatorSnapshot> {
    let close = closes(bars);
    let volume = volumes(bars);

    let ema_fast = ema::calculate_ema(&close, params.ema_fast);
    let ema_slow = ema::calculate_ema(&close, params.ema_slow);
    let rsi = rsi::calculate_rsi(&close, params.rsi_length);
    let vwap = vwap::calculate_vwap(bars);
    let volume_sma = volume::calculate_volume_sma(&volume, params.volume_window);
    let volume_z = volume::calculate_volume_zscore(&volume, params.volume_window);
    let macd = macd::calculate_macd(
        &close,
        params.macd_fast,
        params.macd_slow,
        params.macd_signal,
    );
    let bands = bollinger::calculate_bollinger(&close, params.bollinger_window);
    let adx = adx::calculate_adx(bars, params.adx_length);
    let mean_rev = mean_reversion::calculate_mean_reversion_z(&close, params.mean_rev_length);

    bars.iter()
        .enumerate()
        .map(|(i, bar)| IndicatorSnapshot {
            timestamp: bar.timestamp,
            close: bar.close,
            volume: bar.volume,
            ema_fast: ema_fast[i],
            ema_slow: ema_slow[i],
            rsi: rsi[i],
            vwap: vwap[i],
            volume_sma: volume_sma[i],
            volume_zscore: volume_z[i],
            macd: macd.line[i],
            macd_signal: macd.signal[i],
            macd_hist: macd.histogram[i],
            bollinger_upper: bands.upper[i],
            bollinger_lower: bands.lower[i],
            bollinger_width: bands.width[i],
            band_state: bands.state[i],
            adx: adx[i],
            mean_rev_z: mean_rev[i],
        })
        .collect()
}

/// Snapshot of the last bar, or `None` for an empty series.
pub fn latest_snapshot(bars: &[Bar], params: &IndicatorParams) -> Option<IndicatorSnapshot> {
    compute_snapshots(bars, params).pop()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_bars(closes: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                timestamp: start + chrono::Duration::hours(i as i64),
                open: c,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 100.0 + (i % 7) as f64 * 10.0,
            })
            .collect()
    }

    #[test]
    fn one_snapshot_per_bar() {
        let bars = make_bars(&[100.0; 30]);
        let snaps = compute_snapshots(&bars, &IndicatorParams::default());
        assert_eq!(snaps.len(), 30);
        assert_eq!(snaps[29].timestamp, bars[29].timestamp);
    }

    #[test]
    fn short_series_leaves_lookback_indicators_undefined() {
        let bars = make_bars(&[100.0, 101.0, 102.0]);
        let snap = latest_snapshot(&bars, &IndicatorParams::default()).unwrap();
        assert!(snap.ema_fast.is_none());
        assert!(snap.ema_slow.is_none());
        assert!(snap.rsi.is_none());
        assert!(snap.volume_zscore.is_none());
        assert!(snap.macd_hist.is_none());
        assert!(snap.band_state.is_none());
        assert!(snap.adx.is_none());
        assert!(snap.mean_rev_z.is_none());
        // vwap has no lookback
        assert!(snap.vwap.is_some());
    }

    #[test]
    fn long_series_defines_everything() {
        let params = IndicatorParams::default();
        let closes: Vec<f64> = (0..params.longest_lookback() + 5)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0)
            .collect();
        let snap = latest_snapshot(&make_bars(&closes), &params).unwrap();
        assert!(snap.ema_fast.is_some());
        assert!(snap.ema_slow.is_some());
        assert!(snap.rsi.is_some());
        assert!(snap.volume_zscore.is_some());
        assert!(snap.macd_hist.is_some());
        assert!(snap.band_state.is_some());
        assert!(snap.adx.is_some());
        assert!(snap.mean_rev_z.is_some());
    }

    #[test]
    fn latest_of_empty_is_none() {
        assert!(latest_snapshot(&[], &IndicatorParams::default()).is_none());
    }

    #[test]
    fn bare_snapshot_has_no_band_flags() {
        let snap = IndicatorSnapshot::bare(make_bars(&[1.0])[0].timestamp, 1.0, 1.0);
        assert!(!snap.is_squeeze());
        assert!(!snap.is_expand());
    }
}
