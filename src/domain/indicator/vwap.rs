//! Volume Weighted Average Price.
//!
//! cumulative(close × volume) / cumulative(volume), accumulated from the first
//! bar of the loaded series. There is no session anchor: the value depends on
//! how much history was loaded.

use crate::domain::ohlcv::Bar;

pub fn calculate_vwap(bars: &[Bar]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(bars.len());
    let mut cum_pv = 0.0;
    let mut cum_vol = 0.0;

    for bar in bars {
        cum_pv += bar.close * bar.volume;
        cum_vol += bar.volume;
        out.push(if cum_vol > 0.0 {
            Some(cum_pv / cum_vol)
        } else {
            None
        });
    }

    out
}
