//! Average Directional Index (ADX).
//!
//! Measures trend strength, not direction. +DM/-DM and true range are smoothed
//! with Wilder's method over `length`; DX = 100 × |+DI − −DI| / (+DI + −DI);
//! ADX is DX smoothed again over `length`.
//!
//! Warmup: the first ADX value lands on bar `2 × length - 1`.

use crate::domain::ohlcv::Bar;

pub fn calculate_adx(bars: &[Bar], length: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; bars.len()];
    if length == 0 || bars.len() < 2 * length {
        return out;
    }

    let mut plus_dm = Vec::with_capacity(bars.len() - 1);
    let mut minus_dm = Vec::with_capacity(bars.len() - 1);
    let mut tr = Vec::with_capacity(bars.len() - 1);

    for w in bars.windows(2) {
        let (prev, cur) = (&w[0], &w[1]);
        let up_move = cur.high - prev.high;
        let down_move = prev.low - cur.low;
        plus_dm.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dm.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });
        tr.push(cur.true_range(prev.close));
    }

    let s_plus = wilder_smooth(&plus_dm, length);
    let s_minus = wilder_smooth(&minus_dm, length);
    let s_tr = wilder_smooth(&tr, length);

    let dx: Vec<f64> = s_tr
        .iter()
        .zip(s_plus.iter().zip(&s_minus))
        .map(|(atr, (p, m))| {
            if *atr == 0.0 {
                return 0.0;
            }
            let plus_di = p / atr * 100.0;
            let minus_di = m / atr * 100.0;
            let sum = plus_di + minus_di;
            if sum > 0.0 {
                (plus_di - minus_di).abs() / sum * 100.0
            } else {
                0.0
            }
        })
        .collect();

    // dx[k] belongs to bar k + length; adx[k] to bar k + 2*length - 1
    for (k, value) in wilder_smooth(&dx, length).into_iter().enumerate() {
        out[k + 2 * length - 1] = Some(value);
    }

    out
}

/// Wilder smoothing: first value is the simple mean of the first `period`
/// inputs, then avg = (prev × (period − 1) + x) / period.
fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(values.len() - period + 1);
    let mut avg = values[..period].iter().sum::<f64>() / period as f64;
    out.push(avg);
    for v in &values[period..] {
        avg = (avg * (period - 1) as f64 + v) / period as f64;
        out.push(avg);
    }
    out
}
