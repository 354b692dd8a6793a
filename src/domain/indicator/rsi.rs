//! RSI (Relative Strength Index) indicator.
//!
//! Simple rolling averages of the close-to-close gains and losses over `period`
//! changes:
//!
//! RSI = 100 - (100 / (1 + avg_gain / avg_loss)), and RSI = 100 when avg_loss == 0.
//!
//! Warmup: the first `period` bars are undefined (bar 0 has no change).

pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    let mut gains = Vec::with_capacity(closes.len() - 1);
    let mut losses = Vec::with_capacity(closes.len() - 1);
    for w in closes.windows(2) {
        let change = w[1] - w[0];
        gains.push(if change > 0.0 { change } else { 0.0 });
        losses.push(if change < 0.0 { -change } else { 0.0 });
    }

    // change j sits between bar j and bar j+1
    for i in period..closes.len() {
        let window = i - period..i;
        let avg_gain = gains[window.clone()].iter().sum::<f64>() / period as f64;
        let avg_loss = losses[window].iter().sum::<f64>() / period as f64;
        let rsi = if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
        };
        out[i] = Some(rsi);
    }

    out
}
