//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), seeded with the first available value, then
//! EMA[i] = C[i]*k + EMA[i-1]*(1-k). The recursion runs from the first bar but
//! values are only reported once `period` inputs have been seen.

pub fn calculate_ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut ema: Option<f64> = None;

    for (i, &value) in values.iter().enumerate() {
        let next = match ema {
            None => value,
            Some(prev) => value * k + prev * (1.0 - k),
        };
        ema = Some(next);
        out.push(if i + 1 >= period { ema } else { None });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ema_seeded_from_first_value() {
        let out = calculate_ema(&[10.0, 10.0, 10.0], 3);
        assert_relative_eq!(out[2].unwrap(), 10.0);
    }

    #[test]
    fn ema_undefined_before_period() {
        let out = calculate_ema(&[10.0, 20.0, 30.0], 3);
        assert!(out[0].is_none());
        assert!(out[1].is_none());
        assert!(out[2].is_some());
        assert!(calculate_ema(&[1.0, 2.0], 5).iter().all(Option::is_none));
    }

    #[test]
    fn ema_recursive_calculation() {
        let out = calculate_ema(&[10.0, 20.0, 30.0, 40.0], 3);
        let k = 2.0 / 4.0;
        let e1 = 20.0 * k + 10.0 * (1.0 - k);
        let e2 = 30.0 * k + e1 * (1.0 - k);
        let e3 = 40.0 * k + e2 * (1.0 - k);
        assert!(out[1].is_none());
        assert_relative_eq!(out[2].unwrap(), e2);
        assert_relative_eq!(out[3].unwrap(), e3);
    }

    #[test]
    fn ema_period_1_tracks_input() {
        let out = calculate_ema(&[10.0, 20.0, 30.0], 1);
        assert_relative_eq!(out[2].unwrap(), 30.0);
    }

    #[test]
    fn ema_equal_prices() {
        let out = calculate_ema(&[100.0; 5], 3);
        for v in out.into_iter().flatten() {
            assert_relative_eq!(v, 100.0);
        }
    }

    #[test]
    fn ema_empty_and_zero_period() {
        assert!(calculate_ema(&[], 3).is_empty());
        assert!(calculate_ema(&[1.0, 2.0], 0).iter().all(|v| v.is_none()));
    }

    #[test]
    fn ema_fast_reacts_more_than_slow() {
        let mut prices = vec![100.0; 20];
        prices.extend([110.0; 5]);
        let fast = calculate_ema(&prices, 3);
        let slow = calculate_ema(&prices, 10);
        assert!(fast[24].unwrap() > slow[24].unwrap());
    }
}
