//! Rolling mean and standard deviation.
//!
//! Windows are trailing and include the current bar. A window value is
//! undefined until `window` inputs are available, and undefined whenever any
//! input inside the window is undefined. Standard deviation is the sample form
//! (divides by n-1) and so needs `window >= 2`.

/// Trailing mean over `window` values.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let wrapped: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
    rolling_mean_opt(&wrapped, window)
}

/// Trailing sample standard deviation over `window` values.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let wrapped: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
    rolling_with(&wrapped, window, sample_std)
}

/// Trailing mean over a series that may contain undefined points.
pub fn rolling_mean_opt(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    rolling_with(values, window, |w| Some(w.iter().sum::<f64>() / w.len() as f64))
}

fn rolling_with<F>(values: &[Option<f64>], window: usize, f: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> Option<f64>,
{
    if window == 0 {
        return vec![None; values.len()];
    }

    let mut out = Vec::with_capacity(values.len());
    let mut buf: Vec<f64> = Vec::with_capacity(window);

    for i in 0..values.len() {
        if i + 1 < window {
            out.push(None);
            continue;
        }
        buf.clear();
        let complete = values[i + 1 - window..=i].iter().all(|v| match v {
            Some(x) => {
                buf.push(*x);
                true
            }
            None => false,
        });
        out.push(if complete { f(&buf) } else { None });
    }

    out
}

fn sample_std(window: &[f64]) -> Option<f64> {
    let n = window.len();
    if n < 2 {
        return None;
    }
    let mean = window.iter().sum::<f64>() / n as f64;
    let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    Some(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mean_warmup() {
        let out = rolling_mean(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_relative_eq!(out[2].unwrap(), 2.0);
        assert_relative_eq!(out[3].unwrap(), 3.0);
    }

    #[test]
    fn std_is_sample_form() {
        // values 2,4,4,4,5,5,7,9: sample variance = 32/7
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let out = rolling_std(&values, 8);
        assert_relative_eq!(out[7].unwrap(), (32.0_f64 / 7.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn std_window_one_is_undefined() {
        let out = rolling_std(&[1.0, 2.0], 1);
        assert!(out.iter().all(|v| v.is_none()));
    }

    #[test]
    fn zero_window_is_undefined() {
        assert!(rolling_mean(&[1.0, 2.0], 0).iter().all(|v| v.is_none()));
    }

    #[test]
    fn undefined_input_poisons_window() {
        let values = [Some(1.0), None, Some(3.0), Some(5.0), Some(7.0)];
        let out = rolling_mean_opt(&values, 2);
        assert_eq!(out[1], None);
        assert_eq!(out[2], None);
        assert_relative_eq!(out[3].unwrap(), 4.0);
        assert_relative_eq!(out[4].unwrap(), 6.0);
    }

    #[test]
    fn shorter_than_window_is_all_undefined() {
        assert!(rolling_mean(&[1.0, 2.0], 5).iter().all(|v| v.is_none()));
    }
}
