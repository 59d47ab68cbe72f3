//! Rolling window statistics.
//!
//! Trailing windows only: position `i` summarizes `series[i + 1 - window..=i]`
//! and the first `window - 1` positions are NaN. Windows containing a NaN
//! produce NaN, so a leading undefined return propagates one extra slot.

/// Compute rolling variance (sample variance, n-1 denominator).
pub fn rolling_var(series: &[f64], window: usize) -> Vec<f64> {
    if window < 2 {
        return vec![f64::NAN; series.len()];
    }
    rolling_apply(series, window, |s| {
        let mean = s.iter().sum::<f64>() / s.len() as f64;
        s.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (s.len() - 1) as f64
    })
}

/// Compute rolling standard deviation.
pub fn rolling_std(series: &[f64], window: usize) -> Vec<f64> {
    rolling_var(series, window).iter().map(|v| v.sqrt()).collect()
}

fn rolling_apply<F>(series: &[f64], window: usize, f: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let n = series.len();
    let mut result = vec![f64::NAN; n];
    if window == 0 || window > n {
        return result;
    }

    for i in (window - 1)..n {
        let segment = &series[i + 1 - window..=i];
        if segment.iter().all(|v| v.is_finite()) {
            result[i] = f(segment);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rolling_std_matches_sample_std() {
        let series = [1.0, 3.0, 5.0, 7.0];
        let rs = rolling_std(&series, 2);
        assert!(rs[0].is_nan());
        for v in &rs[1..] {
            assert_relative_eq!(*v, 2.0_f64.sqrt(), epsilon = 1e-12);
        }
    }

    #[test]
    fn rolling_window_larger_than_series() {
        let rs = rolling_std(&[1.0, 2.0], 7);
        assert!(rs.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn nan_in_window_propagates() {
        let rv = rolling_var(&[f64::NAN, 1.0, 2.0, 3.0], 2);
        assert!(rv[1].is_nan());
        assert_relative_eq!(rv[2], 0.5, epsilon = 1e-12);
    }
}
