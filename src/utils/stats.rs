//! Summary statistics over posterior draws and return series.
//!
//! Empty or too-short inputs yield NaN rather than an error; callers decide
//! whether that is degenerate.

/// Arithmetic mean; NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    match values.len() {
        0 => f64::NAN,
        n => values.iter().sum::<f64>() / n as f64,
    }
}

/// Mean of the finite entries of a slice, `None` if there are none.
///
/// Rolling statistics leave NaN in their warm-up positions; this skips them.
pub fn finite_mean(values: &[f64]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Unbiased sample variance (`n - 1` denominator); NaN below two values.
pub fn variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    values.iter().map(|&x| (x - m) * (x - m)).sum::<f64>() / (n - 1) as f64
}

/// Median, averaging the two middle values for even lengths.
pub fn median(values: &[f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = n / 2;
    if n % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mean_of_draws() {
        assert_relative_eq!(mean(&[0.01, -0.01, 0.03]), 0.01, epsilon = 1e-12);
        assert_relative_eq!(mean(&[7.0]), 7.0);
        assert!(mean(&[]).is_nan());
    }

    #[test]
    fn finite_mean_skips_nan() {
        assert_eq!(finite_mean(&[f64::NAN, 2.0, 4.0]), Some(3.0));
        assert_eq!(finite_mean(&[f64::NAN, f64::NAN]), None);
        assert_eq!(finite_mean(&[]), None);
    }

    #[test]
    fn variance_uses_sample_denominator() {
        assert_relative_eq!(variance(&[1.0, 2.0, 3.0, 4.0]), 5.0 / 3.0, epsilon = 1e-12);
        assert!(variance(&[1.0]).is_nan());
        assert_relative_eq!(variance(&[2.0, 4.0]), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn median_odd_and_even() {
        assert_relative_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_relative_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_relative_eq!(median(&[5.0, 5.0, 6.0, 5.0]), 5.0);
        assert!(median(&[]).is_nan());
    }
}
