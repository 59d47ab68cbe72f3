//! Segment cost functions and the exhaustive single-split scan.
//!
//! Cost functions evaluate the "cost" of fitting one regime to a segment of
//! data. Lower cost indicates a better fit. The scan gives a deterministic
//! maximum-likelihood reference for `tau` that the sampler's posterior
//! median can be compared against.

use serde::{Deserialize, Serialize};

/// Variances are floored here so constant segments keep a finite cost.
const VARIANCE_FLOOR: f64 = 1e-12;

/// Cost function type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CostFunction {
    /// Sum of squared deviations from the segment mean (mean shifts only).
    L2,
    /// `n * ln(variance)`: variance shifts around a common level.
    Normal,
    /// `n * (1 + ln(variance))` with the segment's own mean: joint shifts.
    #[default]
    MeanVariance,
}

/// Compute the cost of a segment using the specified cost function.
pub fn segment_cost(segment: &[f64], cost_fn: CostFunction) -> f64 {
    match cost_fn {
        CostFunction::L2 => l2_cost(segment),
        CostFunction::Normal => normal_cost(segment),
        CostFunction::MeanVariance => mean_variance_cost(segment),
    }
}

/// L2 cost: sum of squared deviations from mean.
pub fn l2_cost(segment: &[f64]) -> f64 {
    if segment.is_empty() {
        return 0.0;
    }

    let mean = segment.iter().sum::<f64>() / segment.len() as f64;
    segment.iter().map(|x| (x - mean).powi(2)).sum()
}

/// Normal (Gaussian) cost: `n * ln(variance)`, ignoring constant terms.
pub fn normal_cost(segment: &[f64]) -> f64 {
    let n = segment.len();
    if n == 0 {
        return 0.0;
    }

    let variance = l2_cost(segment) / n as f64;
    n as f64 * variance.max(VARIANCE_FLOOR).ln()
}

/// Mean-variance cost: `-2 log L` of a Gaussian with fitted mean and variance,
/// constants dropped.
pub fn mean_variance_cost(segment: &[f64]) -> f64 {
    let n = segment.len();
    if n == 0 {
        return 0.0;
    }

    let variance = l2_cost(segment) / n as f64;
    n as f64 * (1.0 + variance.max(VARIANCE_FLOOR).ln())
}

/// Best split of a series into two regimes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitResult {
    /// First index of the second regime.
    pub tau: usize,
    /// Combined cost of both segments.
    pub cost: f64,
    /// Cost of the unsplit series minus `cost`.
    pub gain: f64,
}

/// Scan every admissible split and return the cheapest.
///
/// Both segments must hold at least `min_segment_length` observations;
/// returns `None` when no split satisfies that.
pub fn best_single_split(
    series: &[f64],
    cost_fn: CostFunction,
    min_segment_length: usize,
) -> Option<SplitResult> {
    let n = series.len();
    let min_len = min_segment_length.max(1);
    if n < 2 * min_len {
        return None;
    }

    let sums = SegmentSums::new(series);
    let whole = sums.cost(0, n, cost_fn);

    (min_len..=n - min_len)
        .map(|tau| (tau, sums.cost(0, tau, cost_fn) + sums.cost(tau, n, cost_fn)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(tau, cost)| SplitResult {
            tau,
            cost,
            gain: whole - cost,
        })
}

/// Prefix sums for O(1) segment costs.
struct SegmentSums {
    cum_sum: Vec<f64>,
    cum_sum_sq: Vec<f64>,
}

impl SegmentSums {
    fn new(series: &[f64]) -> Self {
        let cum_sum = std::iter::once(0.0)
            .chain(series.iter().scan(0.0, |acc, &x| {
                *acc += x;
                Some(*acc)
            }))
            .collect();
        let cum_sum_sq = std::iter::once(0.0)
            .chain(series.iter().scan(0.0, |acc, &x| {
                *acc += x * x;
                Some(*acc)
            }))
            .collect();
        Self {
            cum_sum,
            cum_sum_sq,
        }
    }

    fn cost(&self, start: usize, end: usize, cost_fn: CostFunction) -> f64 {
        let n = end - start;
        if n == 0 {
            return 0.0;
        }

        // L2 cost = sum(x^2) - n*mean^2
        let sum = self.cum_sum[end] - self.cum_sum[start];
        let sum_sq = self.cum_sum_sq[end] - self.cum_sum_sq[start];
        let n_f64 = n as f64;
        let l2 = (sum_sq - sum * sum / n_f64).max(0.0);

        match cost_fn {
            CostFunction::L2 => l2,
            CostFunction::Normal => n_f64 * (l2 / n_f64).max(VARIANCE_FLOOR).ln(),
            CostFunction::MeanVariance => {
                n_f64 * (1.0 + (l2 / n_f64).max(VARIANCE_FLOOR).ln())
            }
        }
    }
}
