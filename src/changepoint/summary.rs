//! Reduction of posterior draws to point estimates and chart series.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::model::Parameter;
use super::sampler::PosteriorSamples;
use crate::core::{return_to_price_index, LogReturnSeries, PriceSeries};
use crate::error::{ChangepointError, Result, Stage};
use crate::transform::rolling_std;
use crate::utils::stats::{finite_mean, mean, median};

/// Baseline volatilities at or below this make percentage changes undefined.
const DEGENERATE_VOLATILITY: f64 = 1e-12;

/// Outcome of one completed analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub change_point_date: NaiveDate,
    pub avg_price_before: f64,
    pub avg_price_after: f64,
    pub price_change_pct: f64,
    pub volatility_before: f64,
    pub volatility_after: f64,
    pub volatility_change_pct: f64,
}

impl AnalysisResult {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ChangepointError::InvalidInput(format!("serialize result: {e}")))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ChangepointError::InvalidInput(format!("parse result: {e}")))
    }
}

/// Point estimates derived from the posterior.
#[derive(Debug, Clone, PartialEq)]
pub struct PosteriorSummary {
    /// Rounded median of the pooled `tau` draws (log-return index).
    pub most_probable_tau: usize,
    /// `most_probable_tau` mapped into the price series.
    pub change_point_index: usize,
    pub result: AnalysisResult,
}

/// Median of the pooled `tau` draws, rounded and clamped to `[1, n_obs - 1]`.
pub fn most_probable_tau(samples: &PosteriorSamples, returns: &LogReturnSeries) -> Result<usize> {
    if samples.is_empty() {
        return Err(ChangepointError::DegenerateResult("no posterior draws".into()));
    }
    let (lower, upper) = returns.tau_bounds();
    let m = median(&samples.values(Parameter::Tau)).round();
    Ok((m as usize).clamp(lower, upper))
}

/// Posterior probability of each `tau` value that was drawn.
pub fn tau_distribution(samples: &PosteriorSamples) -> Vec<(usize, f64)> {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for &tau in &samples.tau {
        *counts.entry(tau).or_default() += 1;
    }
    let total = samples.len() as f64;
    counts
        .into_iter()
        .map(|(tau, count)| (tau, count as f64 / total))
        .collect()
}

/// Reduce posterior draws to an [`AnalysisResult`].
///
/// Average prices combine the raw mean price on each side of the change
/// point with the posterior mean log-return of that regime:
/// `exp(ln(mean(price)) + mean(mu))`. "Before" spans prices `1..=tau`,
/// "after" spans `tau + 1..`.
pub fn summarize(
    samples: &PosteriorSamples,
    prices: &PriceSeries,
    returns: &LogReturnSeries,
) -> Result<PosteriorSummary> {
    let tau = most_probable_tau(samples, returns)?;
    let change_point_index = return_to_price_index(tau);
    let change_point_date = prices
        .get(change_point_index)
        .map(|p| p.date)
        .ok_or_else(|| {
            ChangepointError::numerical(
                Stage::Summary,
                "tau",
                format!("price index {change_point_index} out of range {}", prices.len()),
            )
        })?;

    // The first price has no log-return, so neither regime covers it.
    let raw = prices.prices();
    let before = &raw[1..change_point_index];
    let after = &raw[change_point_index..];

    let avg_price_before = regime_adjusted_price(before, &samples.mu1, "mu1")?;
    let avg_price_after = regime_adjusted_price(after, &samples.mu2, "mu2")?;
    let price_change_pct = (avg_price_after - avg_price_before) / avg_price_before * 100.0;

    let volatility_before = finite_or_err(mean(&samples.sigma1), "sigma1")?;
    let volatility_after = finite_or_err(mean(&samples.sigma2), "sigma2")?;
    if volatility_before.abs() <= DEGENERATE_VOLATILITY {
        return Err(ChangepointError::DegenerateResult(format!(
            "baseline volatility {volatility_before} is numerically zero"
        )));
    }
    let volatility_change_pct = (volatility_after - volatility_before) / volatility_before * 100.0;

    Ok(PosteriorSummary {
        most_probable_tau: tau,
        change_point_index,
        result: AnalysisResult {
            change_point_date,
            avg_price_before,
            avg_price_after,
            price_change_pct,
            volatility_before,
            volatility_after,
            volatility_change_pct,
        },
    })
}

fn regime_adjusted_price(prices: &[f64], mu_draws: &[f64], parameter: &str) -> Result<f64> {
    let value = (mean(prices).ln() + mean(mu_draws)).exp();
    finite_or_err(value, parameter)
}

fn finite_or_err(value: f64, parameter: &str) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ChangepointError::numerical(
            Stage::Summary,
            parameter,
            format!("posterior summary evaluated to {value}"),
        ))
    }
}

/// One point of the price chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub price: f64,
    #[serde(rename = "isChangePoint")]
    pub is_change_point: bool,
}

/// Side of the change point a volatility bucket covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolatilityPeriod {
    #[serde(rename = "Before Change Point")]
    Before,
    #[serde(rename = "After Change Point")]
    After,
}

/// Mean rolling volatility on one side of the change point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityBucket {
    pub period: VolatilityPeriod,
    /// `None` when the side is shorter than the rolling window.
    pub volatility: Option<f64>,
}

/// Price series with the change-point date flagged.
pub fn price_chart(prices: &PriceSeries, change_point_date: NaiveDate) -> Vec<ChartPoint> {
    prices
        .points()
        .iter()
        .map(|p| ChartPoint {
            date: p.date,
            price: p.price,
            is_change_point: p.date == change_point_date,
        })
        .collect()
}

/// Mean of the rolling standard deviation of simple returns, split at
/// `change_point_date` (the change-point date itself counts as "after").
pub fn volatility_buckets(
    prices: &PriceSeries,
    change_point_date: NaiveDate,
    window: usize,
) -> [VolatilityBucket; 2] {
    let rolling = rolling_std(&prices.simple_returns(), window);

    let (before, after): (Vec<(NaiveDate, f64)>, Vec<(NaiveDate, f64)>) = prices
        .points()
        .iter()
        .map(|p| p.date)
        .zip(rolling)
        .partition(|(date, _)| *date < change_point_date);

    let bucket_mean = |side: &[(NaiveDate, f64)]| {
        finite_mean(&side.iter().map(|&(_, v)| v).collect::<Vec<_>>())
    };

    [
        VolatilityBucket {
            period: VolatilityPeriod::Before,
            volatility: bucket_mean(&before),
        },
        VolatilityBucket {
            period: VolatilityPeriod::After,
            volatility: bucket_mean(&after),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn scenario() -> (PriceSeries, LogReturnSeries) {
        let dates: Vec<_> = (1..=6).map(day).collect();
        let prices =
            PriceSeries::from_parts(&dates, &[100.0, 102.0, 101.0, 150.0, 151.0, 149.0]).unwrap();
        let returns = prices.log_returns().unwrap();
        (prices, returns)
    }

    fn samples(tau: &[usize], mu: (f64, f64), sigma: (f64, f64)) -> PosteriorSamples {
        let n = tau.len();
        PosteriorSamples {
            tau: tau.to_vec(),
            mu1: vec![mu.0; n],
            mu2: vec![mu.1; n],
            sigma1: vec![sigma.0; n],
            sigma2: vec![sigma.1; n],
        }
    }

    #[test]
    fn summary_uses_mapped_date_and_split() {
        let (prices, returns) = scenario();
        let s = samples(&[2, 2, 2, 3, 1], (0.0, 0.0), (0.01, 0.02));
        let summary = summarize(&s, &prices, &returns).unwrap();

        assert_eq!(summary.most_probable_tau, 2);
        assert_eq!(summary.change_point_index, 3);
        assert_eq!(summary.result.change_point_date, day(4));
        // prices 1..=2 are [102, 101]; the leading 100 has no return
        assert_relative_eq!(summary.result.avg_price_before, 101.5, epsilon = 1e-9);
        assert_relative_eq!(summary.result.avg_price_after, 150.0, epsilon = 1e-9);
        assert_relative_eq!(
            summary.result.price_change_pct,
            (150.0 - 101.5) / 101.5 * 100.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(summary.result.volatility_change_pct, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn regime_mean_shifts_average_price() {
        let (prices, returns) = scenario();
        let s = samples(&[2], (0.1, -0.1), (0.01, 0.01));
        let r = summarize(&s, &prices, &returns).unwrap().result;
        assert_relative_eq!(r.avg_price_before, 101.5 * 0.1_f64.exp(), epsilon = 1e-9);
        assert_relative_eq!(r.avg_price_after, 150.0 * (-0.1_f64).exp(), epsilon = 1e-9);
    }

    #[test]
    fn first_price_is_outside_both_regimes() {
        let dates: Vec<_> = (1..=5).map(day).collect();
        let prices = PriceSeries::from_parts(&dates, &[1000.0, 10.0, 20.0, 50.0, 70.0]).unwrap();
        let returns = prices.log_returns().unwrap();
        let r = summarize(&samples(&[2], (0.0, 0.0), (0.1, 0.1)), &prices, &returns)
            .unwrap()
            .result;

        assert_relative_eq!(r.avg_price_before, 15.0, epsilon = 1e-9);
        assert_relative_eq!(r.avg_price_after, 60.0, epsilon = 1e-9);
        assert_relative_eq!(r.price_change_pct, 300.0, epsilon = 1e-9);
    }

    #[test]
    fn median_rounds_and_clamps() {
        let (_, returns) = scenario();
        // median of [2, 3] = 2.5 -> rounds to 3
        assert_eq!(most_probable_tau(&samples(&[2, 3], (0.0, 0.0), (0.1, 0.1)), &returns).unwrap(), 3);
        // out-of-range draws are clamped into [1, 4]
        assert_eq!(most_probable_tau(&samples(&[9, 9], (0.0, 0.0), (0.1, 0.1)), &returns).unwrap(), 4);
    }

    #[test]
    fn zero_baseline_volatility_is_degenerate() {
        let (prices, returns) = scenario();
        let s = samples(&[2], (0.0, 0.0), (0.0, 0.1));
        assert!(matches!(
            summarize(&s, &prices, &returns),
            Err(ChangepointError::DegenerateResult(_))
        ));
    }

    #[test]
    fn empty_samples_are_degenerate() {
        let (prices, returns) = scenario();
        assert!(matches!(
            summarize(&PosteriorSamples::default(), &prices, &returns),
            Err(ChangepointError::DegenerateResult(_))
        ));
    }

    #[test]
    fn tau_distribution_sums_to_one() {
        let dist = tau_distribution(&samples(&[1, 2, 2, 3], (0.0, 0.0), (0.1, 0.1)));
        assert_eq!(dist, vec![(1, 0.25), (2, 0.5), (3, 0.25)]);
    }

    #[test]
    fn chart_flags_change_point() {
        let (prices, _) = scenario();
        let chart = price_chart(&prices, day(4));
        assert_eq!(chart.len(), 6);
        assert_eq!(chart.iter().filter(|p| p.is_change_point).count(), 1);
        assert!(chart[3].is_change_point);

        let json = serde_json::to_string(&chart[3]).unwrap();
        assert_eq!(json, r#"{"date":"2024-01-04","price":150.0,"isChangePoint":true}"#);
    }

    #[test]
    fn volatility_buckets_split_at_date() {
        let dates: Vec<_> = (1..=20).map(day).collect();
        let prices: Vec<f64> = (0..20)
            .map(|i| {
                if i < 10 {
                    100.0 + (i % 2) as f64
                } else {
                    100.0 + (i % 2) as f64 * 20.0
                }
            })
            .collect();
        let series = PriceSeries::from_parts(&dates, &prices).unwrap();
        let buckets = volatility_buckets(&series, day(11), 3);

        assert_eq!(buckets[0].period, VolatilityPeriod::Before);
        assert_eq!(buckets[1].period, VolatilityPeriod::After);
        let before = buckets[0].volatility.unwrap();
        let after = buckets[1].volatility.unwrap();
        assert!(after > before);

        let json = serde_json::to_string(&buckets[0]).unwrap();
        assert!(json.starts_with(r#"{"period":"Before Change Point","volatility":"#));
    }

    #[test]
    fn short_side_has_no_volatility() {
        let (prices, _) = scenario();
        let buckets = volatility_buckets(&prices, day(4), 7);
        assert_eq!(buckets[0].volatility, None);
        assert_eq!(buckets[1].volatility, None);
    }

    #[test]
    fn result_json_round_trip() {
        let result = AnalysisResult {
            change_point_date: day(4),
            avg_price_before: 101.123456789,
            avg_price_after: 150.987654321,
            price_change_pct: 49.31,
            volatility_before: 0.0123,
            volatility_after: 0.2345,
            volatility_change_pct: 1806.5,
        };
        let json = result.to_json().unwrap();
        assert!(json.contains(r#""change_point_date":"2024-01-04""#));
        assert_eq!(AnalysisResult::from_json(&json).unwrap(), result);
    }
}
