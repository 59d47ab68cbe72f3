//! Property-based tests for the change-point engine.
//!
//! These tests verify invariants that should hold for all valid inputs,
//! using randomly generated price series.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use regime_shift::changepoint::{
    best_single_split, detect_change_point, sample, AnalysisConfig, CancellationToken,
    CostFunction, LogPosterior, Priors, SamplerConfig,
};
use regime_shift::core::PriceSeries;
use regime_shift::store::SeriesKey;

fn make_series(prices: &[f64]) -> PriceSeries {
    let base = NaiveDate::from_ymd_opt(2022, 3, 1).unwrap();
    let dates: Vec<_> = (0..prices.len())
        .map(|i| base + Duration::days(i as i64))
        .collect();
    PriceSeries::from_parts(&dates, prices).unwrap()
}

/// Strategy for strictly positive prices of moderate magnitude.
fn price_strategy(min_len: usize, max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    (min_len..max_len).prop_flat_map(|len| prop::collection::vec(1.0..500.0_f64, len))
}

fn quick_sampler(seed: u64) -> SamplerConfig {
    SamplerConfig::default().draws(60).tune(40).chains(2).with_seed(seed)
}

// =============================================================================
// Property: every draw lies in the support
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(25))]

    #[test]
    fn draws_stay_in_support(prices in price_strategy(3, 40), seed in any::<u64>()) {
        let returns = make_series(&prices).log_returns().unwrap();
        let (lower, upper) = returns.tau_bounds();
        let run = sample(&returns, &Priors::default(), &quick_sampler(seed), &CancellationToken::new())
            .unwrap();

        prop_assert_eq!(run.samples.len(), 120);
        prop_assert!(run.samples.tau.iter().all(|&t| t >= lower && t <= upper));
        prop_assert!(run.samples.sigma1.iter().all(|&s| s > 0.0 && s.is_finite()));
        prop_assert!(run.samples.sigma2.iter().all(|&s| s > 0.0 && s.is_finite()));
        prop_assert!(run.samples.mu1.iter().all(|m| m.is_finite()));
        prop_assert!(run.samples.mu2.iter().all(|m| m.is_finite()));
    }
}

// =============================================================================
// Property: analysis output is well formed
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    #[test]
    fn report_is_well_formed(prices in price_strategy(3, 30), seed in any::<u64>()) {
        let series = make_series(&prices);
        let config = AnalysisConfig::default().sampler(quick_sampler(seed));
        let report = detect_change_point(&series, &config).unwrap();

        prop_assert!(report.most_probable_tau >= 1);
        prop_assert!(report.most_probable_tau <= series.len() - 2);
        prop_assert_eq!(report.change_point_index, report.most_probable_tau + 1);
        prop_assert_eq!(
            series.get(report.change_point_index).unwrap().date,
            report.result.change_point_date
        );
        prop_assert!(report.result.avg_price_before > 0.0);
        prop_assert!(report.result.avg_price_after > 0.0);
        prop_assert!(report.result.volatility_before > 0.0);
        prop_assert!(report.result.volatility_after > 0.0);
        prop_assert!(report.result.price_change_pct.is_finite());
        prop_assert!(report.result.volatility_change_pct > -100.0);

        let total: f64 = report.tau_distribution.iter().map(|(_, p)| p).sum();
        prop_assert!((total - 1.0).abs() < 1e-9);
    }
}

// =============================================================================
// Property: density and reference split
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn log_density_is_finite_inside_support(
        prices in price_strategy(3, 60),
        mu in -0.3..0.3_f64,
        sigma in 0.001..0.5_f64,
    ) {
        use regime_shift::changepoint::{ChangePointModel, RegimeParameters};

        let returns = make_series(&prices).log_returns().unwrap();
        let posterior = LogPosterior::new(&returns, &Priors::default()).unwrap();
        let (lower, upper) = posterior.tau_bounds();
        let regime = RegimeParameters { mu, sigma };

        for tau in lower..=upper {
            let point = ChangePointModel { tau, regime_before: regime, regime_after: regime };
            prop_assert!(posterior.log_density(&point).is_finite());
        }

        let outside = ChangePointModel { tau: upper + 1, regime_before: regime, regime_after: regime };
        prop_assert_eq!(posterior.log_density(&outside), f64::NEG_INFINITY);
    }

    #[test]
    fn reference_split_respects_min_segment(values in prop::collection::vec(-1.0..1.0_f64, 4..80)) {
        for cost_fn in [CostFunction::L2, CostFunction::Normal, CostFunction::MeanVariance] {
            let split = best_single_split(&values, cost_fn, 2).unwrap();
            prop_assert!(split.tau >= 2 && split.tau <= values.len() - 2);
            prop_assert!(split.gain >= -1e-6);
        }
    }

    #[test]
    fn series_key_ignores_row_order(prices in price_strategy(2, 20)) {
        let forward = make_series(&prices);
        let mut points = forward.points().to_vec();
        points.reverse();
        let shuffled = PriceSeries::new(points).unwrap();
        prop_assert_eq!(SeriesKey::of(&forward), SeriesKey::of(&shuffled));
    }
}
