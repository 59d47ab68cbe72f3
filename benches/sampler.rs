//! Benchmarks for the change-point sampler and its building blocks.

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use regime_shift::changepoint::{
    best_single_split, detect_change_point, sample, AnalysisConfig, CancellationToken,
    ChangePointModel, CostFunction, LogPosterior, Priors, RegimeParameters, SamplerConfig,
};
use regime_shift::core::PriceSeries;

fn generate_prices(n: usize) -> PriceSeries {
    let base = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let dates: Vec<_> = (0..n).map(|i| base + Duration::days(i as i64)).collect();
    let prices: Vec<f64> = (0..n)
        .map(|i| {
            let level = if i < n / 2 { 100.0 } else { 130.0 };
            level + 2.0 * (i as f64 * 0.7).sin()
        })
        .collect();
    PriceSeries::from_parts(&dates, &prices).unwrap()
}

fn bench_log_density(c: &mut Criterion) {
    let mut group = c.benchmark_group("log_density");

    for size in [64, 512, 4096].iter() {
        let returns = generate_prices(*size).log_returns().unwrap();
        let posterior = LogPosterior::new(&returns, &Priors::default()).unwrap();
        let point = ChangePointModel {
            tau: returns.len() / 2,
            regime_before: RegimeParameters { mu: 0.0, sigma: 0.02 },
            regime_after: RegimeParameters { mu: 0.001, sigma: 0.03 },
        };

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| posterior.log_density(black_box(&point)))
        });
    }

    group.finish();
}

fn bench_sampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("sample");
    group.sample_size(10);

    for size in [64, 256, 1024].iter() {
        let returns = generate_prices(*size).log_returns().unwrap();
        let config = SamplerConfig::default().draws(500).tune(250).with_seed(1);
        let cancel = CancellationToken::new();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| sample(black_box(&returns), &Priors::default(), &config, &cancel))
        });
    }

    group.finish();
}

fn bench_reference_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("best_single_split");

    for size in [256, 4096].iter() {
        let returns = generate_prices(*size).log_returns().unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| best_single_split(black_box(returns.values()), CostFunction::MeanVariance, 2))
        });
    }

    group.finish();
}

fn bench_end_to_end(c: &mut Criterion) {
    let prices = generate_prices(250);
    let config = AnalysisConfig::default()
        .sampler(SamplerConfig::default().draws(1000).tune(500).with_seed(7));

    let mut group = c.benchmark_group("detect_change_point");
    group.sample_size(10);
    group.bench_function("250_prices", |b| {
        b.iter(|| detect_change_point(black_box(&prices), &config))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_log_density,
    bench_sampling,
    bench_reference_split,
    bench_end_to_end
);
criterion_main!(benches);
