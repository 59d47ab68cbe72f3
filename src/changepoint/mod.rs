//! Bayesian single change-point detection.
//!
//! A two-regime Gaussian model over log-returns with a discrete change point
//! `tau`, sampled with a hand-written Metropolis-within-Gibbs sampler and
//! reduced to before/after price and volatility estimates.
//!
//! # Components
//!
//! - **model**: priors, likelihood and the log-density evaluator
//! - **sampler**: adaptive random-walk Metropolis chains, run in parallel
//! - **diagnostics**: acceptance rates and multi-chain agreement (`r_hat`)
//! - **summary**: posterior reduction and chart series
//! - **cost**: deterministic two-segment reference split
//! - **engine**: the end-to-end pipeline
//!
//! # Example
//!
//! ```
//! use regime_shift::changepoint::{detect_change_point, AnalysisConfig, SamplerConfig};
//! use regime_shift::core::PriceSeries;
//! use chrono::NaiveDate;
//!
//! let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let dates: Vec<_> = (0..6).map(|i| base + chrono::Duration::days(i)).collect();
//! let prices = PriceSeries::from_parts(&dates, &[100.0, 102.0, 101.0, 150.0, 151.0, 149.0]).unwrap();
//!
//! let config = AnalysisConfig::default()
//!     .sampler(SamplerConfig::default().draws(500).tune(250).with_seed(42));
//! let report = detect_change_point(&prices, &config).unwrap();
//!
//! assert!(report.most_probable_tau >= 1 && report.most_probable_tau <= 4);
//! println!("{}", report.result.to_json().unwrap());
//! ```

pub mod cost;
pub mod diagnostics;
pub mod engine;
pub mod model;
pub mod sampler;
pub mod summary;

pub use cost::{best_single_split, CostFunction, SplitResult};
pub use diagnostics::{
    diagnose, r_hat, ConvergencePolicy, ConvergenceWarning, Diagnostics, ParameterDiagnostics,
};
pub use engine::{
    analyze_points, detect_change_point, detect_change_point_with_cancel, AnalysisConfig,
    AnalysisReport, ChartSeries,
};
pub use model::{ChangePointModel, LogPosterior, Parameter, Priors, RegimeParameters};
pub use sampler::{
    run_chain, sample, step, CancellationToken, ChainState, ChainTrace, PosteriorSamples,
    SamplerConfig, SamplerRun,
};
pub use summary::{
    most_probable_tau, price_chart, summarize, tau_distribution, volatility_buckets,
    AnalysisResult, ChartPoint, PosteriorSummary, VolatilityBucket, VolatilityPeriod,
};
