//! End-to-end analysis: preprocess, sample, diagnose, summarize.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use super::cost::{best_single_split, CostFunction};
use super::diagnostics::{diagnose, ConvergencePolicy, Diagnostics};
use super::model::Priors;
use super::sampler::{sample, CancellationToken, SamplerConfig};
use super::summary::{
    price_chart, summarize, tau_distribution, volatility_buckets, AnalysisResult, ChartPoint,
    VolatilityBucket,
};
use crate::core::{PricePoint, PriceSeries};
use crate::error::{ChangepointError, Result};

/// Shortest segment the deterministic reference split may produce.
const REFERENCE_MIN_SEGMENT: usize = 2;

/// Settings for a full analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub sampler: SamplerConfig,
    pub priors: Priors,
    pub policy: ConvergencePolicy,
    /// Rolling window (observations) for the volatility chart buckets.
    pub volatility_window: usize,
    /// Cost used for the deterministic reference split.
    pub reference_cost: CostFunction,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            priors: Priors::default(),
            policy: ConvergencePolicy::BestEffort,
            volatility_window: 7,
            reference_cost: CostFunction::MeanVariance,
        }
    }
}

impl AnalysisConfig {
    pub fn sampler(mut self, sampler: SamplerConfig) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn priors(mut self, priors: Priors) -> Self {
        self.priors = priors;
        self
    }

    pub fn policy(mut self, policy: ConvergencePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn volatility_window(mut self, window: usize) -> Self {
        self.volatility_window = window;
        self
    }

    pub fn reference_cost(mut self, cost_fn: CostFunction) -> Self {
        self.reference_cost = cost_fn;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.sampler.validate()?;
        if self.volatility_window < 2 {
            return Err(ChangepointError::InvalidConfig(format!(
                "volatility_window must be at least 2, got {}",
                self.volatility_window
            )));
        }
        Ok(())
    }
}

/// Chart-ready series derived from the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub prices: Vec<ChartPoint>,
    pub volatility: [VolatilityBucket; 2],
}

/// Everything one analysis produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub result: AnalysisResult,
    /// Log-return index of the change point.
    pub most_probable_tau: usize,
    /// Price-series index of the change point.
    pub change_point_index: usize,
    /// Posterior probability of each drawn `tau`.
    pub tau_distribution: Vec<(usize, f64)>,
    pub diagnostics: Diagnostics,
    pub charts: ChartSeries,
}

/// Detect the most probable single change point in `prices`.
pub fn detect_change_point(prices: &PriceSeries, config: &AnalysisConfig) -> Result<AnalysisReport> {
    detect_change_point_with_cancel(prices, config, &CancellationToken::new())
}

/// Normalize raw rows and analyze them.
pub fn analyze_points(points: Vec<PricePoint>, config: &AnalysisConfig) -> Result<AnalysisReport> {
    let prices = PriceSeries::new(points)?;
    detect_change_point(&prices, config)
}

/// [`detect_change_point`] with a caller-owned cancellation signal.
///
/// Input and configuration errors are reported before any sampling starts.
pub fn detect_change_point_with_cancel(
    prices: &PriceSeries,
    config: &AnalysisConfig,
    cancel: &CancellationToken,
) -> Result<AnalysisReport> {
    let span = info_span!(
        "analysis",
        n_prices = prices.len(),
        chains = config.sampler.chains,
        draws = config.sampler.draws
    );
    let _guard = span.enter();

    config.validate()?;
    let returns = prices.log_returns()?;

    let reference_tau = best_single_split(
        returns.values(),
        config.reference_cost,
        REFERENCE_MIN_SEGMENT,
    )
    .map(|split| split.tau);
    debug!(n_obs = returns.len(), ?reference_tau, "preprocessed series");

    let run = sample(&returns, &config.priors, &config.sampler, cancel)?;

    let diagnostics = diagnose(&run, reference_tau);
    for warning in &diagnostics.warnings {
        warn!(?warning, "convergence warning");
    }
    config.policy.enforce(&diagnostics)?;

    let summary = summarize(&run.samples, prices, &returns)?;
    let result = summary.result;

    info!(
        tau = summary.most_probable_tau,
        change_point_date = %result.change_point_date,
        price_change_pct = result.price_change_pct,
        volatility_change_pct = result.volatility_change_pct,
        converged = diagnostics.converged(),
        "change point detected"
    );

    let charts = ChartSeries {
        prices: price_chart(prices, result.change_point_date),
        volatility: volatility_buckets(prices, result.change_point_date, config.volatility_window),
    };

    Ok(AnalysisReport {
        result,
        most_probable_tau: summary.most_probable_tau,
        change_point_index: summary.change_point_index,
        tau_distribution: tau_distribution(&run.samples),
        diagnostics,
        charts,
    })
}
