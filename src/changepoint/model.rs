//! Two-regime Gaussian change-point model over log-returns.
//!
//! ```text
//! tau          ~ DiscreteUniform(1, n_obs - 1)
//! mu1, mu2     ~ Normal(0, mu_scale)
//! sigma1, sigma2 ~ HalfNormal(sigma_scale)
//! r[i]         ~ Normal(mu1, sigma1)  if i < tau
//!                Normal(mu2, sigma2)  otherwise
//! ```
//!
//! The log-density is evaluated in O(1) per call from prefix sums of the
//! returns and their squares, the same trick the segment costs use.

use std::f64::consts::{LN_2, PI};
use std::fmt;

use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Normal};

use crate::core::LogReturnSeries;
use crate::error::{ChangepointError, Result};

/// Volatilities at or below this value have zero density.
pub const SIGMA_FLOOR: f64 = 1e-8;

/// Prior scales for the regime parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Priors {
    /// Standard deviation of the Normal prior on each regime mean.
    pub mu_scale: f64,
    /// Scale of the HalfNormal prior on each regime volatility.
    pub sigma_scale: f64,
}

impl Default for Priors {
    fn default() -> Self {
        Self {
            mu_scale: 0.1,
            sigma_scale: 0.1,
        }
    }
}

impl Priors {
    pub fn mu_scale(mut self, scale: f64) -> Self {
        self.mu_scale = scale;
        self
    }

    pub fn sigma_scale(mut self, scale: f64) -> Self {
        self.sigma_scale = scale;
        self
    }
}

/// Mean and standard deviation of log-returns within one regime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeParameters {
    pub mu: f64,
    pub sigma: f64,
}

/// One of the five sampled quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parameter {
    Tau,
    Mu1,
    Mu2,
    Sigma1,
    Sigma2,
}

impl Parameter {
    pub const ALL: [Parameter; 5] = [
        Parameter::Tau,
        Parameter::Mu1,
        Parameter::Mu2,
        Parameter::Sigma1,
        Parameter::Sigma2,
    ];

    /// Parameters updated by component-wise Gaussian random walks.
    pub const CONTINUOUS: [Parameter; 4] = [
        Parameter::Mu1,
        Parameter::Mu2,
        Parameter::Sigma1,
        Parameter::Sigma2,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Parameter::Tau => "tau",
            Parameter::Mu1 => "mu1",
            Parameter::Mu2 => "mu2",
            Parameter::Sigma1 => "sigma1",
            Parameter::Sigma2 => "sigma2",
        }
    }

    pub fn is_volatility(self) -> bool {
        matches!(self, Parameter::Sigma1 | Parameter::Sigma2)
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A point in parameter space: change point plus both regimes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChangePointModel {
    pub tau: usize,
    pub regime_before: RegimeParameters,
    pub regime_after: RegimeParameters,
}

impl ChangePointModel {
    /// Value of a continuous parameter.
    ///
    /// `Parameter::Tau` is returned as a float.
    pub fn get(&self, parameter: Parameter) -> f64 {
        match parameter {
            Parameter::Tau => self.tau as f64,
            Parameter::Mu1 => self.regime_before.mu,
            Parameter::Mu2 => self.regime_after.mu,
            Parameter::Sigma1 => self.regime_before.sigma,
            Parameter::Sigma2 => self.regime_after.sigma,
        }
    }

    /// Copy of `self` with one continuous parameter replaced.
    ///
    /// Setting `Parameter::Tau` this way is a no-op; assign `tau` directly.
    pub fn with(mut self, parameter: Parameter, value: f64) -> Self {
        match parameter {
            Parameter::Tau => {}
            Parameter::Mu1 => self.regime_before.mu = value,
            Parameter::Mu2 => self.regime_after.mu = value,
            Parameter::Sigma1 => self.regime_before.sigma = value,
            Parameter::Sigma2 => self.regime_after.sigma = value,
        }
        self
    }
}

/// Log posterior density (up to a constant) for a given return series.
#[derive(Debug, Clone)]
pub struct LogPosterior {
    cum_sum: Vec<f64>,
    cum_sum_sq: Vec<f64>,
    mu_prior: Normal,
    sigma_prior: Normal,
    log_tau_prior: f64,
}

impl LogPosterior {
    /// Precompute prefix sums for `returns`.
    ///
    /// Fails with `InsufficientData` if `n_obs - 1 < 1`.
    pub fn new(returns: &LogReturnSeries, priors: &Priors) -> Result<Self> {
        let values = returns.values();
        let n_obs = values.len();
        if n_obs < 2 {
            return Err(ChangepointError::InsufficientData {
                needed: 2,
                got: n_obs,
            });
        }

        let mu_prior = Normal::new(0.0, priors.mu_scale).map_err(|e| {
            ChangepointError::InvalidConfig(format!("mu prior scale {}: {e}", priors.mu_scale))
        })?;
        let sigma_prior = Normal::new(0.0, priors.sigma_scale).map_err(|e| {
            ChangepointError::InvalidConfig(format!(
                "sigma prior scale {}: {e}",
                priors.sigma_scale
            ))
        })?;

        let cum_sum: Vec<f64> = std::iter::once(0.0)
            .chain(values.iter().scan(0.0, |acc, &x| {
                *acc += x;
                Some(*acc)
            }))
            .collect();

        let cum_sum_sq: Vec<f64> = std::iter::once(0.0)
            .chain(values.iter().scan(0.0, |acc, &x| {
                *acc += x * x;
                Some(*acc)
            }))
            .collect();

        Ok(Self {
            cum_sum,
            cum_sum_sq,
            mu_prior,
            sigma_prior,
            log_tau_prior: -((n_obs - 1) as f64).ln(),
        })
    }

    /// Number of observations.
    pub fn n_obs(&self) -> usize {
        self.cum_sum.len() - 1
    }

    /// Inclusive admissible range of `tau`.
    pub fn tau_bounds(&self) -> (usize, usize) {
        (1, self.n_obs() - 1)
    }

    /// `logDensity(tau, mu1, mu2, sigma1, sigma2 | returns)`.
    ///
    /// Returns negative infinity outside the support (tau out of range or a
    /// volatility at or below [`SIGMA_FLOOR`]).
    pub fn log_density(&self, point: &ChangePointModel) -> f64 {
        let (lower, upper) = self.tau_bounds();
        if point.tau < lower || point.tau > upper {
            return f64::NEG_INFINITY;
        }

        let before = &point.regime_before;
        let after = &point.regime_after;

        let log_prior = self.log_tau_prior
            + self.mu_prior.ln_pdf(before.mu)
            + self.mu_prior.ln_pdf(after.mu)
            + self.log_sigma_prior(before.sigma)
            + self.log_sigma_prior(after.sigma);
        if log_prior == f64::NEG_INFINITY {
            return log_prior;
        }

        log_prior
            + self.segment_log_likelihood(0, point.tau, before)
            + self.segment_log_likelihood(point.tau, self.n_obs(), after)
    }

    fn log_sigma_prior(&self, sigma: f64) -> f64 {
        if sigma <= SIGMA_FLOOR {
            return f64::NEG_INFINITY;
        }
        LN_2 + self.sigma_prior.ln_pdf(sigma)
    }

    /// Gaussian log-likelihood of `returns[start..end]` under one regime.
    fn segment_log_likelihood(&self, start: usize, end: usize, regime: &RegimeParameters) -> f64 {
        let k = (end - start) as f64;
        if k == 0.0 {
            return 0.0;
        }
        if regime.sigma <= SIGMA_FLOOR {
            return f64::NEG_INFINITY;
        }

        let sum = self.cum_sum[end] - self.cum_sum[start];
        let sum_sq = self.cum_sum_sq[end] - self.cum_sum_sq[start];
        let mean = sum / k;
        // Centered form keeps the residual sum of squares non-negative.
        let within = (sum_sq - sum * mean).max(0.0);
        let rss = within + k * (mean - regime.mu).powi(2);

        let var = regime.sigma * regime.sigma;
        -k * (regime.sigma.ln() + 0.5 * (2.0 * PI).ln()) - rss / (2.0 * var)
    }
}
