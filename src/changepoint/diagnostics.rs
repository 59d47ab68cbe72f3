//! Convergence diagnostics for sampler runs.
//!
//! Two advisory checks per parameter: the pooled acceptance rate of its
//! proposals and the Gelman-Rubin potential scale reduction factor
//! (`r_hat`), which compares between-chain and within-chain variance.
//! Neither is fatal unless the caller opts into [`ConvergencePolicy::Strict`].

use serde::{Deserialize, Serialize};

use super::model::Parameter;
use super::sampler::{AcceptanceCounts, SamplerRun};
use crate::error::{ChangepointError, Result};
use crate::utils::stats::{mean, variance};

/// Continuous parameters accepting less often than this are flagged.
pub const LOW_ACCEPTANCE_THRESHOLD: f64 = 0.05;

/// Chains disagree when `r_hat` exceeds this.
pub const R_HAT_THRESHOLD: f64 = 1.1;

/// A non-fatal sign that the chains may not have converged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConvergenceWarning {
    LowAcceptance { parameter: Parameter, rate: f64 },
    PoorChainAgreement { parameter: Parameter, r_hat: f64 },
}

/// Whether convergence warnings fail the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergencePolicy {
    /// Return the result with warnings attached.
    #[default]
    BestEffort,
    /// Fail with `NotConverged` if any warning is raised.
    Strict,
}

impl ConvergencePolicy {
    pub fn enforce(&self, diagnostics: &Diagnostics) -> Result<()> {
        match self {
            ConvergencePolicy::Strict if !diagnostics.warnings.is_empty() => {
                Err(ChangepointError::NotConverged(diagnostics.warnings.clone()))
            }
            _ => Ok(()),
        }
    }
}

/// Summary statistics of one parameter across chains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDiagnostics {
    pub parameter: Parameter,
    /// Sampling-phase acceptance pooled over chains.
    pub acceptance_rate: Option<f64>,
    pub pooled_mean: f64,
    pub pooled_variance: f64,
    pub chain_means: Vec<f64>,
    /// `None` with a single chain or a single draw per chain.
    pub r_hat: Option<f64>,
}

/// Diagnostics attached to every analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub parameters: Vec<ParameterDiagnostics>,
    pub warnings: Vec<ConvergenceWarning>,
    /// Change point of the best deterministic two-segment fit, if defined.
    pub reference_tau: Option<usize>,
}

impl Diagnostics {
    pub fn converged(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn parameter(&self, parameter: Parameter) -> Option<&ParameterDiagnostics> {
        self.parameters.iter().find(|d| d.parameter == parameter)
    }
}

/// Gelman-Rubin `r_hat` for equally long chains.
pub fn r_hat(chains: &[Vec<f64>]) -> Option<f64> {
    let m = chains.len();
    let n = chains.first().map_or(0, Vec::len);
    if m < 2 || n < 2 || chains.iter().any(|c| c.len() != n) {
        return None;
    }

    let chain_means: Vec<f64> = chains.iter().map(|c| mean(c)).collect();
    let w = chains.iter().map(|c| variance(c)).sum::<f64>() / m as f64;
    let b_over_n = variance(&chain_means);

    if w <= 0.0 {
        return Some(if b_over_n <= 0.0 { 1.0 } else { f64::INFINITY });
    }

    let n_f64 = n as f64;
    let var_hat = (n_f64 - 1.0) / n_f64 * w + b_over_n;
    Some((var_hat / w).sqrt())
}

/// Compute per-parameter diagnostics and collect warnings.
pub fn diagnose(run: &SamplerRun, reference_tau: Option<usize>) -> Diagnostics {
    let mut acceptance = AcceptanceCounts::default();
    for chain in &run.chains {
        acceptance.merge(&chain.acceptance);
    }

    let mut parameters = Vec::with_capacity(Parameter::ALL.len());
    let mut warnings = Vec::new();

    for parameter in Parameter::ALL {
        let per_chain: Vec<Vec<f64>> = run.chains.iter().map(|c| c.values(parameter)).collect();
        let pooled = run.samples.values(parameter);
        let acceptance_rate = acceptance.rate(parameter);
        let r_hat = r_hat(&per_chain);

        if parameter != Parameter::Tau {
            if let Some(rate) = acceptance_rate.filter(|&r| r < LOW_ACCEPTANCE_THRESHOLD) {
                warnings.push(ConvergenceWarning::LowAcceptance { parameter, rate });
            }
        }
        if let Some(r) = r_hat.filter(|&r| r > R_HAT_THRESHOLD) {
            warnings.push(ConvergenceWarning::PoorChainAgreement {
                parameter,
                r_hat: r,
            });
        }

        parameters.push(ParameterDiagnostics {
            parameter,
            acceptance_rate,
            pooled_mean: mean(&pooled),
            pooled_variance: variance(&pooled),
            chain_means: per_chain.iter().map(|c| mean(c)).collect(),
            r_hat,
        });
    }

    Diagnostics {
        parameters,
        warnings,
        reference_tau,
    }
}
