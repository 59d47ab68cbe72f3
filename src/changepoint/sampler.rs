//! Metropolis-within-Gibbs sampler for the two-regime change-point model.
//!
//! Each iteration makes one discrete random-walk move on `tau` followed by a
//! component-wise Gaussian random-walk Metropolis update of `mu1`, `mu2`,
//! `sigma1` and `sigma2`. Step sizes adapt towards a target acceptance rate
//! during tuning and are frozen afterwards. Chains are independent and run
//! on scoped worker threads; draws are pooled in chain order.
//!
//! # Example
//!
//! ```
//! use regime_shift::changepoint::{sample, Priors, SamplerConfig};
//! use regime_shift::changepoint::sampler::CancellationToken;
//! use regime_shift::core::PriceSeries;
//! use chrono::NaiveDate;
//!
//! let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let dates: Vec<_> = (0..30).map(|i| base + chrono::Duration::days(i)).collect();
//! let prices: Vec<f64> = (0..30).map(|i| if i < 15 { 100.0 + (i % 3) as f64 } else { 130.0 + (i % 4) as f64 * 3.0 }).collect();
//! let returns = PriceSeries::from_parts(&dates, &prices).unwrap().log_returns().unwrap();
//!
//! let config = SamplerConfig::default().draws(200).tune(100).with_seed(7);
//! let run = sample(&returns, &Priors::default(), &config, &CancellationToken::new()).unwrap();
//! assert_eq!(run.samples.len(), 2 * 200);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::model::{
    ChangePointModel, LogPosterior, Parameter, Priors, RegimeParameters, SIGMA_FLOOR,
};
use crate::core::LogReturnSeries;
use crate::error::{ChangepointError, Result, Stage};

const MIN_STEP_SIZE: f64 = 1e-7;
const MAX_STEP_SIZE: f64 = 1.0;
/// Sensitivity of the multiplicative step-size update.
const ADAPT_GAIN: f64 = 2.0;
/// Initial step size as a fraction of the prior scale.
const INITIAL_STEP_FRACTION: f64 = 0.5;
const MAX_INIT_ATTEMPTS: usize = 100;

/// Sampler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Retained draws per chain.
    pub draws: usize,
    /// Burn-in iterations per chain, discarded.
    pub tune: usize,
    /// Number of independent chains.
    pub chains: usize,
    /// Acceptance rate the continuous step sizes adapt towards.
    pub target_accept: f64,
    /// Tuning iterations between step-size updates.
    pub adapt_interval: usize,
    /// Base seed; chain `i` uses `seed + i`.
    pub seed: Option<u64>,
    /// Explicit per-chain seeds, overriding `seed`.
    pub chain_seeds: Option<Vec<u64>>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            draws: 1000,
            tune: 500,
            chains: 2,
            target_accept: 0.9,
            adapt_interval: 50,
            seed: None,
            chain_seeds: None,
        }
    }
}

impl SamplerConfig {
    pub fn draws(mut self, draws: usize) -> Self {
        self.draws = draws;
        self
    }

    pub fn tune(mut self, tune: usize) -> Self {
        self.tune = tune;
        self
    }

    pub fn chains(mut self, chains: usize) -> Self {
        self.chains = chains;
        self
    }

    pub fn target_accept(mut self, rate: f64) -> Self {
        self.target_accept = rate;
        self
    }

    pub fn adapt_interval(mut self, interval: usize) -> Self {
        self.adapt_interval = interval;
        self
    }

    /// Derive every chain's seed from one base seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Seed each chain explicitly; also sets `chains` to the number of seeds.
    pub fn with_chain_seeds(mut self, seeds: Vec<u64>) -> Self {
        self.chains = seeds.len();
        self.chain_seeds = Some(seeds);
        self
    }

    /// Check ranges before any sampling starts.
    pub fn validate(&self) -> Result<()> {
        if self.draws == 0 {
            return Err(ChangepointError::InvalidConfig("draws must be at least 1".into()));
        }
        if self.chains == 0 {
            return Err(ChangepointError::InvalidConfig("chains must be at least 1".into()));
        }
        if !(self.target_accept > 0.0 && self.target_accept < 1.0) {
            return Err(ChangepointError::InvalidConfig(format!(
                "target_accept must lie in (0, 1), got {}",
                self.target_accept
            )));
        }
        if self.adapt_interval == 0 {
            return Err(ChangepointError::InvalidConfig(
                "adapt_interval must be at least 1".into(),
            ));
        }
        if let Some(seeds) = &self.chain_seeds {
            if seeds.len() != self.chains {
                return Err(ChangepointError::InvalidConfig(format!(
                    "{} chain seeds given for {} chains",
                    seeds.len(),
                    self.chains
                )));
            }
        }
        Ok(())
    }

    /// Seed for chain `chain`, or `None` for OS entropy.
    pub fn chain_seed(&self, chain: usize) -> Option<u64> {
        match (&self.chain_seeds, self.seed) {
            (Some(seeds), _) => seeds.get(chain).copied(),
            (None, Some(base)) => Some(base.wrapping_add(chain as u64)),
            (None, None) => None,
        }
    }
}

/// Cooperative cancellation signal checked between iterations.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Accepted and proposed move counts per parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceCounts {
    pub accepted: [usize; 5],
    pub proposed: [usize; 5],
}

impl AcceptanceCounts {
    fn record(&mut self, parameter: Parameter, accepted: bool) {
        let i = parameter.index();
        self.proposed[i] += 1;
        if accepted {
            self.accepted[i] += 1;
        }
    }

    /// Acceptance rate, `None` if nothing was proposed.
    pub fn rate(&self, parameter: Parameter) -> Option<f64> {
        let i = parameter.index();
        (self.proposed[i] > 0).then(|| self.accepted[i] as f64 / self.proposed[i] as f64)
    }

    pub fn merge(&mut self, other: &AcceptanceCounts) {
        for i in 0..5 {
            self.accepted[i] += other.accepted[i];
            self.proposed[i] += other.proposed[i];
        }
    }
}

/// Mutable state of one Markov chain.
#[derive(Debug, Clone)]
pub struct ChainState {
    current: ChangePointModel,
    log_density: f64,
    step_sizes: [f64; 5],
    tau_jump: usize,
    counts: AcceptanceCounts,
    rng: StdRng,
}

impl ChainState {
    /// Draw `tau` uniformly and the regime parameters from their priors.
    pub fn initialize(posterior: &LogPosterior, priors: &Priors, mut rng: StdRng) -> Result<Self> {
        let (lower, upper) = posterior.tau_bounds();

        for _ in 0..MAX_INIT_ATTEMPTS {
            let tau = rng.gen_range(lower..=upper);
            let current = ChangePointModel {
                tau,
                regime_before: draw_regime(priors, &mut rng),
                regime_after: draw_regime(priors, &mut rng),
            };
            let log_density = posterior.log_density(&current);
            if log_density.is_finite() {
                let mut step_sizes = [0.0; 5];
                for p in Parameter::CONTINUOUS {
                    let scale = if p.is_volatility() {
                        priors.sigma_scale
                    } else {
                        priors.mu_scale
                    };
                    step_sizes[p.index()] =
                        (scale * INITIAL_STEP_FRACTION).clamp(MIN_STEP_SIZE, MAX_STEP_SIZE);
                }

                return Ok(Self {
                    current,
                    log_density,
                    step_sizes,
                    tau_jump: ((upper - lower) / 10).max(1),
                    counts: AcceptanceCounts::default(),
                    rng,
                });
            }
        }

        Err(ChangepointError::numerical(
            Stage::Initialization,
            "all",
            format!("no finite starting point in {MAX_INIT_ATTEMPTS} prior draws"),
        ))
    }

    /// Current parameter vector.
    pub fn current(&self) -> &ChangePointModel {
        &self.current
    }

    /// Log-density of the current parameter vector.
    pub fn log_density(&self) -> f64 {
        self.log_density
    }

    /// Current proposal step size of a continuous parameter.
    pub fn step_size(&self, parameter: Parameter) -> f64 {
        self.step_sizes[parameter.index()]
    }

    /// Moves counted since the last reset.
    pub fn counts(&self) -> &AcceptanceCounts {
        &self.counts
    }

    fn reset_counts(&mut self) {
        self.counts = AcceptanceCounts::default();
    }

    /// Scale each continuous step size by `exp(gain * (rate - target))`.
    fn adapt(&mut self, target_accept: f64) {
        for p in Parameter::CONTINUOUS {
            if let Some(rate) = self.counts.rate(p) {
                let i = p.index();
                let factor = (ADAPT_GAIN * (rate - target_accept)).exp();
                self.step_sizes[i] =
                    (self.step_sizes[i] * factor).clamp(MIN_STEP_SIZE, MAX_STEP_SIZE);
            }
        }
        self.reset_counts();
    }
}

fn draw_regime(priors: &Priors, rng: &mut StdRng) -> RegimeParameters {
    let z_mu: f64 = rng.sample(StandardNormal);
    let z_sigma: f64 = rng.sample(StandardNormal);
    RegimeParameters {
        mu: priors.mu_scale * z_mu,
        sigma: priors.sigma_scale * z_sigma.abs(),
    }
}

/// Mirror an out-of-range candidate back into `[lower, upper]`.
///
/// Folding about the half-integer boundaries keeps the proposal symmetric.
fn reflect(candidate: i64, lower: i64, upper: i64) -> usize {
    let folded = if candidate < lower {
        2 * lower - 1 - candidate
    } else if candidate > upper {
        2 * upper + 1 - candidate
    } else {
        candidate
    };
    folded.clamp(lower, upper) as usize
}

/// Metropolis acceptance test on log densities.
fn accept(
    current: f64,
    proposed: f64,
    rng: &mut StdRng,
    parameter: Parameter,
) -> Result<bool> {
    if proposed.is_nan() || proposed == f64::INFINITY {
        return Err(ChangepointError::numerical(
            Stage::Sampling,
            parameter.name(),
            format!("log density evaluated to {proposed}"),
        ));
    }
    if proposed == f64::NEG_INFINITY {
        return Ok(false);
    }
    let log_ratio = proposed - current;
    if log_ratio >= 0.0 {
        return Ok(true);
    }
    let u: f64 = rng.gen();
    Ok(u.ln() < log_ratio)
}

/// Advance a chain by one full sweep over all five parameters.
pub fn step(state: &mut ChainState, posterior: &LogPosterior) -> Result<()> {
    let (lower, upper) = posterior.tau_bounds();

    if upper > lower {
        let jump = state.tau_jump as i64;
        let mut delta = state.rng.gen_range(-jump..jump);
        if delta >= 0 {
            delta += 1;
        }
        let tau = reflect(state.current.tau as i64 + delta, lower as i64, upper as i64);
        let proposal = ChangePointModel { tau, ..state.current };
        let proposed = posterior.log_density(&proposal);
        let accepted = accept(state.log_density, proposed, &mut state.rng, Parameter::Tau)?;
        if accepted {
            state.current = proposal;
            state.log_density = proposed;
        }
        state.counts.record(Parameter::Tau, accepted);
    }

    for p in Parameter::CONTINUOUS {
        let z: f64 = state.rng.sample(StandardNormal);
        let value = state.current.get(p) + state.step_sizes[p.index()] * z;

        // A volatility proposal at or below the floor is rejected without
        // evaluating the density.
        if p.is_volatility() && value <= SIGMA_FLOOR {
            state.counts.record(p, false);
            continue;
        }

        let proposal = state.current.with(p, value);
        let proposed = posterior.log_density(&proposal);
        let accepted = accept(state.log_density, proposed, &mut state.rng, p)?;
        if accepted {
            state.current = proposal;
            state.log_density = proposed;
        }
        state.counts.record(p, accepted);
    }

    Ok(())
}

/// Retained draws and acceptance statistics of one chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainTrace {
    pub chain: usize,
    pub seed: Option<u64>,
    pub tau: Vec<usize>,
    pub mu1: Vec<f64>,
    pub mu2: Vec<f64>,
    pub sigma1: Vec<f64>,
    pub sigma2: Vec<f64>,
    /// Counts over the sampling phase only.
    pub acceptance: AcceptanceCounts,
    /// Step sizes frozen at the end of tuning.
    pub step_sizes: [f64; 5],
}

impl ChainTrace {
    fn with_capacity(chain: usize, seed: Option<u64>, draws: usize) -> Self {
        Self {
            chain,
            seed,
            tau: Vec::with_capacity(draws),
            mu1: Vec::with_capacity(draws),
            mu2: Vec::with_capacity(draws),
            sigma1: Vec::with_capacity(draws),
            sigma2: Vec::with_capacity(draws),
            acceptance: AcceptanceCounts::default(),
            step_sizes: [0.0; 5],
        }
    }

    fn record(&mut self, point: &ChangePointModel) {
        self.tau.push(point.tau);
        self.mu1.push(point.regime_before.mu);
        self.mu2.push(point.regime_after.mu);
        self.sigma1.push(point.regime_before.sigma);
        self.sigma2.push(point.regime_after.sigma);
    }

    pub fn len(&self) -> usize {
        self.tau.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tau.is_empty()
    }

    /// Draws of one parameter as floats.
    pub fn values(&self, parameter: Parameter) -> Vec<f64> {
        match parameter {
            Parameter::Tau => self.tau.iter().map(|&t| t as f64).collect(),
            Parameter::Mu1 => self.mu1.clone(),
            Parameter::Mu2 => self.mu2.clone(),
            Parameter::Sigma1 => self.sigma1.clone(),
            Parameter::Sigma2 => self.sigma2.clone(),
        }
    }
}

/// Post-tuning draws of all chains, concatenated in chain order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PosteriorSamples {
    pub tau: Vec<usize>,
    pub mu1: Vec<f64>,
    pub mu2: Vec<f64>,
    pub sigma1: Vec<f64>,
    pub sigma2: Vec<f64>,
}

impl PosteriorSamples {
    pub fn pool(chains: &[ChainTrace]) -> Self {
        let mut pooled = Self::default();
        for c in chains {
            pooled.tau.extend_from_slice(&c.tau);
            pooled.mu1.extend_from_slice(&c.mu1);
            pooled.mu2.extend_from_slice(&c.mu2);
            pooled.sigma1.extend_from_slice(&c.sigma1);
            pooled.sigma2.extend_from_slice(&c.sigma2);
        }
        pooled
    }

    pub fn len(&self) -> usize {
        self.tau.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tau.is_empty()
    }

    pub fn values(&self, parameter: Parameter) -> Vec<f64> {
        match parameter {
            Parameter::Tau => self.tau.iter().map(|&t| t as f64).collect(),
            Parameter::Mu1 => self.mu1.clone(),
            Parameter::Mu2 => self.mu2.clone(),
            Parameter::Sigma1 => self.sigma1.clone(),
            Parameter::Sigma2 => self.sigma2.clone(),
        }
    }
}

/// Output of a sampler run.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerRun {
    pub chains: Vec<ChainTrace>,
    pub samples: PosteriorSamples,
}

/// Run a single chain to completion.
pub fn run_chain(
    posterior: &LogPosterior,
    priors: &Priors,
    config: &SamplerConfig,
    chain: usize,
    cancel: &CancellationToken,
) -> Result<ChainTrace> {
    run_chain_inner(posterior, priors, config, chain, cancel, &CancellationToken::new())
}

/// `abort` is raised when a sibling chain fails.
fn run_chain_inner(
    posterior: &LogPosterior,
    priors: &Priors,
    config: &SamplerConfig,
    chain: usize,
    cancel: &CancellationToken,
    abort: &CancellationToken,
) -> Result<ChainTrace> {
    let seed = config.chain_seed(chain);
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut state = ChainState::initialize(posterior, priors, rng)?;
    let mut trace = ChainTrace::with_capacity(chain, seed, config.draws);
    let total = config.tune + config.draws;

    for iteration in 0..total {
        if cancel.is_cancelled() || abort.is_cancelled() {
            return Err(ChangepointError::Cancelled { chain, iteration });
        }
        if iteration == config.tune {
            state.reset_counts();
        }

        step(&mut state, posterior)?;

        if iteration < config.tune {
            if (iteration + 1) % config.adapt_interval == 0 {
                state.adapt(config.target_accept);
                trace!(
                    chain,
                    iteration,
                    mu1 = state.step_size(Parameter::Mu1),
                    mu2 = state.step_size(Parameter::Mu2),
                    sigma1 = state.step_size(Parameter::Sigma1),
                    sigma2 = state.step_size(Parameter::Sigma2),
                    "adapted step sizes"
                );
            }
        } else {
            trace.record(&state.current);
        }
    }

    trace.acceptance = state.counts;
    trace.step_sizes = state.step_sizes;

    debug!(
        chain,
        seed = ?seed,
        draws = trace.len(),
        tau_accept = ?trace.acceptance.rate(Parameter::Tau),
        mu1_accept = ?trace.acceptance.rate(Parameter::Mu1),
        sigma1_accept = ?trace.acceptance.rate(Parameter::Sigma1),
        "chain finished"
    );

    Ok(trace)
}

/// Draw posterior samples for `returns`.
///
/// Fails with `InsufficientData` before sampling if `n_obs - 1 < 1`. With
/// more than one chain the chains run on scoped threads; a failing chain
/// stops its siblings at their next iteration.
pub fn sample(
    returns: &LogReturnSeries,
    priors: &Priors,
    config: &SamplerConfig,
    cancel: &CancellationToken,
) -> Result<SamplerRun> {
    config.validate()?;
    let posterior = LogPosterior::new(returns, priors)?;

    let chains: Vec<ChainTrace> = if config.chains == 1 {
        vec![run_chain(&posterior, priors, config, 0, cancel)?]
    } else {
        let abort = CancellationToken::new();
        let results: Vec<Result<ChainTrace>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..config.chains)
                .map(|chain| {
                    let posterior = &posterior;
                    let abort = &abort;
                    scope.spawn(move || {
                        let result =
                            run_chain_inner(posterior, priors, config, chain, cancel, abort);
                        if result.is_err() {
                            abort.cancel();
                        }
                        result
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(ChangepointError::numerical(
                            Stage::Sampling,
                            "chain",
                            "worker thread panicked",
                        ))
                    })
                })
                .collect()
        });

        collect_chains(results, cancel.is_cancelled())?
    };

    let samples = PosteriorSamples::pool(&chains);
    Ok(SamplerRun { chains, samples })
}

/// Prefer the error that stopped the run over the cancellations it induced.
fn collect_chains(
    results: Vec<Result<ChainTrace>>,
    caller_cancelled: bool,
) -> Result<Vec<ChainTrace>> {
    let mut first_err = None;
    let mut chains = Vec::with_capacity(results.len());

    for result in results {
        match result {
            Ok(trace) => chains.push(trace),
            Err(err) => {
                let induced =
                    matches!(err, ChangepointError::Cancelled { .. }) && !caller_cancelled;
                match &first_err {
                    None => first_err = Some(err),
                    Some(ChangepointError::Cancelled { .. }) if !induced => first_err = Some(err),
                    Some(_) => {}
                }
            }
        }
    }

    match first_err {
        Some(err) => Err(err),
        None => Ok(chains),
    }
}
