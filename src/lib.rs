//! # regime-shift
//!
//! Bayesian single change-point detection for daily price series.
//!
//! Prices are turned into log-returns and fitted with a two-regime Gaussian
//! model whose switch index `tau` is sampled jointly with each regime's mean
//! and volatility. The posterior is reduced to the most probable change date,
//! the average price on each side and the relative change in volatility.

#![allow(clippy::needless_range_loop)]

pub mod changepoint;
pub mod core;
pub mod error;
pub mod ingest;
pub mod store;
pub mod transform;
pub mod utils;

pub use error::{ChangepointError, Result};

pub mod prelude {
    pub use crate::changepoint::{
        analyze_points, detect_change_point, AnalysisConfig, AnalysisReport, AnalysisResult,
        ConvergencePolicy, Priors, SamplerConfig,
    };
    pub use crate::core::{PricePoint, PriceSeries};
    pub use crate::error::{ChangepointError, Result};
    pub use crate::ingest::read_price_csv;
    pub use crate::store::{ResultStore, SeriesKey};
}
