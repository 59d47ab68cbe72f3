//! Error types for the regime-shift engine.

use std::fmt;

use thiserror::Error;

use crate::changepoint::diagnostics::ConvergenceWarning;

/// Result type alias for change-point operations.
pub type Result<T> = std::result::Result<T, ChangepointError>;

/// Pipeline stage in which a numerical failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preprocess,
    Initialization,
    Sampling,
    Summary,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Preprocess => "preprocess",
            Stage::Initialization => "initialization",
            Stage::Sampling => "sampling",
            Stage::Summary => "summary",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while detecting a change point.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChangepointError {
    /// Non-positive price, unparseable date or missing column.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Too few observations to admit a change point.
    #[error("insufficient data: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// The posterior summary is undefined (e.g. zero baseline volatility).
    #[error("degenerate result: {0}")]
    DegenerateResult(String),

    /// Non-finite value produced while evaluating the model.
    #[error("numerical failure during {stage} ({parameter}): {detail}")]
    Numerical {
        stage: Stage,
        parameter: String,
        detail: String,
    },

    /// A caller-supplied cancellation signal stopped a chain.
    #[error("chain {chain} cancelled at iteration {iteration}")]
    Cancelled { chain: usize, iteration: usize },

    /// Strict convergence policy rejected the run.
    #[error("sampler did not converge ({} warning(s))", .0.len())]
    NotConverged(Vec<ConvergenceWarning>),

    /// Invalid sampler or analysis configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ChangepointError {
    pub(crate) fn numerical(stage: Stage, parameter: &str, detail: impl Into<String>) -> Self {
        ChangepointError::Numerical {
            stage,
            parameter: parameter.to_string(),
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changepoint::model::Parameter;

    #[test]
    fn error_messages_are_descriptive() {
        let err = ChangepointError::InsufficientData { needed: 2, got: 1 };
        assert_eq!(err.to_string(), "insufficient data: need at least 2, got 1");

        let err = ChangepointError::InvalidInput("price must be positive".to_string());
        assert_eq!(err.to_string(), "invalid input: price must be positive");

        let err = ChangepointError::numerical(Stage::Sampling, "sigma1", "log density is NaN");
        assert_eq!(
            err.to_string(),
            "numerical failure during sampling (sigma1): log density is NaN"
        );

        let err = ChangepointError::Cancelled {
            chain: 1,
            iteration: 42,
        };
        assert_eq!(err.to_string(), "chain 1 cancelled at iteration 42");
    }

    #[test]
    fn not_converged_counts_warnings() {
        let err = ChangepointError::NotConverged(vec![ConvergenceWarning::LowAcceptance {
            parameter: Parameter::Mu1,
            rate: 0.01,
        }]);
        assert_eq!(err.to_string(), "sampler did not converge (1 warning(s))");
    }

    #[test]
    fn errors_are_clonable_and_comparable() {
        let err1 = ChangepointError::DegenerateResult("zero volatility".to_string());
        let err2 = err1.clone();
        assert_eq!(err1, err2);
    }
}
