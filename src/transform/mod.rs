//! Series transformations.
//!
//! # Example
//!
//! ```
//! use regime_shift::transform::rolling_std;
//!
//! let returns = vec![0.01, -0.02, 0.015, 0.0, 0.03];
//! let vol = rolling_std(&returns, 3);
//! assert!(vol[1].is_nan());
//! assert!(vol[2] > 0.0);
//! ```

pub mod window;

pub use window::{rolling_std, rolling_var};
