//! Shared numeric helpers.

pub mod stats;

pub use stats::{finite_mean, mean, median, variance};
