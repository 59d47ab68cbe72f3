//! Price and log-return series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ChangepointError, Result, Stage};

/// Minimum number of log-returns that admits a change point.
pub const MIN_LOG_RETURNS: usize = 2;

/// A single dated price observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, price: f64) -> Self {
        Self { date, price }
    }
}

/// A price series with unique, strictly ascending dates and positive prices.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Normalize raw observations into a series.
    ///
    /// Rows are stably sorted by date; when a date repeats the last row wins.
    /// Fails with `InvalidInput` if any price is non-finite or not positive.
    pub fn new(mut points: Vec<PricePoint>) -> Result<Self> {
        if let Some(bad) = points.iter().find(|p| !(p.price.is_finite() && p.price > 0.0)) {
            return Err(ChangepointError::InvalidInput(format!(
                "price must be positive, got {} on {}",
                bad.price, bad.date
            )));
        }

        points.sort_by_key(|p| p.date);

        let mut deduped: Vec<PricePoint> = Vec::with_capacity(points.len());
        for point in points {
            match deduped.last_mut() {
                Some(last) if last.date == point.date => *last = point,
                _ => deduped.push(point),
            }
        }

        Ok(Self { points: deduped })
    }

    /// Build a series from parallel date and price slices.
    pub fn from_parts(dates: &[NaiveDate], prices: &[f64]) -> Result<Self> {
        if dates.len() != prices.len() {
            return Err(ChangepointError::InvalidInput(format!(
                "dates and prices differ in length: {} vs {}",
                dates.len(),
                prices.len()
            )));
        }
        Self::new(
            dates
                .iter()
                .zip(prices)
                .map(|(&date, &price)| PricePoint::new(date, price))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<&PricePoint> {
        self.points.get(index)
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }

    /// Simple returns `p[i] / p[i-1] - 1`, aligned to the price dates.
    ///
    /// The first entry is NaN.
    pub fn simple_returns(&self) -> Vec<f64> {
        std::iter::once(f64::NAN)
            .chain(self.points.windows(2).map(|w| w[1].price / w[0].price - 1.0))
            .take(self.points.len())
            .collect()
    }

    /// First difference of `ln(price)`, dropping the undefined leading element.
    ///
    /// Fails with `InsufficientData` when fewer than two returns remain.
    pub fn log_returns(&self) -> Result<LogReturnSeries> {
        let got = self.points.len().saturating_sub(1);
        if got < MIN_LOG_RETURNS {
            return Err(ChangepointError::InsufficientData {
                needed: MIN_LOG_RETURNS,
                got,
            });
        }

        let mut dates = Vec::with_capacity(got);
        let mut values = Vec::with_capacity(got);
        for w in self.points.windows(2) {
            let r = w[1].price.ln() - w[0].price.ln();
            if !r.is_finite() {
                return Err(ChangepointError::numerical(
                    Stage::Preprocess,
                    "log_return",
                    format!("non-finite log-return on {}", w[1].date),
                ));
            }
            dates.push(w[1].date);
            values.push(r);
        }

        Ok(LogReturnSeries { dates, values })
    }
}

/// Log-returns dated by the later of the two prices they span.
#[derive(Debug, Clone, PartialEq)]
pub struct LogReturnSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl LogReturnSeries {
    /// Number of observations (`n_obs`).
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Inclusive range of admissible change-point indices, `[1, n_obs - 1]`.
    pub fn tau_bounds(&self) -> (usize, usize) {
        (1, self.values.len().saturating_sub(1))
    }
}

/// Map a log-return index to the index of the price that closes it.
///
/// Return `i` spans prices `i` and `i + 1`, so the first "after" return at
/// `tau` is realised on price index `tau + 1`.
pub fn return_to_price_index(tau: usize) -> usize {
    tau + 1
}
