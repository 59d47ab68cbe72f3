//! Core data structures: price series and their log-returns.

mod price_series;

pub use price_series::{
    return_to_price_index, LogReturnSeries, PricePoint, PriceSeries, MIN_LOG_RETURNS,
};
