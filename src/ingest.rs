//! CSV ingest of dated prices.
//!
//! The file must have a header row with `Date` and `Price` columns; other
//! columns are ignored. Rows may be unsorted and repeat dates, which
//! [`PriceSeries::new`] normalizes.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::StringRecord;

use crate::core::{PricePoint, PriceSeries};
use crate::error::{ChangepointError, Result};

pub const DATE_COLUMN: &str = "Date";
pub const PRICE_COLUMN: &str = "Price";

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Parse a calendar date in any of the accepted layouts.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

/// Read price rows from any CSV source.
pub fn read_price_rows<R: Read>(reader: R) -> Result<Vec<PricePoint>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| ChangepointError::InvalidInput(format!("unreadable header: {e}")))?
        .clone();
    let date_idx = column_index(&headers, DATE_COLUMN)?;
    let price_idx = column_index(&headers, PRICE_COLUMN)?;

    let mut points = Vec::new();
    for (i, record) in csv_reader.records().enumerate() {
        let line = i + 1;
        let record = record
            .map_err(|e| ChangepointError::InvalidInput(format!("row {line}: {e}")))?;

        let raw_date = record.get(date_idx).unwrap_or_default();
        let date = parse_date(raw_date).ok_or_else(|| {
            ChangepointError::InvalidInput(format!("row {line}: unparseable date {raw_date:?}"))
        })?;

        let raw_price = record.get(price_idx).unwrap_or_default();
        let price: f64 = raw_price.parse().map_err(|_| {
            ChangepointError::InvalidInput(format!("row {line}: unparseable price {raw_price:?}"))
        })?;

        points.push(PricePoint::new(date, price));
    }

    Ok(points)
}

/// Read and normalize a price series from a CSV source.
pub fn read_price_csv<R: Read>(reader: R) -> Result<PriceSeries> {
    PriceSeries::new(read_price_rows(reader)?)
}

/// Read and normalize a price series from a CSV file on disk.
pub fn read_price_csv_path(path: impl AsRef<Path>) -> Result<PriceSeries> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        ChangepointError::InvalidInput(format!("cannot open {}: {e}", path.display()))
    })?;
    read_price_csv(file)
}

fn column_index(headers: &StringRecord, name: &str) -> Result<usize> {
    headers.iter().position(|h| h == name).ok_or_else(|| {
        ChangepointError::InvalidInput(format!(
            "CSV must contain {DATE_COLUMN} and {PRICE_COLUMN} columns; missing {name}"
        ))
    })
}
