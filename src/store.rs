//! Caller-owned store of finished analyses, keyed by series content.
//!
//! The engine keeps no state between calls. Callers that want to reuse
//! results own a [`ResultStore`] and decide when entries leave it.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::changepoint::AnalysisReport;
use crate::core::PriceSeries;
use crate::error::Result;

/// Hex SHA-256 over the normalized `(date, price)` rows of a series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesKey(String);

impl SeriesKey {
    pub fn of(series: &PriceSeries) -> Self {
        let mut hasher = Sha256::new();
        for point in series.points() {
            hasher.update(point.date.format("%Y-%m-%d").to_string().as_bytes());
            hasher.update(point.price.to_bits().to_le_bytes());
        }
        let hex = hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<String>();
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// In-memory map from series content to its analysis report.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    entries: HashMap<SeriesKey, AnalysisReport>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a report, returning the one it replaced.
    pub fn insert(&mut self, key: SeriesKey, report: AnalysisReport) -> Option<AnalysisReport> {
        self.entries.insert(key, report)
    }

    pub fn get(&self, key: &SeriesKey) -> Option<&AnalysisReport> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &SeriesKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn evict(&mut self, key: &SeriesKey) -> Option<AnalysisReport> {
        self.entries.remove(key)
    }

    /// Keep only the entries for which `keep` returns true.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&SeriesKey, &AnalysisReport) -> bool,
    {
        self.entries.retain(|k, v| keep(k, v));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &SeriesKey> {
        self.entries.keys()
    }

    /// Return the stored report for `series`, computing and storing it on a miss.
    ///
    /// A failing `analyze` leaves the store unchanged.
    pub fn get_or_insert_with<F>(
        &mut self,
        series: &PriceSeries,
        analyze: F,
    ) -> Result<&AnalysisReport>
    where
        F: FnOnce(&PriceSeries) -> Result<AnalysisReport>,
    {
        let key = SeriesKey::of(series);
        if !self.entries.contains_key(&key) {
            let report = analyze(series)?;
            self.entries.insert(key.clone(), report);
        }
        Ok(&self.entries[&key])
    }
}
