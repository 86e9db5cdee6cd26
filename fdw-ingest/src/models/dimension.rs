//! Dimension key snapshots
//!
//! A snapshot is taken once per load attempt and never mutated, so every
//! record of a run is validated against the same keys even if a dimension
//! changes concurrently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::loader::DimensionLookup;

/// Referenced dimension tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Carrier,
    Airport,
    Date,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Carrier => "carrier",
            Dimension::Airport => "airport",
            Dimension::Date => "date",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable set of valid primary keys for one dimension
#[derive(Debug, Clone, Default)]
pub struct DimensionKeySet {
    keys: Arc<HashSet<String>>,
}

impl DimensionKeySet {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: Arc::new(keys.into_iter().map(Into::into).collect()),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl From<HashSet<String>> for DimensionKeySet {
    fn from(keys: HashSet<String>) -> Self {
        Self { keys: Arc::new(keys) }
    }
}

/// Keys of every referenced dimension as of one point in time
#[derive(Debug, Clone)]
pub struct DimensionSnapshot {
    pub carriers: DimensionKeySet,
    pub airports: DimensionKeySet,
    pub dates: DimensionKeySet,
    pub taken_at: DateTime<Utc>,
}

impl DimensionSnapshot {
    pub fn new(carriers: DimensionKeySet, airports: DimensionKeySet, dates: DimensionKeySet) -> Self {
        Self {
            carriers,
            airports,
            dates,
            taken_at: fdw_common::time::now(),
        }
    }

    /// Query the lookup once per dimension
    pub async fn capture(lookup: &dyn DimensionLookup) -> fdw_common::Result<Self> {
        let carriers = lookup.keys_for(Dimension::Carrier).await?;
        let airports = lookup.keys_for(Dimension::Airport).await?;
        let dates = lookup.keys_for(Dimension::Date).await?;

        let snapshot = Self::new(carriers.into(), airports.into(), dates.into());
        tracing::debug!(
            carriers = snapshot.carriers.len(),
            airports = snapshot.airports.len(),
            dates = snapshot.dates.len(),
            "Captured dimension snapshot"
        );
        Ok(snapshot)
    }
}
