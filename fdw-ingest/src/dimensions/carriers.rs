//! Carrier dimension derived from flight files

use fdw_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

use super::read_csv_blocking;
use crate::source::columns::{self as col, HeaderIndex};
use crate::source::csv_reader::decode_row;
use crate::source::convert::optional_int;

/// Known US reporting carriers
const CARRIER_NAMES: &[(&str, &str)] = &[
    ("AA", "American Airlines"),
    ("DL", "Delta Air Lines"),
    ("UA", "United Airlines"),
    ("WN", "Southwest Airlines"),
    ("B6", "JetBlue Airways"),
    ("AS", "Alaska Airlines"),
    ("NK", "Spirit Airlines"),
    ("F9", "Frontier Airlines"),
    ("G4", "Allegiant Air"),
    ("HA", "Hawaiian Airlines"),
    ("SY", "Sun Country Airlines"),
    ("MX", "MexicanaLink"),
    ("OH", "PSA Airlines"),
    ("OO", "SkyWest Airlines"),
    ("YV", "Mesa Airlines"),
    ("YX", "Republic Airways"),
    ("QX", "Horizon Air"),
    ("MQ", "Envoy Air"),
    ("9E", "Endeavor Air"),
    ("EV", "ExpressJet Airlines"),
    ("PT", "Piedmont Airlines"),
    ("ZW", "Air Wisconsin"),
    ("CP", "Compass Airlines"),
    ("C5", "CommutAir"),
    ("G7", "GoJet Airlines"),
    ("KS", "Penair"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Carrier {
    pub code: String,
    pub name: String,
    pub dot_id: Option<i64>,
}

impl Carrier {
    pub fn new(code: &str, dot_id: Option<i64>) -> Self {
        Self {
            code: code.to_string(),
            name: carrier_name(code),
            dot_id,
        }
    }
}

/// Display name for a carrier code
pub fn carrier_name(code: &str) -> String {
    CARRIER_NAMES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("Carrier {}", code))
}

/// Distinct carriers in one flight file, with the first DOT id seen for each
pub async fn collect_carriers(path: PathBuf) -> Result<BTreeMap<String, Option<i64>>> {
    read_csv_blocking(path, |reader| {
        let index = HeaderIndex::new(reader.headers()?);
        let mut carriers = BTreeMap::new();
        for bytes in reader.byte_records() {
            let (row, bad_field) = decode_row(&bytes?);
            if bad_field.is_some() {
                continue;
            }
            let code = index.get(&row, col::CARRIER);
            if code.is_empty() || carriers.contains_key(code) {
                continue;
            }
            let dot_id = optional_int(index.get(&row, col::CARRIER_DOT_ID)).ok().flatten();
            carriers.insert(code.to_string(), dot_id);
        }
        Ok(carriers)
    })
    .await
}

/// Insert carriers that are not present yet; returns how many were new
pub async fn insert_carriers(pool: &SqlitePool, carriers: &[Carrier]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0u64;

    for carrier in carriers {
        let result = sqlx::query(
            "INSERT INTO carriers (carrier_code, carrier_name, dot_id) VALUES (?, ?, ?) \
             ON CONFLICT(carrier_code) DO NOTHING",
        )
        .bind(&carrier.code)
        .bind(&carrier.name)
        .bind(carrier.dot_id)
        .execute(&mut *tx)
        .await?;
        inserted += result.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

/// Collect carriers across all files and insert the new ones
pub async fn load_carriers(pool: &SqlitePool, paths: &[PathBuf]) -> Result<u64> {
    let mut found: BTreeMap<String, Option<i64>> = BTreeMap::new();
    for path in paths {
        for (code, dot_id) in collect_carriers(path.clone()).await? {
            found.entry(code).or_insert(dot_id);
        }
    }
    info!(files = paths.len(), carriers = found.len(), "Collected carriers");

    let carriers: Vec<Carrier> = found
        .iter()
        .map(|(code, dot_id)| Carrier::new(code, *dot_id))
        .collect();
    let inserted = insert_carriers(pool, &carriers).await?;

    info!(inserted, "Loaded carriers");
    Ok(inserted)
}
