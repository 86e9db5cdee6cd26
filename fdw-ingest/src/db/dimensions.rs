//! Dimension key reads

use async_trait::async_trait;
use fdw_common::Result;
use sqlx::SqlitePool;
use std::collections::HashSet;

use crate::loader::DimensionLookup;
use crate::models::Dimension;

/// `DimensionLookup` over the carriers, airports and date_dim tables
#[derive(Clone)]
pub struct SqliteDimensionLookup {
    pool: SqlitePool,
}

impl SqliteDimensionLookup {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DimensionLookup for SqliteDimensionLookup {
    async fn keys_for(&self, dimension: Dimension) -> Result<HashSet<String>> {
        let sql = match dimension {
            Dimension::Carrier => "SELECT carrier_code FROM carriers",
            Dimension::Airport => "SELECT airport_code FROM airports",
            Dimension::Date => "SELECT date_id FROM date_dim",
        };

        let keys: Vec<String> = sqlx::query_scalar(sql).fetch_all(&self.pool).await?;
        tracing::debug!(dimension = %dimension, count = keys.len(), "Loaded dimension keys");

        Ok(keys.into_iter().collect())
    }
}

/// Row count of a dimension table
pub async fn count_dimension(pool: &SqlitePool, dimension: Dimension) -> Result<u64> {
    let sql = match dimension {
        Dimension::Carrier => "SELECT COUNT(*) FROM carriers",
        Dimension::Airport => "SELECT COUNT(*) FROM airports",
        Dimension::Date => "SELECT COUNT(*) FROM date_dim",
    };
    let count: i64 = sqlx::query_scalar(sql).fetch_one(pool).await?;
    Ok(count as u64)
}
