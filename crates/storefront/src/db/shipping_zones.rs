//! Persisted overrides for the shipping zone editor.
//!
//! Only the editable fields are stored. Country lists always come from the
//! built-in zone table, so an empty table means "all defaults".

use sqlx::{FromRow, PgPool};

use oceane_core::Money;
use oceane_core::shipping::{ShippingZone, ZoneKey, ZoneTable, ZoneUpdate};

use super::RepositoryError;

#[derive(Debug, FromRow)]
struct ZoneRow {
    key: String,
    base_cost: Money,
    per_kg_cost: Money,
    estimated_days: String,
}

/// Repository for shipping zone overrides.
pub struct ShippingZoneRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ShippingZoneRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Build the zone table: defaults with any stored overrides applied.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a stored row names an
    /// unknown zone or holds an out-of-range cost.
    pub async fn load(&self) -> Result<ZoneTable, RepositoryError> {
        let rows = sqlx::query_as::<_, ZoneRow>(
            r"
            SELECT key, base_cost, per_kg_cost, estimated_days
            FROM storefront.shipping_zones
            ",
        )
        .fetch_all(self.pool)
        .await?;

        let mut table = ZoneTable::defaults();
        for row in rows {
            let key: ZoneKey = row
                .key
                .parse()
                .map_err(RepositoryError::DataCorruption)?;
            table
                .update(
                    key,
                    ZoneUpdate {
                        base_cost: Some(row.base_cost),
                        per_kg_cost: Some(row.per_kg_cost),
                        estimated_days: Some(row.estimated_days),
                    },
                )
                .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;
        }
        Ok(table)
    }

    /// Store the editable fields of `zone`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn save(&self, zone: &ShippingZone) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO storefront.shipping_zones (key, base_cost, per_kg_cost, estimated_days)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (key) DO UPDATE
            SET base_cost = EXCLUDED.base_cost,
                per_kg_cost = EXCLUDED.per_kg_cost,
                estimated_days = EXCLUDED.estimated_days,
                updated_at = NOW()
            ",
        )
        .bind(zone.key.as_str())
        .bind(zone.base_cost)
        .bind(zone.per_kg_cost)
        .bind(&zone.estimated_days)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Drop every override.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn reset(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM storefront.shipping_zones")
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
