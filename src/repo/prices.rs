use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::domain::{PriceClass, PricePoint, TariffRate};
use crate::tariff::classify;

/// Look-ahead over which classification thresholds are computed.
const CLASSIFICATION_LOOKAHEAD_HOURS: i64 = 48;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct IngestReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct PriceRow {
    valid_from: DateTime<Utc>,
    valid_to: DateTime<Utc>,
    unit_price_pence: f64,
    classification: String,
}

impl From<PriceRow> for PricePoint {
    fn from(row: PriceRow) -> Self {
        PricePoint {
            valid_from: row.valid_from,
            valid_to: row.valid_to,
            unit_price_pence: row.unit_price_pence,
            classification: PriceClass::parse(&row.classification).unwrap_or(PriceClass::Normal),
        }
    }
}

#[derive(Clone)]
pub struct PriceRepository {
    pool: SqlitePool,
}

impl PriceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert a batch of rates keyed by `valid_from`, prune rows older than
    /// the retention window, then recompute classifications over the
    /// look-ahead window. Malformed rates are skipped, never fatal.
    pub async fn ingest(
        &self,
        rates: &[TariffRate],
        now: DateTime<Utc>,
        retention_days: i64,
    ) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        for rate in rates {
            if !(rate.unit_price_pence.is_finite() && rate.valid_to > rate.valid_from) {
                warn!(valid_from = %rate.valid_from, "skipping malformed price record");
                report.skipped += 1;
                continue;
            }

            let existing: Option<f64> = sqlx::query_scalar(
                "SELECT unit_price_pence FROM price_points WHERE valid_from = ?1",
            )
            .bind(rate.valid_from)
            .fetch_optional(&self.pool)
            .await?;

            match existing {
                Some(price) if (price - rate.unit_price_pence).abs() < f64::EPSILON => {
                    report.unchanged += 1;
                    continue;
                }
                Some(_) => report.updated += 1,
                None => report.inserted += 1,
            }

            sqlx::query(
                r#"
                INSERT INTO price_points (valid_from, valid_to, unit_price_pence)
                VALUES (?1, ?2, ?3)
                ON CONFLICT (valid_from) DO UPDATE SET
                    valid_to = excluded.valid_to,
                    unit_price_pence = excluded.unit_price_pence
                "#,
            )
            .bind(rate.valid_from)
            .bind(rate.valid_to)
            .bind(rate.unit_price_pence)
            .execute(&self.pool)
            .await?;
        }

        let pruned = self.prune(now - Duration::days(retention_days)).await?;
        if pruned > 0 {
            debug!(pruned, "pruned expired price rows");
        }

        self.reclassify(now).await?;
        Ok(report)
    }

    /// Recompute classifications across the look-ahead window. Idempotent:
    /// a second pass over an unchanged window rewrites nothing.
    pub async fn reclassify(&self, now: DateTime<Utc>) -> Result<()> {
        let window_end = now + Duration::hours(CLASSIFICATION_LOOKAHEAD_HOURS);
        let rows: Vec<PriceRow> = sqlx::query_as(
            r#"
            SELECT valid_from, valid_to, unit_price_pence, classification
            FROM price_points
            WHERE valid_from >= ?1 AND valid_from < ?2
            ORDER BY valid_from ASC
            "#,
        )
        .bind(now)
        .bind(window_end)
        .fetch_all(&self.pool)
        .await?;

        let prices: Vec<f64> = rows.iter().map(|r| r.unit_price_pence).collect();
        let thresholds = classify::thresholds(&prices);

        for row in rows {
            let class = classify::classification_for(row.unit_price_pence, thresholds);
            if row.classification != class.as_str() {
                sqlx::query(
                    "UPDATE price_points SET classification = ?1 WHERE valid_from = ?2",
                )
                .bind(class.as_str())
                .bind(row.valid_from)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    pub async fn prune(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM price_points WHERE valid_from < ?1")
            .bind(before)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Ordered points overlapping `[start, end)`. Missing coverage is not an
    /// error; callers see whatever is available.
    pub async fn window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>> {
        let rows: Vec<PriceRow> = sqlx::query_as(
            r#"
            SELECT valid_from, valid_to, unit_price_pence, classification
            FROM price_points
            WHERE valid_to > ?1 AND valid_from < ?2
            ORDER BY valid_from ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PricePoint::from).collect())
    }

    /// Oldest and newest instants covered by the store, if any.
    pub async fn coverage(&self) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let row: Option<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> =
            sqlx::query_as("SELECT MIN(valid_from), MAX(valid_to) FROM price_points")
                .fetch_optional(&self.pool)
                .await?;

        Ok(match row {
            Some((Some(oldest), Some(newest))) => Some((oldest, newest)),
            _ => None,
        })
    }

    /// The point covering `now`, if stored.
    pub async fn current(&self, now: DateTime<Utc>) -> Result<Option<PricePoint>> {
        let row: Option<PriceRow> = sqlx::query_as(
            r#"
            SELECT valid_from, valid_to, unit_price_pence, classification
            FROM price_points
            WHERE valid_from <= ?1 AND valid_to > ?1
            ORDER BY valid_from DESC
            LIMIT 1
            "#,
        )
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PricePoint::from))
    }
}
