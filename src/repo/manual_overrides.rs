use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tracing::{error, info};

use crate::domain::Device;

/// Cleared-by markers written by the store itself.
pub const CLEARED_BY_REPLACED: &str = "system_replaced";
pub const CLEARED_BY_EXPIRY: &str = "system_expiry";
pub const CLEARED_BY_REPAIR: &str = "system_repair";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ManualOverrideRow {
    pub id: i64,
    pub device_id: String,
    pub is_active: bool,
    pub desired_state: bool,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub cleared_at: Option<DateTime<Utc>>,
    pub cleared_by: Option<String>,
}

/// Status view consumed by the priority resolver.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct ManualStatus {
    pub is_active: bool,
    pub desired_state: Option<bool>,
    pub expires_at: Option<DateTime<Utc>>,
    pub time_remaining_minutes: i64,
    pub source: Option<String>,
}

#[derive(Clone)]
pub struct ManualOverrideRepository {
    pool: SqlitePool,
}

impl ManualOverrideRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new active override, atomically replacing any prior active
    /// row for the device. The deactivate-then-insert sequence runs in one
    /// transaction so a "both active" state is never observable.
    pub async fn set(
        &self,
        device: Device,
        desired_state: bool,
        duration: Duration,
        source: &str,
        now: DateTime<Utc>,
    ) -> Result<ManualOverrideRow> {
        let expires_at = now + duration;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE manual_overrides
            SET is_active = 0, cleared_at = ?1, cleared_by = ?2
            WHERE device_id = ?3 AND is_active = 1
            "#,
        )
        .bind(now)
        .bind(CLEARED_BY_REPLACED)
        .bind(device.as_str())
        .execute(&mut *tx)
        .await?;

        let row: ManualOverrideRow = sqlx::query_as(
            r#"
            INSERT INTO manual_overrides
                (device_id, is_active, desired_state, source, created_at, expires_at)
            VALUES (?1, 1, ?2, ?3, ?4, ?5)
            RETURNING id, device_id, is_active, desired_state, source,
                      created_at, expires_at, cleared_at, cleared_by
            "#,
        )
        .bind(device.as_str())
        .bind(desired_state)
        .bind(source)
        .bind(now)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            device = %device,
            desired = desired_state,
            %expires_at,
            source,
            "manual override set"
        );
        Ok(row)
    }

    /// Deactivate any active override for the device. Idempotent: clearing
    /// when nothing is active returns zero.
    pub async fn clear(
        &self,
        device: Device,
        cleared_by: &str,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE manual_overrides
            SET is_active = 0, cleared_at = ?1, cleared_by = ?2
            WHERE device_id = ?3 AND is_active = 1
            "#,
        )
        .bind(now)
        .bind(cleared_by)
        .bind(device.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Deactivate every active override across all devices.
    pub async fn clear_all(&self, cleared_by: &str, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE manual_overrides
            SET is_active = 0, cleared_at = ?1, cleared_by = ?2
            WHERE is_active = 1
            "#,
        )
        .bind(now)
        .bind(cleared_by)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Deactivate overrides whose expiry has passed. Run by the expiry
    /// worker; idempotent and safe under redundant runs.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE manual_overrides
            SET is_active = 0, cleared_at = ?1, cleared_by = ?2
            WHERE is_active = 1 AND expires_at <= ?1
            "#,
        )
        .bind(now)
        .bind(CLEARED_BY_EXPIRY)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Current status for one device: the newest active, unexpired row, or
    /// inactive. Finding more than one active row is an invariant violation;
    /// the newer row wins and the older ones are repaired in place.
    pub async fn status(&self, device: Device, now: DateTime<Utc>) -> Result<ManualStatus> {
        let active: Vec<ManualOverrideRow> = sqlx::query_as(
            r#"
            SELECT id, device_id, is_active, desired_state, source,
                   created_at, expires_at, cleared_at, cleared_by
            FROM manual_overrides
            WHERE device_id = ?1 AND is_active = 1 AND expires_at > ?2
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(device.as_str())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        if active.len() > 1 {
            error!(
                device = %device,
                count = active.len(),
                "multiple active manual overrides found, repairing"
            );
            let keep = active[0].id;
            sqlx::query(
                r#"
                UPDATE manual_overrides
                SET is_active = 0, cleared_at = ?1, cleared_by = ?2
                WHERE device_id = ?3 AND is_active = 1 AND id != ?4
                "#,
            )
            .bind(now)
            .bind(CLEARED_BY_REPAIR)
            .bind(device.as_str())
            .bind(keep)
            .execute(&self.pool)
            .await?;
        }

        Ok(match active.into_iter().next() {
            Some(row) => {
                let remaining = (row.expires_at - now).num_minutes().max(0);
                ManualStatus {
                    is_active: true,
                    desired_state: Some(row.desired_state),
                    expires_at: Some(row.expires_at),
                    time_remaining_minutes: remaining,
                    source: Some(row.source),
                }
            }
            None => ManualStatus::default(),
        })
    }

    /// Most recent row for a device regardless of state, for tests and
    /// diagnostics.
    pub async fn latest(&self, device: Device) -> Result<Option<ManualOverrideRow>> {
        let row = sqlx::query_as(
            r#"
            SELECT id, device_id, is_active, desired_state, source,
                   created_at, expires_at, cleared_at, cleared_by
            FROM manual_overrides
            WHERE device_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(device.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
