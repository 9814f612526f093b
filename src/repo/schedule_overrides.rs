use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tracing::info;

use crate::domain::Device;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScheduleOverrideRow {
    pub device_id: String,
    pub is_active: bool,
    pub reason: Option<String>,
    pub activated_at: Option<DateTime<Utc>>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ScheduleEventRow {
    pub id: i64,
    pub device_id: String,
    pub is_active: bool,
    pub reason: Option<String>,
    pub reported_at: DateTime<Utc>,
}

/// Status view consumed by the priority resolver.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct ScheduleStatus {
    pub is_active: bool,
    pub reason: Option<String>,
    pub activated_at: Option<DateTime<Utc>>,
    pub duration_minutes: i64,
}

#[derive(Clone)]
pub struct ScheduleOverrideRepository {
    pool: SqlitePool,
}

impl ScheduleOverrideRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a schedule report for a device. The device's single row is
    /// upserted; `updated_at` always moves forward and acts as the heartbeat.
    /// Every report is also appended to the transition log.
    pub async fn report(
        &self,
        device: Device,
        is_active: bool,
        reason: Option<&str>,
        reported_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if is_active {
            sqlx::query(
                r#"
                INSERT INTO schedule_overrides
                    (device_id, is_active, reason, activated_at, deactivated_at, updated_at)
                VALUES (?1, 1, ?2, ?3, NULL, ?4)
                ON CONFLICT (device_id) DO UPDATE SET
                    reason = excluded.reason,
                    -- keep the original activation instant while the schedule
                    -- stays active; a fresh activation resets it
                    activated_at = CASE
                        WHEN schedule_overrides.is_active = 1
                             AND schedule_overrides.activated_at IS NOT NULL
                        THEN schedule_overrides.activated_at
                        ELSE excluded.activated_at
                    END,
                    is_active = 1,
                    deactivated_at = NULL,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(device.as_str())
            .bind(reason)
            .bind(reported_at)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                r#"
                INSERT INTO schedule_overrides
                    (device_id, is_active, reason, activated_at, deactivated_at, updated_at)
                VALUES (?1, 0, ?2, NULL, ?3, ?4)
                ON CONFLICT (device_id) DO UPDATE SET
                    reason = excluded.reason,
                    is_active = 0,
                    deactivated_at = excluded.deactivated_at,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(device.as_str())
            .bind(reason)
            .bind(reported_at)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO schedule_events (device_id, is_active, reason, reported_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(device.as_str())
        .bind(is_active)
        .bind(reason)
        .bind(reported_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            device = %device,
            active = is_active,
            reason = reason.unwrap_or(""),
            "schedule override reported"
        );
        Ok(())
    }

    /// Current status for one device. The row counts as active only while
    /// the heartbeat is fresh: a schedule whose `updated_at` is older than
    /// the stale threshold is reported inactive regardless of `is_active`.
    pub async fn status(
        &self,
        device: Device,
        now: DateTime<Utc>,
        stale_threshold: Duration,
    ) -> Result<ScheduleStatus> {
        let row: Option<ScheduleOverrideRow> = sqlx::query_as(
            r#"
            SELECT device_id, is_active, reason, activated_at, deactivated_at, updated_at
            FROM schedule_overrides
            WHERE device_id = ?1
            "#,
        )
        .bind(device.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(ScheduleStatus::default());
        };

        if !row.is_active || now - row.updated_at > stale_threshold {
            return Ok(ScheduleStatus::default());
        }

        let duration_minutes = row
            .activated_at
            .map(|t| (now - t).num_minutes().max(0))
            .unwrap_or(0);

        Ok(ScheduleStatus {
            is_active: true,
            reason: row.reason,
            activated_at: row.activated_at,
            duration_minutes,
        })
    }

    /// Recent schedule transitions, newest first.
    pub async fn history(
        &self,
        device: Option<Device>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<ScheduleEventRow>> {
        // SQLite treats NULL-guarded filters as no-ops when unset.
        let rows = sqlx::query_as(
            r#"
            SELECT id, device_id, is_active, reason, reported_at
            FROM schedule_events
            WHERE (?1 IS NULL OR device_id = ?1)
              AND (?2 IS NULL OR reported_at >= ?2)
              AND (?3 IS NULL OR reported_at <= ?3)
            ORDER BY reported_at DESC, id DESC
            LIMIT ?4
            "#,
        )
        .bind(device.map(|d| d.as_str()))
        .bind(start)
        .bind(end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
