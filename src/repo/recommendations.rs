use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::{
    BatteryMode, DecisionSource, DeviceDecision, OptimizationStatus, PerDevice, Recommendation,
};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecommendationRow {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub horizon_steps: i64,
    pub battery_mode: String,
    pub discharge_current_amps: i64,
    pub main_desired: bool,
    pub main_source: String,
    pub main_reason: String,
    pub lucy_desired: bool,
    pub lucy_source: String,
    pub lucy_reason: String,
    pub optimization_status: String,
    pub optimization_time_ms: f64,
    pub expected_soc_percent: Option<f64>,
    pub reason: String,
}

impl RecommendationRow {
    pub fn into_recommendation(self) -> Recommendation {
        let device = |desired: bool, source: &str, reason: String| DeviceDecision {
            desired,
            source: DecisionSource::parse(source).unwrap_or(DecisionSource::Optimizer),
            reason,
        };
        let devices = PerDevice {
            main: device(self.main_desired, &self.main_source, self.main_reason),
            lucy: device(self.lucy_desired, &self.lucy_source, self.lucy_reason),
        };
        let manual_override_active = devices.any(|d| d.source == DecisionSource::ManualOverride);
        let schedule_override_active =
            devices.any(|d| d.source == DecisionSource::ScheduleOverride);

        Recommendation {
            timestamp: self.timestamp,
            horizon_steps: self.horizon_steps.max(0) as usize,
            battery_mode: BatteryMode::parse(&self.battery_mode).unwrap_or(BatteryMode::SelfUse),
            discharge_current_amps: self.discharge_current_amps,
            devices,
            manual_override_active,
            schedule_override_active,
            optimization_status: OptimizationStatus::parse(&self.optimization_status)
                .unwrap_or(OptimizationStatus::Fallback),
            optimization_time_ms: self.optimization_time_ms,
            expected_soc_percent: self.expected_soc_percent,
            reason: self.reason,
        }
    }
}

/// Audit log of every decision cycle.
#[derive(Clone)]
pub struct RecommendationRepository {
    pool: SqlitePool,
}

impl RecommendationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, rec: &Recommendation) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO recommendations
                (timestamp, horizon_steps, battery_mode, discharge_current_amps,
                 main_desired, main_source, main_reason,
                 lucy_desired, lucy_source, lucy_reason,
                 optimization_status, optimization_time_ms, expected_soc_percent, reason)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            RETURNING id
            "#,
        )
        .bind(rec.timestamp)
        .bind(rec.horizon_steps as i64)
        .bind(rec.battery_mode.as_str())
        .bind(rec.discharge_current_amps)
        .bind(rec.devices.main.desired)
        .bind(rec.devices.main.source.as_str())
        .bind(&rec.devices.main.reason)
        .bind(rec.devices.lucy.desired)
        .bind(rec.devices.lucy.source.as_str())
        .bind(&rec.devices.lucy.reason)
        .bind(rec.optimization_status.as_str())
        .bind(rec.optimization_time_ms)
        .bind(rec.expected_soc_percent)
        .bind(&rec.reason)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Recent recommendations, newest first.
    pub async fn recent(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<RecommendationRow>> {
        let rows = sqlx::query_as(
            r#"
            SELECT id, timestamp, horizon_steps, battery_mode, discharge_current_amps,
                   main_desired, main_source, main_reason,
                   lucy_desired, lucy_source, lucy_reason,
                   optimization_status, optimization_time_ms, expected_soc_percent, reason
            FROM recommendations
            WHERE timestamp >= ?1
            ORDER BY timestamp DESC, id DESC
            LIMIT ?2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
