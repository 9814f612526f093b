pub mod db;
pub mod manual_overrides;
pub mod prices;
pub mod recommendations;
pub mod schedule_overrides;

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;

pub use manual_overrides::{ManualOverrideRepository, ManualOverrideRow, ManualStatus};
pub use prices::{IngestReport, PriceRepository};
pub use recommendations::{RecommendationRepository, RecommendationRow};
pub use schedule_overrides::{ScheduleEventRow, ScheduleOverrideRepository, ScheduleStatus};

/// The shared-state of record. All override invariants are enforced here,
/// inside transactions.
#[derive(Clone)]
pub struct Repositories {
    pub pool: SqlitePool,
    pub prices: PriceRepository,
    pub manual: ManualOverrideRepository,
    pub schedule: ScheduleOverrideRepository,
    pub recommendations: RecommendationRepository,
}

impl Repositories {
    pub async fn new(cfg: &Config) -> Result<Self> {
        let pool = db::connect(
            &cfg.database.url,
            cfg.database.connect_max_retries,
            cfg.database.connect_retry_delay_ms,
        )
        .await?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            prices: PriceRepository::new(pool.clone()),
            manual: ManualOverrideRepository::new(pool.clone()),
            schedule: ScheduleOverrideRepository::new(pool.clone()),
            recommendations: RecommendationRepository::new(pool.clone()),
            pool,
        }
    }
}
