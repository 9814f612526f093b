use std::sync::Arc;

use anyhow::Result;
use chrono::Duration;
use serde::Serialize;
use tracing::warn;

use crate::bridge::{BridgeClient, Freshness, HttpBridgeClient, Snapshot, StateAdapter};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::domain::{Device, PerDevice, PricePoint, PriceWindowStats, Recommendation};
use crate::optimizer::{Optimizer, STEP_HOURS};
use crate::repo::{IngestReport, ManualStatus, Repositories, ScheduleStatus};
use crate::resolver;
use crate::tariff::{classify, TariffClient};

/// Shared handler state: the long-lived pieces (store, adapter cache,
/// tariff client) passed as explicit dependencies, no process-wide
/// singletons beyond the database pool inside `Repositories`.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    pub repos: Arc<Repositories>,
    pub adapter: Arc<StateAdapter>,
    pub tariff: Arc<TariffClient>,
    pub optimizer: Arc<Optimizer>,
    pub clock: Arc<dyn Clock>,
}

/// Outcome of a tariff refresh. `stale` flags that the external fetch
/// failed and the store was served as-is.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    pub report: IngestReport,
    pub prices_stored: usize,
    pub coverage_hours: f64,
    pub statistics: Option<PriceWindowStats>,
    pub stale: bool,
}

impl AppState {
    pub async fn new(cfg: Config) -> Result<Self> {
        let repos = Arc::new(Repositories::new(&cfg).await?);
        let bridge: Arc<dyn BridgeClient> = Arc::new(HttpBridgeClient::new(&cfg.bridge)?);
        Self::with_parts(cfg, repos, bridge, Arc::new(SystemClock))
    }

    /// Assemble the state from externally built parts. Tests use this with
    /// an in-memory pool, a mock bridge and a manual clock.
    pub fn with_parts(
        cfg: Config,
        repos: Arc<Repositories>,
        bridge: Arc<dyn BridgeClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let adapter = Arc::new(StateAdapter::new(bridge, cfg.bridge.clone()));
        let tariff = Arc::new(TariffClient::new(&cfg.tariff)?);
        let optimizer = Arc::new(Optimizer::new(cfg.clone()));
        Ok(Self {
            cfg,
            repos,
            adapter,
            tariff,
            optimizer,
            clock,
        })
    }

    fn schedule_stale_threshold(&self) -> Duration {
        Duration::seconds(self.cfg.r#override.schedule_stale_threshold_secs as i64)
    }

    fn horizon(&self) -> Duration {
        Duration::minutes(30 * self.cfg.optimizer.horizon_steps as i64)
    }

    /// Pull the tariff window from the external API and update the store.
    /// A failed fetch is not an error: the stored window is served with a
    /// staleness indicator instead.
    pub async fn refresh_prices(&self) -> Result<RefreshOutcome> {
        let now = self.clock.now();
        let (report, stale) = match self.tariff.fetch_rates(now).await {
            Ok(rates) => {
                let report = self
                    .repos
                    .prices
                    .ingest(&rates, now, self.cfg.tariff.retention_days)
                    .await?;
                (report, false)
            }
            Err(e) => {
                warn!(error = %e, "tariff fetch failed, serving stored prices");
                (IngestReport::default(), true)
            }
        };

        let window = self.repos.prices.window(now, now + self.horizon()).await?;
        let statistics = classify::window_stats(&window);

        Ok(RefreshOutcome {
            report,
            prices_stored: window.len(),
            coverage_hours: window.len() as f64 * STEP_HOURS,
            statistics,
            stale,
        })
    }

    /// Ordered stored prices covering the next `hours`.
    pub async fn current_prices(&self, hours: i64) -> Result<Vec<PricePoint>> {
        let now = self.clock.now();
        self.repos
            .prices
            .window(now, now + Duration::hours(hours))
            .await
    }

    /// Live snapshot plus the stored price covering now.
    pub async fn current_state(&self) -> Result<(Snapshot, Option<PricePoint>)> {
        let now = self.clock.now();
        let snapshot = self.adapter.snapshot(now).await;
        let price = self.repos.prices.current(now).await?;
        Ok((snapshot, price))
    }

    pub async fn override_statuses(
        &self,
    ) -> Result<(PerDevice<ScheduleStatus>, PerDevice<ManualStatus>)> {
        let now = self.clock.now();
        let stale = self.schedule_stale_threshold();
        let schedule = PerDevice {
            main: self.repos.schedule.status(Device::Main, now, stale).await?,
            lucy: self.repos.schedule.status(Device::Lucy, now, stale).await?,
        };
        let manual = PerDevice {
            main: self.repos.manual.status(Device::Main, now).await?,
            lucy: self.repos.manual.status(Device::Lucy, now).await?,
        };
        Ok((schedule, manual))
    }

    /// One full decision cycle: snapshot, optimise, resolve against the
    /// overrides, persist the result for audit.
    pub async fn recommendation_now(&self) -> Result<Recommendation> {
        let now = self.clock.now();
        let snapshot = self.adapter.snapshot(now).await;

        let output = if snapshot.freshness == Freshness::Fallback {
            self.optimizer
                .fallback_output("fallback: state snapshot unavailable")
        } else {
            let window = self
                .repos
                .prices
                .window(now - Duration::minutes(30), now + self.horizon())
                .await?;
            let input = self.optimizer.build_input(&snapshot.state, &window, now);
            self.optimizer.recommend(input).await
        };

        let (schedule, manual) = self.override_statuses().await?;
        let resolved = resolver::resolve(&output, &schedule, &manual);

        let recommendation = Recommendation {
            timestamp: now,
            horizon_steps: self.cfg.optimizer.horizon_steps,
            battery_mode: output.mode,
            discharge_current_amps: output.discharge_current_amps,
            devices: resolved.devices,
            manual_override_active: resolved.manual_override_active,
            schedule_override_active: resolved.schedule_override_active,
            optimization_status: output.status,
            optimization_time_ms: output.elapsed_ms,
            expected_soc_percent: output.expected_soc_percent,
            reason: output.reason,
        };

        self.repos.recommendations.insert(&recommendation).await?;
        Ok(recommendation)
    }
}
