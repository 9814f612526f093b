//! Forecast & state adapter: the only place in the core that talks to the
//! smart-home bridge.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::warn;

use crate::config::BridgeConfig;
use crate::domain::SystemState;

/// One bounded-latency bulk read of entity states.
#[async_trait]
pub trait BridgeClient: Send + Sync {
    async fn fetch_states(&self) -> Result<HashMap<String, String>>;
}

pub struct HttpBridgeClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct EntityState {
    entity_id: String,
    state: String,
}

impl HttpBridgeClient {
    pub fn new(cfg: &BridgeConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if !cfg.token.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", cfg.token))
                .context("invalid bridge token")?;
            headers.insert(AUTHORIZATION, value);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.read_timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl BridgeClient for HttpBridgeClient {
    async fn fetch_states(&self) -> Result<HashMap<String, String>> {
        let url = format!("{}/api/states", self.base_url);
        let resp = self.http.get(&url).send().await.context("bridge GET failed")?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("bridge API error: HTTP {status}");
        }
        let states: Vec<EntityState> = resp.json().await.context("bridge JSON parse failed")?;
        Ok(states.into_iter().map(|s| (s.entity_id, s.state)).collect())
    }
}

/// How the snapshot was obtained. `Fallback` means the recommendation built
/// from it must be marked degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Live,
    Cached,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub state: SystemState,
    pub freshness: Freshness,
}

/// Wraps the bridge client with a read deadline and a last-good-snapshot
/// cache. `snapshot` never fails; it degrades.
pub struct StateAdapter {
    client: Arc<dyn BridgeClient>,
    cfg: BridgeConfig,
    last_good: RwLock<Option<SystemState>>,
}

impl StateAdapter {
    pub fn new(client: Arc<dyn BridgeClient>, cfg: BridgeConfig) -> Self {
        Self {
            client,
            cfg,
            last_good: RwLock::new(None),
        }
    }

    pub async fn snapshot(&self, now: DateTime<Utc>) -> Snapshot {
        let deadline = Duration::from_secs(self.cfg.read_timeout_secs);
        let read = tokio::time::timeout(deadline, self.client.fetch_states()).await;

        match read {
            Ok(Ok(states)) => {
                let state = self.build_state(&states, now);
                *self.last_good.write().await = Some(state.clone());
                Snapshot {
                    state,
                    freshness: Freshness::Live,
                }
            }
            other => {
                match other {
                    Ok(Err(e)) => warn!(error = %e, "bridge read failed"),
                    _ => warn!("bridge read timed out"),
                }
                let stale_after =
                    chrono::Duration::seconds(self.cfg.snapshot_stale_secs as i64);
                let cached = self.last_good.read().await.clone();
                match cached {
                    Some(state) if now - state.timestamp <= stale_after => Snapshot {
                        state,
                        freshness: Freshness::Cached,
                    },
                    _ => Snapshot {
                        state: SystemState::conservative(now),
                        freshness: Freshness::Fallback,
                    },
                }
            }
        }
    }

    fn build_state(&self, states: &HashMap<String, String>, now: DateTime<Utc>) -> SystemState {
        let mut degraded = false;
        let mut read = |entity: &str, default: f64| -> f64 {
            match states.get(entity).and_then(|s| s.parse::<f64>().ok()) {
                Some(v) if v.is_finite() => v,
                _ => {
                    warn!(entity, default, "sensor unavailable, using default");
                    degraded = true;
                    default
                }
            }
        };

        let battery_soc_percent = read(&self.cfg.entity_battery_soc, 50.0).clamp(0.0, 100.0);
        let solar_power_kw = read(&self.cfg.entity_solar_power, 0.0).max(0.0);
        let solar_remaining_today_kwh =
            read(&self.cfg.entity_solar_forecast_today, 0.0).max(0.0);
        // The bridge reports the next-hour forecast in watts.
        let solar_next_hour_kwh =
            (read(&self.cfg.entity_solar_forecast_next_hour, 0.0) / 1000.0).max(0.0);

        SystemState {
            battery_soc_percent,
            solar_power_kw,
            solar_remaining_today_kwh,
            solar_next_hour_kwh,
            timestamp: now,
            degraded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::test_config;
    use chrono::{Duration as ChronoDuration, TimeZone};

    struct FixedClient {
        states: HashMap<String, String>,
    }

    #[async_trait]
    impl BridgeClient for FixedClient {
        async fn fetch_states(&self) -> Result<HashMap<String, String>> {
            Ok(self.states.clone())
        }
    }

    struct FailingClient;

    #[async_trait]
    impl BridgeClient for FailingClient {
        async fn fetch_states(&self) -> Result<HashMap<String, String>> {
            anyhow::bail!("bridge down")
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 4, 12, 0, 0).unwrap()
    }

    fn full_states(cfg: &BridgeConfig) -> HashMap<String, String> {
        HashMap::from([
            (cfg.entity_battery_soc.clone(), "82.5".to_string()),
            (cfg.entity_solar_power.clone(), "3.2".to_string()),
            (cfg.entity_solar_forecast_today.clone(), "12.4".to_string()),
            (cfg.entity_solar_forecast_next_hour.clone(), "2500".to_string()),
        ])
    }

    #[tokio::test]
    async fn live_read_builds_a_full_snapshot() {
        let cfg = test_config().bridge;
        let client = Arc::new(FixedClient {
            states: full_states(&cfg),
        });
        let adapter = StateAdapter::new(client, cfg);

        let snap = adapter.snapshot(t0()).await;
        assert_eq!(snap.freshness, Freshness::Live);
        assert!(!snap.state.degraded);
        assert_eq!(snap.state.battery_soc_percent, 82.5);
        assert_eq!(snap.state.solar_power_kw, 3.2);
        assert!((snap.state.solar_next_hour_kwh - 2.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn missing_sensors_use_safe_defaults_and_flag_degraded() {
        let cfg = test_config().bridge;
        let client = Arc::new(FixedClient {
            states: HashMap::new(),
        });
        let adapter = StateAdapter::new(client, cfg);

        let snap = adapter.snapshot(t0()).await;
        assert_eq!(snap.freshness, Freshness::Live);
        assert!(snap.state.degraded);
        assert_eq!(snap.state.battery_soc_percent, 50.0);
        assert_eq!(snap.state.solar_power_kw, 0.0);
    }

    #[tokio::test]
    async fn failure_serves_cached_snapshot_within_freshness_window() {
        let cfg = test_config().bridge;
        let good = Arc::new(FixedClient {
            states: full_states(&cfg),
        });
        let adapter = StateAdapter::new(good, cfg.clone());
        adapter.snapshot(t0()).await;

        // Swap to a failing client, keeping the cache.
        let failing = StateAdapter {
            client: Arc::new(FailingClient),
            cfg,
            last_good: RwLock::new(adapter.last_good.read().await.clone()),
        };

        let fresh = failing.snapshot(t0() + ChronoDuration::minutes(2)).await;
        assert_eq!(fresh.freshness, Freshness::Cached);
        assert_eq!(fresh.state.battery_soc_percent, 82.5);

        let stale = failing.snapshot(t0() + ChronoDuration::minutes(10)).await;
        assert_eq!(stale.freshness, Freshness::Fallback);
        assert_eq!(stale.state.battery_soc_percent, 50.0);
        assert!(stale.state.degraded);
    }
}
