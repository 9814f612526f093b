#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use figment::providers::{Format, Toml};
use figment::Figment;

use home_battery_controller::bridge::BridgeClient;
use home_battery_controller::clock::Clock;
use home_battery_controller::config::Config;
use home_battery_controller::controller::AppState;
use home_battery_controller::domain::TariffRate;
use home_battery_controller::repo::{db, Repositories};

/// The documented defaults, loaded through the same figment path as
/// production.
pub fn test_config() -> Config {
    Figment::new()
        .merge(Toml::file("config/default.toml"))
        .extract()
        .expect("default config parses")
}

/// A frozen instant all tests start from.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 4, 12, 0, 0).unwrap()
}

/// Manually advanced clock shared with the app state.
pub struct TestClock {
    now: Mutex<DateTime<Utc>>,
}

impl TestClock {
    pub fn at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Scriptable smart-home bridge.
pub struct MockBridge {
    states: Mutex<HashMap<String, String>>,
    failing: Mutex<bool>,
}

impl MockBridge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            states: Mutex::new(HashMap::new()),
            failing: Mutex::new(false),
        })
    }

    /// Publish the four sensors the adapter reads.
    pub fn set_sensors(&self, cfg: &Config, soc_percent: f64, solar_kw: f64) {
        let mut states = self.states.lock().unwrap();
        states.insert(cfg.bridge.entity_battery_soc.clone(), soc_percent.to_string());
        states.insert(cfg.bridge.entity_solar_power.clone(), solar_kw.to_string());
        states.insert(cfg.bridge.entity_solar_forecast_today.clone(), "0".to_string());
        states.insert(
            cfg.bridge.entity_solar_forecast_next_hour.clone(),
            "0".to_string(),
        );
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait]
impl BridgeClient for MockBridge {
    async fn fetch_states(&self) -> anyhow::Result<HashMap<String, String>> {
        if *self.failing.lock().unwrap() {
            anyhow::bail!("bridge unreachable");
        }
        Ok(self.states.lock().unwrap().clone())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub clock: Arc<TestClock>,
    pub bridge: Arc<MockBridge>,
}

/// App state over a fresh in-memory database, a mock bridge and a frozen
/// clock.
pub async fn test_app() -> TestApp {
    test_app_with_config(test_config()).await
}

pub async fn test_app_with_config(cfg: Config) -> TestApp {
    let pool = db::connect("sqlite::memory:", 1, 10)
        .await
        .expect("in-memory database");
    let repos = Arc::new(Repositories::from_pool(pool));
    let clock = TestClock::at(t0());
    let bridge = MockBridge::new();
    bridge.set_sensors(&cfg, 50.0, 0.0);

    let state = AppState::with_parts(cfg, repos, bridge.clone(), clock.clone())
        .expect("app state builds");

    TestApp {
        state,
        clock,
        bridge,
    }
}

/// Contiguous half-hourly rates starting at `from`.
pub fn rates(from: DateTime<Utc>, prices: &[f64]) -> Vec<TariffRate> {
    prices
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let valid_from = from + Duration::minutes(30 * i as i64);
            TariffRate {
                valid_from,
                valid_to: valid_from + Duration::minutes(30),
                unit_price_pence: p,
            }
        })
        .collect()
}
