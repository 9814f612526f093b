use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use validator::Validate;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub server: ServerConfig,

    #[validate(nested)]
    pub database: DatabaseConfig,

    #[validate(nested)]
    pub battery: BatteryConfig,

    #[validate(nested)]
    pub solar: SolarConfig,

    #[validate(nested)]
    pub grid: GridConfig,

    #[validate(nested)]
    pub tariff: TariffConfig,

    #[validate(nested)]
    pub bridge: BridgeConfig,

    #[validate(nested)]
    pub optimizer: OptimizerConfig,

    #[validate(nested)]
    pub immersion: ImmersionConfig,

    #[validate(nested)]
    pub r#override: OverrideConfig,

    #[validate(nested)]
    pub expiry_worker: ExpiryWorkerConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,

    #[validate(range(min = 1, max = 65535))]
    pub port: u16,

    /// Per-request deadline covering adapter + solver + resolver.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .context("Failed to parse socket address")
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct DatabaseConfig {
    #[validate(length(min = 1))]
    pub url: String,

    #[serde(default = "default_connect_max_retries")]
    pub connect_max_retries: u32,

    #[serde(default = "default_connect_retry_delay_ms")]
    pub connect_retry_delay_ms: u64,
}

/// Battery hardware parameters
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[validate(schema(function = "validate_battery_config"))]
pub struct BatteryConfig {
    #[validate(range(min = 0.1, max = 1000.0))]
    pub capacity_kwh: f64,

    #[validate(range(min = 0.1, max = 100.0))]
    pub max_charge_kw: f64,

    #[validate(range(min = 0.1, max = 100.0))]
    pub max_discharge_kw: f64,

    /// Round-trip efficiency.
    #[validate(range(min = 0.5, max = 1.0))]
    pub efficiency: f64,

    #[serde(default = "default_min_soc")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub min_soc_percent: f64,

    #[serde(default = "default_max_soc")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub max_soc_percent: f64,

    /// Inverter setting used for Force Discharge. The amp value is a display
    /// and control integer for the inverter, not a modelled quantity.
    #[serde(default = "default_max_discharge_current")]
    #[validate(range(min = 0, max = 200))]
    pub max_discharge_current_amps: i64,

    /// Tie-break current for Self Use and the fallback path.
    #[serde(default = "default_max_discharge_current")]
    #[validate(range(min = 0, max = 200))]
    pub default_discharge_current_amps: i64,
}

fn validate_battery_config(config: &BatteryConfig) -> Result<(), validator::ValidationError> {
    if config.min_soc_percent >= config.max_soc_percent {
        return Err(validator::ValidationError::new(
            "min_soc_percent must be less than max_soc_percent",
        ));
    }
    Ok(())
}

/// Solar plant parameters (capacity is used only for sanity capping)
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SolarConfig {
    #[validate(range(min = 0.1, max = 100.0))]
    pub capacity_kw: f64,
}

/// Grid connection envelope
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct GridConfig {
    #[validate(range(min = 0.1, max = 100.0))]
    pub max_import_kw: f64,

    #[validate(range(min = 0.0, max = 100.0))]
    pub max_export_kw: f64,
}

/// Tariff API configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TariffConfig {
    #[validate(url)]
    pub base_url: String,

    #[validate(length(min = 1))]
    pub product_code: String,

    #[validate(length(min = 1))]
    pub tariff_code: String,

    /// Hard deadline on the whole fetch, retries included.
    #[serde(default = "default_fetch_deadline_secs")]
    pub fetch_deadline_secs: u64,

    #[serde(default = "default_retention_days")]
    #[validate(range(min = 1, max = 90))]
    pub retention_days: i64,

    /// Flat export unit rate. When unset, export is priced as a fraction of
    /// the import rate (`export_price_ratio`).
    #[serde(default)]
    pub export_price_pence: Option<f64>,

    #[serde(default = "default_export_price_ratio")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub export_price_ratio: f64,
}

impl TariffConfig {
    pub fn unit_rates_url(&self) -> String {
        format!(
            "{}/v1/products/{}/electricity-tariffs/{}/standard-unit-rates/",
            self.base_url.trim_end_matches('/'),
            self.product_code,
            self.tariff_code
        )
    }

    pub fn export_price_for(&self, import_price_pence: f64) -> f64 {
        match self.export_price_pence {
            Some(flat) => flat,
            None => import_price_pence.max(0.0) * self.export_price_ratio,
        }
    }
}

/// Smart-home bridge configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct BridgeConfig {
    #[validate(url)]
    pub base_url: String,

    #[serde(default)]
    pub token: String,

    #[serde(default = "default_bridge_read_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Age beyond which a cached snapshot no longer substitutes for a failed
    /// live read.
    #[serde(default = "default_snapshot_stale_secs")]
    pub snapshot_stale_secs: u64,

    pub entity_battery_soc: String,
    pub entity_solar_power: String,
    pub entity_solar_forecast_today: String,
    pub entity_solar_forecast_next_hour: String,
}

/// Solver configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct OptimizerConfig {
    /// Half-hour steps in the horizon, 24 h by default, up to 48 h.
    #[serde(default = "default_horizon_steps")]
    #[validate(range(min = 1, max = 96))]
    pub horizon_steps: usize,

    #[serde(default = "default_solver_timeout_ms")]
    pub solver_timeout_ms: u64,

    /// Flat baseline load used when no load forecast is supplied.
    #[serde(default = "default_load_profile_kwh_per_step")]
    #[validate(range(min = 0.0, max = 50.0))]
    pub load_profile_kwh_per_step: f64,

    /// Optional end-of-horizon SoC target. Defaults to the battery minimum.
    #[serde(default)]
    pub terminal_soc_target_percent: Option<f64>,
}

/// Immersion rule thresholds
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ImmersionConfig {
    #[validate(range(min = 0.1, max = 100.0))]
    pub high_solar_kw: f64,
}

/// Override lifecycle configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct OverrideConfig {
    #[serde(default = "default_manual_default_hours")]
    #[validate(range(min = 0.01, max = 168.0))]
    pub manual_default_hours: f64,

    #[serde(default = "default_manual_max_hours")]
    #[validate(range(min = 0.01, max = 168.0))]
    pub manual_max_hours: f64,

    /// A schedule override whose heartbeat is older than this is stale.
    #[serde(default = "default_schedule_stale_threshold_secs")]
    pub schedule_stale_threshold_secs: u64,
}

/// Manual-override expiry worker configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ExpiryWorkerConfig {
    #[serde(default = "default_expiry_period_secs")]
    #[validate(range(min = 1, max = 3600))]
    pub period_secs: u64,
}

// Default value functions
fn default_request_timeout_secs() -> u64 { 5 }
fn default_connect_max_retries() -> u32 { 5 }
fn default_connect_retry_delay_ms() -> u64 { 1000 }
fn default_min_soc() -> f64 { 10.0 }
fn default_max_soc() -> f64 { 100.0 }
fn default_max_discharge_current() -> i64 { 50 }
fn default_fetch_deadline_secs() -> u64 { 15 }
fn default_retention_days() -> i64 { 7 }
fn default_export_price_ratio() -> f64 { 0.15 }
fn default_bridge_read_timeout_secs() -> u64 { 3 }
fn default_snapshot_stale_secs() -> u64 { 300 }
fn default_horizon_steps() -> usize { 48 }
fn default_solver_timeout_ms() -> u64 { 1000 }
fn default_load_profile_kwh_per_step() -> f64 { 0.25 }
fn default_manual_default_hours() -> f64 { 2.0 }
fn default_manual_max_hours() -> f64 { 24.0 }
fn default_schedule_stale_threshold_secs() -> u64 { 300 }
fn default_expiry_period_secs() -> u64 { 300 }

impl Config {
    /// Load configuration from `config/default.toml`, overridden by
    /// `HBC__`-prefixed environment variables (`HBC__SERVER__PORT` etc.).
    pub fn load() -> Result<Self> {
        let config: Config = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("HBC__").split("__"))
            .extract()
            .context("Failed to parse configuration")?;

        config
            .validate()
            .context("Configuration validation failed")?;

        Ok(config)
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;

    /// A fully-populated configuration with the documented defaults, for
    /// tests that never touch the filesystem or environment.
    pub fn test_config() -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
                request_timeout_secs: 5,
            },
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                connect_max_retries: 1,
                connect_retry_delay_ms: 10,
            },
            battery: BatteryConfig {
                capacity_kwh: 10.0,
                max_charge_kw: 5.0,
                max_discharge_kw: 5.0,
                efficiency: 0.95,
                min_soc_percent: 10.0,
                max_soc_percent: 100.0,
                max_discharge_current_amps: 50,
                default_discharge_current_amps: 50,
            },
            solar: SolarConfig { capacity_kw: 8.0 },
            grid: GridConfig {
                max_import_kw: 15.0,
                max_export_kw: 5.0,
            },
            tariff: TariffConfig {
                base_url: "https://api.octopus.energy".to_string(),
                product_code: "AGILE-24-10-01".to_string(),
                tariff_code: "E-1R-AGILE-24-10-01-E".to_string(),
                fetch_deadline_secs: 15,
                retention_days: 7,
                export_price_pence: None,
                export_price_ratio: 0.15,
            },
            bridge: BridgeConfig {
                base_url: "http://127.0.0.1:8123".to_string(),
                token: String::new(),
                read_timeout_secs: 3,
                snapshot_stale_secs: 300,
                entity_battery_soc: "sensor.battery_soc".to_string(),
                entity_solar_power: "sensor.solar_power".to_string(),
                entity_solar_forecast_today: "sensor.solar_remaining_today".to_string(),
                entity_solar_forecast_next_hour: "sensor.solar_next_hour".to_string(),
            },
            optimizer: OptimizerConfig {
                horizon_steps: 48,
                solver_timeout_ms: 1000,
                load_profile_kwh_per_step: 0.25,
                terminal_soc_target_percent: None,
            },
            immersion: ImmersionConfig { high_solar_kw: 5.0 },
            r#override: OverrideConfig {
                manual_default_hours: 2.0,
                manual_max_hours: 24.0,
                schedule_stale_threshold_secs: 300,
            },
            expiry_worker: ExpiryWorkerConfig { period_secs: 300 },
        }
    }
}
