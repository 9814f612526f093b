use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::TariffConfig;
use crate::domain::TariffRate;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

/// Client for the tariff provider's half-hourly unit-rate endpoint.
#[derive(Clone)]
pub struct TariffClient {
    http: reqwest::Client,
    url: String,
    deadline: Duration,
}

#[derive(Debug, Deserialize)]
struct UnitRatesPage {
    results: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawRate {
    valid_from: DateTime<Utc>,
    valid_to: DateTime<Utc>,
    value_inc_vat: f64,
}

impl TariffClient {
    pub fn new(cfg: &TariffConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("home-battery-controller/0.3"),
        );
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            url: cfg.unit_rates_url(),
            deadline: Duration::from_secs(cfg.fetch_deadline_secs),
        })
    }

    /// Fetch all published rates from midnight (UTC) today onward. Bounded
    /// retry with exponential backoff under a hard overall deadline.
    /// Malformed entries are skipped with a warning; the batch continues.
    pub async fn fetch_rates(&self, now: DateTime<Utc>) -> Result<Vec<TariffRate>> {
        let page = tokio::time::timeout(self.deadline, self.fetch_with_retry())
            .await
            .context("tariff fetch deadline exceeded")??;

        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight exists")
            .and_utc();

        let mut rates = Vec::with_capacity(page.results.len());
        let mut skipped = 0usize;
        for entry in page.results {
            match serde_json::from_value::<RawRate>(entry) {
                Ok(raw) if raw.valid_to > raw.valid_from && raw.value_inc_vat.is_finite() => {
                    if raw.valid_from >= midnight {
                        rates.push(TariffRate {
                            valid_from: raw.valid_from,
                            valid_to: raw.valid_to,
                            unit_price_pence: raw.value_inc_vat,
                        });
                    }
                }
                Ok(raw) => {
                    skipped += 1;
                    warn!(valid_from = %raw.valid_from, "skipping rate with invalid window or price");
                }
                Err(e) => {
                    skipped += 1;
                    warn!(error = %e, "skipping malformed rate entry");
                }
            }
        }

        rates.sort_by_key(|r| r.valid_from);
        info!(
            fetched = rates.len(),
            skipped,
            "tariff rates fetched"
        );
        Ok(rates)
    }

    async fn fetch_with_retry(&self) -> Result<UnitRatesPage> {
        let mut backoff = Duration::from_millis(INITIAL_BACKOFF_MS);
        let mut last_err = None;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.fetch_once().await {
                Ok(page) => return Ok(page),
                Err(e) => {
                    warn!(error = %e, attempt, "tariff fetch attempt failed");
                    last_err = Some(e);
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        Err(last_err.expect("at least one attempt ran"))
    }

    async fn fetch_once(&self) -> Result<UnitRatesPage> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .context("tariff GET failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("tariff API error: HTTP {status}: {body}");
        }
        resp.json::<UnitRatesPage>()
            .await
            .context("tariff JSON parse failed")
    }
}
