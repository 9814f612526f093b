use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bucket assigned to each half-hourly price by the percentile classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceClass {
    Negative,
    Cheap,
    Normal,
    Expensive,
}

impl PriceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceClass::Negative => "negative",
            PriceClass::Cheap => "cheap",
            PriceClass::Normal => "normal",
            PriceClass::Expensive => "expensive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "negative" => Some(PriceClass::Negative),
            "cheap" => Some(PriceClass::Cheap),
            "normal" => Some(PriceClass::Normal),
            "expensive" => Some(PriceClass::Expensive),
            _ => None,
        }
    }
}

/// A raw half-hourly unit rate as fetched from the tariff API, before
/// classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TariffRate {
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub unit_price_pence: f64,
}

/// A stored half-hourly price with its derived classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub unit_price_pence: f64,
    pub classification: PriceClass,
}

/// Derived statistics over a price window. Never stored as primary truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceWindowStats {
    pub min_pence: f64,
    pub max_pence: f64,
    pub mean_pence: f64,
    pub median_pence: f64,
    pub cheap_threshold_pence: f64,
    pub expensive_threshold_pence: f64,
    pub negative_count: usize,
    pub cheap_count: usize,
    pub normal_count: usize,
    pub expensive_count: usize,
    pub total_periods: usize,
    pub coverage_hours: f64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}
