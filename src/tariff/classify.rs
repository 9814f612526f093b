//! Percentile classification of half-hourly unit prices.
//!
//! Thresholds are computed over the non-negative subset of the look-ahead
//! window; negative prices form their own bucket. The percentile is a
//! deterministic nearest-rank pick so reclassifying a window twice always
//! yields the same result.

use chrono::{DateTime, Utc};

use crate::domain::{PriceClass, PricePoint, PriceWindowStats};

const CHEAP_PERCENTILE: f64 = 0.33;
const EXPENSIVE_PERCENTILE: f64 = 0.67;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub cheap_pence: f64,
    pub expensive_pence: f64,
}

/// Nearest-rank percentile over an already-sorted slice.
fn percentile(sorted: &[f64], fraction: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let index = ((sorted.len() - 1) as f64 * fraction).round() as usize;
    sorted[index.min(sorted.len() - 1)]
}

/// Cheap/expensive thresholds for a window of prices. `None` when the window
/// holds no non-negative prices to rank.
pub fn thresholds(prices_pence: &[f64]) -> Option<Thresholds> {
    let mut non_negative: Vec<f64> = prices_pence
        .iter()
        .copied()
        .filter(|p| *p >= 0.0 && p.is_finite())
        .collect();
    if non_negative.is_empty() {
        return None;
    }
    non_negative.sort_by(|a, b| a.partial_cmp(b).expect("finite prices"));

    Some(Thresholds {
        cheap_pence: percentile(&non_negative, CHEAP_PERCENTILE),
        expensive_pence: percentile(&non_negative, EXPENSIVE_PERCENTILE),
    })
}

/// Bucket for a single price given the window thresholds.
pub fn classification_for(price_pence: f64, thresholds: Option<Thresholds>) -> PriceClass {
    if price_pence < 0.0 {
        return PriceClass::Negative;
    }
    match thresholds {
        Some(t) if price_pence <= t.cheap_pence => PriceClass::Cheap,
        Some(t) if price_pence >= t.expensive_pence => PriceClass::Expensive,
        _ => PriceClass::Normal,
    }
}

/// Statistics over a classified window. `None` when the window holds no
/// finite prices.
pub fn window_stats(points: &[PricePoint]) -> Option<PriceWindowStats> {
    let mut values: Vec<f64> = points
        .iter()
        .map(|p| p.unit_price_pence)
        .filter(|p| p.is_finite())
        .collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).expect("finite prices"));

    let t = thresholds(&values);
    let count = |class: PriceClass| points.iter().filter(|p| p.classification == class).count();

    let window_start: DateTime<Utc> = points.iter().map(|p| p.valid_from).min()?;
    let window_end: DateTime<Utc> = points.iter().map(|p| p.valid_to).max()?;

    Some(PriceWindowStats {
        min_pence: values[0],
        max_pence: values[values.len() - 1],
        mean_pence: values.iter().sum::<f64>() / values.len() as f64,
        median_pence: values[values.len() / 2],
        cheap_threshold_pence: t.map(|t| t.cheap_pence).unwrap_or(0.0),
        expensive_threshold_pence: t.map(|t| t.expensive_pence).unwrap_or(0.0),
        negative_count: count(PriceClass::Negative),
        cheap_count: count(PriceClass::Cheap),
        normal_count: count(PriceClass::Normal),
        expensive_count: count(PriceClass::Expensive),
        total_periods: points.len(),
        coverage_hours: points.len() as f64 * 0.5,
        window_start,
        window_end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn points(prices: &[f64]) -> Vec<PricePoint> {
        let start = Utc.with_ymd_and_hms(2025, 6, 4, 0, 0, 0).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let valid_from = start + Duration::minutes(30 * i as i64);
                PricePoint {
                    valid_from,
                    valid_to: valid_from + Duration::minutes(30),
                    unit_price_pence: p,
                    classification: classification_for(p, thresholds(prices)),
                }
            })
            .collect()
    }

    #[test]
    fn negative_prices_are_their_own_bucket() {
        let t = thresholds(&[-2.0, -1.0, 5.0, 10.0, 20.0]);
        assert_eq!(classification_for(-2.0, t), PriceClass::Negative);
        // Thresholds ignore the negative subset entirely.
        let t = t.unwrap();
        assert!(t.cheap_pence >= 5.0);
    }

    #[test]
    fn buckets_split_at_the_percentile_thresholds() {
        let prices = [2.0, 4.0, 10.0, 12.0, 20.0, 30.0];
        let t = thresholds(&prices).unwrap();
        assert!(classification_for(prices[0], Some(t)) == PriceClass::Cheap);
        assert!(classification_for(prices[5], Some(t)) == PriceClass::Expensive);
        // A value strictly between the thresholds is normal.
        let mid = (t.cheap_pence + t.expensive_pence) / 2.0;
        assert_eq!(classification_for(mid, Some(t)), PriceClass::Normal);
    }

    #[test]
    fn classification_is_idempotent() {
        let prices = [-1.5, 3.0, 7.0, 11.0, 24.0, 31.0, 8.0, 8.0];
        let first = points(&prices);
        let t = thresholds(&prices);
        for p in &first {
            assert_eq!(
                classification_for(p.unit_price_pence, t),
                p.classification,
                "reclassification changed {}p",
                p.unit_price_pence
            );
        }
    }

    #[test]
    fn all_negative_window_has_no_thresholds() {
        assert!(thresholds(&[-5.0, -1.0]).is_none());
        assert_eq!(classification_for(-1.0, None), PriceClass::Negative);
    }

    #[test]
    fn stats_count_every_bucket() {
        let prices = [-2.0, 1.0, 5.0, 9.0, 14.0, 27.0];
        let pts = points(&prices);
        let stats = window_stats(&pts).unwrap();
        assert_eq!(stats.total_periods, 6);
        assert_eq!(stats.negative_count, 1);
        assert_eq!(
            stats.negative_count + stats.cheap_count + stats.normal_count + stats.expensive_count,
            stats.total_periods
        );
        assert_eq!(stats.min_pence, -2.0);
        assert_eq!(stats.max_pence, 27.0);
        assert_eq!(stats.coverage_hours, 3.0);
    }

    #[test]
    fn empty_window_yields_no_stats() {
        assert!(window_stats(&[]).is_none());
    }

    #[test]
    fn non_finite_prices_are_ignored_instead_of_panicking() {
        let mut pts = points(&[4.0, 9.0, 21.0]);
        pts[1].unit_price_pence = f64::NAN;

        let stats = window_stats(&pts).unwrap();
        assert_eq!(stats.min_pence, 4.0);
        assert_eq!(stats.max_pence, 21.0);

        pts.iter_mut().for_each(|p| p.unit_price_pence = f64::INFINITY);
        assert!(window_stats(&pts).is_none());
    }
}
