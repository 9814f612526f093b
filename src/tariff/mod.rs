pub mod classify;
pub mod client;

pub use classify::{classification_for, thresholds, window_stats, Thresholds};
pub use client::TariffClient;
