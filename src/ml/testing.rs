//! Synthetic price histories shared by model tests

use crate::ml::indicators::{FeatureTable, IndicatorEngine};
use crate::types::{trading_days_after, PriceBar};
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Weekday bars starting 2024-01-01 with the given closes
pub fn bars_from_closes(closes: &[f64]) -> Vec<PriceBar> {
    let start = NaiveDate::from_ymd_opt(2023, 12, 29).unwrap();
    trading_days_after(start, closes.len())
        .into_iter()
        .zip(closes)
        .enumerate()
        .map(|(i, (date, &close))| PriceBar {
            date,
            open: close - 0.4,
            high: close + 1.2,
            low: close - 1.1,
            close,
            volume: 1_000_000.0 + (i as f64 * 0.7).sin() * 50_000.0,
        })
        .collect()
}

/// Drifting sine wave around 100 with seeded noise
pub fn wavy_closes(n: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(17);
    (0..n)
        .map(|i| {
            100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.05 + rng.random_range(-0.5..0.5)
        })
        .collect()
}

pub fn sample_bars(n: usize) -> Vec<PriceBar> {
    bars_from_closes(&wavy_closes(n))
}

/// Default-indicator table over `n` synthetic bars (`n - 49` rows)
pub fn sample_table(n: usize) -> FeatureTable {
    IndicatorEngine::with_defaults()
        .build(&sample_bars(n))
        .unwrap()
}
