//! Indicator engine
//!
//! Derives technical features from an OHLCV series:
//! - Fast/slow simple moving averages of close
//! - RSI over simple rolling means of gains and losses
//! - MACD line (fast EMA - slow EMA, seeded by the first close)
//! - Bollinger bands (population standard deviation)
//! - Volume moving average
//!
//! Every value at row `i` uses bars `0..=i` only. Rows whose windows are not yet
//! full are dropped, so each surviving row is fully defined.

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::IndicatorConfig;
use crate::error::{ForecastError, Result};
use crate::types::PriceBar;

/// Divisor substituted for a zero average loss
const RSI_EPSILON: f64 = 1e-10;

/// A price bar with its indicator values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub bar: PriceBar,
    pub sma_fast: f64,
    pub sma_slow: f64,
    pub rsi: f64,
    pub macd: f64,
    pub bb_upper: f64,
    pub bb_lower: f64,
    pub volume_sma: f64,
}

impl FeatureRow {
    pub fn date(&self) -> NaiveDate {
        self.bar.date
    }

    pub fn close(&self) -> f64 {
        self.bar.close
    }

    /// Model inputs in column order (date and close excluded)
    pub fn feature_vector(&self) -> Vec<f64> {
        vec![
            self.bar.open,
            self.bar.high,
            self.bar.low,
            self.bar.volume,
            self.sma_fast,
            self.sma_slow,
            self.rsi,
            self.macd,
            self.bb_upper,
            self.bb_lower,
            self.volume_sma,
        ]
    }
}

/// Chronologically ordered feature rows plus their column names
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureTable {
    columns: Vec<String>,
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn new(columns: Vec<String>, rows: Vec<FeatureRow>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last_row(&self) -> Option<&FeatureRow> {
        self.rows.last()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.date())
    }

    pub fn closes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.close()).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date()).collect()
    }

    /// One feature vector per row
    pub fn feature_matrix(&self) -> Vec<Vec<f64>> {
        self.rows.iter().map(|r| r.feature_vector()).collect()
    }
}

/// Builds feature tables from price history
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    config: IndicatorConfig,
}

impl IndicatorEngine {
    pub fn new(config: IndicatorConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(IndicatorConfig::default())
    }

    /// Bars needed for the first fully defined row
    pub fn min_bars(&self) -> usize {
        self.config.max_window()
    }

    /// Column names matching `FeatureRow::feature_vector`
    pub fn column_names(&self) -> Vec<String> {
        let c = &self.config;
        vec![
            "open".to_string(),
            "high".to_string(),
            "low".to_string(),
            "volume".to_string(),
            format!("sma_{}", c.sma_fast),
            format!("sma_{}", c.sma_slow),
            format!("rsi_{}", c.rsi_period),
            "macd".to_string(),
            "bb_upper".to_string(),
            "bb_lower".to_string(),
            format!("volume_sma_{}", c.volume_period),
        ]
    }

    /// Compute indicators and drop warm-up rows
    pub fn build(&self, bars: &[PriceBar]) -> Result<FeatureTable> {
        let required = self.min_bars();
        if bars.len() < required {
            return Err(ForecastError::InsufficientHistory {
                required,
                actual: bars.len(),
            });
        }

        let c = &self.config;
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

        let sma_fast = sma(&closes, c.sma_fast);
        let sma_slow = sma(&closes, c.sma_slow);
        let rsi_values = rsi(&closes, c.rsi_period);
        let macd_values = macd(&closes, c.macd_fast, c.macd_slow);
        let bb_mid = sma(&closes, c.bollinger_period);
        let bb_std = rolling_std(&closes, c.bollinger_period);
        let volume_sma = sma(&volumes, c.volume_period);

        let rows: Vec<FeatureRow> = bars
            .iter()
            .enumerate()
            .filter_map(|(i, bar)| {
                let mid = bb_mid[i]?;
                let std = bb_std[i]?;
                Some(FeatureRow {
                    bar: *bar,
                    sma_fast: sma_fast[i]?,
                    sma_slow: sma_slow[i]?,
                    rsi: rsi_values[i]?,
                    macd: macd_values[i],
                    bb_upper: mid + c.bollinger_k * std,
                    bb_lower: mid - c.bollinger_k * std,
                    volume_sma: volume_sma[i]?,
                })
            })
            .collect();

        tracing::debug!(
            "Built {} feature rows from {} bars (warm-up {})",
            rows.len(),
            bars.len(),
            required - 1
        );

        Ok(FeatureTable::new(self.column_names(), rows))
    }
}

/// Simple moving average; `None` until the window is full
pub fn sma(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }

    let mut sum: f64 = values[..window].iter().sum();
    out[window - 1] = Some(sum / window as f64);
    for i in window..values.len() {
        sum += values[i] - values[i - window];
        out[i] = Some(sum / window as f64);
    }
    out
}

/// Rolling population standard deviation
pub fn rolling_std(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 {
        return out;
    }

    for i in (window - 1)..values.len() {
        let slice = &values[i + 1 - window..=i];
        let mean = slice.iter().sum::<f64>() / window as f64;
        let variance = slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / window as f64;
        out[i] = Some(variance.sqrt());
    }
    out
}

/// Recursive EMA with smoothing `2 / (span + 1)`, seeded by the first value
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let Some(&first) = values.first() else {
        return out;
    };

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut current = first;
    out.push(current);
    for value in &values[1..] {
        current = alpha * value + (1.0 - alpha) * current;
        out.push(current);
    }
    out
}

/// MACD line: fast EMA minus slow EMA
pub fn macd(values: &[f64], fast: usize, slow: usize) -> Vec<f64> {
    ema(values, fast)
        .into_iter()
        .zip(ema(values, slow))
        .map(|(f, s)| f - s)
        .collect()
}

/// RSI from simple rolling means of gains and losses over `period` deltas
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    for i in period..closes.len() {
        // deltas[j] is the move into bar j + 1
        let window = &deltas[i - period..i];
        let avg_gain = window.iter().filter(|d| **d > 0.0).sum::<f64>() / period as f64;
        let avg_loss = -window.iter().filter(|d| **d < 0.0).sum::<f64>() / period as f64;
        out[i] = Some(rsi_from_averages(avg_gain, avg_loss));
    }
    out
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    let rs = if avg_loss > 0.0 {
        avg_gain / avg_loss
    } else {
        // no losses in the window: epsilon divisor, saturates just under 100
        avg_gain.max(1.0) / RSI_EPSILON
    };
    100.0 - 100.0 / (1.0 + rs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn bars_from_closes(closes: &[f64]) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PriceBar {
                date: start + Duration::days(i as i64),
                open: close - 0.5,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1_000_000.0 + (i as f64 * 1_000.0),
            })
            .collect()
    }

    fn wavy(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.05)
            .collect()
    }

    #[test]
    fn test_table_length_drops_warmup() {
        let engine = IndicatorEngine::with_defaults();
        for n in [70, 100, 253] {
            let table = engine.build(&bars_from_closes(&wavy(n))).unwrap();
            assert_eq!(table.len(), n - 49);
        }
    }

    #[test]
    fn test_rsi_bounds() {
        let engine = IndicatorEngine::with_defaults();
        let table = engine.build(&bars_from_closes(&wavy(150))).unwrap();
        for row in table.rows() {
            assert!(row.rsi >= 0.0 && row.rsi <= 100.0, "rsi out of range: {}", row.rsi);
        }
    }

    #[test]
    fn test_dates_increase() {
        let engine = IndicatorEngine::with_defaults();
        let table = engine.build(&bars_from_closes(&wavy(80))).unwrap();
        let dates = table.dates();
        assert!(dates.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(2024, 2, 19).unwrap());
    }

    #[test]
    fn test_idempotent() {
        let engine = IndicatorEngine::with_defaults();
        let bars = bars_from_closes(&wavy(90));
        assert_eq!(engine.build(&bars).unwrap(), engine.build(&bars).unwrap());
    }

    #[test]
    fn test_no_look_ahead() {
        let engine = IndicatorEngine::with_defaults();
        let mut closes = wavy(90);
        let before = engine.build(&bars_from_closes(&closes)).unwrap();

        closes[89] = 500.0;
        let after = engine.build(&bars_from_closes(&closes)).unwrap();

        let n = before.len();
        assert_eq!(before.rows()[..n - 1], after.rows()[..n - 1]);
        assert_ne!(before.rows()[n - 1], after.rows()[n - 1]);
    }

    #[test]
    fn test_constant_series_rsi_is_finite() {
        let engine = IndicatorEngine::with_defaults();
        let table = engine.build(&bars_from_closes(&[100.0; 80])).unwrap();
        for row in table.rows() {
            assert!(row.rsi.is_finite());
            assert!(row.rsi > 99.0);
            assert_eq!(row.bb_upper, row.bb_lower);
            assert!(row.macd.abs() < 1e-12);
        }
    }

    #[test]
    fn test_insufficient_history() {
        let engine = IndicatorEngine::with_defaults();
        let err = engine.build(&bars_from_closes(&wavy(49))).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::InsufficientHistory { required: 50, actual: 49 }
        ));
    }

    #[test]
    fn test_sma_values() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let out = sma(&values, 3);
        assert_eq!(out, vec![None, None, Some(2.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn test_ema_seeded_by_first_value() {
        let values = vec![10.0, 20.0];
        let out = ema(&values, 3);
        assert_eq!(out[0], 10.0);
        assert!((out[1] - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_rsi_trend_direction() {
        let up: Vec<f64> = (0..20).map(|i| 100.0 + i as f64 + (i % 3) as f64 * 0.5).collect();
        let down: Vec<f64> = up.iter().rev().cloned().collect();
        let rsi_up = rsi(&up, 14)[19].unwrap();
        let rsi_down = rsi(&down, 14)[19].unwrap();
        assert!(rsi_up > 50.0);
        assert!(rsi_down < 50.0);
    }

    #[test]
    fn test_bollinger_symmetric_about_sma() {
        let engine = IndicatorEngine::with_defaults();
        let table = engine.build(&bars_from_closes(&wavy(75))).unwrap();
        for row in table.rows() {
            let mid = (row.bb_upper + row.bb_lower) / 2.0;
            assert!((mid - row.sma_fast).abs() < 1e-9);
        }
    }

    #[test]
    fn test_column_names_match_vector() {
        let engine = IndicatorEngine::with_defaults();
        let table = engine.build(&bars_from_closes(&wavy(60))).unwrap();
        assert_eq!(table.columns().len(), table.rows()[0].feature_vector().len());
        assert_eq!(table.columns()[10], "volume_sma_20");
    }
}
