//! Core data types shared across the pipeline

use crate::error::{ForecastError, ModelFailure, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

/// One daily OHLCV bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// News sentiment in the canonical range [-1, 1]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize)]
pub struct SentimentScore(f64);

impl SentimentScore {
    pub const NEUTRAL: SentimentScore = SentimentScore(0.0);

    /// Validate a raw score; values outside [-1, 1] are rejected, not clamped
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() || !(-1.0..=1.0).contains(&value) {
            return Err(ForecastError::InvalidInput(format!(
                "sentiment score {} outside [-1, 1]",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

/// The four forecasters, in blending order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Arima,
    Seasonal,
    Boosting,
    Recurrent,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Arima,
        ModelKind::Seasonal,
        ModelKind::Boosting,
        ModelKind::Recurrent,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Arima => "arima",
            ModelKind::Seasonal => "seasonal",
            ModelKind::Boosting => "boosting",
            ModelKind::Recurrent => "recurrent",
        }
    }

    /// Position in the fixed-weight table
    pub fn index(&self) -> usize {
        match self {
            ModelKind::Arima => 0,
            ModelKind::Seasonal => 1,
            ModelKind::Boosting => 2,
            ModelKind::Recurrent => 3,
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single forecast day
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub predicted_price: f64,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

/// Horizon-length forecast from one forecaster or the combiner
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ForecastSeries {
    pub points: Vec<ForecastPoint>,
}

impl ForecastSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.predicted_price).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    /// Serialisable records, rounded for the API layer
    pub fn to_records(&self) -> Vec<PredictionRecord> {
        self.points
            .iter()
            .map(|p| PredictionRecord {
                date: p.date.format("%Y-%m-%d").to_string(),
                pred: round_dp(p.predicted_price, 2),
                conf: round_dp(p.confidence, 2),
            })
            .collect()
    }
}

/// Signed contribution of one feature to the latest tree prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributionItem {
    pub feature_name: String,
    pub contribution: f64,
}

impl AttributionItem {
    pub fn to_record(&self) -> AttributionRecord {
        AttributionRecord {
            feature: self.feature_name.clone(),
            value: round_dp(self.contribution, 4),
        }
    }
}

/// `{date, pred, conf}` output record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub date: String,
    pub pred: f64,
    pub conf: f64,
}

/// `{feature, value}` output record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionRecord {
    pub feature: String,
    pub value: f64,
}

/// Whether every forecaster contributed to the blend
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineStatus {
    Complete,
    Degraded { failed: Vec<ModelFailure> },
}

impl PipelineStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, PipelineStatus::Complete)
    }
}

/// Structured output of one forecasting request
#[derive(Debug, Clone, Serialize)]
pub struct ForecastReport {
    pub symbol: String,
    pub horizon: usize,
    pub sentiment: f64,
    pub predictions: Vec<PredictionRecord>,
    pub shap: Vec<AttributionRecord>,
    pub status: PipelineStatus,
}

/// Round half-to-even at `dp` decimal places; non-finite values pass through
pub fn round_dp(value: f64, dp: u32) -> f64 {
    Decimal::from_f64(value)
        .and_then(|d| d.round_dp(dp).to_f64())
        .unwrap_or(value)
}

/// The next `horizon` trading days (weekdays) strictly after `last`.
///
/// Stops early if the calendar runs out, so callers compare the length.
pub fn trading_days_after(last: NaiveDate, horizon: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut current = last;
    while dates.len() < horizon {
        let Some(next) = current.checked_add_signed(Duration::days(1)) else {
            break;
        };
        current = next;
        if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(current);
        }
    }
    dates
}
