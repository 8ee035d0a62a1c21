//! Ensemble Combiner
//!
//! Blends the surviving per-model series index by index:
//! - `Variance`: unweighted mean; confidence `1 - std/|mean| + sentiment * coefficient`
//! - `FixedWeights`: configured weights renormalised over the survivors,
//!   constant confidence
//!
//! Confidence is always clamped to [0, 1]. Sentiment never moves the price.

use chrono::NaiveDate;

use crate::config::{EnsembleConfig, EnsembleMethod};
use crate::error::{ForecastError, Result};
use crate::types::{ForecastPoint, ForecastSeries, ModelKind, SentimentScore};

#[derive(Debug, Clone, Default)]
pub struct EnsembleCombiner {
    config: EnsembleConfig,
}

impl EnsembleCombiner {
    pub fn new(config: EnsembleConfig) -> Self {
        Self { config }
    }

    /// Combine per-model forecasts aligned with `dates`
    pub fn combine(
        &self,
        forecasts: &[(ModelKind, Vec<f64>)],
        dates: &[NaiveDate],
        sentiment: SentimentScore,
    ) -> Result<ForecastSeries> {
        if forecasts.is_empty() {
            return Err(ForecastError::InvalidInput("no forecasts to combine".to_string()));
        }
        if let Some((kind, series)) = forecasts.iter().find(|(_, s)| s.len() != dates.len()) {
            return Err(ForecastError::InvalidInput(format!(
                "{} forecast has {} points, expected {}",
                kind,
                series.len(),
                dates.len()
            )));
        }

        let points = match self.config.method {
            EnsembleMethod::Variance => self.variance_blend(forecasts, dates, sentiment),
            EnsembleMethod::FixedWeights => self.weighted_blend(forecasts, dates)?,
        };
        Ok(ForecastSeries { points })
    }

    fn variance_blend(
        &self,
        forecasts: &[(ModelKind, Vec<f64>)],
        dates: &[NaiveDate],
        sentiment: SentimentScore,
    ) -> Vec<ForecastPoint> {
        let count = forecasts.len() as f64;
        let shift = sentiment.value() * self.config.sentiment_coefficient;

        dates
            .iter()
            .enumerate()
            .map(|(k, &date)| {
                let mean = forecasts.iter().map(|(_, s)| s[k]).sum::<f64>() / count;
                let variance =
                    forecasts.iter().map(|(_, s)| (s[k] - mean).powi(2)).sum::<f64>() / count;
                let std = variance.sqrt();
                let base = if mean != 0.0 {
                    1.0 - std / mean.abs()
                } else if std == 0.0 {
                    1.0
                } else {
                    0.0
                };
                ForecastPoint {
                    date,
                    predicted_price: mean,
                    confidence: clamp_unit(base + shift),
                }
            })
            .collect()
    }

    fn weighted_blend(
        &self,
        forecasts: &[(ModelKind, Vec<f64>)],
        dates: &[NaiveDate],
    ) -> Result<Vec<ForecastPoint>> {
        let weights = &self.config.weights;
        let total: f64 = forecasts.iter().map(|(kind, _)| weights[kind.index()]).sum();
        if total.is_nan() || total <= 0.0 {
            return Err(ForecastError::InvalidInput(
                "surviving models have no positive weight".to_string(),
            ));
        }

        let confidence = clamp_unit(self.config.fixed_confidence);
        Ok(dates
            .iter()
            .enumerate()
            .map(|(k, &date)| ForecastPoint {
                date,
                predicted_price: forecasts
                    .iter()
                    .map(|(kind, s)| weights[kind.index()] * s[k])
                    .sum::<f64>()
                    / total,
                confidence,
            })
            .collect())
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
