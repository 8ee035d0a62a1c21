//! Price history input
//!
//! The market-data fetch itself lives outside the core; this module defines the
//! seam (`PriceSource`), a JSON-file implementation used by the CLI, and the
//! checks every history must pass before feature engineering.

use crate::error::{ForecastError, Result};
use crate::types::{PriceBar, SentimentScore};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

/// Supplier of chronologically ordered daily bars for a symbol
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self, symbol: &str) -> Result<Vec<PriceBar>>;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Reads a JSON array of bars from disk
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PriceSource for JsonFileSource {
    async fn fetch(&self, symbol: &str) -> Result<Vec<PriceBar>> {
        tracing::debug!("Loading {} history from {}", symbol, self.path.display());
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let mut bars: Vec<PriceBar> = serde_json::from_str(&raw)?;
        bars.sort_by_key(|b| b.date);
        validate_history(&bars)?;
        tracing::info!("Loaded {} bars for {}", bars.len(), symbol);
        Ok(bars)
    }

    fn name(&self) -> &str {
        "json_file"
    }
}

/// Check the input contract: strictly increasing dates, finite positive prices,
/// non-negative volume
pub fn validate_history(bars: &[PriceBar]) -> Result<()> {
    for (i, bar) in bars.iter().enumerate() {
        let prices = [bar.open, bar.high, bar.low, bar.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(ForecastError::InvalidInput(format!(
                "bar {} has a non-positive or non-finite price",
                bar.date
            )));
        }
        if !bar.volume.is_finite() || bar.volume < 0.0 {
            return Err(ForecastError::InvalidInput(format!(
                "bar {} has an invalid volume",
                bar.date
            )));
        }
        if i > 0 && bars[i - 1].date >= bar.date {
            return Err(ForecastError::InvalidInput(format!(
                "bars out of order or duplicated at {}",
                bar.date
            )));
        }
    }
    Ok(())
}

/// Classifier output for one headline
#[derive(Debug, Clone, Deserialize)]
pub struct HeadlineSentiment {
    pub label: String,
    pub score: f64,
}

/// Mean signed score: positive labels count `+score`, anything else `-score`
pub fn aggregate_sentiment(headlines: &[HeadlineSentiment]) -> Result<SentimentScore> {
    if headlines.is_empty() {
        return Ok(SentimentScore::NEUTRAL);
    }

    let total: f64 = headlines
        .iter()
        .map(|h| {
            if h.label.eq_ignore_ascii_case("positive") {
                h.score
            } else {
                -h.score
            }
        })
        .sum();

    SentimentScore::new(total / headlines.len() as f64)
}
