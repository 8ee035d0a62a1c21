//! Configuration loading
//!
//! Layers serde defaults, an optional TOML file and `FORECAST__*` environment
//! variables (e.g. `FORECAST__PIPELINE__HORIZON=10`).

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub indicators: IndicatorConfig,
    pub arima: ArimaConfig,
    pub seasonal: SeasonalConfig,
    pub boosting: BoostingConfig,
    pub recurrent: RecurrentConfig,
    pub rollout: RolloutConfig,
    pub ensemble: EnsembleConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file (optional) and the environment
    pub fn load(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let expanded = shellexpand::tilde(path).into_owned();
        let settings = config::Config::builder()
            .add_source(config::File::from(Path::new(&expanded)).required(false))
            .add_source(
                config::Environment::with_prefix("FORECAST")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

/// Request-level pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Default forecast horizon in trading days
    pub horizon: usize,
    /// Longest horizon a request may ask for
    pub max_horizon: usize,
    /// Feature rows required beyond the indicator warm-up
    pub min_training_rows: usize,
    /// Whole-pipeline timeout
    pub timeout_secs: Option<u64>,
    /// Run forecasters on blocking worker threads concurrently
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            horizon: 30,
            max_horizon: 365,
            min_training_rows: 20,
            timeout_secs: None,
            parallel: true,
        }
    }
}

/// Indicator window sizes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub sma_fast: usize,
    pub sma_slow: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub bollinger_period: usize,
    pub bollinger_k: f64,
    pub volume_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            sma_fast: 20,
            sma_slow: 50,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            bollinger_period: 20,
            bollinger_k: 2.0,
            volume_period: 20,
        }
    }
}

impl IndicatorConfig {
    /// Longest rolling window; rows before it fills are dropped
    pub fn max_window(&self) -> usize {
        self.sma_fast
            .max(self.sma_slow)
            .max(self.rsi_period + 1)
            .max(self.bollinger_period)
            .max(self.volume_period)
    }
}

/// ARIMA(p, d, 0) order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArimaConfig {
    pub p: usize,
    pub d: usize,
    pub include_constant: bool,
}

impl Default for ArimaConfig {
    fn default() -> Self {
        Self {
            p: 5,
            d: 1,
            include_constant: false,
        }
    }
}

/// Additive trend + seasonality model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonalConfig {
    /// Fourier order of the weekly component
    pub weekly_order: usize,
    /// Fourier order of the yearly component
    pub yearly_order: usize,
    pub n_changepoints: usize,
    /// Share of history in which changepoints are placed
    pub changepoint_range: f64,
    pub changepoint_penalty: f64,
    pub seasonality_penalty: f64,
}

impl Default for SeasonalConfig {
    fn default() -> Self {
        Self {
            weekly_order: 3,
            yearly_order: 10,
            n_changepoints: 25,
            changepoint_range: 0.8,
            changepoint_penalty: 10.0,
            seasonality_penalty: 0.01,
        }
    }
}

/// Gradient-boosted tree ensemble settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// L2 penalty on leaf weights
    pub lambda: f64,
    /// Row sampling ratio per tree
    pub subsample: f64,
    pub seed: u64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_samples_leaf: 1,
            lambda: 1.0,
            subsample: 1.0,
            seed: 42,
        }
    }
}

/// Recurrent network settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecurrentConfig {
    pub hidden_size: usize,
    pub layers: usize,
    /// Timesteps per training sample
    pub sequence_length: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for RecurrentConfig {
    fn default() -> Self {
        Self {
            hidden_size: 50,
            layers: 2,
            sequence_length: 1,
            epochs: 10,
            batch_size: 32,
            learning_rate: 0.001,
            seed: 42,
        }
    }
}

/// How the last feature vector is carried forward between forecast steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutPolicy {
    /// Shift every slot left by one and write the prediction into the last slot
    ShiftAppend,
    /// Keep slots in place and overwrite only the last slot
    OverwriteLast,
}

/// Autoregressive rollout settings shared by the tree and recurrent forecasters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    pub policy: RolloutPolicy,
    /// Multiplier applied to the sentiment score before nudging the last slot
    pub sentiment_nudge: f64,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            policy: RolloutPolicy::ShiftAppend,
            sentiment_nudge: 0.05,
        }
    }
}

/// Blending policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleMethod {
    /// Unweighted mean, confidence from cross-model dispersion
    Variance,
    /// Fixed weights, constant confidence
    FixedWeights,
}

/// Ensemble combiner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub method: EnsembleMethod,
    /// Weights in model order: arima, seasonal, boosting, recurrent
    pub weights: [f64; 4],
    pub fixed_confidence: f64,
    pub sentiment_coefficient: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            method: EnsembleMethod::Variance,
            weights: [0.2, 0.3, 0.3, 0.2],
            fixed_confidence: 0.05,
            sentiment_coefficient: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
