//! Forecasting models
//!
//! Provides the numeric core of the pipeline:
//! - Indicator engine turning price bars into feature rows
//! - Four independent forecasters (ARIMA, additive seasonal, boosted trees, LSTM)
//! - Ensemble combination with a dispersion-based confidence
//! - TreeSHAP attribution for the boosted trees

pub mod arima;
pub mod attribution;
pub mod boosting;
pub mod ensemble;
pub mod forecaster;
pub mod indicators;
pub mod linalg;
pub mod recurrent;
pub mod scaler;
pub mod seasonal;

#[cfg(test)]
pub(crate) mod testing;
#[cfg(test)]
mod tests;

pub use arima::{ArimaForecaster, ArimaModel};
pub use attribution::AttributionEngine;
pub use boosting::{BoostingForecaster, GradientBoostedTrees};
pub use ensemble::EnsembleCombiner;
pub use forecaster::{check_series, FeatureRollout, ForecastContext, Forecaster};
pub use indicators::{FeatureRow, FeatureTable, IndicatorEngine};
pub use recurrent::{LstmNetwork, RecurrentForecaster};
pub use seasonal::{SeasonalForecaster, SeasonalModel};

use std::sync::Arc;

use crate::config::Config;

/// The four default forecasters, in blending order
pub fn default_forecasters(config: &Config) -> Vec<Arc<dyn Forecaster>> {
    vec![
        Arc::new(ArimaForecaster::new(config.arima.clone())),
        Arc::new(SeasonalForecaster::new(config.seasonal.clone())),
        Arc::new(BoostingForecaster::new(config.boosting.clone(), config.rollout.clone())),
        Arc::new(RecurrentForecaster::new(config.recurrent.clone(), config.rollout.clone())),
    ]
}
