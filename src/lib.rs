//! Stock Forecast
//!
//! Ensemble price forecasting for a single symbol from daily OHLCV history.
//!
//! ## Architecture
//!
//! ```text
//! PriceSource → IndicatorEngine → FeatureTable ─┬→ ARIMA ──────┐
//!                                               ├→ Seasonal ───┤
//!                                               ├→ Boosting ───┼→ EnsembleCombiner → ForecastSeries
//!                                               ├→ Recurrent ──┘
//!                                               └→ TreeSHAP (boosting) → attribution
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod ml;
pub mod pipeline;
pub mod types;

#[cfg(test)]
mod types_tests;
#[cfg(test)]
mod integration_tests;
