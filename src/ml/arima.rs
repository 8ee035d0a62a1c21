//! Statistical autoregressive forecaster: ARIMA(p, d, 0)
//!
//! The close series is differenced `d` times, AR coefficients are estimated by
//! conditional least squares, and the forecast is built recursively, feeding
//! each step's value back as a lag before integrating back to price levels.

use crate::config::ArimaConfig;
use crate::error::{ForecastError, Result};
use crate::ml::forecaster::{ForecastContext, Forecaster};
use crate::ml::indicators::FeatureTable;
use crate::ml::linalg::{self, LinalgError};
use crate::types::ModelKind;

/// Observations required beyond the AR order
const MIN_EXTRA_OBSERVATIONS: usize = 10;

/// Fitted ARIMA(p, d, 0) model
#[derive(Debug, Clone)]
pub struct ArimaModel {
    pub p: usize,
    pub d: usize,
    /// phi_1..phi_p, lag 1 first
    pub ar_coeffs: Vec<f64>,
    pub constant: f64,
    /// Residual variance
    pub sigma2: f64,
}

impl ArimaModel {
    /// Fit on a univariate series
    pub fn fit(series: &[f64], config: &ArimaConfig) -> Result<Self> {
        let model = ModelKind::Arima.name();
        let (p, d) = (config.p, config.d);

        if series.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::fit(model, "series contains non-finite values"));
        }
        let required = p + d + MIN_EXTRA_OBSERVATIONS;
        if series.len() < required {
            return Err(ForecastError::fit(
                model,
                format!("series too short: need {}, got {}", required, series.len()),
            ));
        }
        if series.windows(2).all(|w| w[0] == w[1]) {
            return Err(ForecastError::fit(model, "constant series"));
        }

        let z = difference(series, d);
        let offset = usize::from(config.include_constant);
        let width = p + offset;

        let mut x = Vec::with_capacity(z.len() - p);
        let mut y = Vec::with_capacity(z.len() - p);
        for t in p..z.len() {
            let mut row = Vec::with_capacity(width);
            if config.include_constant {
                row.push(1.0);
            }
            row.extend((1..=p).map(|lag| z[t - lag]));
            x.push(row);
            y.push(z[t]);
        }

        let beta = linalg::least_squares(&x, &y, &vec![0.0; width]).map_err(|e| match e {
            LinalgError::Singular { .. } => {
                ForecastError::fit(model, "singular normal equations (degenerate series)")
            }
            other => ForecastError::fit(model, other.to_string()),
        })?;

        let constant = if config.include_constant { beta[0] } else { 0.0 };
        let ar_coeffs = beta[offset..].to_vec();

        let residuals: Vec<f64> = x
            .iter()
            .zip(&y)
            .map(|(row, target)| {
                let fitted: f64 = row.iter().zip(&beta).map(|(a, b)| a * b).sum();
                target - fitted
            })
            .collect();
        let sigma2 = residuals.iter().map(|r| r * r).sum::<f64>() / residuals.len() as f64;

        tracing::debug!("ARIMA({},{},0) coefficients {:?}, sigma2 {:.6}", p, d, ar_coeffs, sigma2);

        Ok(Self {
            p,
            d,
            ar_coeffs,
            constant,
            sigma2,
        })
    }

    /// Recursive `horizon`-step forecast continuing `series`
    pub fn forecast(&self, series: &[f64], horizon: usize) -> Vec<f64> {
        // Last value of each differencing level, level 0 = the series itself
        let mut levels = vec![series.to_vec()];
        for k in 0..self.d {
            let next = difference(&levels[k], 1);
            levels.push(next);
        }

        let mut history = levels[self.d].clone();
        let mut forecasts = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let n = history.len();
            let value = self.constant
                + self
                    .ar_coeffs
                    .iter()
                    .enumerate()
                    .map(|(i, phi)| phi * history[n - 1 - i])
                    .sum::<f64>();
            history.push(value);
            forecasts.push(value);
        }

        for k in (0..self.d).rev() {
            let start = levels[k].last().copied().unwrap_or(0.0);
            forecasts = integrate(&forecasts, start);
        }
        forecasts
    }
}

/// Difference a series `d` times
pub fn difference(data: &[f64], d: usize) -> Vec<f64> {
    let mut result = data.to_vec();
    for _ in 0..d {
        if result.len() < 2 {
            return Vec::new();
        }
        result = result.windows(2).map(|w| w[1] - w[0]).collect();
    }
    result
}

/// Cumulative sum starting from `start`
fn integrate(diff: &[f64], start: f64) -> Vec<f64> {
    let mut cumsum = start;
    diff.iter()
        .map(|d| {
            cumsum += d;
            cumsum
        })
        .collect()
}

/// Close-only ARIMA forecaster
#[derive(Debug, Clone, Default)]
pub struct ArimaForecaster {
    config: ArimaConfig,
}

impl ArimaForecaster {
    pub fn new(config: ArimaConfig) -> Self {
        Self { config }
    }
}

impl Forecaster for ArimaForecaster {
    fn kind(&self) -> ModelKind {
        ModelKind::Arima
    }

    fn forecast(&self, table: &FeatureTable, ctx: &ForecastContext) -> Result<Vec<f64>> {
        let closes = table.closes();
        let model = ArimaModel::fit(&closes, &self.config)?;
        Ok(model.forecast(&closes, ctx.horizon))
    }
}
