//! Additive trend + seasonality forecaster
//!
//! `y(t) = trend(t) + weekly(t) + yearly(t)`, fitted by penalised least squares:
//! - trend: piecewise linear, intercept and base slope free, slope changes at
//!   changepoints spread over the first part of history (ridge-penalised)
//! - weekly / yearly: Fourier series in calendar days (ridge-penalised)
//!
//! Time is scaled to [0, 1] over the history and values by their maximum
//! magnitude before fitting. A component is only used when the history spans
//! at least two of its periods. The daily component is flat on daily bars and
//! is not modelled. The fit is closed-form, so results are deterministic.

use chrono::NaiveDate;
use std::f64::consts::PI;

use crate::config::SeasonalConfig;
use crate::error::{ForecastError, Result};
use crate::ml::forecaster::{ForecastContext, Forecaster};
use crate::ml::indicators::FeatureTable;
use crate::ml::linalg;
use crate::types::{trading_days_after, ModelKind};

const WEEK_DAYS: f64 = 7.0;
const YEAR_DAYS: f64 = 365.25;

/// Fitted additive model
#[derive(Debug, Clone)]
pub struct SeasonalModel {
    start: NaiveDate,
    span_days: f64,
    y_scale: f64,
    /// Changepoint locations in scaled time
    changepoints: Vec<f64>,
    weekly_order: usize,
    yearly_order: usize,
    beta: Vec<f64>,
}

impl SeasonalModel {
    /// Fit on (date, value) pairs in chronological order
    pub fn fit(dates: &[NaiveDate], values: &[f64], config: &SeasonalConfig) -> Result<Self> {
        let model = ModelKind::Seasonal.name();
        if dates.len() != values.len() {
            return Err(ForecastError::fit(model, "dates and values differ in length"));
        }
        if dates.len() < 2 {
            return Err(ForecastError::fit(model, "need at least two observations"));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::fit(model, "series contains non-finite values"));
        }

        let start = dates[0];
        let span_days = (dates[dates.len() - 1] - start).num_days() as f64;
        if span_days <= 0.0 {
            return Err(ForecastError::fit(model, "history spans no time"));
        }
        let y_scale = values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        if y_scale == 0.0 {
            return Err(ForecastError::fit(model, "all values are zero"));
        }

        let weekly_order = if span_days >= 2.0 * WEEK_DAYS { config.weekly_order } else { 0 };
        let yearly_order = if span_days >= 2.0 * YEAR_DAYS { config.yearly_order } else { 0 };

        let mut this = Self {
            start,
            span_days,
            y_scale,
            changepoints: Vec::new(),
            weekly_order,
            yearly_order,
            beta: Vec::new(),
        };
        this.changepoints = this.place_changepoints(dates, config);

        let x: Vec<Vec<f64>> = dates.iter().map(|d| this.design_row(*d)).collect();
        let y: Vec<f64> = values.iter().map(|v| v / y_scale).collect();

        let mut penalties = vec![0.0, 0.0];
        penalties.extend(std::iter::repeat(config.changepoint_penalty).take(this.changepoints.len()));
        penalties.extend(
            std::iter::repeat(config.seasonality_penalty).take(2 * (weekly_order + yearly_order)),
        );

        this.beta = linalg::least_squares(&x, &y, &penalties)
            .map_err(|e| ForecastError::fit(model, e.to_string()))?;

        tracing::debug!(
            "Seasonal fit: {} changepoints, weekly order {}, yearly order {}",
            this.changepoints.len(),
            weekly_order,
            yearly_order
        );

        Ok(this)
    }

    /// Modelled values at `dates`
    pub fn predict(&self, dates: &[NaiveDate]) -> Vec<f64> {
        dates
            .iter()
            .map(|d| {
                let row = self.design_row(*d);
                row.iter().zip(&self.beta).map(|(a, b)| a * b).sum::<f64>() * self.y_scale
            })
            .collect()
    }

    fn scaled_time(&self, date: NaiveDate) -> f64 {
        (date - self.start).num_days() as f64 / self.span_days
    }

    /// Evenly spaced over the first `changepoint_range` of the observations
    fn place_changepoints(&self, dates: &[NaiveDate], config: &SeasonalConfig) -> Vec<f64> {
        let cutoff = (config.changepoint_range.clamp(0.0, 1.0) * (dates.len() - 1) as f64).floor() as usize;
        let count = config.n_changepoints.min(cutoff);
        (1..=count)
            .map(|j| {
                let idx = ((j * cutoff) as f64 / count as f64).round() as usize;
                self.scaled_time(dates[idx.min(dates.len() - 1)])
            })
            .collect()
    }

    fn design_row(&self, date: NaiveDate) -> Vec<f64> {
        let t = self.scaled_time(date);
        let days = (date - self.start).num_days() as f64;

        let mut row = Vec::with_capacity(2 + self.changepoints.len() + 2 * (self.weekly_order + self.yearly_order));
        row.push(1.0);
        row.push(t);
        row.extend(self.changepoints.iter().map(|s| (t - s).max(0.0)));
        push_fourier(&mut row, days, WEEK_DAYS, self.weekly_order);
        push_fourier(&mut row, days, YEAR_DAYS, self.yearly_order);
        row
    }
}

fn push_fourier(row: &mut Vec<f64>, days: f64, period: f64, order: usize) {
    for k in 1..=order {
        let angle = 2.0 * PI * k as f64 * days / period;
        row.push(angle.sin());
        row.push(angle.cos());
    }
}

/// Date/close-only additive forecaster
#[derive(Debug, Clone, Default)]
pub struct SeasonalForecaster {
    config: SeasonalConfig,
}

impl SeasonalForecaster {
    pub fn new(config: SeasonalConfig) -> Self {
        Self { config }
    }
}

impl Forecaster for SeasonalForecaster {
    fn kind(&self) -> ModelKind {
        ModelKind::Seasonal
    }

    fn forecast(&self, table: &FeatureTable, ctx: &ForecastContext) -> Result<Vec<f64>> {
        let last = table
            .last_date()
            .ok_or_else(|| ForecastError::fit(self.kind().name(), "empty feature table"))?;
        let model = SeasonalModel::fit(&table.dates(), &table.closes(), &self.config)?;
        Ok(model.predict(&trading_days_after(last, ctx.horizon)))
    }
}
