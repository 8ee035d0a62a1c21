//! Forecaster interface and autoregressive feature rollout
//!
//! Each forecaster is built fresh per request, reads the shared feature table
//! without mutating it, and returns one price per forecast day.
//!
//! Rollout convention for the feature-driven forecasters (tree and recurrent):
//! 1. nudge the last slot by `sentiment * sentiment_nudge`
//! 2. predict the next close from the current vector
//! 3. `ShiftAppend`: shift every slot left by one and write the prediction into
//!    the last slot; `OverwriteLast`: write the prediction into the last slot only
//!
//! Both forecasters roll in raw feature units; the recurrent one scales after.

use crate::config::{RolloutConfig, RolloutPolicy};
use crate::error::{ForecastError, Result};
use crate::ml::indicators::FeatureTable;
use crate::types::{ModelKind, SentimentScore};

/// Per-request forecasting inputs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastContext {
    pub horizon: usize,
    pub sentiment: SentimentScore,
}

/// A model that turns a feature table into a horizon-length price path
#[cfg_attr(test, mockall::automock)]
pub trait Forecaster: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// Fit on `table` and forecast `ctx.horizon` closes
    fn forecast(&self, table: &FeatureTable, ctx: &ForecastContext) -> Result<Vec<f64>>;
}

/// Carries the most recent feature vectors forward one step at a time
#[derive(Debug, Clone)]
pub struct FeatureRollout {
    policy: RolloutPolicy,
    nudge: f64,
}

impl FeatureRollout {
    pub fn new(config: &RolloutConfig, sentiment: SentimentScore) -> Self {
        Self {
            policy: config.policy,
            nudge: sentiment.value() * config.sentiment_nudge,
        }
    }

    /// Apply the sentiment nudge to the last slot
    pub fn prepare(&self, features: &mut [f64]) {
        if let Some(last) = features.last_mut() {
            *last += self.nudge;
        }
    }

    /// Next step's feature vector after predicting `prediction`
    pub fn advance(&self, features: &[f64], prediction: f64) -> Vec<f64> {
        let mut next = features.to_vec();
        if next.is_empty() {
            return next;
        }
        if self.policy == RolloutPolicy::ShiftAppend {
            next.rotate_left(1);
        }
        if let Some(last) = next.last_mut() {
            *last = prediction;
        }
        next
    }

    /// Run `horizon` steps over a window of feature vectors (oldest first).
    ///
    /// `step` sees the whole window and returns the next close. The window keeps
    /// its length: each step appends the advanced vector and drops the oldest.
    pub fn run<F>(
        &self,
        kind: ModelKind,
        mut window: Vec<Vec<f64>>,
        horizon: usize,
        mut step: F,
    ) -> Result<Vec<f64>>
    where
        F: FnMut(&[Vec<f64>]) -> Result<f64>,
    {
        if window.is_empty() {
            return Err(ForecastError::fit(kind.name(), "empty rollout window"));
        }

        let mut predictions = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            if let Some(current) = window.last_mut() {
                self.prepare(current);
            }
            let prediction = step(&window)?;
            if !prediction.is_finite() {
                return Err(ForecastError::fit(kind.name(), "non-finite prediction"));
            }
            predictions.push(prediction);

            let next = match window.last() {
                Some(current) => self.advance(current, prediction),
                None => break,
            };
            window.push(next);
            window.remove(0);
        }
        Ok(predictions)
    }
}

/// Reject series of the wrong length or with non-finite values
pub fn check_series(kind: ModelKind, values: &[f64], horizon: usize) -> Result<()> {
    if values.len() != horizon {
        return Err(ForecastError::fit(
            kind.name(),
            format!("expected {} predictions, got {}", horizon, values.len()),
        ));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::fit(kind.name(), "non-finite prediction"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rollout(policy: RolloutPolicy, sentiment: f64) -> FeatureRollout {
        let config = RolloutConfig {
            policy,
            sentiment_nudge: 0.05,
        };
        FeatureRollout::new(&config, SentimentScore::new(sentiment).unwrap())
    }

    #[test]
    fn test_shift_append() {
        let r = rollout(RolloutPolicy::ShiftAppend, 0.0);
        assert_eq!(r.advance(&[1.0, 2.0, 3.0], 9.0), vec![2.0, 3.0, 9.0]);
    }

    #[test]
    fn test_overwrite_last() {
        let r = rollout(RolloutPolicy::OverwriteLast, 0.0);
        assert_eq!(r.advance(&[1.0, 2.0, 3.0], 9.0), vec![1.0, 2.0, 9.0]);
    }

    #[test]
    fn test_prepare_nudges_last_slot() {
        let r = rollout(RolloutPolicy::ShiftAppend, 0.5);
        let mut v = vec![1.0, 2.0];
        r.prepare(&mut v);
        assert_eq!(v[0], 1.0);
        assert!((v[1] - 2.025).abs() < 1e-12);
    }

    #[test]
    fn test_run_feeds_predictions_back() {
        let r = rollout(RolloutPolicy::ShiftAppend, 0.0);
        let mut seen = Vec::new();
        let out = r
            .run(ModelKind::Boosting, vec![vec![1.0, 2.0]], 3, |w| {
                seen.push(w[0].clone());
                Ok(w[0][1] + 1.0)
            })
            .unwrap();
        assert_eq!(out, vec![3.0, 4.0, 5.0]);
        assert_eq!(seen[1], vec![2.0, 3.0]);
        assert_eq!(seen[2], vec![3.0, 4.0]);
    }

    #[test]
    fn test_run_keeps_window_length() {
        let r = rollout(RolloutPolicy::OverwriteLast, 0.0);
        let window = vec![vec![1.0], vec![2.0]];
        let out = r
            .run(ModelKind::Recurrent, window, 2, |w| {
                assert_eq!(w.len(), 2);
                Ok(w[1][0] * 2.0)
            })
            .unwrap();
        assert_eq!(out, vec![4.0, 8.0]);
    }

    #[test]
    fn test_run_rejects_nan() {
        let r = rollout(RolloutPolicy::ShiftAppend, 0.0);
        let result = r.run(ModelKind::Boosting, vec![vec![1.0]], 2, |_| Ok(f64::NAN));
        assert!(matches!(result, Err(ForecastError::ModelFit { .. })));
    }

    #[test]
    fn test_check_series_length() {
        assert!(check_series(ModelKind::Arima, &[1.0, 2.0], 2).is_ok());
        assert!(check_series(ModelKind::Arima, &[1.0], 2).is_err());
        assert!(check_series(ModelKind::Arima, &[1.0, f64::INFINITY], 2).is_err());
    }
}
