//! Cross-model tests over synthetic price tables

use super::testing::sample_table;
use super::*;
use crate::config::{BoostingConfig, Config, RolloutConfig, RolloutPolicy};
use crate::types::{ModelKind, SentimentScore};

fn context(horizon: usize) -> ForecastContext {
    ForecastContext {
        horizon,
        sentiment: SentimentScore::NEUTRAL,
    }
}

#[test]
fn test_default_forecasters_in_blend_order() {
    let kinds: Vec<ModelKind> = default_forecasters(&Config::default())
        .iter()
        .map(|f| f.kind())
        .collect();
    assert_eq!(kinds, ModelKind::ALL.to_vec());
}

#[test]
fn test_every_forecaster_returns_horizon_points() {
    let table = sample_table(150);
    for forecaster in default_forecasters(&Config::default()) {
        let values = forecaster.forecast(&table, &context(7)).unwrap();
        assert!(check_series(forecaster.kind(), &values, 7).is_ok(), "{}", forecaster.kind());
    }
}

#[test]
fn test_forecasters_do_not_mutate_table() {
    let table = sample_table(100);
    let before = table.clone();
    for forecaster in default_forecasters(&Config::default()) {
        let _ = forecaster.forecast(&table, &context(3));
    }
    assert_eq!(table, before);
}

#[test]
fn test_boosting_forecast_is_deterministic() {
    let table = sample_table(120);
    let forecaster = BoostingForecaster::default();
    let a = forecaster.forecast(&table, &context(5)).unwrap();
    let b = forecaster.forecast(&table, &context(5)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_boosting_overwrite_policy() {
    let table = sample_table(120);
    let forecaster = BoostingForecaster::new(
        BoostingConfig::default(),
        RolloutConfig {
            policy: RolloutPolicy::OverwriteLast,
            sentiment_nudge: 0.05,
        },
    );
    let values = forecaster.forecast(&table, &context(4)).unwrap();
    assert_eq!(values.len(), 4);
    assert!(values.iter().all(|v| v.is_finite()));
}

#[test]
fn test_attribution_matches_columns_and_prediction() {
    let table = sample_table(130);
    let items = AttributionEngine::default().explain(&table).unwrap();

    let names: Vec<&str> = items.iter().map(|i| i.feature_name.as_str()).collect();
    let columns: Vec<&str> = table.columns().iter().map(|c| c.as_str()).collect();
    assert_eq!(names, columns);

    let model = boosting::fit_on_table(&table, &BoostingConfig::default()).unwrap();
    let x = table.last_row().unwrap().feature_vector();
    let total = model.expected_value() + items.iter().map(|i| i.contribution).sum::<f64>();
    assert!((total - model.predict(&x)).abs() < 1e-6);
}

#[test]
fn test_attribution_needs_two_rows() {
    let table = sample_table(50);
    assert_eq!(table.len(), 1);
    assert!(AttributionEngine::default().explain(&table).is_err());
}

#[test]
fn test_arima_on_feature_table() {
    let table = sample_table(120);
    let values = ArimaForecaster::default().forecast(&table, &context(5)).unwrap();
    let last = *table.closes().last().unwrap();
    assert!((values[0] - last).abs() < 5.0);
}
