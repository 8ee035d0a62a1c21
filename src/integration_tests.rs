//! End-to-end pipeline tests

#[cfg(test)]
mod tests {
    use super::super::config::{Config, EnsembleMethod};
    use super::super::error::ForecastError;
    use super::super::ml::forecaster::{Forecaster, MockForecaster};
    use super::super::ml::testing::{bars_from_closes, sample_bars};
    use super::super::pipeline::ForecastPipeline;
    use super::super::types::{ModelKind, PipelineStatus, SentimentScore};
    use chrono::{Datelike, Weekday};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn fixed(kind: ModelKind, value: f64) -> Arc<dyn Forecaster> {
        let mut mock = MockForecaster::new();
        mock.expect_kind().return_const(kind);
        mock.expect_forecast()
            .returning(move |_, ctx| Ok(vec![value; ctx.horizon]));
        Arc::new(mock)
    }

    fn failing(kind: ModelKind) -> Arc<dyn Forecaster> {
        let mut mock = MockForecaster::new();
        mock.expect_kind().return_const(kind);
        mock.expect_forecast()
            .returning(move |_, _| Err(ForecastError::fit(kind.name(), "singular matrix")));
        Arc::new(mock)
    }

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.recurrent.hidden_size = 8;
        config.recurrent.epochs = 2;
        config.boosting.n_estimators = 20;
        config
    }

    #[tokio::test]
    async fn test_linear_history_forecast() {
        let closes: Vec<f64> = (0..100).map(|i| 100.0 + 0.1 * i as f64).collect();
        let bars = bars_from_closes(&closes);
        let pipeline = ForecastPipeline::new(fast_config());

        let outcome = pipeline
            .run("LIN", &bars, 5, SentimentScore::NEUTRAL)
            .await
            .unwrap();

        let dates = outcome.forecast.dates();
        assert_eq!(dates.len(), 5);
        assert!(dates[0] > bars.last().unwrap().date);
        assert!(dates.windows(2).all(|w| w[0] < w[1]));
        assert!(dates
            .iter()
            .all(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun)));
        assert!(outcome
            .forecast
            .points
            .iter()
            .all(|p| p.predicted_price.is_finite() && (0.0..=1.0).contains(&p.confidence)));
        assert_eq!(outcome.attribution.len(), 11);
    }

    #[tokio::test]
    async fn test_insufficient_history() {
        let pipeline = ForecastPipeline::new(Config::default());
        let bars = sample_bars(45);
        let err = pipeline
            .run("SHORT", &bars, 5, SentimentScore::NEUTRAL)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ForecastError::InsufficientHistory { required: 70, actual: 45 }
        ));
    }

    #[tokio::test]
    async fn test_zero_horizon_rejected() {
        let pipeline = ForecastPipeline::new(Config::default());
        let result = pipeline
            .run("X", &sample_bars(100), 0, SentimentScore::NEUTRAL)
            .await;
        assert!(matches!(result, Err(ForecastError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_horizon_above_maximum_rejected() {
        let pipeline = ForecastPipeline::new(Config::default())
            .with_forecasters(vec![fixed(ModelKind::Arima, 1.0)]);
        let bars = sample_bars(100);

        for horizon in [366, usize::MAX] {
            let result = pipeline.run("X", &bars, horizon, SentimentScore::NEUTRAL).await;
            assert!(matches!(result, Err(ForecastError::InvalidInput(_))), "horizon {}", horizon);
        }
        let at_limit = pipeline
            .run("X", &bars, 365, SentimentScore::NEUTRAL)
            .await
            .unwrap();
        assert_eq!(at_limit.forecast.len(), 365);
    }

    #[tokio::test]
    async fn test_timeout_applies_in_both_modes() {
        for parallel in [true, false] {
            let mut slow = MockForecaster::new();
            slow.expect_kind().return_const(ModelKind::Arima);
            slow.expect_forecast().returning(|_, ctx| {
                std::thread::sleep(Duration::from_millis(2500));
                Ok(vec![1.0; ctx.horizon])
            });

            let mut config = Config::default();
            config.pipeline.timeout_secs = Some(1);
            config.pipeline.parallel = parallel;
            let pipeline = ForecastPipeline::new(config).with_forecasters(vec![Arc::new(slow)]);

            let start = Instant::now();
            let result = pipeline
                .run("SLOW", &sample_bars(100), 3, SentimentScore::NEUTRAL)
                .await;
            assert!(
                matches!(result, Err(ForecastError::Timeout { secs: 1 })),
                "parallel = {}",
                parallel
            );
            assert!(start.elapsed() < Duration::from_millis(2000), "parallel = {}", parallel);
        }
    }

    #[tokio::test]
    async fn test_unordered_history_rejected() {
        let pipeline = ForecastPipeline::new(Config::default());
        let mut bars = sample_bars(100);
        bars.swap(10, 11);
        let result = pipeline.run("X", &bars, 3, SentimentScore::NEUTRAL).await;
        assert!(matches!(result, Err(ForecastError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_failed_model_degrades() {
        let pipeline = ForecastPipeline::new(Config::default()).with_forecasters(vec![
            failing(ModelKind::Arima),
            fixed(ModelKind::Seasonal, 100.0),
            fixed(ModelKind::Boosting, 100.0),
            fixed(ModelKind::Recurrent, 100.0),
        ]);

        let outcome = pipeline
            .run("DEG", &sample_bars(100), 4, SentimentScore::NEUTRAL)
            .await
            .unwrap();

        match &outcome.status {
            PipelineStatus::Degraded { failed } => {
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].model, "arima");
                assert_eq!(failed[0].reason, "singular matrix");
            }
            other => panic!("expected degraded status, got {:?}", other),
        }
        assert!(outcome.forecast.points.iter().all(|p| p.predicted_price == 100.0));
        assert!(outcome.forecast.points.iter().all(|p| p.confidence == 1.0));
    }

    #[tokio::test]
    async fn test_all_models_failed() {
        let pipeline = ForecastPipeline::new(Config::default())
            .with_forecasters(ModelKind::ALL.iter().map(|k| failing(*k)).collect());

        let err = pipeline
            .run("FAIL", &sample_bars(100), 3, SentimentScore::NEUTRAL)
            .await
            .unwrap_err();
        match err {
            ForecastError::AllModelsFailed { failures } => assert_eq!(failures.len(), 4),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wrong_length_counts_as_failure() {
        let mut short = MockForecaster::new();
        short.expect_kind().return_const(ModelKind::Seasonal);
        short.expect_forecast().returning(|_, _| Ok(vec![1.0]));

        let pipeline = ForecastPipeline::new(Config::default()).with_forecasters(vec![
            fixed(ModelKind::Arima, 50.0),
            Arc::new(short),
        ]);
        let outcome = pipeline
            .run("LEN", &sample_bars(100), 3, SentimentScore::NEUTRAL)
            .await
            .unwrap();
        assert!(!outcome.status.is_complete());
        assert_eq!(outcome.forecast.len(), 3);
    }

    #[tokio::test]
    async fn test_sentiment_moves_confidence_not_price() {
        let forecasters = || {
            vec![
                fixed(ModelKind::Arima, 90.0),
                fixed(ModelKind::Seasonal, 110.0),
                fixed(ModelKind::Boosting, 90.0),
                fixed(ModelKind::Recurrent, 110.0),
            ]
        };
        let bars = sample_bars(100);

        let neutral = ForecastPipeline::new(Config::default())
            .with_forecasters(forecasters())
            .run("S", &bars, 2, SentimentScore::NEUTRAL)
            .await
            .unwrap();
        let positive = ForecastPipeline::new(Config::default())
            .with_forecasters(forecasters())
            .run("S", &bars, 2, SentimentScore::new(0.5).unwrap())
            .await
            .unwrap();

        let (a, b) = (&neutral.forecast.points[0], &positive.forecast.points[0]);
        assert_eq!(a.predicted_price, b.predicted_price);
        assert!((b.confidence - a.confidence - 0.05).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_sequential_matches_parallel() {
        let bars = sample_bars(100);
        let mut config = fast_config();
        let parallel = ForecastPipeline::new(config.clone())
            .run("P", &bars, 3, SentimentScore::NEUTRAL)
            .await
            .unwrap();
        config.pipeline.parallel = false;
        let sequential = ForecastPipeline::new(config)
            .run("P", &bars, 3, SentimentScore::NEUTRAL)
            .await
            .unwrap();
        assert_eq!(parallel.forecast, sequential.forecast);
        assert_eq!(parallel.attribution, sequential.attribution);
    }

    #[tokio::test]
    async fn test_report_shape() {
        let mut config = fast_config();
        config.ensemble.method = EnsembleMethod::FixedWeights;
        let pipeline = ForecastPipeline::new(config);

        let report = pipeline
            .report("AAPL", &sample_bars(120), 5, SentimentScore::new(0.2).unwrap())
            .await
            .unwrap();
        assert_eq!(report.symbol, "AAPL");
        assert_eq!(report.horizon, 5);
        assert_eq!(report.predictions.len(), 5);
        assert!(report.predictions.iter().all(|p| p.conf == 0.05));

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["predictions"][0]["date"].is_string());
        assert_eq!(json["shap"].as_array().unwrap().len(), 11);
        assert_eq!(json["shap"][0]["feature"], "open");
    }
}
