//! Tests for core types

#[cfg(test)]
mod tests {
    use super::super::error::{ForecastError, ModelFailure};
    use super::super::types::*;
    use chrono::{Datelike, Duration, NaiveDate, Weekday};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_sentiment_range() {
        assert_eq!(SentimentScore::new(0.3).unwrap().value(), 0.3);
        assert!(SentimentScore::new(-1.0).is_ok());
        assert!(SentimentScore::new(1.0).is_ok());
        assert!(matches!(SentimentScore::new(1.5), Err(ForecastError::InvalidInput(_))));
        assert!(SentimentScore::new(-1.01).is_err());
        assert!(SentimentScore::new(f64::NAN).is_err());
        assert_eq!(SentimentScore::default(), SentimentScore::NEUTRAL);
    }

    #[test]
    fn test_trading_days_skip_weekends() {
        // Friday
        let days = trading_days_after(date(2024, 3, 1), 3);
        assert_eq!(days, vec![date(2024, 3, 4), date(2024, 3, 5), date(2024, 3, 6)]);
    }

    #[test]
    fn test_trading_days_after_weekend_bar() {
        let days = trading_days_after(date(2024, 3, 2), 1);
        assert_eq!(days, vec![date(2024, 3, 4)]);
    }

    #[test]
    fn test_trading_days_properties() {
        let days = trading_days_after(date(2024, 12, 27), 30);
        assert_eq!(days.len(), 30);
        assert!(days.windows(2).all(|w| w[0] < w[1]));
        assert!(days
            .iter()
            .all(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun)));
        assert!(trading_days_after(date(2024, 1, 1), 0).is_empty());
    }

    #[test]
    fn test_trading_days_stop_at_calendar_end() {
        let near_end = NaiveDate::MAX - Duration::days(10);
        let days = trading_days_after(near_end, 1000);
        assert!(days.len() < 1000);
        assert!(days.iter().all(|d| *d > near_end));
    }

    #[test]
    fn test_round_dp() {
        assert_eq!(round_dp(1.23456, 2), 1.23);
        assert_eq!(round_dp(-0.123456, 4), -0.1235);
        // Half to even
        assert_eq!(round_dp(0.125, 2), 0.12);
        assert!(round_dp(f64::NAN, 2).is_nan());
    }

    #[test]
    fn test_series_records() {
        let series = ForecastSeries {
            points: vec![ForecastPoint {
                date: date(2024, 5, 6),
                predicted_price: 101.23789,
                confidence: 0.876,
            }],
        };
        let records = series.to_records();
        assert_eq!(records[0].date, "2024-05-06");
        assert_eq!(records[0].pred, 101.24);
        assert_eq!(records[0].conf, 0.88);
    }

    #[test]
    fn test_attribution_record() {
        let item = AttributionItem {
            feature_name: "rsi_14".to_string(),
            contribution: -0.123456,
        };
        let record = item.to_record();
        assert_eq!(record.feature, "rsi_14");
        assert_eq!(record.value, -0.1235);
    }

    #[test]
    fn test_model_kind_names() {
        let names: Vec<&str> = ModelKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(names, vec!["arima", "seasonal", "boosting", "recurrent"]);
        assert_eq!(ModelKind::Boosting.to_string(), "boosting");
        assert_eq!(serde_json::to_string(&ModelKind::Recurrent).unwrap(), "\"recurrent\"");
    }

    #[test]
    fn test_status_serialization() {
        let complete = serde_json::to_value(PipelineStatus::Complete).unwrap();
        assert_eq!(complete["state"], "complete");

        let degraded = PipelineStatus::Degraded {
            failed: vec![ModelFailure {
                model: "arima".to_string(),
                reason: "constant series".to_string(),
            }],
        };
        assert!(!degraded.is_complete());
        let value = serde_json::to_value(&degraded).unwrap();
        assert_eq!(value["state"], "degraded");
        assert_eq!(value["failed"][0]["model"], "arima");
    }

    #[test]
    fn test_price_bar_json() {
        let json = r#"{"date":"2024-01-02","open":1.0,"high":2.0,"low":0.5,"close":1.5,"volume":100.0}"#;
        let bar: PriceBar = serde_json::from_str(json).unwrap();
        assert_eq!(bar.date, date(2024, 1, 2));
        assert_eq!(bar.close, 1.5);
    }
}
