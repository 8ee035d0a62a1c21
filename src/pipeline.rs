//! Forecast pipeline
//!
//! bars -> validation -> feature table -> {four forecasters, attribution}
//! -> ensemble -> outcome. Forecasters share the table read-only through an
//! `Arc` and run on blocking worker threads. A failing forecaster is dropped
//! from the blend and reported; only when all fail does the run error out.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::data::validate_history;
use crate::error::{ForecastError, ModelFailure, Result};
use crate::ml::{
    self, check_series, AttributionEngine, EnsembleCombiner, FeatureTable, ForecastContext,
    Forecaster, IndicatorEngine,
};
use crate::types::{
    trading_days_after, AttributionItem, ForecastReport, ForecastSeries, ModelKind,
    PipelineStatus, PriceBar, SentimentScore,
};

type ModelRun = (ModelKind, Result<Vec<f64>>);

/// Result of one successful run
#[derive(Debug, Clone)]
pub struct ForecastOutcome {
    pub forecast: ForecastSeries,
    /// Empty when attribution failed
    pub attribution: Vec<AttributionItem>,
    pub status: PipelineStatus,
}

impl ForecastOutcome {
    /// Rounded output records for the API layer
    pub fn into_report(self, symbol: &str, sentiment: SentimentScore) -> ForecastReport {
        ForecastReport {
            symbol: symbol.to_string(),
            horizon: self.forecast.len(),
            sentiment: sentiment.value(),
            predictions: self.forecast.to_records(),
            shap: self.attribution.iter().map(|a| a.to_record()).collect(),
            status: self.status,
        }
    }
}

pub struct ForecastPipeline {
    config: Config,
    engine: IndicatorEngine,
    forecasters: Vec<Arc<dyn Forecaster>>,
    combiner: EnsembleCombiner,
    attribution: AttributionEngine,
}

impl ForecastPipeline {
    pub fn new(config: Config) -> Self {
        Self {
            engine: IndicatorEngine::new(config.indicators.clone()),
            forecasters: ml::default_forecasters(&config),
            combiner: EnsembleCombiner::new(config.ensemble.clone()),
            attribution: AttributionEngine::new(config.boosting.clone()),
            config,
        }
    }

    /// Replace the forecaster set
    pub fn with_forecasters(mut self, forecasters: Vec<Arc<dyn Forecaster>>) -> Self {
        self.forecasters = forecasters;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bars needed for indicator warm-up plus the minimum training rows
    pub fn min_history(&self) -> usize {
        self.engine.min_bars() + self.config.pipeline.min_training_rows
    }

    /// Validate `bars` and build the feature table
    pub fn features(&self, bars: &[PriceBar]) -> Result<FeatureTable> {
        validate_history(bars)?;
        self.engine.build(bars)
    }

    /// Forecast `horizon` trading days past the last bar
    pub async fn run(
        &self,
        symbol: &str,
        bars: &[PriceBar],
        horizon: usize,
        sentiment: SentimentScore,
    ) -> Result<ForecastOutcome> {
        let span = tracing::info_span!(
            "forecast",
            request_id = %Uuid::new_v4(),
            symbol = %symbol,
            horizon = horizon
        );
        let work = self.run_inner(bars, horizon, sentiment).instrument(span);

        match self.config.pipeline.timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), work)
                .await
                .map_err(|_| ForecastError::Timeout { secs })?,
            None => work.await,
        }
    }

    /// `run` followed by conversion to the rounded report
    pub async fn report(
        &self,
        symbol: &str,
        bars: &[PriceBar],
        horizon: usize,
        sentiment: SentimentScore,
    ) -> Result<ForecastReport> {
        let outcome = self.run(symbol, bars, horizon, sentiment).await?;
        Ok(outcome.into_report(symbol, sentiment))
    }

    async fn run_inner(
        &self,
        bars: &[PriceBar],
        horizon: usize,
        sentiment: SentimentScore,
    ) -> Result<ForecastOutcome> {
        if horizon == 0 {
            return Err(ForecastError::InvalidInput("horizon must be positive".to_string()));
        }
        let max_horizon = self.config.pipeline.max_horizon;
        if horizon > max_horizon {
            return Err(ForecastError::InvalidInput(format!(
                "horizon {} exceeds the maximum of {}",
                horizon, max_horizon
            )));
        }
        validate_history(bars)?;
        let required = self.min_history();
        if bars.len() < required {
            return Err(ForecastError::InsufficientHistory {
                required,
                actual: bars.len(),
            });
        }

        let table = Arc::new(self.engine.build(bars)?);
        let last_date = table
            .last_date()
            .ok_or_else(|| ForecastError::InvalidInput("no feature rows".to_string()))?;
        let dates = trading_days_after(last_date, horizon);
        if dates.len() != horizon {
            return Err(ForecastError::InvalidInput(format!(
                "only {} trading days remain after {}",
                dates.len(),
                last_date
            )));
        }
        let ctx = ForecastContext { horizon, sentiment };

        tracing::info!(
            "Running {} forecasters on {} feature rows",
            self.forecasters.len(),
            table.len()
        );

        let (runs, attribution) = if self.config.pipeline.parallel {
            self.run_parallel(&table, ctx).await
        } else {
            self.run_sequential(&table, ctx).await
        };

        let mut survivors = Vec::with_capacity(runs.len());
        let mut failures = Vec::new();
        for (kind, result) in runs {
            match result.and_then(|values| check_series(kind, &values, horizon).map(|_| values)) {
                Ok(values) => survivors.push((kind, values)),
                Err(e) => {
                    let reason = match e {
                        ForecastError::ModelFit { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    tracing::warn!("Forecaster {} failed: {}", kind, reason);
                    failures.push(ModelFailure {
                        model: kind.name().to_string(),
                        reason,
                    });
                }
            }
        }

        if survivors.is_empty() {
            return Err(ForecastError::AllModelsFailed { failures });
        }

        let forecast = self.combiner.combine(&survivors, &dates, sentiment)?;

        let attribution = attribution.unwrap_or_else(|e| {
            tracing::warn!("Attribution skipped: {}", e);
            Vec::new()
        });

        let status = if failures.is_empty() {
            PipelineStatus::Complete
        } else {
            PipelineStatus::Degraded { failed: failures }
        };

        tracing::info!(
            "Forecast ready: {} points from {} models, {} attributions",
            forecast.len(),
            survivors.len(),
            attribution.len()
        );

        Ok(ForecastOutcome {
            forecast,
            attribution,
            status,
        })
    }

    /// One blocking task running every forecaster in order, then attribution
    async fn run_sequential(
        &self,
        table: &Arc<FeatureTable>,
        ctx: ForecastContext,
    ) -> (Vec<ModelRun>, Result<Vec<AttributionItem>>) {
        let forecasters = self.forecasters.clone();
        let kinds: Vec<ModelKind> = forecasters.iter().map(|f| f.kind()).collect();
        let engine = self.attribution.clone();
        let table = Arc::clone(table);
        let span = tracing::Span::current();

        let handle = tokio::task::spawn_blocking(move || {
            let _guard = span.enter();
            let runs: Vec<ModelRun> = forecasters
                .iter()
                .map(|f| timed_forecast(f.as_ref(), &table, &ctx))
                .collect();
            (runs, engine.explain(&table))
        });

        handle.await.unwrap_or_else(|e| {
            let reason = e.to_string();
            let runs: Vec<ModelRun> = kinds
                .into_iter()
                .map(|kind| (kind, Err(ForecastError::Task(reason.clone()))))
                .collect();
            (runs, Err(ForecastError::Task(reason)))
        })
    }

    async fn run_parallel(
        &self,
        table: &Arc<FeatureTable>,
        ctx: ForecastContext,
    ) -> (Vec<ModelRun>, Result<Vec<AttributionItem>>) {
        let handles = self.forecasters.iter().map(|forecaster| {
            let forecaster = Arc::clone(forecaster);
            let table = Arc::clone(table);
            let span = tracing::Span::current();
            let kind = forecaster.kind();
            async move {
                let handle = tokio::task::spawn_blocking(move || {
                    let _guard = span.enter();
                    timed_forecast(forecaster.as_ref(), &table, &ctx)
                });
                handle
                    .await
                    .unwrap_or_else(|e| (kind, Err(ForecastError::Task(e.to_string()))))
            }
        });

        let attribution = {
            let engine = self.attribution.clone();
            let table = Arc::clone(table);
            let span = tracing::Span::current();
            tokio::task::spawn_blocking(move || {
                let _guard = span.enter();
                engine.explain(&table)
            })
        };

        let runs = join_all(handles).await;
        let attribution = attribution
            .await
            .unwrap_or_else(|e| Err(ForecastError::Task(e.to_string())));
        (runs, attribution)
    }
}

fn timed_forecast(forecaster: &dyn Forecaster, table: &FeatureTable, ctx: &ForecastContext) -> ModelRun {
    let kind = forecaster.kind();
    let start = Instant::now();
    let result = forecaster.forecast(table, ctx);
    tracing::debug!("{} finished in {:?} (ok: {})", kind, start.elapsed(), result.is_ok());
    (kind, result)
}
