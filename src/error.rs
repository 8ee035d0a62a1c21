//! Error types for the forecasting pipeline

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, ForecastError>;

/// A forecaster that failed during a run, kept for degraded reports
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ModelFailure {
    pub model: String,
    pub reason: String,
}

impl std::fmt::Display for ModelFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.model, self.reason)
    }
}

/// Pipeline errors
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Insufficient history: need at least {required} bars, got {actual}")]
    InsufficientHistory { required: usize, actual: usize },

    #[error("Model {model} failed to fit: {reason}")]
    ModelFit { model: String, reason: String },

    #[error("All forecasters failed: {}", format_failures(.failures))]
    AllModelsFailed { failures: Vec<ModelFailure> },

    #[error("Attribution failed: {0}")]
    Attribution(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Forecast timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Forecast task failed: {0}")]
    Task(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ForecastError {
    /// Shorthand for a fit failure of a named model
    pub fn fit(model: impl Into<String>, reason: impl Into<String>) -> Self {
        ForecastError::ModelFit {
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error aborts the whole request
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ForecastError::ModelFit { .. } | ForecastError::Attribution(_))
    }
}

fn format_failures(failures: &[ModelFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
