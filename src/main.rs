//! Stock Forecast CLI
//!
//! Runs the ensemble forecaster over a price history stored as JSON.

use clap::{Parser, Subcommand};
use stock_forecast::{
    config::Config,
    data::{aggregate_sentiment, HeadlineSentiment, JsonFileSource, PriceSource},
    pipeline::ForecastPipeline,
    types::SentimentScore,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "stock-forecast")]
#[command(about = "Ensemble stock price forecasting with tree attribution")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Forecast closing prices and print the report as JSON
    Predict {
        /// JSON array of daily bars
        #[arg(short, long)]
        input: String,
        /// Ticker symbol
        #[arg(short, long)]
        symbol: String,
        /// Trading days to forecast (defaults to pipeline.horizon)
        #[arg(long)]
        horizon: Option<usize>,
        /// Sentiment score in [-1, 1]
        #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
        sentiment: f64,
        /// JSON array of {label, score} headline classifications; overrides --sentiment
        #[arg(long)]
        headlines: Option<String>,
    },
    /// Print the engineered feature table as JSON
    Features {
        /// JSON array of daily bars
        #[arg(short, long)]
        input: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Predict {
            input,
            symbol,
            horizon,
            sentiment,
            headlines,
        } => predict(config, &input, &symbol, horizon, sentiment, headlines).await,
        Commands::Features { input } => show_features(config, &input).await,
    }
}

async fn predict(
    config: Config,
    input: &str,
    symbol: &str,
    horizon: Option<usize>,
    sentiment: f64,
    headlines: Option<String>,
) -> anyhow::Result<()> {
    let sentiment = match headlines {
        Some(path) => {
            let raw = tokio::fs::read_to_string(&path).await?;
            let items: Vec<HeadlineSentiment> = serde_json::from_str(&raw)?;
            aggregate_sentiment(&items)?
        }
        None => SentimentScore::new(sentiment)?,
    };

    let source = JsonFileSource::new(input);
    let bars = source.fetch(symbol).await?;
    tracing::info!("Fetched {} bars for {} from {}", bars.len(), symbol, source.name());

    let horizon = horizon.unwrap_or(config.pipeline.horizon);
    let pipeline = ForecastPipeline::new(config);
    let report = pipeline.report(symbol, &bars, horizon, sentiment).await?;

    if !report.status.is_complete() {
        tracing::warn!("Forecast for {} is degraded: {:?}", symbol, report.status);
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn show_features(config: Config, input: &str) -> anyhow::Result<()> {
    let bars = JsonFileSource::new(input).fetch("input").await?;
    let pipeline = ForecastPipeline::new(config);
    let table = pipeline.features(&bars)?;
    println!("{}", serde_json::to_string_pretty(&table)?);
    Ok(())
}
