mod types;
mod indicators;
mod ml;
mod engine;
mod market_data;
mod report;
mod config;
mod error;

use anyhow::{anyhow, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{load_config, render_toml, ForecastConfig, ForecastProfile, DEFAULT_CONFIG_FILE};
use engine::{BatchRunner, ForecastOrchestrator, PipelineSettings};
use error::ConfigError;
use market_data::YahooSource;
use ml::{build_strategy, StrategyKind};
use report::{render_report, JsonLinesSink, OutputFormat, PresentationSink, TableSink};

#[derive(Parser)]
#[command(name = "equity-forecaster")]
#[command(version = "0.1.0")]
#[command(about = "Daily close forecasts for a universe of equities", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch history and forecast every instrument in the universe
    Forecast {
        /// Forecasting strategy
        #[arg(short, long, value_enum)]
        strategy: Option<StrategyKind>,
        /// Preset run shape, applied before the other flags
        #[arg(short, long, value_enum)]
        profile: Option<ForecastProfile>,
        /// Comma-separated tickers replacing the configured universe
        #[arg(short, long, value_delimiter = ',')]
        tickers: Option<Vec<String>>,
        /// Business days to forecast
        #[arg(long)]
        horizon: Option<usize>,
        /// Append the benchmark index to the universe
        #[arg(long)]
        benchmark: bool,
        /// Last date of history to use (YYYY-MM-DD, default today)
        #[arg(long)]
        as_of: Option<NaiveDate>,
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Print the latest rolling features per instrument
    Features {
        /// Comma-separated tickers replacing the configured universe
        #[arg(short, long, value_delimiter = ',')]
        tickers: Option<Vec<String>>,
        /// Last date of history to use (YYYY-MM-DD, default today)
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Print the effective configuration as TOML
    Config {
        #[arg(short, long, value_enum)]
        profile: Option<ForecastProfile>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json)?;

    info!("Equity Forecaster v0.1.0");

    match cli.command {
        Commands::Forecast { strategy, profile, tickers, horizon, benchmark, as_of, format } => {
            let mut config = load_config(&cli.config)?;
            apply_profile(&mut config, profile);
            if let Some(strategy) = strategy {
                config.strategy = strategy;
            }
            if let Some(tickers) = tickers {
                config.universe = tickers;
            }
            if let Some(horizon) = horizon {
                config.forecast_horizon = horizon;
            }
            config.include_benchmark |= benchmark;
            config.validate().map_err(ConfigError::Invalid)?;

            run_forecast(&config, as_of.unwrap_or_else(today), format).await?;
        }
        Commands::Features { tickers, as_of } => {
            let mut config = load_config(&cli.config)?;
            if let Some(tickers) = tickers {
                config.universe = tickers;
            }
            config.validate().map_err(ConfigError::Invalid)?;

            show_features(&config, as_of.unwrap_or_else(today)).await?;
        }
        Commands::Config { profile } => {
            let mut config = load_config(&cli.config)?;
            apply_profile(&mut config, profile);
            if let Err(errors) = config.validate() {
                for e in &errors {
                    warn!("Config issue: {}", e);
                }
            }
            print!("{}", render_toml(&config)?);
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = if json { builder.json().try_init() } else { builder.try_init() };
    installed.map_err(|e| anyhow!("failed to initialise logging: {}", e))
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// A profile given on the command line wins over the configured one.
fn apply_profile(config: &mut ForecastConfig, profile: Option<ForecastProfile>) {
    match config.apply_profile(profile) {
        Some(profile) => info!("Profile: {} ({})", profile.name(), profile.description()),
        None => info!("Profile: none, using configured settings"),
    }
}

fn build_orchestrator(config: &ForecastConfig) -> Result<Arc<ForecastOrchestrator>> {
    let source = Arc::new(YahooSource::new(&config.source)?);
    let strategy = build_strategy(config);
    let settings = PipelineSettings::from_config(config);
    Ok(Arc::new(ForecastOrchestrator::new(source, strategy, settings)))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("Ctrl-C handler unavailable, batch cannot be interrupted");
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}

async fn run_forecast(config: &ForecastConfig, as_of: NaiveDate, format: OutputFormat) -> Result<()> {
    let instruments = config.instruments();
    info!(
        "Forecasting {} instruments with {} strategy, horizon {} business days, history to {}",
        instruments.len(),
        config.strategy,
        config.forecast_horizon,
        as_of
    );

    let orchestrator = build_orchestrator(config)?;
    let runner = BatchRunner::new(orchestrator, config.batch.max_concurrency);
    let report = runner.run(&instruments, as_of, shutdown_signal()).await;

    let stdout = std::io::stdout();
    let mut sink: Box<dyn PresentationSink> = match format {
        OutputFormat::Table => Box::new(TableSink::new(stdout.lock())),
        OutputFormat::Json => Box::new(JsonLinesSink::new(stdout.lock())),
    };
    render_report(&report, sink.as_mut())?;

    if report.cancelled {
        warn!("Batch {} was cancelled, results are partial", report.run_id);
    }
    if report.success_count() == 0 && !report.outcomes.is_empty() {
        warn!("No instrument produced a forecast");
    }
    Ok(())
}

async fn show_features(config: &ForecastConfig, as_of: NaiveDate) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let mut out = std::io::stdout().lock();

    for instrument in config.instruments() {
        match orchestrator.features(&instrument, as_of).await {
            Ok((series, features)) => {
                report::table::write_feature_summary(&mut out, &instrument, series.last(), &features)?;
            }
            Err(e) => warn!("{}: {}", instrument, e),
        }
    }
    out.flush()?;
    Ok(())
}
