use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use candle_forecaster::config::ForecastConfig;
use candle_forecaster::data::{load_forecast_series, CandleSource, JsonCandleFile};
use candle_forecaster::engine::{
    simulate_balance, BalanceSignal, Backtester, ForecastAccuracy, ForecastPipeline, PipelineReport,
};
use candle_forecaster::ml::OutlierFilter;

#[derive(Parser)]
#[command(name = "candle-forecaster")]
#[command(version = "0.1.0")]
#[command(about = "Next-close forecasting and position-replay backtesting for OHLCV candles", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Fix the model seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Produce a forecast series for a candle file
    Forecast {
        /// JSON array of candles
        #[arg(short = 'i', long)]
        candles: PathBuf,
    },
    /// Forecast, filter and backtest one or more candle files
    Backtest {
        /// One JSON candle file per symbol
        #[arg(short = 'i', long, required = true, num_args = 1..)]
        candles: Vec<PathBuf>,
    },
    /// Backtest a previously saved forecast series
    Replay {
        #[arg(short, long)]
        forecasts: PathBuf,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = ForecastConfig::load(Path::new(&cli.config))?;
    if cli.seed.is_some() {
        config.model.seed = cli.seed;
    }

    info!("Candle Forecaster v0.1.0");

    match cli.command {
        Commands::Forecast { candles } => {
            run_forecast(&config, &candles).await?;
        }
        Commands::Backtest { candles } => {
            run_backtest(&config, &candles).await?;
        }
        Commands::Replay { forecasts } => {
            run_replay(&config, &forecasts).await?;
        }
        Commands::Config => {
            println!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

async fn run_forecast(config: &ForecastConfig, path: &Path) -> Result<()> {
    let candles = JsonCandleFile::new(path).load_candles().await?;
    let pipeline = ForecastPipeline::new(config);
    let records = pipeline.forecast_series(Arc::new(candles)).await?;

    println!("\n{}", "=".repeat(60));
    println!("{:<18} {:>10} {:>10} {:>10}  {}", "DATE", "OPEN", "CLOSE", "PREDICTED", "OP");
    println!("{}", "-".repeat(60));
    for record in &records {
        println!(
            "{:<18} {:>10.2} {:>10.2} {:>10.2}  {}",
            record.date.format("%d/%m/%Y %H:%M"),
            record.open,
            record.close,
            record.predict_close,
            record.operation.map(|op| op.as_str()).unwrap_or("-")
        );
    }
    println!("{}", "=".repeat(60));
    Ok(())
}

async fn run_backtest(config: &ForecastConfig, paths: &[PathBuf]) -> Result<()> {
    let mut series = Vec::with_capacity(paths.len());
    for path in paths {
        let candles = JsonCandleFile::new(path).load_candles().await?;
        if candles.is_empty() {
            warn!("{} has no candles, skipping", path.display());
            continue;
        }
        series.push(candles);
    }

    let pipeline = ForecastPipeline::new(config);
    let reports = pipeline.run_symbols(series).await?;

    for report in &reports {
        print_report(config, report);
    }
    Ok(())
}

async fn run_replay(config: &ForecastConfig, path: &Path) -> Result<()> {
    let records = load_forecast_series(path).await?;
    let accuracy = ForecastAccuracy::evaluate(&records);
    let filtered = OutlierFilter::new(&config.filter).filter(&records);
    let backtest = Backtester::new(&config.backtest).run(&filtered);

    let symbol = records.first().map(|r| r.symbol.clone()).unwrap_or_default();
    print_report(
        config,
        &PipelineReport {
            symbol,
            records,
            filtered,
            accuracy,
            backtest,
        },
    );
    Ok(())
}

fn print_report(config: &ForecastConfig, report: &PipelineReport) {
    println!("\n{} ({} records, {} after filtering)", report.symbol, report.records.len(), report.filtered.len());
    println!(
        "Direction hits:     {}/{} ({:.1}%), mean abs error {:.2}",
        report.accuracy.direction_hits,
        report.accuracy.evaluated,
        report.accuracy.hit_rate_pct,
        report.accuracy.mean_abs_error
    );
    report.backtest.print_summary();

    let balance = simulate_balance(config.backtest.initial_balance, &BalanceSignal::from_records(&report.filtered));
    println!(
        "All-in balance:     {:.2} -> {:.2} ({:.2}%)",
        balance.initial_balance,
        balance.final_balance,
        balance.return_pct()
    );
}
