use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use sandbox_forecast::cohort::{run_cohort, CohortReport, CohortSettings, Ranking};
use sandbox_forecast::config::Config;
use sandbox_forecast::logging::init_tracing;
use sandbox_forecast::market_data::AlpacaDailyBars;
use sandbox_forecast::predictor::build_predictor;
use sandbox_forecast::quality::{CsvQualityScores, QualityScoreSource};

#[derive(Parser, Debug)]
#[command(name = "sandbox-forecast")]
#[command(about = "Forecast daily closes and rank a cohort by trend and quality score", long_about = None)]
struct Cli {
    /// Config file (defaults to $SF_CONFIG_PATH or config/default.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Comma separated tickers, overrides market_data.tickers
    #[arg(short, long, value_delimiter = ',')]
    tickers: Vec<String>,

    /// Forecast horizon such as 3m, 6m, 1y or 45d
    #[arg(long)]
    horizon: Option<String>,

    /// Price-vs-quality weight in [0, 1]
    #[arg(short, long)]
    weight: Option<f64>,

    /// Quality score CSV (ticker,total_score)
    #[arg(short, long)]
    quality: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };
    let mut config = match loaded {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Make sure .env file exists with ALPACA_API_KEY and ALPACA_API_SECRET");
            std::process::exit(1);
        }
    };
    apply_overrides(&mut config, &cli);
    config.validate().context("invalid configuration after CLI overrides")?;

    init_tracing(&config.logging)?;
    tracing::info!(
        data_url = %config.market_data.data_base_url,
        start = %config.market_data.start_date,
        end = %config.market_data.end_date,
        horizon = %config.pipeline.horizon,
        "Starting sandbox-forecast"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let report = runtime.block_on(run(&config));
    // Detached predictor jobs that timed out must not hold the process open.
    runtime.shutdown_timeout(Duration::from_secs(1));
    let report = report?;

    if cli.json {
        let json =
            serde_json::to_string_pretty(&report).context("failed to serialize cohort report")?;
        println!("{}", json);
    } else {
        print_report(&report, config.ranking.price_weight);
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if !cli.tickers.is_empty() {
        config.market_data.tickers = cli.tickers.clone();
    }
    if let Some(h) = &cli.horizon {
        config.pipeline.horizon = h.clone();
    }
    if let Some(w) = cli.weight {
        config.ranking.price_weight = w;
    }
    if let Some(q) = &cli.quality {
        config.ranking.quality_scores_path = q.clone();
    }
}

async fn run(config: &Config) -> Result<CohortReport> {
    let tickers = config.market_data.cohort_tickers();
    if tickers.is_empty() {
        bail!("please provide at least one ticker");
    }

    let source = AlpacaDailyBars::new(
        &config.market_data.data_base_url,
        &config.market_data.api_key,
        &config.market_data.api_secret,
        &config.market_data.feed,
    )?;
    let quality = CsvQualityScores::new(&config.ranking.quality_scores_path).load()?;

    let settings = CohortSettings {
        pipeline: config.pipeline.settings()?,
        start: config.market_data.start_date,
        end: config.market_data.end_date,
        price_weight: config.ranking.price_weight,
        workers: config.runtime.workers,
        predictor_timeout: config.runtime.predictor_timeout(),
    };
    let predictor_cfg = config.predictor;
    let report = run_cohort(
        &tickers,
        &source,
        &quality,
        move |_ticker: &str| build_predictor(&predictor_cfg),
        &settings,
    )
    .await?;
    Ok(report)
}

fn print_report(report: &CohortReport, price_weight: f64) {
    for forecast in &report.forecasts {
        println!();
        println!("== {} ({} days) ==", forecast.ticker, forecast.points.len());
        match &forecast.accuracy {
            Some(m) => println!(
                "Accuracy: RMSE = {:.2}, MAE = {:.2} ({} test windows)",
                m.rmse, m.mae, m.samples
            ),
            None => println!("Accuracy: unavailable (test partition too short)"),
        }
        println!("Last close: {:.2}", forecast.last_close);
        if let Some(mean) = forecast.mean_price {
            println!("Mean predicted price: {:.2}", mean);
        }
        println!("{:>5}  {:>15}", "Day", "Predicted Price");
        for p in &forecast.points {
            println!("{:>5}  {:>15.2}", p.day_offset, p.predicted_price);
        }
    }

    if !report.skipped.is_empty() {
        println!();
        println!("Skipped:");
        for s in &report.skipped {
            println!("- {:<8} [{}] {}", s.ticker, s.kind, s.reason);
        }
    }

    println!();
    match &report.ranking {
        Ranking::Ranked { results } => {
            println!(
                "Ranked stocks (price weight {:.2}, quality weight {:.2}):",
                price_weight,
                1.0 - price_weight
            );
            for r in results {
                println!("{}. {}: {:.2}", r.rank, r.ticker, r.score);
            }
        }
        Ranking::NoPredictions { message } => {
            println!("{}", message);
        }
    }
}
