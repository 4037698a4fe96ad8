mod config;
mod data;
mod error;
mod portfolio;
mod report;
mod simulation;
mod sources;
mod stats;
mod tui;
mod ui;

use anyhow::{anyhow, Result};
use chrono::{Duration, Local, NaiveDate};
use clap::Parser;
use config::{DEFAULT_HORIZON_DAYS, PLOT_MAX_DRAWN_PATHS, PLOT_MC_PATHS, PREVIEW_POINTS};
use data::AssetType;
use portfolio::{AssetInput, Portfolio};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use sources::{DataManager, FetchRequest};
use std::collections::HashMap;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Portfolio Monte Carlo: weighted portfolio statistics and value projection",
    after_help = "EXAMPLES:
    # Random weights over the default symbols, Yahoo data for the last year
    cargo run --release

    # Explicit weights (renormalized if they do not sum to 1)
    cargo run --release -- --symbols AAPL,MSFT,NVDA --weights 0.5,0.3,0.2

    # Offline run with synthetic data and a terminal chart
    cargo run --release -- --source mock --seed 7 --plot"
)]
struct Args {
    /// Comma-separated symbols (e.g., AAPL,MSFT,NVDA)
    #[arg(long, value_delimiter = ',')]
    symbols: Option<Vec<String>>,

    /// Comma-separated weights, one per symbol. Random weights when omitted.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    weights: Option<Vec<f64>>,

    /// Data source: yahoo | broker | ibkr | fred | mock (default from PORTFOLIO_MC_SOURCE, else yahoo)
    #[arg(long)]
    source: Option<String>,

    /// Asset type of the requested symbols: stock | index | macro
    #[arg(long, default_value = "stock")]
    asset_type: AssetType,

    /// First day of history (YYYY-MM-DD). Defaults to one year before --end.
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last day of history (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Report horizon in days
    #[arg(long, default_value_t = DEFAULT_HORIZON_DAYS)]
    horizon: usize,

    /// Number of simulated paths for the plot
    #[arg(long, default_value_t = PLOT_MC_PATHS)]
    paths: usize,

    /// Seed for weights, mock data and simulation (random when omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Print a short preview of each fetched series
    #[arg(long)]
    preview: bool,

    /// Print the report as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Show the simulated paths as a terminal chart
    #[arg(long)]
    plot: bool,

    /// Hide the mean path on the chart
    #[arg(long)]
    no_mean: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    config::init_cpu_parallelism();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("portfolio_mc=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let symbols: Vec<String> = args
        .symbols
        .unwrap_or_else(|| config::DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect())
        .into_iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    if symbols.is_empty() {
        return Err(anyhow!("No symbols given. Example: --symbols AAPL,MSFT"));
    }

    let end = args.end.unwrap_or_else(|| Local::now().date_naive());
    let start = args.start.unwrap_or(end - Duration::days(365));
    if start > end {
        return Err(anyhow!("--start ({}) is after --end ({})", start, end));
    }

    let source = args.source.unwrap_or_else(config::configured_default_source);
    let manager = DataManager::with_default_sources(rng.next_u64());
    let requests = vec![FetchRequest {
        source: source.clone(),
        symbols: symbols.clone(),
        start,
        end,
        asset_type: args.asset_type,
    }];

    info!("Fetching {} series from {} ({} → {})", symbols.len(), source, start, end);
    let all_series = manager.fetch_multiple_sources(&requests).await?;
    if all_series.is_empty() {
        return Err(anyhow!("No price series could be fetched from {}", source));
    }
    info!("Fetched {} price series", all_series.len());

    if args.preview {
        for line in data::preview_lines(&all_series, PREVIEW_POINTS) {
            println!("{}", line);
        }
    }

    let weights: HashMap<String, f64> = match args.weights {
        Some(w) => {
            if w.len() != symbols.len() {
                return Err(anyhow!(
                    "Got {} weights for {} symbols",
                    w.len(),
                    symbols.len()
                ));
            }
            symbols.iter().cloned().zip(w).collect()
        }
        None => {
            let raw: Vec<f64> = symbols.iter().map(|_| rng.gen_range(0.0..1.0)).collect();
            let total: f64 = raw.iter().sum();
            info!("No weights given; using random weights");
            symbols
                .iter()
                .cloned()
                .zip(raw.into_iter().map(|w| if total > 0.0 { w / total } else { w }))
                .collect()
        }
    };

    let assets: Vec<(String, AssetInput)> = all_series
        .into_iter()
        .filter_map(|series| match weights.get(&series.symbol) {
            Some(&w) => Some((series.symbol.clone(), AssetInput::new(series, w))),
            None => {
                warn!("No weight for {}; leaving it out of the portfolio", series.symbol);
                None
            }
        })
        .collect();

    let portfolio = Portfolio::new(assets)?;
    if portfolio.is_empty() {
        return Err(anyhow!("None of the fetched series matched a requested symbol"));
    }
    info!("Reporting on {} assets over {} days", portfolio.len(), args.horizon);
    let report = portfolio.report(args.horizon, &mut rng)?;
    if !report.has_simulation() {
        warn!("Monte Carlo summary unavailable: no asset has usable return statistics");
    }
    for warning in report.warnings() {
        info!("Report warning: {}", warning);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }

    if args.plot {
        let ensemble = portfolio.monte_carlo(args.horizon, args.paths, None, &mut rng)?;
        match ui::PathPlot::from_ensemble(&ensemble, PLOT_MAX_DRAWN_PATHS, !args.no_mean) {
            Some(plot) => ui::show(&plot)?,
            None => warn!("Cannot plot: empty simulation"),
        }
    }

    Ok(())
}
