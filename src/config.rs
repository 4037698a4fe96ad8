use rayon::ThreadPoolBuilder;
use std::sync::OnceLock;
use tracing::{info, warn};

static RAYON_INIT: OnceLock<()> = OnceLock::new();

pub fn init_cpu_parallelism() {
    RAYON_INIT.get_or_init(|| {
        let num_threads = num_cpus::get().max(1);
        match ThreadPoolBuilder::new().num_threads(num_threads).build_global() {
            Ok(_) => info!(
                "Initialized Rayon thread pool with {} threads (all logical CPU cores)",
                num_threads
            ),
            Err(e) => warn!(
                "Rayon thread pool already initialized or unavailable ({}). Using existing configuration.",
                e
            ),
        }
    });
}

/// Source used when `--source` is not given. Falls back to `yahoo`.
pub fn configured_default_source() -> String {
    std::env::var("PORTFOLIO_MC_SOURCE")
        .ok()
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "yahoo".to_string())
}

pub fn fred_api_key() -> Option<String> {
    std::env::var("FRED_API_KEY")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Forecast horizon in days for the report.
pub const DEFAULT_HORIZON_DAYS: usize = 30;
/// Paths simulated for the report's percentile summary.
pub const REPORT_MC_PATHS: usize = 500;
/// Paths simulated for the plot.
pub const PLOT_MC_PATHS: usize = 200;
/// Individual paths drawn on the chart; the mean uses the whole ensemble.
pub const PLOT_MAX_DRAWN_PATHS: usize = 20;
/// Series with fewer points than this get a short-series warning.
pub const SHORT_SERIES_POINTS: usize = 5;
/// Allowed deviation of the raw weight sum from 1.0 before a notice is emitted.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;
/// Bars shown per series with `--preview`.
pub const PREVIEW_POINTS: usize = 2;

pub const HTTP_RETRY_ATTEMPTS: usize = 3;
pub const HTTP_RETRY_DELAY_SECS: u64 = 2;
pub const HTTP_TIMEOUT_SECS: u64 = 15;

/// Length and daily volatility of `mock` source series.
pub const MOCK_SERIES_DAYS: usize = 252;
pub const MOCK_DAILY_VOLATILITY: f64 = 0.02;

pub const DEFAULT_SYMBOLS: &[&str] = &["AAPL", "MSFT", "NVDA", "AMZN", "GOOGL"];
