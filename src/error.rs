use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortfolioError {
    #[error("Asset {symbol} has an invalid weight ({weight}); weights must be finite and non-negative.")]
    InvalidWeight { symbol: String, weight: f64 },

    #[error("Invalid simulation parameters: days={days}, n_paths={n_paths} (both must be > 0).")]
    InvalidSimulationParameters { days: usize, n_paths: usize },
}
