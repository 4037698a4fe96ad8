use crate::error::PortfolioError;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;
use tracing::{debug, info};

/// Simulated portfolio value paths from one `simulate` call.
///
/// Every path has `days + 1` values and starts at the initial value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathEnsemble {
    paths: Vec<Vec<f64>>,
}

impl PathEnsemble {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn paths(&self) -> &[Vec<f64>] {
        &self.paths
    }

    /// Number of simulated steps per path, `None` for an empty ensemble.
    pub fn days(&self) -> Option<usize> {
        self.paths.first().map(|p| p.len().saturating_sub(1))
    }

    pub fn final_values(&self) -> Vec<f64> {
        self.paths.iter().filter_map(|p| p.last().copied()).collect()
    }

    /// Pointwise mean across all paths.
    pub fn mean_path(&self) -> Vec<f64> {
        let Some(first) = self.paths.first() else {
            return Vec::new();
        };
        let n = self.paths.len() as f64;
        (0..first.len())
            .map(|t| self.paths.iter().map(|p| p[t]).sum::<f64>() / n)
            .collect()
    }
}

/// Multiplicative log-normal random walk of portfolio value.
///
/// Each step draws `z ~ N(0, 1)` and multiplies by `exp(mu + sigma * z)`.
/// Returns an empty ensemble when any of `mu`, `sigma`, `initial_value` is
/// undefined. `days` and `n_paths` must both be positive.
///
/// One seed per path is drawn from `rng` up front and paths are built in
/// parallel, so the result depends only on `rng`'s state.
pub fn simulate<R: Rng>(
    mu: Option<f64>,
    sigma: Option<f64>,
    initial_value: Option<f64>,
    days: usize,
    n_paths: usize,
    rng: &mut R,
) -> Result<PathEnsemble, PortfolioError> {
    if days == 0 || n_paths == 0 {
        return Err(PortfolioError::InvalidSimulationParameters { days, n_paths });
    }

    let (Some(mu), Some(sigma), Some(initial_value)) = (mu, sigma, initial_value) else {
        debug!("Skipping simulation: mu={:?}, sigma={:?}, v0={:?}", mu, sigma, initial_value);
        return Ok(PathEnsemble::empty());
    };

    info!(
        "Simulating {} paths over {} days (mu={:.6}, sigma={:.6}, v0={:.2})",
        n_paths, days, mu, sigma, initial_value
    );

    let seeds: Vec<u64> = (0..n_paths).map(|_| rng.next_u64()).collect();
    let paths = seeds
        .into_par_iter()
        .map(|seed| {
            let mut path_rng = StdRng::seed_from_u64(seed);
            simulate_path(mu, sigma, initial_value, days, &mut path_rng)
        })
        .collect();

    Ok(PathEnsemble { paths })
}

fn simulate_path<R: Rng>(mu: f64, sigma: f64, initial_value: f64, days: usize, rng: &mut R) -> Vec<f64> {
    let mut path = Vec::with_capacity(days + 1);
    let mut value = initial_value;
    path.push(value);
    for _ in 0..days {
        let z: f64 = rng.sample(StandardNormal);
        let daily_return = mu + sigma * z;
        value *= daily_return.exp();
        path.push(value);
    }
    path
}
