use crate::config::REPORT_MC_PATHS;
use crate::data::PriceSeries;
use crate::error::PortfolioError;
use crate::report::{self, Report};
use crate::simulation::{self, PathEnsemble};
use rand::Rng;
use tracing::{debug, info, warn};

// ──────────────────────────────────────────────────────────────────────────────
// Data Structures
// ──────────────────────────────────────────────────────────────────────────────

/// Input for one portfolio position, before normalization.
#[derive(Clone, Debug)]
pub struct AssetInput {
    pub series: PriceSeries,
    pub weight: f64,
}

impl AssetInput {
    pub fn new(series: PriceSeries, weight: f64) -> Self {
        Self { series, weight }
    }
}

/// One position: a cleaned series with its normalized weight.
#[derive(Clone, Debug)]
pub struct AssetSlot {
    pub symbol: String,
    pub series: PriceSeries,
    pub weight: f64,
}

/// Per-asset view handed to the report builder.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetSummary {
    pub symbol: String,
    pub weight: f64,
    pub points: usize,
    pub mean_return: Option<f64>,
    pub stdev_return: Option<f64>,
}

/// Aggregated portfolio statistics, the input of [`report::build`].
#[derive(Clone, Debug, PartialEq)]
pub struct PortfolioSummary {
    pub assets: Vec<AssetSummary>,
    pub expected_daily_return: Option<f64>,
    pub daily_volatility: Option<f64>,
    pub initial_value: Option<f64>,
    /// Sum of the weights as supplied, before normalization.
    pub raw_weight_sum: f64,
}

/// Weighted set of assets, keyed by symbol in insertion order.
///
/// Weights are normalized and every series is cleaned with its statistics
/// computed in [`Portfolio::new`]; the value is read-only afterwards.
#[derive(Clone, Debug)]
pub struct Portfolio {
    slots: Vec<AssetSlot>,
    raw_weight_sum: f64,
}

// ──────────────────────────────────────────────────────────────────────────────
// Aggregation
// ──────────────────────────────────────────────────────────────────────────────

/// Divides every weight by the total. Leaves weights untouched when the total
/// is exactly zero. Returns the total before normalization.
pub fn normalize_weights(slots: &mut [AssetSlot]) -> f64 {
    // fold from +0.0: an empty f64 `sum()` yields -0.0
    let total = slots.iter().fold(0.0, |acc, s| acc + s.weight);
    if total == 0.0 {
        return total;
    }
    for slot in slots.iter_mut() {
        slot.weight /= total;
    }
    total
}

/// `Σ w_i * μ_i` over assets with a defined mean return.
///
/// Weight of assets without statistics is not redistributed, so the result
/// understates exposure when some assets lack data.
pub fn expected_daily_return(slots: &[AssetSlot]) -> Option<f64> {
    let mut total = 0.0;
    let mut contributing = 0usize;
    for slot in slots {
        if let Some(mu) = slot.series.mean_return {
            total += slot.weight * mu;
            contributing += 1;
        }
    }
    (contributing > 0).then_some(total)
}

/// `sqrt(Σ (w_i * σ_i)^2)`, assuming independent asset returns.
///
/// `None` when the accumulated variance is not positive, which covers both
/// "no asset has statistics" and "all contributing volatilities are zero".
pub fn daily_volatility(slots: &[AssetSlot]) -> Option<f64> {
    let variance: f64 = slots
        .iter()
        .filter_map(|slot| slot.series.stdev_return.map(|sigma| (slot.weight * sigma).powi(2)))
        .sum();
    if variance <= 0.0 {
        return None;
    }
    Some(variance.sqrt())
}

/// `Σ w_i * last_close_i` over assets with at least one price.
pub fn portfolio_value(slots: &[AssetSlot]) -> Option<f64> {
    let mut total = 0.0;
    let mut contributing = 0usize;
    for slot in slots {
        if let Some(close) = slot.series.last_close() {
            total += slot.weight * close;
            contributing += 1;
        }
    }
    (contributing > 0).then_some(total)
}

// ──────────────────────────────────────────────────────────────────────────────
// Portfolio
// ──────────────────────────────────────────────────────────────────────────────

impl Portfolio {
    /// Builds a portfolio from `(symbol, asset)` pairs.
    ///
    /// A repeated symbol replaces the earlier entry in place. Fails on any
    /// negative or non-finite weight.
    pub fn new<I, S>(assets: I) -> Result<Self, PortfolioError>
    where
        I: IntoIterator<Item = (S, AssetInput)>,
        S: Into<String>,
    {
        let mut slots: Vec<AssetSlot> = Vec::new();
        for (symbol, input) in assets {
            let symbol = symbol.into();
            if !input.weight.is_finite() || input.weight < 0.0 {
                return Err(PortfolioError::InvalidWeight {
                    symbol,
                    weight: input.weight,
                });
            }
            let slot = AssetSlot {
                symbol,
                series: input.series,
                weight: input.weight,
            };
            match slots.iter_mut().find(|s| s.symbol == slot.symbol) {
                Some(existing) => {
                    warn!("Duplicate symbol {} in portfolio input; keeping the later entry", slot.symbol);
                    *existing = slot;
                }
                None => slots.push(slot),
            }
        }

        let raw_weight_sum = normalize_weights(&mut slots);
        debug!("Normalized {} weights (raw sum {:.6})", slots.len(), raw_weight_sum);

        for slot in slots.iter_mut() {
            slot.series.clean();
            slot.series.update_basic_stats();
            match (slot.series.mean_return, slot.series.stdev_return) {
                (Some(mu), Some(sigma)) => debug!(
                    "  {}: w={:.4}, points={}, mu={:.6}, sigma={:.6}",
                    slot.symbol,
                    slot.weight,
                    slot.series.len(),
                    mu,
                    sigma
                ),
                _ => warn!(
                    "{}: insufficient history ({} points) for return statistics",
                    slot.symbol,
                    slot.series.len()
                ),
            }
        }

        info!("Portfolio built with {} assets", slots.len());
        Ok(Self { slots, raw_weight_sum })
    }

    pub fn slots(&self) -> &[AssetSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn raw_weight_sum(&self) -> f64 {
        self.raw_weight_sum
    }

    pub fn expected_daily_return(&self) -> Option<f64> {
        expected_daily_return(&self.slots)
    }

    pub fn daily_volatility(&self) -> Option<f64> {
        daily_volatility(&self.slots)
    }

    pub fn portfolio_value(&self) -> Option<f64> {
        portfolio_value(&self.slots)
    }

    pub fn summary(&self) -> PortfolioSummary {
        PortfolioSummary {
            assets: self
                .slots
                .iter()
                .map(|slot| AssetSummary {
                    symbol: slot.symbol.clone(),
                    weight: slot.weight,
                    points: slot.series.len(),
                    mean_return: slot.series.mean_return,
                    stdev_return: slot.series.stdev_return,
                })
                .collect(),
            expected_daily_return: self.expected_daily_return(),
            daily_volatility: self.daily_volatility(),
            initial_value: self.portfolio_value(),
            raw_weight_sum: self.raw_weight_sum,
        }
    }

    /// Simulates total portfolio value. `initial_value` defaults to the
    /// current weighted value; an empty ensemble means the inputs were undefined.
    pub fn monte_carlo<R: Rng>(
        &self,
        days: usize,
        n_paths: usize,
        initial_value: Option<f64>,
        rng: &mut R,
    ) -> Result<PathEnsemble, PortfolioError> {
        let initial_value = initial_value.or_else(|| self.portfolio_value());
        simulation::simulate(
            self.expected_daily_return(),
            self.daily_volatility(),
            initial_value,
            days,
            n_paths,
            rng,
        )
    }

    pub fn report<R: Rng>(&self, horizon_days: usize, rng: &mut R) -> Result<Report, PortfolioError> {
        let summary = self.summary();
        let ensemble = self.monte_carlo(horizon_days, REPORT_MC_PATHS, summary.initial_value, rng)?;
        Ok(report::build(&summary, &ensemble, horizon_days))
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{AssetType, PricePoint};
    use chrono::{Duration, NaiveDate};
    use crate::report::{ReportLine, ReportWarning};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn series_from_closes(symbol: &str, closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let data = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PricePoint::close_only(start + Duration::days(i as i64), c))
            .collect();
        PriceSeries::new(symbol, "test", AssetType::Stock, "USD", data)
    }

    fn slot<'a>(portfolio: &'a Portfolio, symbol: &str) -> &'a AssetSlot {
        portfolio.slots().iter().find(|s| s.symbol == symbol).unwrap()
    }

    fn slot_with_stats(symbol: &str, weight: f64, mu: Option<f64>, sigma: Option<f64>) -> AssetSlot {
        let mut series = series_from_closes(symbol, &[100.0, 101.0]);
        series.mean_return = mu;
        series.stdev_return = sigma;
        AssetSlot {
            symbol: symbol.to_string(),
            series,
            weight,
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let portfolio = Portfolio::new(vec![
            ("AAA", AssetInput::new(series_from_closes("AAA", &[10.0, 11.0, 12.0]), 3.0)),
            ("BBB", AssetInput::new(series_from_closes("BBB", &[20.0, 19.0, 21.0]), 1.5)),
            ("CCC", AssetInput::new(series_from_closes("CCC", &[5.0, 5.5, 5.2]), 0.25)),
        ])
        .unwrap();

        let sum: f64 = portfolio.slots().iter().map(|s| s.weight).sum();
        assert!((sum - 1.0).abs() < 1e-9, "Weights should sum to 1.0, got {}", sum);
        assert!((portfolio.raw_weight_sum() - 4.75).abs() < 1e-12);
    }

    #[test]
    fn test_zero_weights_left_unchanged() {
        let portfolio = Portfolio::new(vec![
            ("AAA", AssetInput::new(series_from_closes("AAA", &[10.0, 11.0]), 0.0)),
            ("BBB", AssetInput::new(series_from_closes("BBB", &[20.0, 21.0]), 0.0)),
        ])
        .unwrap();

        assert!(portfolio.slots().iter().all(|s| s.weight == 0.0));
        assert_eq!(portfolio.raw_weight_sum(), 0.0);
        // Zero weights give zero variance, which maps to undefined volatility
        assert_eq!(portfolio.daily_volatility(), None);
    }

    #[test]
    fn test_negative_weight_rejected() {
        let err = Portfolio::new(vec![
            ("AAA", AssetInput::new(series_from_closes("AAA", &[10.0, 11.0]), 1.0)),
            ("BBB", AssetInput::new(series_from_closes("BBB", &[20.0, 21.0]), -0.5)),
        ])
        .unwrap_err();

        assert_eq!(
            err,
            PortfolioError::InvalidWeight {
                symbol: "BBB".to_string(),
                weight: -0.5
            }
        );
    }

    #[test]
    fn test_duplicate_symbol_replaces_in_place() {
        let portfolio = Portfolio::new(vec![
            ("AAA", AssetInput::new(series_from_closes("AAA", &[10.0, 11.0]), 1.0)),
            ("BBB", AssetInput::new(series_from_closes("BBB", &[20.0, 21.0]), 1.0)),
            ("AAA", AssetInput::new(series_from_closes("AAA", &[30.0, 31.0]), 2.0)),
        ])
        .unwrap();

        assert_eq!(portfolio.len(), 2);
        assert_eq!(portfolio.slots()[0].symbol, "AAA");
        assert!((portfolio.slots()[0].weight - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(slot(&portfolio, "AAA").series.last_close(), Some(31.0));
    }

    #[test]
    fn test_two_asset_scenario() {
        let mut slots = vec![
            slot_with_stats("A", 0.6, Some(0.001), Some(0.01)),
            slot_with_stats("B", 0.9, Some(0.0005), Some(0.02)),
        ];
        let raw = normalize_weights(&mut slots);
        assert!((raw - 1.5).abs() < 1e-12);
        assert!((slots[0].weight - 0.4).abs() < 1e-12);
        assert!((slots[1].weight - 0.6).abs() < 1e-12);

        let mu = expected_daily_return(&slots).unwrap();
        assert!((mu - (0.4 * 0.001 + 0.6 * 0.0005)).abs() < 1e-12);
        assert!((mu - 0.0007).abs() < 1e-12);

        let sigma = daily_volatility(&slots).unwrap();
        assert!((sigma - 0.00016f64.sqrt()).abs() < 1e-12);
        assert!((sigma - 0.012649).abs() < 1e-6);
    }

    #[test]
    fn test_missing_stats_excluded_without_redistribution() {
        let slots = vec![
            slot_with_stats("A", 0.5, Some(0.002), Some(0.01)),
            slot_with_stats("B", 0.5, None, None),
        ];
        assert!((expected_daily_return(&slots).unwrap() - 0.001).abs() < 1e-12);
        assert!((daily_volatility(&slots).unwrap() - 0.005).abs() < 1e-12);
    }

    #[test]
    fn test_volatility_undefined_cases() {
        // No contributing asset and all-zero volatility are indistinguishable
        let none = vec![slot_with_stats("A", 1.0, None, None)];
        let zero = vec![slot_with_stats("A", 1.0, Some(0.001), Some(0.0))];
        assert_eq!(daily_volatility(&none), None);
        assert_eq!(daily_volatility(&zero), None);
        assert_eq!(daily_volatility(&[]), None);
        assert_eq!(expected_daily_return(&none), None);
        assert_eq!(expected_daily_return(&zero), Some(0.001));
    }

    #[test]
    fn test_volatility_non_negative() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let slots: Vec<AssetSlot> = (0..4)
                .map(|i| {
                    let sigma = if rng.gen_bool(0.2) { None } else { Some(rng.gen_range(0.0..0.05)) };
                    slot_with_stats(&format!("S{}", i), rng.gen_range(0.0..1.0), Some(0.0), sigma)
                })
                .collect();
            if let Some(v) = daily_volatility(&slots) {
                assert!(v >= 0.0);
            }
        }
    }

    #[test]
    fn test_portfolio_value_skips_empty_series() {
        let portfolio = Portfolio::new(vec![
            ("AAA", AssetInput::new(series_from_closes("AAA", &[10.0, 20.0]), 1.0)),
            ("EMPTY", AssetInput::new(series_from_closes("EMPTY", &[]), 1.0)),
        ])
        .unwrap();
        assert!((portfolio.portfolio_value().unwrap() - 10.0).abs() < 1e-12);

        let empty = Portfolio::new(Vec::<(String, AssetInput)>::new()).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.portfolio_value(), None);
        assert_eq!(empty.expected_daily_return(), None);
    }

    #[test]
    fn test_single_point_series_excluded() {
        let portfolio = Portfolio::new(vec![
            ("AAA", AssetInput::new(series_from_closes("AAA", &[100.0, 101.0, 99.0, 102.0]), 1.0)),
            ("ONE", AssetInput::new(series_from_closes("ONE", &[50.0]), 1.0)),
        ])
        .unwrap();

        let one = slot(&portfolio, "ONE");
        assert_eq!(one.series.mean_return, None);
        assert_eq!(one.series.stdev_return, None);

        let aaa = slot(&portfolio, "AAA");
        let expected = 0.5 * aaa.series.mean_return.unwrap();
        assert!((portfolio.expected_daily_return().unwrap() - expected).abs() < 1e-15);
    }

    #[test]
    fn test_monte_carlo_empty_without_stats() {
        let portfolio = Portfolio::new(vec![(
            "ONE",
            AssetInput::new(series_from_closes("ONE", &[50.0]), 1.0),
        )])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let ensemble = portfolio.monte_carlo(30, 100, None, &mut rng).unwrap();
        assert!(ensemble.is_empty());
    }

    #[test]
    fn test_monte_carlo_uses_portfolio_value() {
        let portfolio = Portfolio::new(vec![
            ("AAA", AssetInput::new(series_from_closes("AAA", &[100.0, 102.0, 101.0, 104.0]), 1.0)),
            ("BBB", AssetInput::new(series_from_closes("BBB", &[50.0, 49.0, 51.0, 52.0]), 1.0)),
        ])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let ensemble = portfolio.monte_carlo(10, 25, None, &mut rng).unwrap();
        assert_eq!(ensemble.len(), 25);
        for path in ensemble.paths() {
            assert!((path[0] - 78.0).abs() < 1e-12);
        }

        let overridden = portfolio.monte_carlo(10, 5, Some(1_000.0), &mut rng).unwrap();
        assert!(overridden.paths().iter().all(|p| p[0] == 1_000.0));
    }

    #[test]
    fn test_report_single_point_series() {
        let portfolio = Portfolio::new(vec![
            ("AAA", AssetInput::new(series_from_closes("AAA", &[100.0]), 0.6)),
            ("BBB", AssetInput::new(series_from_closes("BBB", &[50.0]), 0.9)),
        ])
        .unwrap();
        let report = portfolio.report(30, &mut StdRng::seed_from_u64(21)).unwrap();

        assert!(!report.has_simulation());
        assert!(report.lines.contains(&ReportLine::CouldNotSimulate));
        assert!(!report.lines.iter().any(|l| matches!(l, ReportLine::Horizon { .. })));

        let weights: Vec<(&str, f64)> = report
            .lines
            .iter()
            .filter_map(|l| match l {
                ReportLine::Weight { symbol, percent } => Some((symbol.as_str(), *percent)),
                _ => None,
            })
            .collect();
        assert_eq!(weights.len(), 2);
        assert_eq!(weights[0].0, "AAA");
        assert!((weights[0].1 - 40.0).abs() < 1e-9);
        assert!((weights[1].1 - 60.0).abs() < 1e-9);

        assert!(report.lines.contains(&ReportLine::ExpectedReturn { value: None }));
        assert!(report.lines.contains(&ReportLine::Volatility { value: None }));
        let initial = report.lines.iter().find_map(|l| match l {
            ReportLine::InitialValue { value } => *value,
            _ => None,
        });
        assert!((initial.unwrap() - 70.0).abs() < 1e-9);

        let warnings: Vec<&ReportWarning> = report.warnings().collect();
        for symbol in ["AAA", "BBB"] {
            assert!(warnings.contains(&&ReportWarning::InsufficientData { symbol: symbol.to_string() }));
            assert!(warnings.contains(&&ReportWarning::ShortSeries {
                symbol: symbol.to_string(),
                points: 1
            }));
        }
        let raw_sum = warnings.iter().find_map(|w| match w {
            ReportWarning::WeightsRenormalized { raw_sum } => Some(*raw_sum),
            _ => None,
        });
        assert!((raw_sum.unwrap() - 1.5).abs() < 1e-12);
        assert_eq!(warnings.len(), 5);

        let text = report.to_string();
        assert!(text.contains("- AAA: 40.00%"));
        assert!(text.contains("Could not simulate"));
        assert!(text.contains("sum was 1.500000"));
    }

    #[test]
    fn test_report_healthy_portfolio() {
        let portfolio = Portfolio::new(vec![
            (
                "AAA",
                AssetInput::new(series_from_closes("AAA", &[100.0, 102.0, 101.0, 104.0, 103.0, 106.0]), 0.5),
            ),
            (
                "BBB",
                AssetInput::new(series_from_closes("BBB", &[50.0, 49.0, 51.0, 52.0, 51.5, 53.0]), 0.5),
            ),
        ])
        .unwrap();
        let report = portfolio.report(30, &mut StdRng::seed_from_u64(4)).unwrap();

        assert!(report.has_simulation());
        assert!(report.lines.contains(&ReportLine::Horizon { days: 30 }));
        assert!(!report.lines.contains(&ReportLine::CouldNotSimulate));

        let percentiles: Vec<(u8, f64)> = report
            .lines
            .iter()
            .filter_map(|l| match l {
                ReportLine::Percentile { percentile, value } => Some((*percentile, *value)),
                _ => None,
            })
            .collect();
        assert_eq!(percentiles.iter().map(|p| p.0).collect::<Vec<_>>(), vec![5, 50, 95]);
        assert!(percentiles[0].1 <= percentiles[1].1 && percentiles[1].1 <= percentiles[2].1);
        assert!(percentiles.iter().all(|p| p.1 > 0.0));
        assert_eq!(report.warnings().count(), 0);

        let text = report.to_string();
        assert!(text.contains("Pessimistic scenario (p5)"));
        assert!(text.contains("Base scenario (p50)"));
        assert!(text.contains("Optimistic scenario (p95)"));
    }

    #[test]
    fn test_report_zero_horizon_rejected() {
        let portfolio = Portfolio::new(vec![(
            "AAA",
            AssetInput::new(series_from_closes("AAA", &[100.0, 102.0, 101.0, 104.0]), 1.0),
        )])
        .unwrap();
        let err = portfolio.report(0, &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert_eq!(
            err,
            PortfolioError::InvalidSimulationParameters {
                days: 0,
                n_paths: REPORT_MC_PATHS
            }
        );
    }

    #[test]
    fn test_empty_portfolio_weight_sum_is_positive_zero() {
        let empty = Portfolio::new(Vec::<(String, AssetInput)>::new()).unwrap();
        assert_eq!(empty.raw_weight_sum(), 0.0);
        assert!(empty.raw_weight_sum().is_sign_positive());

        let text = empty.report(30, &mut StdRng::seed_from_u64(2)).unwrap().to_string();
        assert!(text.contains("sum was 0.000000"));
        assert!(!text.contains("-0.0"));
    }
}
