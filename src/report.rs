use crate::config::{SHORT_SERIES_POINTS, WEIGHT_SUM_TOLERANCE};
use crate::portfolio::PortfolioSummary;
use crate::simulation::PathEnsemble;
use serde::Serialize;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Composition,
    DailyMetrics,
    MonteCarlo,
    Warnings,
}

impl Section {
    pub fn title(self) -> &'static str {
        match self {
            Self::Composition => "Composition (normalized weights)",
            Self::DailyMetrics => "Estimated daily metrics",
            Self::MonteCarlo => "Monte Carlo simulation",
            Self::Warnings => "Warnings",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportWarning {
    InsufficientData { symbol: String },
    ShortSeries { symbol: String, points: usize },
    WeightsRenormalized { raw_sum: f64 },
}

/// One line of the report. Metric values are `None` when undefined.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportLine {
    Heading { section: Section },
    Weight { symbol: String, percent: f64 },
    ExpectedReturn { value: Option<f64> },
    Volatility { value: Option<f64> },
    InitialValue { value: Option<f64> },
    Horizon { days: usize },
    Percentile { percentile: u8, value: f64 },
    CouldNotSimulate,
    Warning { warning: ReportWarning },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Report {
    pub lines: Vec<ReportLine>,
}

/// Final-value percentiles of an ensemble (nearest rank).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PercentileSet {
    pub p5: f64,
    pub p50: f64,
    pub p95: f64,
}

impl PercentileSet {
    pub fn from_ensemble(ensemble: &PathEnsemble) -> Option<Self> {
        let mut finals = ensemble.final_values();
        if finals.is_empty() {
            return None;
        }
        finals.sort_by(f64::total_cmp);
        Some(Self {
            p5: nearest_rank(&finals, 0.05),
            p50: nearest_rank(&finals, 0.50),
            p95: nearest_rank(&finals, 0.95),
        })
    }
}

/// `sorted[floor(p * n)]`, clamped to the last element. `sorted` must be non-empty.
pub fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    let idx = ((p * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Assembles composition, daily metrics, Monte Carlo summary and warnings, in that order.
pub fn build(summary: &PortfolioSummary, ensemble: &PathEnsemble, horizon_days: usize) -> Report {
    let mut lines = Vec::new();

    lines.push(ReportLine::Heading { section: Section::Composition });
    for asset in &summary.assets {
        lines.push(ReportLine::Weight {
            symbol: asset.symbol.clone(),
            percent: round2(asset.weight * 100.0),
        });
    }

    lines.push(ReportLine::Heading { section: Section::DailyMetrics });
    lines.push(ReportLine::ExpectedReturn { value: summary.expected_daily_return });
    lines.push(ReportLine::Volatility { value: summary.daily_volatility });
    lines.push(ReportLine::InitialValue { value: summary.initial_value });

    lines.push(ReportLine::Heading { section: Section::MonteCarlo });
    match PercentileSet::from_ensemble(ensemble) {
        Some(pct) => {
            lines.push(ReportLine::Horizon { days: horizon_days });
            lines.push(ReportLine::Percentile { percentile: 5, value: pct.p5 });
            lines.push(ReportLine::Percentile { percentile: 50, value: pct.p50 });
            lines.push(ReportLine::Percentile { percentile: 95, value: pct.p95 });
        }
        None => lines.push(ReportLine::CouldNotSimulate),
    }

    lines.push(ReportLine::Heading { section: Section::Warnings });
    for asset in &summary.assets {
        if asset.mean_return.is_none() || asset.stdev_return.is_none() {
            lines.push(ReportLine::Warning {
                warning: ReportWarning::InsufficientData { symbol: asset.symbol.clone() },
            });
        }
        if asset.points < SHORT_SERIES_POINTS {
            lines.push(ReportLine::Warning {
                warning: ReportWarning::ShortSeries {
                    symbol: asset.symbol.clone(),
                    points: asset.points,
                },
            });
        }
    }
    if (summary.raw_weight_sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        lines.push(ReportLine::Warning {
            warning: ReportWarning::WeightsRenormalized { raw_sum: summary.raw_weight_sum },
        });
    }

    Report { lines }
}

impl Report {
    pub fn has_simulation(&self) -> bool {
        self.lines.iter().any(|l| matches!(l, ReportLine::Percentile { .. }))
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ReportWarning> {
        self.lines.iter().filter_map(|l| match l {
            ReportLine::Warning { warning } => Some(warning),
            _ => None,
        })
    }
}

fn fmt_metric(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", precision, v),
        None => "undefined".to_string(),
    }
}

impl fmt::Display for ReportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData { symbol } => {
                write!(f, "{}: insufficient data for reliable statistics.", symbol)
            }
            Self::ShortSeries { symbol, points } => {
                write!(f, "{}: extremely short series ({} points).", symbol, points)
            }
            Self::WeightsRenormalized { raw_sum } => write!(
                f,
                "Weights did not sum to 1 (sum was {:.6}); they were normalized internally.",
                raw_sum
            ),
        }
    }
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heading { section } => write!(f, "## {}", section.title()),
            Self::Weight { symbol, percent } => write!(f, "- {}: {:.2}%", symbol, percent),
            Self::ExpectedReturn { value } => {
                write!(f, "- Expected daily return (mean): {}", fmt_metric(*value, 6))
            }
            Self::Volatility { value } => {
                write!(f, "- Estimated daily volatility: {}", fmt_metric(*value, 6))
            }
            Self::InitialValue { value } => {
                write!(f, "- Estimated initial portfolio value: {}", fmt_metric(*value, 2))
            }
            Self::Horizon { days } => write!(f, "- Simulated horizon: {} days", days),
            Self::Percentile { percentile, value } => {
                let label = match percentile {
                    5 => "Pessimistic",
                    50 => "Base",
                    95 => "Optimistic",
                    _ => "Scenario",
                };
                write!(f, "- {} scenario (p{}): {:.2}", label, percentile, value)
            }
            Self::CouldNotSimulate => write!(f, "- Could not simulate (missing data or statistics)."),
            Self::Warning { warning } => write!(f, "- {}", warning),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Portfolio Report")?;
        for line in &self.lines {
            if matches!(line, ReportLine::Heading { .. }) {
                writeln!(f)?;
            }
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}
