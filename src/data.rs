use crate::stats;
use chrono::{Duration, NaiveDate};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Stock,
    Index,
    Macro,
}

impl AssetType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Index => "index",
            Self::Macro => "macro",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stock" => Ok(Self::Stock),
            "index" => Ok(Self::Index),
            "macro" => Ok(Self::Macro),
            other => Err(anyhow::anyhow!(
                "Unknown asset type '{}'. Allowed values: stock | index | macro",
                other
            )),
        }
    }
}

/// One daily bar (OHLCV). Macro series only carry `close`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PricePoint {
    pub fn close_only(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            open: f64::NAN,
            high: f64::NAN,
            low: f64::NAN,
            close,
            volume: f64::NAN,
        }
    }
}

/// Price history for one instrument, as delivered by a source.
///
/// `mean_return` and `stdev_return` stay `None` until `update_basic_stats`
/// runs, and afterwards are either both set or both `None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub source: String,
    pub asset_type: AssetType,
    pub currency: String,
    pub data: Vec<PricePoint>,
    pub mean_return: Option<f64>,
    pub stdev_return: Option<f64>,
}

impl PriceSeries {
    pub fn new(
        symbol: impl Into<String>,
        source: impl Into<String>,
        asset_type: AssetType,
        currency: impl Into<String>,
        data: Vec<PricePoint>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            source: source.into(),
            asset_type,
            currency: currency.into(),
            data,
            mean_return: None,
            stdev_return: None,
        }
    }

    /// Sorts by date, keeps the last bar for each duplicated date and drops
    /// bars whose close is missing (`NaN` or infinite).
    pub fn clean(&mut self) {
        self.data.retain(|p| p.close.is_finite());
        // Stable sort keeps arrival order within a date, so the last one wins below.
        self.data.sort_by_key(|p| p.date);

        let mut deduped: Vec<PricePoint> = Vec::with_capacity(self.data.len());
        for point in self.data.drain(..) {
            match deduped.last_mut() {
                Some(prev) if prev.date == point.date => *prev = point,
                _ => deduped.push(point),
            }
        }
        self.data = deduped;
    }

    pub fn update_basic_stats(&mut self) {
        let returns = stats::log_returns(&self.close_prices());
        match stats::mean(&returns) {
            Some(mu) => {
                self.mean_return = Some(mu);
                self.stdev_return = Some(stats::stdev(&returns));
            }
            None => {
                self.mean_return = None;
                self.stdev_return = None;
            }
        }
    }

    pub fn close_prices(&self) -> Vec<f64> {
        self.data.iter().map(|p| p.close).collect()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.data.last().map(|p| p.close)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Random-walk series for offline runs. Daily moves are uniform in ±`volatility`.
    pub fn new_mock<R: Rng>(
        symbol: &str,
        start: NaiveDate,
        days: usize,
        volatility: f64,
        rng: &mut R,
    ) -> Self {
        let mut data = Vec::with_capacity(days);
        let mut current_price: f64 = 100.0;
        let mut current_date = start;

        for _ in 0..days {
            let change_pct: f64 = if volatility > 0.0 {
                rng.gen_range(-volatility..volatility)
            } else {
                0.0
            };
            let open = current_price;
            let close = open * (1.0 + change_pct);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
            let volume = rng.gen_range(1000.0..10000.0);

            data.push(PricePoint {
                date: current_date,
                open,
                high,
                low,
                close,
                volume,
            });

            current_price = close;
            current_date += Duration::days(1);
        }

        Self::new(symbol, "mock", AssetType::Stock, "USD", data)
    }
}

/// Console summary of fetched series, `max_points` bars each.
pub fn preview_lines(series: &[PriceSeries], max_points: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for s in series {
        lines.push("=".repeat(60));
        lines.push(format!("Symbol:      {}", s.symbol));
        lines.push(format!("Source:      {}", s.source));
        lines.push(format!("Asset Type:  {}", s.asset_type));
        lines.push(format!("Currency:    {}", s.currency));
        lines.push(format!("mean_return: {}", fmt_optional(s.mean_return)));
        lines.push(format!("stdev_ret.:  {}", fmt_optional(s.stdev_return)));
        lines.push(format!("Points:      {}", s.len()));
        if s.is_empty() {
            lines.push("  (no data)".to_string());
            continue;
        }
        lines.push(format!("First {} points:", max_points));
        for p in s.data.iter().take(max_points) {
            if s.asset_type == AssetType::Macro {
                lines.push(format!("  {} | Value: {}{}", p.date, p.close, s.currency));
            } else {
                lines.push(format!(
                    "  {} | O:{:.2} H:{:.2} L:{:.2} C:{:.2} V:{:.0}",
                    p.date, p.open, p.high, p.low, p.close, p.volume
                ));
            }
        }
    }
    lines
}

fn fmt_optional(value: Option<f64>) -> String {
    value.map(|v| format!("{:.6}", v)).unwrap_or_else(|| "n/a".to_string())
}
