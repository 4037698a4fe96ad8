use crate::config::{
    fred_api_key, HTTP_RETRY_ATTEMPTS, HTTP_RETRY_DELAY_SECS, HTTP_TIMEOUT_SECS, MOCK_DAILY_VOLATILITY, MOCK_SERIES_DAYS,
};
use crate::data::{AssetType, PricePoint, PriceSeries};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{info, warn};

/// Anything that can deliver daily price history for a list of symbols.
#[allow(async_fn_in_trait)]
pub trait PriceSource {
    async fn fetch(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        asset_type: AssetType,
    ) -> Result<Vec<PriceSeries>>;
}

/// GET with the browser user agent and a per-request timeout.
fn http_get(client: &reqwest::Client, url: &str) -> reqwest::RequestBuilder {
    client
        .get(url)
        .header("User-Agent", "Mozilla/5.0")
        .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
}

// ──────────────────────────────────────────────────────────────────────────────
// Yahoo Finance
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Deserialize, Debug)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
}

#[derive(Deserialize, Debug)]
struct YahooResult {
    meta: Option<YahooMeta>,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Deserialize, Debug)]
struct YahooMeta {
    currency: Option<String>,
}

#[derive(Deserialize, Debug)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
}

#[derive(Deserialize, Debug, Default)]
struct YahooQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Clone, Debug, Default)]
pub struct YahooSource {
    client: reqwest::Client,
}

impl YahooSource {
    pub fn new() -> Self {
        Self::default()
    }

    async fn fetch_chart(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<YahooChartResponse> {
        let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        // period2 is exclusive
        let period2 = (end + Duration::days(1)).and_time(NaiveTime::MIN).and_utc().timestamp();
        let url = format!(
            "https://query1.finance.yahoo.com/v8/finance/chart/{}?period1={}&period2={}&interval=1d",
            symbol, period1, period2
        );

        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = async {
                http_get(&self.client, &url)
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<YahooChartResponse>()
                    .await
            }
            .await;

            match result {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempts >= HTTP_RETRY_ATTEMPTS {
                        return Err(e.into());
                    }
                    warn!(
                        "Failed to fetch data for {} (attempt {}/{}): {}",
                        symbol, attempts, HTTP_RETRY_ATTEMPTS, e
                    );
                }
            }

            tokio::time::sleep(std::time::Duration::from_secs(HTTP_RETRY_DELAY_SECS)).await;
        }
    }
}

fn bar_field(values: &[Option<f64>], i: usize) -> f64 {
    values.get(i).copied().flatten().unwrap_or(f64::NAN)
}

fn yahoo_to_series(symbol: &str, asset_type: AssetType, response: YahooChartResponse) -> Result<PriceSeries> {
    let result = response
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| anyhow!("No chart result returned for {}", symbol))?;

    let currency = result
        .meta
        .and_then(|m| m.currency)
        .unwrap_or_else(|| "USD".to_string());
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    let mut data = Vec::with_capacity(result.timestamp.len());
    for (i, &ts) in result.timestamp.iter().enumerate() {
        let Some(date) = DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive()) else {
            continue;
        };
        data.push(PricePoint {
            date,
            open: bar_field(&quote.open, i),
            high: bar_field(&quote.high, i),
            low: bar_field(&quote.low, i),
            close: bar_field(&quote.close, i),
            volume: bar_field(&quote.volume, i),
        });
    }

    Ok(PriceSeries::new(symbol, "yahoo", asset_type, currency, data))
}

impl PriceSource for YahooSource {
    async fn fetch(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        asset_type: AssetType,
    ) -> Result<Vec<PriceSeries>> {
        let mut results = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            info!("Fetching {} from Yahoo Finance ({} → {})", symbol, start, end);
            match self.fetch_chart(symbol, start, end).await {
                Ok(resp) => match yahoo_to_series(symbol, asset_type, resp) {
                    Ok(series) => results.push(series),
                    Err(e) => warn!("Skipping {}: {}", symbol, e),
                },
                Err(e) => warn!("Skipping {}: {}", symbol, e),
            }
        }
        Ok(results)
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Synthetic broker feed
// ──────────────────────────────────────────────────────────────────────────────

/// Offline stand-in for a broker API: a deterministic upward drifting bar
/// every calendar day.
#[derive(Clone, Debug, Default)]
pub struct BrokerSource;

impl PriceSource for BrokerSource {
    async fn fetch(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        asset_type: AssetType,
    ) -> Result<Vec<PriceSeries>> {
        let results = symbols
            .iter()
            .map(|symbol| {
                let mut data = Vec::new();
                let mut price = 100.0;
                for date in start.iter_days().take_while(|d| *d <= end) {
                    let close = price * 1.005;
                    data.push(PricePoint {
                        date,
                        open: price,
                        high: price * 1.01,
                        low: price * 0.99,
                        close,
                        volume: 1_000_000.0,
                    });
                    price = close * 1.002;
                }
                PriceSeries::new(symbol.as_str(), "ibkr", asset_type, "USD", data)
            })
            .collect();
        Ok(results)
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// FRED (macro series)
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct FredObservationsResponse {
    observations: Vec<FredObservation>,
}

#[derive(Deserialize, Debug)]
struct FredObservation {
    date: String,
    value: String,
}

#[derive(Clone, Debug, Default)]
pub struct FredSource {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl FredSource {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    pub fn from_env() -> Self {
        Self::new(fred_api_key())
    }

    async fn fetch_observations(&self, series_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PricePoint>> {
        match &self.api_key {
            Some(key) => {
                let url = format!(
                    "https://api.stlouisfed.org/fred/series/observations?series_id={}&api_key={}&file_type=json&observation_start={}&observation_end={}",
                    series_id, key, start, end
                );
                let resp: FredObservationsResponse = http_get(&self.client, &url)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await
                    .with_context(|| format!("Invalid FRED response for {}", series_id))?;
                Ok(fred_observations_to_points(&resp.observations))
            }
            None => {
                let url = format!(
                    "https://fred.stlouisfed.org/graph/fredgraph.csv?id={}&cosd={}&coed={}",
                    series_id, start, end
                );
                let body = http_get(&self.client, &url)
                    .send()
                    .await?
                    .error_for_status()?
                    .text()
                    .await?;
                Ok(parse_fred_csv(&body))
            }
        }
    }
}

/// FRED marks missing observations with "."; those become `NaN` gaps.
fn parse_fred_value(raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(f64::NAN)
}

fn fred_observations_to_points(observations: &[FredObservation]) -> Vec<PricePoint> {
    observations
        .iter()
        .filter_map(|obs| {
            let date = NaiveDate::parse_from_str(obs.date.trim(), "%Y-%m-%d").ok()?;
            Some(PricePoint::close_only(date, parse_fred_value(&obs.value)))
        })
        .collect()
}

fn parse_fred_csv(body: &str) -> Vec<PricePoint> {
    body.lines()
        .skip(1)
        .filter_map(|line| {
            let (date, value) = line.split_once(',')?;
            let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
            Some(PricePoint::close_only(date, parse_fred_value(value)))
        })
        .collect()
}

impl PriceSource for FredSource {
    async fn fetch(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        _asset_type: AssetType,
    ) -> Result<Vec<PriceSeries>> {
        let mut results = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            info!("Fetching {} from FRED ({} → {})", symbol, start, end);
            match self.fetch_observations(symbol, start, end).await {
                Ok(points) => results.push(PriceSeries::new(symbol.as_str(), "fred", AssetType::Macro, "", points)),
                Err(e) => warn!("Skipping {}: {}", symbol, e),
            }
        }
        Ok(results)
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Mock random walk
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct MockSource {
    seed: u64,
}

impl MockSource {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl PriceSource for MockSource {
    async fn fetch(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        asset_type: AssetType,
    ) -> Result<Vec<PriceSeries>> {
        let span = (end - start).num_days() + 1;
        let days = usize::try_from(span).unwrap_or(0).min(MOCK_SERIES_DAYS);
        let results = symbols
            .iter()
            .enumerate()
            .map(|(i, symbol)| {
                let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(i as u64));
                let mut series = PriceSeries::new_mock(symbol, start, days, MOCK_DAILY_VOLATILITY, &mut rng);
                series.asset_type = asset_type;
                series
            })
            .collect();
        Ok(results)
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Registry
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub enum Source {
    Yahoo(YahooSource),
    Broker(BrokerSource),
    Fred(FredSource),
    Mock(MockSource),
}

impl PriceSource for Source {
    async fn fetch(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        asset_type: AssetType,
    ) -> Result<Vec<PriceSeries>> {
        match self {
            Self::Yahoo(s) => s.fetch(symbols, start, end, asset_type).await,
            Self::Broker(s) => s.fetch(symbols, start, end, asset_type).await,
            Self::Fred(s) => s.fetch(symbols, start, end, asset_type).await,
            Self::Mock(s) => s.fetch(symbols, start, end, asset_type).await,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FetchRequest {
    pub source: String,
    pub symbols: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub asset_type: AssetType,
}

/// Named sources; fetches from several of them in one pass.
#[derive(Clone, Debug, Default)]
pub struct DataManager {
    sources: HashMap<String, Source>,
}

impl DataManager {
    pub fn new(sources: HashMap<String, Source>) -> Self {
        Self { sources }
    }

    /// `yahoo`, `broker` (also registered as `ibkr`), `fred` and `mock`.
    pub fn with_default_sources(mock_seed: u64) -> Self {
        let mut sources = HashMap::new();
        sources.insert("yahoo".to_string(), Source::Yahoo(YahooSource::new()));
        sources.insert("broker".to_string(), Source::Broker(BrokerSource));
        sources.insert("ibkr".to_string(), Source::Broker(BrokerSource));
        sources.insert("fred".to_string(), Source::Fred(FredSource::from_env()));
        sources.insert("mock".to_string(), Source::Mock(MockSource::new(mock_seed)));
        Self::new(sources)
    }

    pub async fn fetch_from_source(
        &self,
        source_name: &str,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        asset_type: AssetType,
    ) -> Result<Vec<PriceSeries>> {
        let source = self
            .sources
            .get(source_name)
            .ok_or_else(|| anyhow!("Unknown data source '{}'", source_name))?;
        source.fetch(symbols, start, end, asset_type).await
    }

    /// Concatenates the series of every request, in request order.
    pub async fn fetch_multiple_sources(&self, requests: &[FetchRequest]) -> Result<Vec<PriceSeries>> {
        let mut all_series = Vec::new();
        for req in requests {
            let series = self
                .fetch_from_source(&req.source, &req.symbols, req.start, req.end, req.asset_type)
                .await?;
            all_series.extend(series);
        }
        Ok(all_series)
    }
}
