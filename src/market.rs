use std::{collections::BTreeMap, env, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use itertools::Itertools;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::DataError;

pub const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";
/// Page whose response sets the session cookie the crumb is bound to.
pub const DEFAULT_COOKIE_URL: &str = "https://fc.yahoo.com";

/// One daily OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Daily bars for one symbol, dates strictly increasing.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    symbol: String,
    bars: Vec<Bar>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Result<Self, DataError> {
        let symbol = symbol.into();
        if bars.is_empty() {
            return Err(DataError::unavailable(&symbol, "no bars returned"));
        }
        if let Some((a, b)) = bars.iter().tuple_windows().find(|(a, b)| a.date >= b.date) {
            return Err(DataError::InvalidSeries(format!(
                "{symbol}: dates not strictly increasing ({} then {})",
                a.date, b.date
            )));
        }
        Ok(Self { symbol, bars })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }
    pub fn len(&self) -> usize {
        self.bars.len()
    }
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }
    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }
    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    pub fn last(&self) -> &Bar {
        // non-empty by construction
        &self.bars[self.bars.len() - 1]
    }

    /// Close-to-close simple returns, one shorter than the series.
    pub fn daily_returns(&self) -> Vec<f64> {
        self.bars
            .iter()
            .tuple_windows()
            .map(|(prev, next)| (next.close - prev.close) / prev.close)
            .filter(|r| r.is_finite())
            .collect()
    }

    /// Close-to-close log returns, one shorter than the series.
    pub fn log_returns(&self) -> Vec<f64> {
        self.bars
            .iter()
            .tuple_windows()
            .map(|(prev, next)| (next.close / prev.close).ln())
            .filter(|r| r.is_finite())
            .collect()
    }
}

/// Company metrics the fundamental rules can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FundamentalMetric {
    /// Fraction, 0.03 = 3%.
    DividendYield,
    ForwardPe,
    TrailingPe,
    Beta,
    MarketCap,
}

impl FundamentalMetric {
    pub const ALL: [FundamentalMetric; 5] = [
        FundamentalMetric::DividendYield,
        FundamentalMetric::ForwardPe,
        FundamentalMetric::TrailingPe,
        FundamentalMetric::Beta,
        FundamentalMetric::MarketCap,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FundamentalMetric::DividendYield => "Dividend yield",
            FundamentalMetric::ForwardPe => "Forward P/E",
            FundamentalMetric::TrailingPe => "Trailing P/E",
            FundamentalMetric::Beta => "Beta",
            FundamentalMetric::MarketCap => "Market cap",
        }
    }

    /// Field name in the quote-summary payload.
    fn field(self) -> &'static str {
        match self {
            FundamentalMetric::DividendYield => "dividendYield",
            FundamentalMetric::ForwardPe => "forwardPE",
            FundamentalMetric::TrailingPe => "trailingPE",
            FundamentalMetric::Beta => "beta",
            FundamentalMetric::MarketCap => "marketCap",
        }
    }
}

/// Sparse fundamentals snapshot. Absent metrics carry no signal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    values: BTreeMap<FundamentalMetric, f64>,
}

impl Fundamentals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, metric: FundamentalMetric, value: f64) -> Self {
        self.insert(metric, value);
        self
    }

    pub fn insert(&mut self, metric: FundamentalMetric, value: f64) {
        if value.is_finite() {
            self.values.insert(metric, value);
        }
    }

    pub fn get(&self, metric: FundamentalMetric) -> Option<f64> {
        self.values.get(&metric).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Present metrics in [`FundamentalMetric::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (FundamentalMetric, f64)> + '_ {
        self.values.iter().map(|(m, v)| (*m, *v))
    }
}

/// Source of price history and fundamentals.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch_daily_history(&self, ticker: &str, period: &str)
    -> Result<PriceSeries, DataError>;

    async fn fetch_fundamentals(&self, ticker: &str) -> Result<Fundamentals, DataError>;

    async fn fetch_benchmark_history(
        &self,
        index_symbol: &str,
        period: &str,
    ) -> Result<PriceSeries, DataError> {
        self.fetch_daily_history(index_symbol, period).await
    }
}

/// Yahoo Finance chart and quote-summary endpoints.
///
/// Quote summary needs a crumb tied to a session cookie. The cookie comes from
/// `cookie_url`, the crumb from `/v1/test/getcrumb`; both are fetched once
/// per provider and reused through the client's cookie store.
pub struct YahooProvider {
    client: Client,
    base_url: String,
    cookie_url: String,
    crumb: OnceCell<String>,
}

impl YahooProvider {
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, DataError> {
        Ok(Self {
            client: mk_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cookie_url: DEFAULT_COOKIE_URL.to_string(),
            crumb: OnceCell::new(),
        })
    }

    pub fn with_cookie_url(mut self, url: impl Into<String>) -> Self {
        self.cookie_url = url.into();
        self
    }

    /// Reads `MARKET_DATA_BASE_URL`, `MARKET_DATA_COOKIE_URL` and
    /// `MARKET_DATA_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, DataError> {
        let base = env::var("MARKET_DATA_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let cookie = env::var("MARKET_DATA_COOKIE_URL").unwrap_or_else(|_| DEFAULT_COOKIE_URL.into());
        let timeout = env::var("MARKET_DATA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);
        Ok(Self::new(base, timeout)?.with_cookie_url(cookie))
    }

    async fn crumb(&self) -> Result<&str, DataError> {
        self.crumb
            .get_or_try_init(|| self.fetch_crumb())
            .await
            .map(String::as_str)
    }

    async fn fetch_crumb(&self) -> Result<String, DataError> {
        // the seed page answers 404; only its Set-Cookie matters
        match self.client.get(&self.cookie_url).send().await {
            Ok(resp) => debug!("cookie seed {} -> {}", self.cookie_url, resp.status()),
            Err(e) => warn!("cookie seed {} failed: {}", self.cookie_url, e),
        }

        let url = format!("{}/v1/test/getcrumb", self.base_url);
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DataError::Http {
                status: status.as_u16(),
                url,
            });
        }
        let crumb = resp.text().await?.trim().to_string();
        if crumb.is_empty() || crumb.contains(char::is_whitespace) || crumb.contains('<') {
            return Err(DataError::ResponseFormat(format!("{url}: no crumb in body")));
        }
        debug!("got crumb");
        Ok(crumb)
    }

    fn chart_url(&self, symbol: &str, period: &str) -> Result<Url, DataError> {
        let base = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        Url::parse_with_params(&base, &[("range", period), ("interval", "1d")])
            .map_err(|e| DataError::ResponseFormat(format!("bad chart url: {e}")))
    }

    fn quote_summary_url(&self, symbol: &str, crumb: &str) -> Result<Url, DataError> {
        let base = format!("{}/v10/finance/quoteSummary/{}", self.base_url, symbol);
        Url::parse_with_params(
            &base,
            &[("modules", "summaryDetail,defaultKeyStatistics"), ("crumb", crumb)],
        )
            .map_err(|e| DataError::ResponseFormat(format!("bad quote summary url: {e}")))
    }
}

#[async_trait]
impl MarketDataProvider for YahooProvider {
    async fn fetch_daily_history(
        &self,
        ticker: &str,
        period: &str,
    ) -> Result<PriceSeries, DataError> {
        let url = self.chart_url(ticker, period)?;
        info!("fetching {} daily history ({})", ticker, period);
        let body = do_get_json::<ChartResponse>(&self.client, url).await?;
        let bars = parse_chart(ticker, body)?;
        debug!("{}: {} bars", ticker, bars.len());
        PriceSeries::new(ticker, bars)
    }

    async fn fetch_fundamentals(&self, ticker: &str) -> Result<Fundamentals, DataError> {
        let crumb = self.crumb().await?;
        let url = self.quote_summary_url(ticker, crumb)?;
        info!("fetching {} fundamentals", ticker);
        let body = do_get_json::<Value>(&self.client, url).await?;
        parse_quote_summary(ticker, &body)
    }
}

/// HTTP client shared by all requests of a run.
pub fn mk_client(timeout: Option<Duration>) -> Result<Client, DataError> {
    let mut builder = Client::builder()
        .user_agent("Mozilla/5.0 (strike-advisor)")
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .deflate(true);
    if let Some(t) = timeout {
        builder = builder.timeout(t);
    }
    Ok(builder.build()?)
}

/// Single GET decoded as JSON. Failures surface to the caller as-is.
pub async fn do_get_json<T: for<'de> Deserialize<'de>>(
    client: &Client,
    url: Url,
) -> Result<T, DataError> {
    let resp = client.get(url.clone()).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(DataError::Http {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    resp.json::<T>()
        .await
        .map_err(|e| DataError::ResponseFormat(format!("{url}: {e}")))
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartData>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    /// Exchange offset from UTC in seconds.
    #[serde(default)]
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
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

/// Turn a chart payload into daily bars, deduped per date (last bar wins).
fn parse_chart(symbol: &str, resp: ChartResponse) -> Result<Vec<Bar>, DataError> {
    if let Some(err) = resp.chart.error {
        return Err(DataError::unavailable(
            symbol,
            format!("{}: {}", err.code, err.description),
        ));
    }
    let data = resp
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| DataError::unavailable(symbol, "empty chart result"))?;
    let gmtoffset = data.meta.as_ref().and_then(|m| m.gmtoffset).unwrap_or(0);
    let timestamps = data
        .timestamp
        .ok_or_else(|| DataError::unavailable(symbol, "no timestamps"))?;
    let quote = data
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| DataError::ResponseFormat("no quote block".into()))?;

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        // session date in the exchange's own time zone
        let date = DateTime::from_timestamp(ts + gmtoffset, 0)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| DataError::ResponseFormat(format!("invalid timestamp {ts}")))?;
        let field = |v: &Vec<Option<f64>>| v.get(i).copied().flatten();
        // holidays and halted sessions come back as nulls
        let (Some(open), Some(high), Some(low), Some(close)) = (
            field(&quote.open),
            field(&quote.high),
            field(&quote.low),
            field(&quote.close),
        ) else {
            continue;
        };
        bars.push(Bar {
            date,
            open,
            high,
            low,
            close,
            volume: field(&quote.volume).unwrap_or(0.0),
        });
    }

    let mut out = Vec::with_capacity(bars.len());
    for (_date, group) in &bars.into_iter().chunk_by(|b| b.date) {
        if let Some(last) = group.last() {
            out.push(last);
        }
    }
    if out.is_empty() {
        return Err(DataError::unavailable(symbol, "no complete bars"));
    }
    Ok(out)
}

fn parse_quote_summary(symbol: &str, body: &Value) -> Result<Fundamentals, DataError> {
    let summary = &body["quoteSummary"];
    if let Some(err) = summary.get("error").filter(|e| !e.is_null()) {
        let desc = err["description"].as_str().unwrap_or("unknown error");
        return Err(DataError::unavailable(symbol, desc));
    }
    let result = summary["result"]
        .as_array()
        .and_then(|r| r.first())
        .ok_or_else(|| DataError::unavailable(symbol, "empty quote summary"))?;

    let mut out = Fundamentals::new();
    for metric in FundamentalMetric::ALL {
        let value = ["summaryDetail", "defaultKeyStatistics"]
            .iter()
            .find_map(|module| raw_number(&result[*module][metric.field()]));
        if let Some(v) = value {
            out.insert(metric, v);
        }
    }
    Ok(out)
}

/// Yahoo wraps numbers as `{"raw": 0.01, "fmt": "1%"}`; empty objects mean absent.
fn raw_number(v: &Value) -> Option<f64> {
    v.get("raw").and_then(Value::as_f64).or_else(|| v.as_f64())
}
