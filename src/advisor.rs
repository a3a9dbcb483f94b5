//! One advisory run: fetch, compute indicators, evaluate, decide, present.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use tracing::{debug, info};

use crate::chart::{ChartRenderer, NoChart, PngChart};
use crate::config::Thresholds;
use crate::decision::{self, Decision, Evaluation};
use crate::error::DataError;
use crate::indicators::{FillPolicy, IndicatorFrame};
use crate::market::{Fundamentals, MarketDataProvider, PriceSeries, YahooProvider};
use crate::report;
use crate::rules::{self, TrendCall};
use crate::{AdviseArgs, MarketArgs, TrendArgs};

/// Bars needed before the latest-three-bar rules can be read.
pub const MIN_BARS: usize = 3;

#[derive(Debug, Clone)]
pub struct Request<'a> {
    pub ticker: &'a str,
    pub period: &'a str,
    pub benchmark: Option<&'a str>,
    pub fundamentals: bool,
    pub fill: FillPolicy,
}

/// Everything fetched and derived for one ticker.
///
/// `frame` keeps warm-up values undefined; `fill` only applies to exports.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub series: PriceSeries,
    pub frame: IndicatorFrame,
    pub benchmark: Option<PriceSeries>,
    pub fundamentals: Fundamentals,
    pub fill: FillPolicy,
}

impl Analysis {
    pub fn new(
        series: PriceSeries,
        benchmark: Option<PriceSeries>,
        fundamentals: Fundamentals,
        fill: FillPolicy,
    ) -> Self {
        let frame = IndicatorFrame::compute(&series);
        Self {
            series,
            frame,
            benchmark,
            fundamentals,
            fill,
        }
    }
}

/// Fetches history, benchmark and fundamentals one after another.
pub async fn analyze<P>(provider: &P, req: &Request<'_>) -> Result<Analysis, DataError>
where
    P: MarketDataProvider + ?Sized,
{
    let series = provider.fetch_daily_history(req.ticker, req.period).await?;
    if series.len() < MIN_BARS {
        return Err(DataError::unavailable(
            req.ticker,
            format!("only {} bars, need {}", series.len(), MIN_BARS),
        ));
    }

    let benchmark = match req.benchmark {
        Some(index) => Some(provider.fetch_benchmark_history(index, req.period).await?),
        None => None,
    };

    let fundamentals = if req.fundamentals {
        provider.fetch_fundamentals(req.ticker).await?
    } else {
        Fundamentals::new()
    };
    debug!("{} fundamentals: {:?}", req.ticker, fundamentals);

    Ok(Analysis::new(series, benchmark, fundamentals, req.fill))
}

/// Runs the four scoring evaluators.
pub fn evaluate(analysis: &Analysis, t: &Thresholds) -> Evaluation {
    let eval = Evaluation {
        fundamental: rules::fundamental(&analysis.fundamentals, t),
        technical: rules::technical(
            &analysis.series,
            &analysis.frame,
            analysis.benchmark.as_ref(),
            t,
        ),
        volume: rules::volume(&analysis.series, t),
        volatility: rules::volatility(&analysis.series, t),
    };
    info!(
        "reasons: fundamental={} technical={} volume={} volatility={}",
        eval.fundamental.len(),
        eval.technical.len(),
        eval.volume.len(),
        eval.volatility.len()
    );
    eval
}

pub fn advise(analysis: &Analysis, today: NaiveDate, days_out: i64, t: &Thresholds) -> Decision {
    let eval = evaluate(analysis, t);
    let d = decision::decide(eval, analysis.series.last().close, today, days_out, t);
    info!("score {} -> {}", d.score, d.action);
    d
}

pub fn trend(analysis: &Analysis, t: &Thresholds) -> TrendCall {
    rules::basic(
        &analysis.series,
        &analysis.frame,
        analysis.benchmark.as_ref(),
        &analysis.fundamentals,
        t,
    )
}

fn load_thresholds(args: &MarketArgs) -> Result<Thresholds> {
    match &args.thresholds {
        Some(path) => {
            let t = Thresholds::from_json_file(path)?;
            info!("thresholds from {}", path.display());
            Ok(t)
        }
        None => Ok(Thresholds::default()),
    }
}

fn request<'a>(args: &'a MarketArgs, ticker: &'a str) -> Request<'a> {
    Request {
        ticker,
        period: &args.period,
        benchmark: (!args.no_benchmark).then_some(args.benchmark.as_str()),
        fundamentals: !args.skip_fundamentals,
        fill: args.fill_policy,
    }
}

/// The advise command: prints the decision, the chart path and the disclaimer.
pub async fn execute(args: &AdviseArgs, ticker: &str, days_out: i64) -> Result<()> {
    let t = load_thresholds(&args.market)?;
    let provider = YahooProvider::from_env().context("build market data client")?;
    let analysis = analyze(&provider, &request(&args.market, ticker))
        .await
        .with_context(|| format!("fetch market data for {ticker}"))?;

    let decision = advise(&analysis, Local::now().date_naive(), days_out, &t);

    let renderer: Box<dyn ChartRenderer> = if args.no_chart {
        Box::new(NoChart)
    } else {
        Box::new(PngChart)
    };
    let chart = renderer
        .render(&analysis.series, &args.out)
        .context("render chart")?;

    if args.export_csv {
        let exported = analysis.frame.filled(analysis.fill);
        report::export_indicators(&analysis.series, &exported, &args.out)?;
    }

    println!();
    print!("{}", report::decision_summary(&decision, chart.as_deref()));
    let fundamentals = report::fundamentals_summary(&analysis.fundamentals);
    if !fundamentals.is_empty() {
        println!();
        print!("{fundamentals}");
    }
    println!();
    println!("{}", report::disclaimer());
    Ok(())
}

/// The trend command: basic composite path only.
pub async fn execute_trend(args: &TrendArgs, ticker: &str) -> Result<()> {
    let t = load_thresholds(&args.market)?;
    let provider = YahooProvider::from_env().context("build market data client")?;
    let analysis = analyze(&provider, &request(&args.market, ticker))
        .await
        .with_context(|| format!("fetch market data for {ticker}"))?;

    let call = trend(&analysis, &t);
    println!();
    print!("{}", report::trend_summary(ticker, &call));
    let fundamentals = report::fundamentals_summary(&analysis.fundamentals);
    if !fundamentals.is_empty() {
        println!();
        print!("{fundamentals}");
    }
    println!();
    println!("{}", report::disclaimer());
    Ok(())
}
