pub mod advisor;
pub mod chart;
pub mod config;
pub mod decision;
pub mod error;
pub mod indicators;
pub mod market;
pub mod report;
pub mod rules;

use clap::Args;
use std::path::PathBuf;

use crate::config::{DEFAULT_BENCHMARK, DEFAULT_PERIOD};
use crate::indicators::FillPolicy;

/// Inputs shared by every command that looks at one ticker.
#[derive(Args, Debug, Clone)]
pub struct MarketArgs {
    /// Stock ticker (prompted for when omitted)
    #[arg(long, short)]
    pub ticker: Option<String>,

    /// Lookback window passed to the data provider (e.g. 6mo, 1y, 2y)
    #[arg(long, default_value = DEFAULT_PERIOD)]
    pub period: String,

    /// Market index for relative strength
    #[arg(long, default_value = DEFAULT_BENCHMARK)]
    pub benchmark: String,

    /// Skip the relative-strength benchmark fetch
    #[arg(long)]
    pub no_benchmark: bool,

    /// Skip the fundamentals fetch (no dividend / P/E reasons)
    #[arg(long)]
    pub skip_fundamentals: bool,

    /// How undefined warm-up values are written to the CSV export
    #[arg(long, value_enum, default_value_t = FillPolicy::Undefined)]
    pub fill_policy: FillPolicy,

    /// JSON file overriding rule thresholds
    #[arg(long)]
    pub thresholds: Option<PathBuf>,
}

/// Score the rules into an options suggestion.
#[derive(Args, Debug, Clone)]
pub struct AdviseArgs {
    #[command(flatten)]
    pub market: MarketArgs,

    /// Days until the option expires (prompted for when omitted)
    #[arg(long, short)]
    pub days: Option<i64>,

    /// Directory for the chart and exports
    #[arg(long, default_value = ".")]
    pub out: PathBuf,

    /// Do not render the price chart
    #[arg(long)]
    pub no_chart: bool,

    /// Also write `{ticker}_indicators.csv`
    #[arg(long)]
    pub export_csv: bool,
}

/// Composite uptrend/downtrend check.
#[derive(Args, Debug, Clone)]
pub struct TrendArgs {
    #[command(flatten)]
    pub market: MarketArgs,
}
