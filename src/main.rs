use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use strike_advisor::config::{self, DEFAULT_BENCHMARK, DEFAULT_PERIOD};
use strike_advisor::error::ConfigError;
use strike_advisor::indicators::FillPolicy;
use strike_advisor::{AdviseArgs, MarketArgs, TrendArgs, advisor, report};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    Advise(AdviseArgs),
    Trend(TrendArgs),
}

fn get_default_advise_args() -> AdviseArgs {
    AdviseArgs {
        market: MarketArgs {
            ticker: None,
            period: DEFAULT_PERIOD.to_string(),
            benchmark: DEFAULT_BENCHMARK.to_string(),
            no_benchmark: false,
            skip_fundamentals: false,
            fill_policy: FillPolicy::Undefined,
            thresholds: None,
        },
        days: None,
        out: PathBuf::from("."),
        no_chart: false,
        export_csv: false,
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    let n = io::stdin().lock().read_line(&mut line)?;
    if n == 0 {
        bail!("no input for {:?}", label.trim());
    }
    Ok(line)
}

fn resolve_ticker(given: Option<&str>) -> Result<String> {
    let raw = match given {
        Some(t) => t.to_string(),
        None => prompt("Enter a stock ticker: ")?,
    };
    Ok(config::normalize_ticker(&raw)?)
}

fn resolve_days(given: Option<i64>) -> Result<i64> {
    match given {
        Some(d) if d >= 0 => Ok(d),
        Some(d) => Err(ConfigError::InvalidDays(d.to_string()).into()),
        None => {
            let raw = prompt("Enter the number of days out for the option's expiration: ")?;
            Ok(config::parse_days_out(&raw)?)
        }
    }
}

async fn run_advise(args: AdviseArgs) -> Result<()> {
    let ticker = resolve_ticker(args.market.ticker.as_deref())?;
    let days_out = resolve_days(args.days)?;
    advisor::execute(&args, &ticker, days_out)
        .await
        .with_context(|| format!("advise {ticker}"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();
    match args.command {
        Some(Command::Advise(advise_args)) => {
            run_advise(advise_args).await?;
        }
        Some(Command::Trend(trend_args)) => {
            let ticker = resolve_ticker(trend_args.market.ticker.as_deref())?;
            advisor::execute_trend(&trend_args, &ticker)
                .await
                .with_context(|| format!("trend {ticker}"))?;
        }
        None => {
            // Default behavior: interactive advise run
            println!("{}\n", report::GREETING);
            run_advise(get_default_advise_args()).await?;
        }
    }
    Ok(())
}
