use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use csv::WriterBuilder;
use tempfile::NamedTempFile;
use tracing::info;

use crate::decision::Decision;
use crate::indicators::IndicatorFrame;
use crate::market::{FundamentalMetric, Fundamentals, PriceSeries};
use crate::rules::TrendCall;

pub const GREETING: &str = "--- Hello there! I'm your stock option trading and investing assistant. Let's look at the numbers. ---";

pub const DISCLAIMER_TITLE: &str = "--- Disclaimer: Potential for Losses in Options Investing ---";

pub const DISCLAIMER: &str = "Options investing carries the potential for significant financial losses. \
Due to factors like market volatility, leverage, time decay, and incomplete information, options trading \
can result in substantial losses. The information provided here is not financial advice. Investors should \
seek guidance from a qualified financial advisor and exercise caution when considering options trading to \
manage these risks effectively. By using this tool, you agree to hold its authors and any affiliates and \
representatives harmless from any financial losses that may result from errors and misuse.";

pub fn money(v: f64) -> String {
    format!("${v:.2}")
}

/// Human-readable decision summary.
pub fn decision_summary(decision: &Decision, chart: Option<&Path>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Decision: {}", decision.action);
    let _ = writeln!(out, "Strike Price (OTM): {}", money(decision.strike_otm));
    let _ = writeln!(out, "Strike Price (ITM): {}", money(decision.strike_itm));
    let _ = writeln!(
        out,
        "Expiration Date: {}",
        decision.expiration.format("%Y-%m-%d")
    );
    let _ = writeln!(out, "\nReasons:");
    if decision.reasons.is_empty() {
        let _ = writeln!(out, "- (no rule fired)");
    }
    for reason in &decision.reasons {
        let _ = writeln!(out, "- {reason}");
    }
    if let Some(path) = chart {
        let _ = writeln!(out, "\nChart:\n{}", path.display());
    }
    out
}

fn metric_value(metric: FundamentalMetric, v: f64) -> String {
    match metric {
        FundamentalMetric::DividendYield => format!("{:.2}%", v * 100.0),
        FundamentalMetric::MarketCap if v >= 1e9 => format!("${:.2}B", v / 1e9),
        FundamentalMetric::MarketCap => format!("${:.2}M", v / 1e6),
        _ => format!("{v:.2}"),
    }
}

/// Every fetched company metric, including the ones no rule reads.
pub fn fundamentals_summary(fundamentals: &Fundamentals) -> String {
    let mut out = String::new();
    if fundamentals.is_empty() {
        return out;
    }
    let _ = writeln!(out, "Fundamentals:");
    for (metric, v) in fundamentals.iter() {
        let _ = writeln!(out, "- {}: {}", metric.label(), metric_value(metric, v));
    }
    out
}

pub fn trend_summary(ticker: &str, call: &TrendCall) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{ticker}: {}", call.trend);
    let _ = writeln!(out, "\nReasons:");
    for reason in &call.reasons {
        let _ = writeln!(out, "- {reason}");
    }
    out
}

pub fn disclaimer() -> String {
    format!("{DISCLAIMER_TITLE}\n\n{DISCLAIMER}")
}

/// Write bars plus every indicator column to `{ticker}_indicators.csv`.
pub fn export_indicators(
    series: &PriceSeries,
    frame: &IndicatorFrame,
    out_dir: &Path,
) -> Result<PathBuf> {
    fs::create_dir_all(out_dir).context("create export dir")?;
    let target = out_dir.join(format!("{}_indicators.csv", series.symbol()));
    let mut tmp = NamedTempFile::new_in(out_dir)?;
    {
        let mut wtr = WriterBuilder::new().from_writer(tmp.as_file_mut());
        let columns = frame.columns();
        let mut header = vec!["date", "open", "high", "low", "close", "volume"];
        header.extend(columns.iter().map(|(name, _)| *name));
        wtr.write_record(&header)?;

        for (i, bar) in series.bars().iter().enumerate() {
            let mut row = vec![
                bar.date.format("%Y-%m-%d").to_string(),
                format!("{:.4}", bar.open),
                format!("{:.4}", bar.high),
                format!("{:.4}", bar.low),
                format!("{:.4}", bar.close),
                format!("{:.0}", bar.volume),
            ];
            row.extend(columns.iter().map(|(_, col)| {
                col.get(i)
                    .copied()
                    .flatten()
                    .map(|v| format!("{v:.6}"))
                    .unwrap_or_default()
            }));
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
    }
    tmp.persist(&target)
        .with_context(|| format!("move export into {}", target.display()))?;
    info!("wrote {}", target.display());
    Ok(target)
}
