//! Rule thresholds and run settings.
//!
//! Every cut-off the evaluators and the aggregator use lives here as a named
//! constant with its unit. [`Thresholds`] gathers them so a run can override
//! any of them from a JSON file without touching evaluator code.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// RSI below this (index points, 0-100) reads as oversold.
pub const RSI_OVERSOLD: f64 = 30.0;
/// RSI above this (index points, 0-100) reads as overbought.
pub const RSI_OVERBOUGHT: f64 = 70.0;
/// Stochastic %K and %D above this (percent) read as overbought.
pub const STOCH_OVERBOUGHT: f64 = 80.0;
/// Stochastic %K and %D below this (percent) read as oversold.
pub const STOCH_OVERSOLD: f64 = 20.0;
/// ATR above this flags high volatility. Absolute price units, so its meaning
/// shifts with the ticker's price level.
pub const ATR_HIGH: f64 = 0.05;
/// Latest volume above this multiple of the window mean is high interest.
pub const VOLUME_HIGH_RATIO: f64 = 1.5;
/// Latest volume below this multiple of the window mean is low interest.
pub const VOLUME_LOW_RATIO: f64 = 0.5;
/// Dividend yield above this fraction (0.03 = 3%) is a good yield.
pub const DIVIDEND_YIELD_GOOD: f64 = 0.03;
/// Forward P/E below this ratio reads as undervalued.
pub const FORWARD_PE_CHEAP: f64 = 20.0;
/// Annualised log-return volatility (fraction) above which the basic path warns.
pub const ANNUALIZED_VOL_HIGH: f64 = 0.3;
/// Raw standard deviation of close prices (price units) above which the
/// volatility evaluator warns. Unnormalised, like [`ATR_HIGH`].
pub const RAW_CLOSE_STD_HIGH: f64 = 1.5;
/// Strike distance from the latest close, as a fraction of price.
pub const STRIKE_OFFSET: f64 = 0.05;
/// Scores strictly above this buy calls.
pub const SCORE_BUY_CALL: i64 = 3;
/// Scores strictly above this (and not above [`SCORE_BUY_CALL`]) sell puts.
pub const SCORE_SELL_PUT: i64 = 0;
/// Scores strictly above this (and not above [`SCORE_SELL_PUT`]) sell calls.
pub const SCORE_SELL_CALL: i64 = -3;
/// Trading days per year used to annualise daily volatility.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

pub const DEFAULT_PERIOD: &str = "1y";
pub const DEFAULT_BENCHMARK: &str = "^GSPC";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub stoch_overbought: f64,
    pub stoch_oversold: f64,
    pub atr_high: f64,
    pub volume_high_ratio: f64,
    pub volume_low_ratio: f64,
    pub dividend_yield_good: f64,
    pub forward_pe_cheap: f64,
    pub annualized_vol_high: f64,
    pub raw_close_std_high: f64,
    pub strike_offset: f64,
    pub score_buy_call: i64,
    pub score_sell_put: i64,
    pub score_sell_call: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            rsi_oversold: RSI_OVERSOLD,
            rsi_overbought: RSI_OVERBOUGHT,
            stoch_overbought: STOCH_OVERBOUGHT,
            stoch_oversold: STOCH_OVERSOLD,
            atr_high: ATR_HIGH,
            volume_high_ratio: VOLUME_HIGH_RATIO,
            volume_low_ratio: VOLUME_LOW_RATIO,
            dividend_yield_good: DIVIDEND_YIELD_GOOD,
            forward_pe_cheap: FORWARD_PE_CHEAP,
            annualized_vol_high: ANNUALIZED_VOL_HIGH,
            raw_close_std_high: RAW_CLOSE_STD_HIGH,
            strike_offset: STRIKE_OFFSET,
            score_buy_call: SCORE_BUY_CALL,
            score_sell_put: SCORE_SELL_PUT,
            score_sell_call: SCORE_SELL_CALL,
        }
    }
}

impl Thresholds {
    /// Load overrides from a JSON file; keys left out keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadThresholds {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::ParseThresholds {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Normalise a user-typed ticker: trimmed and uppercased.
pub fn normalize_ticker(raw: &str) -> Result<String, ConfigError> {
    let t = raw.trim().to_uppercase();
    if t.is_empty() {
        return Err(ConfigError::EmptyTicker);
    }
    Ok(t)
}

pub fn parse_days_out(raw: &str) -> Result<i64, ConfigError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|d| *d >= 0)
        .ok_or_else(|| ConfigError::InvalidDays(raw.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_override_keeps_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{ "rsi_oversold": 25.0, "strike_offset": 0.1 }}"#).unwrap();
        let t = Thresholds::from_json_file(f.path()).unwrap();
        assert_eq!(t.rsi_oversold, 25.0);
        assert_eq!(t.strike_offset, 0.1);
        assert_eq!(t.rsi_overbought, RSI_OVERBOUGHT);
        assert_eq!(t.score_buy_call, SCORE_BUY_CALL);
    }

    #[test]
    fn malformed_thresholds_file_is_reported() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "not json").unwrap();
        let err = Thresholds::from_json_file(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseThresholds { .. }));
    }

    #[test]
    fn ticker_is_uppercased_and_trimmed() {
        assert_eq!(normalize_ticker("  aapl \n").unwrap(), "AAPL");
        assert!(matches!(normalize_ticker("   "), Err(ConfigError::EmptyTicker)));
    }

    #[test]
    fn days_out_rejects_garbage() {
        assert_eq!(parse_days_out(" 30\n").unwrap(), 30);
        assert!(parse_days_out("thirty").is_err());
        assert!(parse_days_out("-2").is_err());
    }
}
