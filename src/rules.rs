//! Threshold rules that turn indicator readings into reasons.
//!
//! Each evaluator is a pure function returning its reasons in a fixed order.
//! Rules never suppress each other, and an undefined input (warm-up value,
//! missing fundamental, too few bars) simply produces no reason.

use std::fmt;

use serde::Serialize;
use statrs::statistics::Statistics;

use crate::config::{TRADING_DAYS_PER_YEAR, Thresholds};
use crate::indicators::{self, IndicatorFrame};
use crate::market::{FundamentalMetric, Fundamentals, PriceSeries};

/// Which rule produced a reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReasonKind {
    RsiOversold,
    RsiOverbought,
    MacdBullish,
    MacdBearish,
    AboveUpperBand,
    BelowLowerBand,
    StochasticOverbought,
    StochasticOversold,
    GoldenCross,
    DeathCross,
    HighAtr,
    RelativeStrength,
    LocalDipPattern,
    HighVolume,
    LowVolume,
    GoodDividendYield,
    LowForwardPe,
    HighCloseDispersion,
    HighAnnualizedVolatility,
    TrendCrossUp,
    NoBullishSignal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reason {
    pub kind: ReasonKind,
    pub message: String,
    /// The reading that tripped the rule, when there is a single one.
    pub value: Option<f64>,
}

impl Reason {
    pub fn new(kind: ReasonKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            value: None,
        }
    }

    pub fn with_value(kind: ReasonKind, message: impl Into<String>, value: f64) -> Self {
        Self {
            kind,
            message: message.into(),
            value: Some(value),
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub const NO_BULLISH_SIGNAL: &str = "Recent trends do not support a strong bullish signal.";

/// Momentum, trend, band, crossover, ATR, relative-strength and pattern rules.
///
/// `benchmark` is the market index used for relative strength; without it
/// that rule is skipped.
pub fn technical(
    series: &PriceSeries,
    frame: &IndicatorFrame,
    benchmark: Option<&PriceSeries>,
    t: &Thresholds,
) -> Vec<Reason> {
    let mut reasons = Vec::new();

    if let Some(rsi) = indicators::last(&frame.rsi) {
        if rsi < t.rsi_oversold {
            reasons.push(Reason::with_value(
                ReasonKind::RsiOversold,
                format!("RSI indicates oversold conditions at {rsi:.2}."),
                rsi,
            ));
        } else if rsi > t.rsi_overbought {
            reasons.push(Reason::with_value(
                ReasonKind::RsiOverbought,
                format!("RSI indicates overbought conditions at {rsi:.2}."),
                rsi,
            ));
        }
    }

    if let (Some(line), Some(signal)) = (
        indicators::last(&frame.macd_line),
        indicators::last(&frame.macd_signal),
    ) {
        if line > signal {
            reasons.push(Reason::with_value(
                ReasonKind::MacdBullish,
                "MACD line is above the signal line, indicating bullish momentum.",
                line - signal,
            ));
        } else if line < signal {
            reasons.push(Reason::with_value(
                ReasonKind::MacdBearish,
                "MACD line is below the signal line, indicating bearish momentum.",
                line - signal,
            ));
        }
    }

    let close = series.last().close;
    if let (Some(upper), Some(lower)) = (
        indicators::last(&frame.bollinger_upper),
        indicators::last(&frame.bollinger_lower),
    ) {
        if close > upper {
            reasons.push(Reason::with_value(
                ReasonKind::AboveUpperBand,
                "Price is above the upper Bollinger Band, indicating it might be overbought.",
                close,
            ));
        } else if close < lower {
            reasons.push(Reason::with_value(
                ReasonKind::BelowLowerBand,
                "Price is below the lower Bollinger Band, indicating it might be oversold.",
                close,
            ));
        }
    }

    if let (Some(k), Some(d)) = (
        indicators::last(&frame.stoch_k),
        indicators::last(&frame.stoch_d),
    ) {
        if k > t.stoch_overbought && d > t.stoch_overbought {
            reasons.push(Reason::with_value(
                ReasonKind::StochasticOverbought,
                "Stochastic Oscillator indicates overbought conditions.",
                k,
            ));
        } else if k < t.stoch_oversold && d < t.stoch_oversold {
            reasons.push(Reason::with_value(
                ReasonKind::StochasticOversold,
                "Stochastic Oscillator indicates oversold conditions.",
                k,
            ));
        }
    }

    match crossing(&frame.sma_50, &frame.sma_200) {
        Some(Cross::Up) => reasons.push(Reason::new(
            ReasonKind::GoldenCross,
            "Golden cross: the 50-day average crossed above the 200-day average, indicating potential bullish momentum.",
        )),
        Some(Cross::Down) => reasons.push(Reason::new(
            ReasonKind::DeathCross,
            "Death cross: the 50-day average crossed below the 200-day average, indicating potential bearish momentum.",
        )),
        None => {}
    }

    // absolute price units: a $500 stock trips this on almost any day
    if let Some(atr) = indicators::last(&frame.atr)
        && atr > t.atr_high
    {
        reasons.push(Reason::with_value(
            ReasonKind::HighAtr,
            format!("The Average True Range (ATR) is high ({atr:.2}), indicating increased volatility."),
            atr,
        ));
    }

    if let Some(rs) = benchmark.and_then(|b| relative_strength(series, b))
        && rs > 0.0
    {
        reasons.push(Reason::with_value(
            ReasonKind::RelativeStrength,
            "The stock shows relative strength compared to the market index.",
            rs,
        ));
    }

    if local_dip(series) {
        reasons.push(Reason::new(
            ReasonKind::LocalDipPattern,
            "Possible head and shoulders pattern detected, which may indicate a trend reversal.",
        ));
    }

    reasons
}

/// Latest volume against the mean volume of the whole window.
pub fn volume(series: &PriceSeries, t: &Thresholds) -> Vec<Reason> {
    let volumes = series.volumes();
    let latest = series.last().volume;
    let average = volumes.iter().mean();
    if !average.is_finite() || average <= 0.0 {
        return vec![];
    }
    let ratio = latest / average;

    if latest > t.volume_high_ratio * average {
        vec![Reason::with_value(
            ReasonKind::HighVolume,
            "Trading volume is significantly higher than average, indicating strong market interest.",
            ratio,
        )]
    } else if latest < t.volume_low_ratio * average {
        vec![Reason::with_value(
            ReasonKind::LowVolume,
            "Trading volume is much lower than average, indicating potential disinterest or consolidation.",
            ratio,
        )]
    } else {
        vec![]
    }
}

pub fn fundamental(fundamentals: &Fundamentals, t: &Thresholds) -> Vec<Reason> {
    let mut reasons = Vec::new();

    if let Some(y) = fundamentals.get(FundamentalMetric::DividendYield)
        && y > t.dividend_yield_good
    {
        reasons.push(Reason::with_value(
            ReasonKind::GoodDividendYield,
            format!("The stock has a good dividend yield of {:.2}%.", y * 100.0),
            y,
        ));
    }

    if let Some(pe) = fundamentals.get(FundamentalMetric::ForwardPe)
        && pe < t.forward_pe_cheap
    {
        reasons.push(Reason::with_value(
            ReasonKind::LowForwardPe,
            format!("The stock has a forward P/E ratio of {pe:.2}, indicating it might be undervalued."),
            pe,
        ));
    }

    reasons
}

/// Dispersion of raw close prices.
///
/// The standard deviation is in price units, not returns, so the threshold
/// means something different for every price level.
pub fn volatility(series: &PriceSeries, t: &Thresholds) -> Vec<Reason> {
    match close_std(series) {
        Some(sd) if sd > t.raw_close_std_high => vec![Reason::with_value(
            ReasonKind::HighCloseDispersion,
            format!("The stock has high historical volatility of {sd:.2}, indicating potential risks."),
            sd,
        )],
        _ => vec![],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Uptrend,
    Downtrend,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Uptrend => f.write_str("uptrend"),
            Trend::Downtrend => f.write_str("downtrend"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendCall {
    pub trend: Trend,
    pub reasons: Vec<Reason>,
}

/// Composite check: any reason at all reads as an uptrend.
pub fn basic(
    series: &PriceSeries,
    frame: &IndicatorFrame,
    benchmark: Option<&PriceSeries>,
    fundamentals: &Fundamentals,
    t: &Thresholds,
) -> TrendCall {
    let mut reasons = Vec::new();

    if crossing(&frame.sma_40, &frame.sma_100) == Some(Cross::Up) {
        reasons.push(Reason::new(
            ReasonKind::TrendCrossUp,
            "The 40-day average crossed above the 100-day average, indicating potential bullish momentum.",
        ));
    }
    reasons.extend(technical(series, frame, benchmark, t));
    reasons.extend(volume(series, t));
    reasons.extend(fundamental(fundamentals, t));

    if let Some(vol) = annualized_volatility(series)
        && vol > t.annualized_vol_high
    {
        reasons.push(Reason::with_value(
            ReasonKind::HighAnnualizedVolatility,
            format!("The stock has high historical volatility of {vol:.2}, indicating potential risks."),
            vol,
        ));
    }

    if reasons.is_empty() {
        TrendCall {
            trend: Trend::Downtrend,
            reasons: vec![Reason::new(ReasonKind::NoBullishSignal, NO_BULLISH_SIGNAL)],
        }
    } else {
        TrendCall {
            trend: Trend::Uptrend,
            reasons,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cross {
    Up,
    Down,
}

/// Did `short` cross `long` between the previous bar and the latest one?
pub fn crossing(short: &[Option<f64>], long: &[Option<f64>]) -> Option<Cross> {
    let (s1, l1) = (indicators::last(short)?, indicators::last(long)?);
    let (s0, l0) = (indicators::nth_back(short, 1)?, indicators::nth_back(long, 1)?);
    if s1 > l1 && s0 <= l0 {
        Some(Cross::Up)
    } else if s1 < l1 && s0 >= l0 {
        Some(Cross::Down)
    } else {
        None
    }
}

/// `(mean stock return − mean benchmark return) / stdev of stock returns`.
pub fn relative_strength(stock: &PriceSeries, benchmark: &PriceSeries) -> Option<f64> {
    let stock_returns = stock.daily_returns();
    let market_returns = benchmark.daily_returns();
    let sd = stock_returns.iter().std_dev();
    let rs = (stock_returns.iter().mean() - market_returns.iter().mean()) / sd;
    rs.is_finite().then_some(rs)
}

/// Sample standard deviation of log returns, annualised.
pub fn annualized_volatility(series: &PriceSeries) -> Option<f64> {
    let v = series.log_returns().iter().std_dev() * TRADING_DAYS_PER_YEAR.sqrt();
    v.is_finite().then_some(v)
}

/// Sample standard deviation of close prices.
pub fn close_std(series: &PriceSeries) -> Option<f64> {
    let sd = series.closes().iter().std_dev();
    sd.is_finite().then_some(sd)
}

/// `close[t-2] > close[t-1] < close[t]`: a one-bar dip.
fn local_dip(series: &PriceSeries) -> bool {
    match series.bars() {
        [.., a, b, c] => a.close > b.close && b.close < c.close,
        _ => false,
    }
}
