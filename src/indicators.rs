//! Technical indicators over a daily price series.
//!
//! Every column is aligned with the input bars. Values inside an indicator's
//! warm-up window are undefined (`None`). The rules always read the unfilled
//! frame; a [`FillPolicy`] only shapes the copy that gets exported.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::market::PriceSeries;

pub const RSI_WINDOW: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const BOLLINGER_WINDOW: usize = 20;
pub const BOLLINGER_DEV: f64 = 2.0;
pub const STOCH_WINDOW: usize = 14;
pub const STOCH_SMOOTH: usize = 3;
pub const ATR_WINDOW: usize = 14;
pub const SMA_CROSS_SHORT: usize = 50;
pub const SMA_CROSS_LONG: usize = 200;
pub const SMA_TREND_SHORT: usize = 40;
pub const SMA_TREND_LONG: usize = 100;

/// What to put in place of undefined indicator values in exported frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FillPolicy {
    /// Leave them undefined.
    #[default]
    #[value(name = "none")]
    #[serde(rename = "none")]
    Undefined,
    /// Carry the last defined value forward; leading values stay undefined.
    Forward,
    /// Replace with 0.0.
    Zero,
}

pub type Column = Vec<Option<f64>>;

/// Derived indicator columns, one entry per bar.
#[derive(Debug, Clone)]
pub struct IndicatorFrame {
    pub rsi: Column,
    pub macd_line: Column,
    pub macd_signal: Column,
    pub bollinger_upper: Column,
    pub bollinger_lower: Column,
    pub stoch_k: Column,
    pub stoch_d: Column,
    pub atr: Column,
    pub sma_50: Column,
    pub sma_200: Column,
    /// Expanding mean until 40 bars exist.
    pub sma_40: Column,
    /// Expanding mean until 100 bars exist.
    pub sma_100: Column,
}

impl IndicatorFrame {
    pub fn compute(series: &PriceSeries) -> Self {
        let close = series.closes();
        let high = series.highs();
        let low = series.lows();

        let (macd_line, macd_signal) = macd(&close, MACD_FAST, MACD_SLOW, MACD_SIGNAL);
        let (bollinger_upper, bollinger_lower) = bollinger(&close, BOLLINGER_WINDOW, BOLLINGER_DEV);
        let (stoch_k, stoch_d) = stochastic(&high, &low, &close, STOCH_WINDOW, STOCH_SMOOTH);

        Self {
            rsi: rsi(&close, RSI_WINDOW),
            macd_line,
            macd_signal,
            bollinger_upper,
            bollinger_lower,
            stoch_k,
            stoch_d,
            atr: average_true_range(&high, &low, &close, ATR_WINDOW),
            sma_50: rolling_ma(&close, SMA_CROSS_SHORT),
            sma_200: rolling_ma(&close, SMA_CROSS_LONG),
            sma_40: expanding_ma(&close, SMA_TREND_SHORT),
            sma_100: expanding_ma(&close, SMA_TREND_LONG),
        }
    }

    /// Copy with undefined values replaced per `fill`. Not for rule input:
    /// a placeholder would read as a real reading.
    pub fn filled(&self, fill: FillPolicy) -> Self {
        let mut out = self.clone();
        out.apply_fill(fill);
        out
    }

    /// A frame of `len` bars with every value undefined.
    pub fn blank(len: usize) -> Self {
        let col = vec![None; len];
        Self {
            rsi: col.clone(),
            macd_line: col.clone(),
            macd_signal: col.clone(),
            bollinger_upper: col.clone(),
            bollinger_lower: col.clone(),
            stoch_k: col.clone(),
            stoch_d: col.clone(),
            atr: col.clone(),
            sma_50: col.clone(),
            sma_200: col.clone(),
            sma_40: col.clone(),
            sma_100: col,
        }
    }

    pub fn len(&self) -> usize {
        self.rsi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rsi.is_empty()
    }

    /// Column names paired with their data, in export order.
    pub fn columns(&self) -> [(&'static str, &Column); 12] {
        [
            ("rsi", &self.rsi),
            ("macd_line", &self.macd_line),
            ("macd_signal", &self.macd_signal),
            ("bollinger_upper", &self.bollinger_upper),
            ("bollinger_lower", &self.bollinger_lower),
            ("stoch_k", &self.stoch_k),
            ("stoch_d", &self.stoch_d),
            ("atr", &self.atr),
            ("sma_50", &self.sma_50),
            ("sma_200", &self.sma_200),
            ("sma_40", &self.sma_40),
            ("sma_100", &self.sma_100),
        ]
    }

    fn apply_fill(&mut self, fill: FillPolicy) {
        for col in [
            &mut self.rsi,
            &mut self.macd_line,
            &mut self.macd_signal,
            &mut self.bollinger_upper,
            &mut self.bollinger_lower,
            &mut self.stoch_k,
            &mut self.stoch_d,
            &mut self.atr,
            &mut self.sma_50,
            &mut self.sma_200,
            &mut self.sma_40,
            &mut self.sma_100,
        ] {
            fill_column(col, fill);
        }
    }
}

/// Latest value of a column.
pub fn last(col: &[Option<f64>]) -> Option<f64> {
    nth_back(col, 0)
}

/// Value `k` bars before the latest one.
pub fn nth_back(col: &[Option<f64>], k: usize) -> Option<f64> {
    col.len()
        .checked_sub(k + 1)
        .and_then(|i| col[i])
        .filter(|v| v.is_finite())
}

pub fn fill_column(col: &mut [Option<f64>], fill: FillPolicy) {
    match fill {
        FillPolicy::Undefined => {}
        FillPolicy::Zero => col.iter_mut().filter(|v| v.is_none()).for_each(|v| *v = Some(0.0)),
        FillPolicy::Forward => {
            let mut carry = None;
            for v in col.iter_mut() {
                if v.is_some() {
                    carry = *v;
                } else {
                    *v = carry;
                }
            }
        }
    }
}

/// Simple moving average; undefined until `w` values exist.
pub fn rolling_ma(x: &[f64], w: usize) -> Column {
    let mut out = vec![None; x.len()];
    if w == 0 || x.len() < w {
        return out;
    }
    for (end, window) in (w - 1..).zip(x.windows(w)) {
        out[end] = Some(window.mean());
    }
    out
}

/// Moving average that starts from the first bar and widens up to `w`.
pub fn expanding_ma(x: &[f64], w: usize) -> Column {
    if w == 0 {
        return vec![None; x.len()];
    }
    let mut out = vec![None; x.len()];
    let mut sum = 0.0;
    for i in 0..x.len() {
        sum += x[i];
        if i >= w {
            sum -= x[i - w];
        }
        out[i] = Some(sum / (i + 1).min(w) as f64);
    }
    out
}

/// Rolling population standard deviation.
pub fn rolling_std(x: &[f64], w: usize) -> Column {
    let mut out = vec![None; x.len()];
    if w == 0 {
        return out;
    }
    for i in 0..x.len() {
        if i + 1 >= w {
            let s = &x[i + 1 - w..=i];
            let mean = s.mean();
            let var = s.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / s.len() as f64;
            out[i] = Some(var.sqrt());
        }
    }
    out
}

/// Mean over the last `w` entries, undefined if any of them is.
fn rolling_mean_opt(x: &[Option<f64>], w: usize) -> Column {
    let mut out = vec![None; x.len()];
    for i in 0..x.len() {
        if w > 0 && i + 1 >= w {
            let window: Option<Vec<f64>> = x[i + 1 - w..=i].iter().copied().collect();
            out[i] = window.map(|v| v.iter().sum::<f64>() / w as f64);
        }
    }
    out
}

/// Recursive exponential average seeded with the first defined value.
/// Emits once `min_periods` defined values have been seen.
pub fn ewm(x: &[Option<f64>], alpha: f64, min_periods: usize) -> Column {
    let mut out = vec![None; x.len()];
    let mut state: Option<f64> = None;
    let mut seen = 0usize;
    for (i, v) in x.iter().enumerate() {
        let Some(v) = *v else { continue };
        state = Some(match state {
            None => v,
            Some(prev) => alpha * v + (1.0 - alpha) * prev,
        });
        seen += 1;
        if seen >= min_periods.max(1) {
            out[i] = state;
        }
    }
    out
}

pub fn ema(x: &[f64], span: usize) -> Column {
    let opt: Column = x.iter().copied().map(Some).collect();
    ewm(&opt, 2.0 / (span as f64 + 1.0), span)
}

/// Wilder RSI. The first bar counts as a zero move, so the first value
/// lands on bar `w - 1`.
pub fn rsi(close: &[f64], w: usize) -> Column {
    let diffs: Column = std::iter::once(Some(0.0))
        .chain(close.windows(2).map(|p| Some(p[1] - p[0])))
        .take(close.len())
        .collect();
    let up: Column = diffs.iter().map(|d| d.map(|d| d.max(0.0))).collect();
    let down: Column = diffs.iter().map(|d| d.map(|d| (-d).max(0.0))).collect();
    let alpha = 1.0 / w as f64;
    let avg_up = ewm(&up, alpha, w);
    let avg_down = ewm(&down, alpha, w);
    avg_up
        .iter()
        .zip(avg_down.iter())
        .map(|(u, d)| match (u, d) {
            (Some(_), Some(d)) if *d == 0.0 => Some(100.0),
            (Some(u), Some(d)) => Some(100.0 - 100.0 / (1.0 + u / d)),
            _ => None,
        })
        .collect()
}

/// MACD line (`EMA fast − EMA slow`) and its signal line.
pub fn macd(close: &[f64], fast: usize, slow: usize, signal: usize) -> (Column, Column) {
    let fast_ema = ema(close, fast);
    let slow_ema = ema(close, slow);
    let line: Column = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let sig = ewm(&line, 2.0 / (signal as f64 + 1.0), signal);
    (line, sig)
}

/// Upper and lower Bollinger bands.
pub fn bollinger(close: &[f64], w: usize, k: f64) -> (Column, Column) {
    let mid = rolling_ma(close, w);
    let sd = rolling_std(close, w);
    let band = |sign: f64| -> Column {
        mid.iter()
            .zip(sd.iter())
            .map(|(m, s)| Some((*m)? + sign * k * (*s)?))
            .collect()
    };
    (band(1.0), band(-1.0))
}

/// Stochastic oscillator %K and its `smooth`-bar average %D.
pub fn stochastic(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    w: usize,
    smooth: usize,
) -> (Column, Column) {
    let mut k = vec![None; close.len()];
    for i in 0..close.len() {
        if w > 0 && i + 1 >= w {
            let lo = low[i + 1 - w..=i].iter().copied().fold(f64::INFINITY, f64::min);
            let hi = high[i + 1 - w..=i].iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let range = hi - lo;
            // flat window has no defined position
            if range > 0.0 {
                k[i] = Some(100.0 * (close[i] - lo) / range);
            }
        }
    }
    let d = rolling_mean_opt(&k, smooth);
    (k, d)
}

/// Widest of the bar's own range and its gaps from the previous close.
pub fn true_range(high: f64, low: f64, prev_close: f64) -> f64 {
    [high - low, high - prev_close, low - prev_close]
        .into_iter()
        .map(f64::abs)
        .fold(0.0, f64::max)
}

/// ATR: mean of the first `w` true ranges, then Wilder smoothing.
pub fn average_true_range(high: &[f64], low: &[f64], close: &[f64], w: usize) -> Column {
    let n = close.len();
    let mut out = vec![None; n];
    if w == 0 || n < w {
        return out;
    }
    let trs: Vec<f64> = (0..n)
        .map(|i| {
            if i == 0 {
                (high[i] - low[i]).abs()
            } else {
                true_range(high[i], low[i], close[i - 1])
            }
        })
        .collect();
    let mut atr = trs[..w].iter().sum::<f64>() / w as f64;
    out[w - 1] = Some(atr);
    for i in w..n {
        atr = (atr * (w as f64 - 1.0) + trs[i]) / w as f64;
        out[i] = Some(atr);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Bar;
    use chrono::{Days, NaiveDate};

    fn close_to(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn series(closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                date: start + Days::new(i as u64),
                open: c,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 1_000.0,
            })
            .collect();
        PriceSeries::new("TEST", bars).unwrap()
    }

    #[test]
    fn rolling_ma_waits_for_full_window() {
        let ma = rolling_ma(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(ma[..2], [None, None]);
        assert!(close_to(ma[2].unwrap(), 2.0));
        assert!(close_to(ma[3].unwrap(), 3.0));
    }

    #[test]
    fn expanding_ma_defined_from_first_bar() {
        let ma = expanding_ma(&[2.0, 4.0, 6.0, 8.0], 2);
        assert!(close_to(ma[0].unwrap(), 2.0));
        assert!(close_to(ma[1].unwrap(), 3.0));
        assert!(close_to(ma[3].unwrap(), 7.0));
    }

    #[test]
    fn rsi_of_only_gains_is_100() {
        let close: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let r = rsi(&close, 14);
        assert!(r[12].is_none());
        assert_eq!(r[13], Some(100.0));
        assert_eq!(last(&r), Some(100.0));
    }

    #[test]
    fn rsi_counts_first_bar_as_flat() {
        let r = rsi(&[10.0, 11.0, 10.0], 2);
        assert!(r[0].is_none());
        // no losses yet
        assert_eq!(r[1], Some(100.0));
        // gains 0, 0.5, 0.25 against losses 0, 0, 0.5
        assert!(close_to(r[2].unwrap(), 100.0 - 100.0 / 1.5));
    }

    #[test]
    fn rsi_of_only_losses_is_0() {
        let close: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        assert!(close_to(last(&rsi(&close, 14)).unwrap(), 0.0));
    }

    #[test]
    fn rsi_of_alternating_moves_is_near_50() {
        let close: Vec<f64> = (0..200).map(|i| if i % 2 == 0 { 100.0 } else { 101.0 }).collect();
        let v = last(&rsi(&close, 14)).unwrap();
        assert!(v > 40.0 && v < 60.0, "rsi {v}");
    }

    #[test]
    fn macd_warm_up_and_trend_sign() {
        let close: Vec<f64> = (0..60).map(|i| 10.0 + i as f64).collect();
        let (line, signal) = macd(&close, 12, 26, 9);
        assert!(line[24].is_none());
        assert!(line[25].is_some());
        assert!(signal[32].is_none());
        assert!(signal[33].is_some());
        // rising prices: fast average above slow, line above its lagging signal
        assert!(last(&line).unwrap() > 0.0);
        assert!(last(&line).unwrap() > last(&signal).unwrap());
    }

    #[test]
    fn bollinger_collapses_on_constant_prices() {
        let (up, lo) = bollinger(&[5.0; 25], 20, 2.0);
        assert!(up[18].is_none());
        assert!(close_to(last(&up).unwrap(), 5.0));
        assert!(close_to(last(&lo).unwrap(), 5.0));
    }

    #[test]
    fn stochastic_top_of_range_is_100_and_flat_is_undefined() {
        let high: Vec<f64> = (0..20).map(|i| i as f64 + 1.0).collect();
        let low: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let close = high.clone();
        let (k, d) = stochastic(&high, &low, &close, 14, 3);
        assert!(k[12].is_none());
        assert!(close_to(last(&k).unwrap(), 100.0));
        assert!(close_to(last(&d).unwrap(), 100.0));
        assert!(d[14].is_none());
        assert!(d[15].is_some());

        let (k, _) = stochastic(&[1.0; 20], &[1.0; 20], &[1.0; 20], 14, 3);
        assert!(k.iter().all(Option::is_none));
    }

    #[test]
    fn atr_of_constant_range_is_that_range() {
        let close: Vec<f64> = vec![10.0; 20];
        let high: Vec<f64> = vec![11.0; 20];
        let low: Vec<f64> = vec![9.0; 20];
        let atr = average_true_range(&high, &low, &close, 14);
        assert!(atr[12].is_none());
        assert!(close_to(atr[13].unwrap(), 2.0));
        assert!(close_to(last(&atr).unwrap(), 2.0));
    }

    #[test]
    fn true_range_uses_previous_close_gaps() {
        assert!(close_to(true_range(12.0, 11.0, 8.0), 4.0));
        assert!(close_to(true_range(12.0, 11.0, 11.5), 1.0));
    }

    #[test]
    fn frame_columns_match_series_length() {
        let s = series(&(0..50).map(|i| 100.0 + (i as f64).sin()).collect::<Vec<_>>());
        let frame = IndicatorFrame::compute(&s);
        assert_eq!(frame.len(), s.len());
        for (name, col) in frame.columns() {
            assert_eq!(col.len(), s.len(), "{name}");
        }
        // too short for the 200-bar average
        assert!(frame.sma_200.iter().all(Option::is_none));
        assert!(frame.sma_100.iter().all(Option::is_some));
    }

    #[test]
    fn fill_policies() {
        let mut col = vec![None, Some(1.0), None, Some(3.0)];
        fill_column(&mut col, FillPolicy::Forward);
        assert_eq!(col, vec![None, Some(1.0), Some(1.0), Some(3.0)]);

        let mut col = vec![None, Some(1.0), None];
        fill_column(&mut col, FillPolicy::Zero);
        assert_eq!(col, vec![Some(0.0), Some(1.0), Some(0.0)]);

        let mut col = vec![None, Some(1.0)];
        fill_column(&mut col, FillPolicy::Undefined);
        assert_eq!(col, vec![None, Some(1.0)]);
    }

    #[test]
    fn filled_copy_leaves_computed_frame_alone() {
        let s = series(&[100.0, 101.0, 99.0, 102.0, 103.0]);
        let frame = IndicatorFrame::compute(&s);
        assert!(frame.rsi.iter().all(Option::is_none));

        let zero = frame.filled(FillPolicy::Zero);
        assert!(zero.rsi.iter().all(|v| *v == Some(0.0)));
        assert_eq!(zero.sma_40, frame.sma_40);
        assert!(frame.rsi.iter().all(Option::is_none));

        let forward = frame.filled(FillPolicy::Forward);
        assert!(forward.sma_200.iter().all(Option::is_none));
        assert_eq!(frame.filled(FillPolicy::Undefined).rsi, frame.rsi);
    }

    #[test]
    fn nth_back_ignores_out_of_range_and_nan() {
        let col = vec![Some(1.0), Some(f64::NAN), Some(3.0)];
        assert_eq!(nth_back(&col, 0), Some(3.0));
        assert_eq!(nth_back(&col, 1), None);
        assert_eq!(nth_back(&col, 2), Some(1.0));
        assert_eq!(nth_back(&col, 3), None);
        assert_eq!(last(&[]), None);
    }
}
