#![allow(dead_code)]

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use strike_advisor::error::DataError;
use strike_advisor::market::{Bar, Fundamentals, MarketDataProvider, PriceSeries};

pub fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
}

/// Bars with open/high/low equal to the close.
pub fn bars(closes: &[f64], volumes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .zip(volumes)
        .enumerate()
        .map(|(i, (&c, &v))| Bar {
            date: start() + Days::new(i as u64),
            open: c,
            high: c,
            low: c,
            close: c,
            volume: v,
        })
        .collect()
}

pub fn series(symbol: &str, closes: &[f64], volumes: &[f64]) -> PriceSeries {
    PriceSeries::new(symbol, bars(closes, volumes)).unwrap()
}

/// A year of wavy, drifting bars with a proper high/low range.
pub fn wavy_bars(n: usize, drift: f64) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let x = i as f64;
            let close = 100.0 + drift * x + 4.0 * (x / 7.0).sin();
            Bar {
                date: start() + Days::new(i as u64),
                open: close - 0.3,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1_000_000.0 + 50_000.0 * (x / 5.0).cos(),
            }
        })
        .collect()
}

/// In-memory provider keyed by symbol.
#[derive(Default)]
pub struct FakeProvider {
    pub history: HashMap<String, Vec<Bar>>,
    pub fundamentals: Fundamentals,
}

impl FakeProvider {
    pub fn with_history(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.history.insert(symbol.to_string(), bars);
        self
    }
}

#[async_trait]
impl MarketDataProvider for FakeProvider {
    async fn fetch_daily_history(
        &self,
        ticker: &str,
        _period: &str,
    ) -> Result<PriceSeries, DataError> {
        let bars = self
            .history
            .get(ticker)
            .cloned()
            .ok_or_else(|| DataError::unavailable(ticker, "unknown symbol"))?;
        PriceSeries::new(ticker, bars)
    }

    async fn fetch_fundamentals(&self, _ticker: &str) -> Result<Fundamentals, DataError> {
        Ok(self.fundamentals.clone())
    }
}
