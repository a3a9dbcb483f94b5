use std::fmt;

use chrono::{NaiveDate, TimeDelta};
use serde::Serialize;

use crate::config::Thresholds;
use crate::rules::Reason;

/// Suggested options trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Action {
    BuyCall,
    SellPut,
    SellCall,
    BuyPut,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::BuyCall, Action::SellPut, Action::SellCall, Action::BuyPut];

    /// Buying puts the out-of-the-money strike above the price; selling puts it below.
    pub fn is_buy(self) -> bool {
        matches!(self, Action::BuyCall | Action::BuyPut)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::BuyCall => "BUY a CALL option",
            Action::SellPut => "SELL a PUT option",
            Action::SellCall => "SELL a CALL option",
            Action::BuyPut => "BUY a PUT option",
        })
    }
}

/// Reasons from each evaluator that takes part in the score.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub fundamental: Vec<Reason>,
    pub technical: Vec<Reason>,
    pub volume: Vec<Reason>,
    pub volatility: Vec<Reason>,
}

impl Evaluation {
    /// Fundamental and technical reasons push up; volume and volatility pull down.
    pub fn score(&self) -> i64 {
        self.fundamental.len() as i64 + self.technical.len() as i64
            - self.volume.len() as i64
            - self.volatility.len() as i64
    }

    pub fn into_reasons(self) -> Vec<Reason> {
        let mut all = self.fundamental;
        all.extend(self.technical);
        all.extend(self.volume);
        all.extend(self.volatility);
        all
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub action: Action,
    pub score: i64,
    pub current_price: f64,
    pub strike_otm: f64,
    pub strike_itm: f64,
    pub expiration: NaiveDate,
    pub reasons: Vec<Reason>,
}

/// First matching band wins; each cut-off is exclusive on the lower side.
pub fn action_for_score(score: i64, t: &Thresholds) -> Action {
    if score > t.score_buy_call {
        Action::BuyCall
    } else if score > t.score_sell_put {
        Action::SellPut
    } else if score > t.score_sell_call {
        Action::SellCall
    } else {
        Action::BuyPut
    }
}

/// `(otm, itm)` strikes, `offset` (a fraction) either side of `price`.
pub fn strikes(action: Action, price: f64, offset: f64) -> (f64, f64) {
    let adj = price * offset;
    if action.is_buy() {
        (price + adj, price - adj)
    } else {
        (price - adj, price + adj)
    }
}

pub fn expiration_date(today: NaiveDate, days_out: i64) -> NaiveDate {
    today
        .checked_add_signed(TimeDelta::days(days_out))
        .unwrap_or(NaiveDate::MAX)
}

pub fn decide(
    evaluation: Evaluation,
    current_price: f64,
    today: NaiveDate,
    days_out: i64,
    t: &Thresholds,
) -> Decision {
    let score = evaluation.score();
    let action = action_for_score(score, t);
    let (strike_otm, strike_itm) = strikes(action, current_price, t.strike_offset);
    Decision {
        action,
        score,
        current_price,
        strike_otm,
        strike_itm,
        expiration: expiration_date(today, days_out),
        reasons: evaluation.into_reasons(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::ReasonKind;

    fn reasons(n: usize) -> Vec<Reason> {
        (0..n)
            .map(|i| Reason::new(ReasonKind::MacdBullish, format!("r{i}")))
            .collect()
    }

    #[test]
    fn score_bands() {
        let t = Thresholds::default();
        assert_eq!(action_for_score(4, &t), Action::BuyCall);
        assert_eq!(action_for_score(3, &t), Action::SellPut);
        assert_eq!(action_for_score(1, &t), Action::SellPut);
        assert_eq!(action_for_score(0, &t), Action::SellCall);
        assert_eq!(action_for_score(-2, &t), Action::SellCall);
        assert_eq!(action_for_score(-3, &t), Action::BuyPut);
        assert_eq!(action_for_score(i64::MIN, &t), Action::BuyPut);
        assert_eq!(action_for_score(i64::MAX, &t), Action::BuyCall);
    }

    #[test]
    fn score_of_five_buys_call() {
        let t = Thresholds::default();
        let eval = Evaluation {
            fundamental: reasons(2),
            technical: reasons(4),
            volume: reasons(1),
            volatility: vec![],
        };
        let today = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let d = decide(eval, 200.0, today, 30, &t);
        assert_eq!(d.score, 5);
        assert_eq!(d.action, Action::BuyCall);
        assert!((d.strike_otm - 210.0).abs() < 1e-9);
        assert!((d.strike_itm - 190.0).abs() < 1e-9);
        assert_eq!(d.reasons.len(), 7);
    }

    #[test]
    fn reasons_keep_evaluator_order() {
        let eval = Evaluation {
            fundamental: vec![Reason::new(ReasonKind::LowForwardPe, "f")],
            technical: vec![Reason::new(ReasonKind::RsiOversold, "t")],
            volume: vec![Reason::new(ReasonKind::HighVolume, "v")],
            volatility: vec![Reason::new(ReasonKind::HighCloseDispersion, "x")],
        };
        assert_eq!(eval.score(), 0);
        let msgs: Vec<_> = eval.into_reasons().into_iter().map(|r| r.message).collect();
        assert_eq!(msgs, ["f", "t", "v", "x"]);
    }

    #[test]
    fn sell_strikes_mirror_buy_strikes() {
        let (otm, itm) = strikes(Action::SellPut, 100.0, 0.05);
        assert!((otm - 95.0).abs() < 1e-9);
        assert!((itm - 105.0).abs() < 1e-9);
        let (otm, itm) = strikes(Action::BuyPut, 100.0, 0.05);
        assert!((otm - 105.0).abs() < 1e-9);
        assert!((itm - 95.0).abs() < 1e-9);
    }

    #[test]
    fn expiration_is_iso_date_days_out() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let exp = expiration_date(today, 30);
        assert_eq!(exp, NaiveDate::from_ymd_opt(2024, 2, 14).unwrap());
        assert_eq!(exp.format("%Y-%m-%d").to_string(), "2024-02-14");
        assert_eq!(expiration_date(today, 0), today);
    }

    #[test]
    fn action_labels() {
        assert_eq!(Action::BuyCall.to_string(), "BUY a CALL option");
        assert_eq!(Action::SellPut.to_string(), "SELL a PUT option");
        assert_eq!(Action::SellCall.to_string(), "SELL a CALL option");
        assert_eq!(Action::BuyPut.to_string(), "BUY a PUT option");
    }
}
