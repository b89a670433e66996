use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::Value;

use super::billing::{next_billing_date, Period};
use super::subscription::Subscription;

/// Splits `price` into the owner's share and the advanced party's share.
///
/// A zero `self_ratio` counts as 1 and the advance ratio only participates when the charge is
/// advanced, so the denominator never reaches zero.
pub fn advance_split(price: f64, is_advance: bool, self_ratio: u32, advance_ratio: u32) -> (f64, f64) {
    let own = f64::from(self_ratio.max(1));
    let other = if is_advance { f64::from(advance_ratio) } else { 0.0 };
    let self_amount = price * own / (own + other);
    (self_amount, price - self_amount)
}

/// Re-expresses an amount billed every `cycle` as the amount for one `period`.
/// An unrecognized cycle passes through unchanged.
pub fn convert_cycle(amount: f64, cycle: Option<Period>, period: Period) -> f64 {
    let Some(cycle) = cycle else {
        return amount;
    };
    if cycle == period {
        return amount;
    }
    amount * f64::from(period.months()) / f64::from(cycle.months())
}

/// Converts into the base currency; codes missing from the table use a factor of 1.
pub fn to_base(amount: f64, currency: &str, rates: &BTreeMap<String, f64>) -> f64 {
    amount * rates.get(currency).copied().unwrap_or(1.0)
}

#[derive(Debug, Clone)]
pub struct NormalizedItem<'a> {
    pub subscription: &'a Subscription,
    /// Owner's share for one period, in the base currency.
    pub self_amount: f64,
    /// Advanced party's share for one period, in the base currency.
    pub advance_amount: f64,
    /// Full price for one period, in the base currency. Amount sorting uses this.
    pub full_amount: f64,
    /// Owner's share for one period, still in the subscription's own currency.
    pub native_self_amount: f64,
    pub next_billing_date: NaiveDate,
}

impl NormalizedItem<'_> {
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "selfAmount": self.self_amount,
            "advanceAmount": self.advance_amount,
            "fullAmount": self.full_amount,
            "nativeSelfAmount": self.native_self_amount,
            "nextBillingDate": self.next_billing_date.format("%Y-%m-%d").to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CostSummary<'a> {
    pub period: Period,
    pub items: Vec<NormalizedItem<'a>>,
    pub total_self: f64,
    pub total_advance: f64,
}

pub fn normalize_one<'a>(
    sub: &'a Subscription,
    rates: &BTreeMap<String, f64>,
    period: Period,
    today: NaiveDate,
) -> NormalizedItem<'a> {
    let cycle = sub.cycle();
    let (own, other) = advance_split(sub.price, sub.is_advance, sub.self_ratio, sub.advance_ratio);
    let native_self_amount = convert_cycle(own, cycle, period);
    NormalizedItem {
        subscription: sub,
        self_amount: to_base(native_self_amount, &sub.currency, rates),
        advance_amount: to_base(convert_cycle(other, cycle, period), &sub.currency, rates),
        full_amount: to_base(convert_cycle(sub.price, cycle, period), &sub.currency, rates),
        native_self_amount,
        next_billing_date: next_billing_date(sub.billing_date, cycle, today),
    }
}

/// Normalizes every subscription into `period` and the base currency. Items keep input order.
pub fn normalize<'a>(
    subs: &'a [Subscription],
    rates: &BTreeMap<String, f64>,
    period: Period,
    today: NaiveDate,
) -> CostSummary<'a> {
    let items: Vec<NormalizedItem<'a>> = subs
        .iter()
        .map(|sub| normalize_one(sub, rates, period, today))
        .collect();
    let total_self = items.iter().map(|i| i.self_amount).sum();
    let total_advance = items.iter().map(|i| i.advance_amount).sum();
    CostSummary {
        period,
        items,
        total_self,
        total_advance,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    AmountAsc,
    AmountDesc,
    DateAsc,
    DateDesc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amount_asc" => Some(Self::AmountAsc),
            "amount_desc" => Some(Self::AmountDesc),
            "date_asc" => Some(Self::DateAsc),
            "date_desc" => Some(Self::DateDesc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AmountAsc => "amount_asc",
            Self::AmountDesc => "amount_desc",
            Self::DateAsc => "date_asc",
            Self::DateDesc => "date_desc",
        }
    }

    /// The sort toggle cycles amount asc -> amount desc -> date asc -> date desc.
    pub fn next(&self) -> Self {
        match self {
            Self::AmountAsc => Self::AmountDesc,
            Self::AmountDesc => Self::DateAsc,
            Self::DateAsc => Self::DateDesc,
            Self::DateDesc => Self::AmountAsc,
        }
    }
}

/// Stable sort; ties keep their input order in both directions.
pub fn sort_items(items: &mut [NormalizedItem<'_>], order: SortOrder) {
    items.sort_by(|a, b| -> Ordering {
        match order {
            SortOrder::AmountAsc => a.full_amount.total_cmp(&b.full_amount),
            SortOrder::AmountDesc => b.full_amount.total_cmp(&a.full_amount),
            SortOrder::DateAsc => a.next_billing_date.cmp(&b.next_billing_date),
            SortOrder::DateDesc => b.next_billing_date.cmp(&a.next_billing_date),
        }
    });
}

#[cfg(test)]
mod tests;
