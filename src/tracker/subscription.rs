use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::billing::Period;
use crate::constants::is_supported_currency;

/// A stored subscription document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub currency: String,
    pub billing_date: NaiveDate,
    /// Kept as the raw stored string; unknown values pass through the engine unconverted.
    pub cycle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub is_advance: bool,
    #[serde(default = "default_ratio")]
    pub self_ratio: u32,
    #[serde(default = "default_ratio")]
    pub advance_ratio: u32,
    pub created_at_unix_ms: u64,
    #[serde(default)]
    pub deleted_at_unix_ms: Option<u64>,
}

fn default_ratio() -> u32 {
    1
}

impl Subscription {
    pub fn cycle(&self) -> Option<Period> {
        Period::parse(&self.cycle)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at_unix_ms.is_some()
    }
}

/// Validated fields for a new subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubscription {
    pub name: String,
    pub price: f64,
    pub currency: String,
    pub billing_date: NaiveDate,
    pub cycle: Period,
    pub note: Option<String>,
    pub is_advance: bool,
    pub self_ratio: u32,
    pub advance_ratio: u32,
}

/// Validated partial update. `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionPatch {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub billing_date: Option<NaiveDate>,
    pub cycle: Option<Period>,
    pub note: Option<Option<String>>,
    pub is_advance: Option<bool>,
    pub self_ratio: Option<u32>,
    pub advance_ratio: Option<u32>,
}

impl SubscriptionPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, sub: &mut Subscription) {
        if let Some(v) = &self.name {
            sub.name = v.clone();
        }
        if let Some(v) = self.price {
            sub.price = v;
        }
        if let Some(v) = &self.currency {
            sub.currency = v.clone();
        }
        if let Some(v) = self.billing_date {
            sub.billing_date = v;
        }
        if let Some(v) = self.cycle {
            sub.cycle = v.as_str().to_string();
        }
        if let Some(v) = &self.note {
            sub.note = v.clone();
        }
        if let Some(v) = self.is_advance {
            sub.is_advance = v;
        }
        if let Some(v) = self.self_ratio {
            sub.self_ratio = v;
        }
        if let Some(v) = self.advance_ratio {
            sub.advance_ratio = v;
        }
    }
}

/// Raw request body shared by create and update. Clients send prices as numbers or as
/// strings straight from a form field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub billing_date: Option<String>,
    #[serde(default)]
    pub cycle: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub is_advance: Option<bool>,
    #[serde(default)]
    pub self_ratio: Option<Value>,
    #[serde(default)]
    pub advance_ratio: Option<Value>,
}

impl SubscriptionInput {
    pub fn into_new(self) -> Result<NewSubscription, String> {
        let patch = self.into_patch()?;
        let name = patch.name.ok_or("name is required")?;
        Ok(NewSubscription {
            name,
            price: patch.price.ok_or("price is required")?,
            currency: patch.currency.ok_or("currency is required")?,
            billing_date: patch.billing_date.ok_or("billingDate is required")?,
            cycle: patch.cycle.ok_or("cycle is required")?,
            note: patch.note.flatten(),
            is_advance: patch.is_advance.unwrap_or(false),
            self_ratio: patch.self_ratio.unwrap_or(1),
            advance_ratio: patch.advance_ratio.unwrap_or(1),
        })
    }

    pub fn into_patch(self) -> Result<SubscriptionPatch, String> {
        let name = match self.name {
            Some(n) => {
                let n = n.trim().to_string();
                if n.is_empty() {
                    return Err("name must not be empty".to_string());
                }
                Some(n)
            }
            None => None,
        };
        let price = self.price.as_ref().map(parse_price).transpose()?;
        let currency = match self.currency {
            Some(c) => {
                let c = c.trim().to_ascii_uppercase();
                if !is_supported_currency(&c) {
                    return Err(format!("unsupported currency: {c}"));
                }
                Some(c)
            }
            None => None,
        };
        let billing_date = match self.billing_date.as_deref() {
            Some(s) => Some(
                parse_billing_date(s).ok_or_else(|| format!("invalid billingDate: {s}"))?,
            ),
            None => None,
        };
        let cycle = match self.cycle.as_deref() {
            Some(s) => Some(
                Period::parse(s)
                    .ok_or("cycle must be monthly, halfyear or yearly")?,
            ),
            None => None,
        };
        let note = self
            .note
            .map(|n| Some(n.trim().to_string()).filter(|n| !n.is_empty()));
        let self_ratio = self
            .self_ratio
            .as_ref()
            .map(|v| parse_ratio(v, "selfRatio"))
            .transpose()?;
        let advance_ratio = self
            .advance_ratio
            .as_ref()
            .map(|v| parse_ratio(v, "advanceRatio"))
            .transpose()?;

        Ok(SubscriptionPatch {
            name,
            price,
            currency,
            billing_date,
            cycle,
            note,
            is_advance: self.is_advance,
            self_ratio,
            advance_ratio,
        })
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
}

fn parse_price(v: &Value) -> Result<f64, String> {
    match as_f64(v) {
        Some(p) if p.is_finite() && p >= 0.0 => Ok(p),
        _ => Err("price must be a non-negative number".to_string()),
    }
}

fn parse_ratio(v: &Value, field: &str) -> Result<u32, String> {
    match as_f64(v) {
        Some(r) if r.is_finite() && r >= 1.0 && r.fract() == 0.0 && r <= u32::MAX as f64 => {
            Ok(r as u32)
        }
        _ => Err(format!("{field} must be a positive integer")),
    }
}

/// Accepts a plain date or a full RFC 3339 timestamp.
pub fn parse_billing_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())
}
