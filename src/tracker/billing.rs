use chrono::{Months, NaiveDate};

/// A billing cycle or a reporting period. Both use the same three calendar units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Monthly,
    HalfYear,
    Yearly,
}

impl Period {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Some(Self::Monthly),
            "halfyear" => Some(Self::HalfYear),
            "yearly" => Some(Self::Yearly),
            _ => None,
        }
    }

    /// Reporting periods fall back to monthly on anything unrecognized.
    pub fn from_query(s: Option<&str>) -> Self {
        s.and_then(Self::parse).unwrap_or(Self::Monthly)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::HalfYear => "halfyear",
            Self::Yearly => "yearly",
        }
    }

    pub fn months(&self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::HalfYear => 6,
            Self::Yearly => 12,
        }
    }
}

/// First occurrence of `anchor + k * cycle` (k >= 0) that is not earlier than `today`.
///
/// Every occurrence is computed from the anchor rather than from the previous occurrence, so
/// a month-end anchor is clamped in short months (Jan 31 -> Feb 29) and restored afterwards
/// (-> Mar 31) instead of drifting to the 29th. A `None` cycle yields the anchor unchanged.
pub fn next_billing_date(anchor: NaiveDate, cycle: Option<Period>, today: NaiveDate) -> NaiveDate {
    let Some(cycle) = cycle else {
        return anchor;
    };
    if anchor >= today {
        return anchor;
    }

    let step = cycle.months();
    // Jump close to `today` first so very old anchors do not loop month by month.
    let elapsed = months_between(anchor, today);
    let mut k = (elapsed / step).saturating_sub(1);
    loop {
        let Some(candidate) = anchor.checked_add_months(Months::new(k.saturating_mul(step))) else {
            return anchor;
        };
        if candidate >= today {
            return candidate;
        }
        k += 1;
    }
}

fn months_between(from: NaiveDate, to: NaiveDate) -> u32 {
    use chrono::Datelike;
    let diff = (to.year() - from.year()) * 12 + (to.month() as i32 - from.month() as i32);
    diff.max(0) as u32
}
