use super::*;
use crate::constants::{BASE_CURRENCY, SUPPORTED_CURRENCIES};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn sub(id: &str, price: f64, currency: &str, cycle: &str) -> Subscription {
    Subscription {
        id: id.to_string(),
        name: id.to_string(),
        price,
        currency: currency.to_string(),
        billing_date: day(2024, 1, 1),
        cycle: cycle.to_string(),
        note: None,
        is_advance: false,
        self_ratio: 1,
        advance_ratio: 1,
        created_at_unix_ms: 0,
        deleted_at_unix_ms: None,
    }
}

fn rates(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

const PERIODS: [Period; 3] = [Period::Monthly, Period::HalfYear, Period::Yearly];

#[test]
fn one_unit_converts_to_its_factor() {
    let table = rates(&[
        ("TWD", 1.0),
        ("USD", 32.1),
        ("JPY", 0.21),
        ("HKD", 4.1),
        ("EUR", 35.0),
        ("CNY", 4.4),
    ]);
    for code in SUPPORTED_CURRENCIES {
        assert_eq!(to_base(1.0, code, &table), table[code]);
    }
    assert_eq!(to_base(123.45, BASE_CURRENCY, &table), 123.45);
}

#[test]
fn missing_currency_uses_factor_one() {
    let table = rates(&[("TWD", 1.0)]);
    assert_eq!(to_base(50.0, "USD", &table), 50.0);
    assert_eq!(to_base(50.0, "XYZ", &table), 50.0);
}

#[test]
fn cycle_conversion_matches_ratio_table() {
    let m = Some(Period::Monthly);
    let h = Some(Period::HalfYear);
    let y = Some(Period::Yearly);
    assert_eq!(convert_cycle(120.0, m, Period::Monthly), 120.0);
    assert_eq!(convert_cycle(120.0, h, Period::Monthly), 20.0);
    assert_eq!(convert_cycle(120.0, y, Period::Monthly), 10.0);
    assert_eq!(convert_cycle(120.0, m, Period::HalfYear), 720.0);
    assert_eq!(convert_cycle(120.0, h, Period::HalfYear), 120.0);
    assert_eq!(convert_cycle(120.0, y, Period::HalfYear), 60.0);
    assert_eq!(convert_cycle(120.0, m, Period::Yearly), 1440.0);
    assert_eq!(convert_cycle(120.0, h, Period::Yearly), 240.0);
    assert_eq!(convert_cycle(120.0, y, Period::Yearly), 120.0);
}

#[test]
fn cycle_conversion_round_trips() {
    for amount in [0.0, 1.0, 9.99, 1234.5678, 1e9] {
        for from in PERIODS {
            for to in PERIODS {
                let there = convert_cycle(amount, Some(from), to);
                let back = convert_cycle(there, Some(to), from);
                assert!(
                    (back - amount).abs() <= 1e-9 * amount.max(1.0),
                    "{amount} {from:?}->{to:?}->{from:?} gave {back}"
                );
            }
        }
    }
}

#[test]
fn unknown_cycle_passes_through() {
    for period in PERIODS {
        assert_eq!(convert_cycle(42.0, None, period), 42.0);
    }
}

#[test]
fn advance_split_conserves_price() {
    for price in [0.0, 1.0, 99.0, 300.0, 1000.0] {
        for s in 1..=5u32 {
            for a in 1..=5u32 {
                let (own, other) = advance_split(price, true, s, a);
                assert_eq!(own + other, price, "price {price} ratio {s}:{a}");
            }
        }
    }
}

#[test]
fn non_advance_ignores_advance_ratio() {
    for a in [0u32, 1, 2, 7, 1000] {
        assert_eq!(advance_split(250.0, false, 1, a), (250.0, 0.0));
        assert_eq!(advance_split(250.0, false, 3, a), (250.0, 0.0));
    }
}

#[test]
fn zero_ratios_are_guarded() {
    assert_eq!(advance_split(90.0, true, 0, 2), (30.0, 60.0));
    assert_eq!(advance_split(90.0, true, 2, 0), (90.0, 0.0));
}

#[test]
fn yearly_twd_reported_monthly() {
    let subs = vec![sub("a", 1200.0, "TWD", "yearly")];
    let summary = normalize(&subs, &rates(&[("TWD", 1.0)]), Period::Monthly, day(2024, 6, 1));
    assert_eq!(summary.items[0].self_amount, 100.0);
    assert_eq!(summary.total_self, 100.0);
    assert_eq!(summary.total_advance, 0.0);
}

#[test]
fn advanced_usd_is_split_then_converted() {
    let mut s = sub("a", 300.0, "USD", "monthly");
    s.is_advance = true;
    s.self_ratio = 1;
    s.advance_ratio = 2;
    let subs = vec![s];
    let summary = normalize(&subs, &rates(&[("USD", 32.0)]), Period::Monthly, day(2024, 6, 1));
    let item = &summary.items[0];
    assert_eq!(item.native_self_amount, 100.0);
    assert_eq!(item.self_amount, 3200.0);
    assert_eq!(item.advance_amount, 6400.0);
    assert_eq!(item.full_amount, 9600.0);
    assert_eq!(summary.total_self, 3200.0);
    assert_eq!(summary.total_advance, 6400.0);
}

#[test]
fn total_sums_self_shares_only() {
    let mut shared = sub("shared", 600.0, "TWD", "yearly");
    shared.is_advance = true;
    shared.advance_ratio = 2;
    let subs = vec![shared, sub("solo", 30.0, "TWD", "monthly")];
    let summary = normalize(&subs, &rates(&[("TWD", 1.0)]), Period::Yearly, day(2024, 6, 1));
    assert_eq!(summary.total_self, 200.0 + 360.0);
    assert_eq!(summary.total_advance, 400.0);
}

#[test]
fn amount_sort_uses_full_price() {
    // "shared" costs more in total but less for the owner.
    let mut shared = sub("shared", 900.0, "TWD", "monthly");
    shared.is_advance = true;
    shared.advance_ratio = 8;
    let subs = vec![shared, sub("solo", 500.0, "TWD", "monthly")];
    let mut summary = normalize(&subs, &rates(&[("TWD", 1.0)]), Period::Monthly, day(2024, 6, 1));

    sort_items(&mut summary.items, SortOrder::AmountAsc);
    let ids: Vec<&str> = summary.items.iter().map(|i| i.subscription.id.as_str()).collect();
    assert_eq!(ids, ["solo", "shared"]);

    sort_items(&mut summary.items, SortOrder::AmountDesc);
    let ids: Vec<&str> = summary.items.iter().map(|i| i.subscription.id.as_str()).collect();
    assert_eq!(ids, ["shared", "solo"]);
}

#[test]
fn amount_sort_compares_across_currencies_and_cycles() {
    let subs = vec![
        sub("usd-monthly", 10.0, "USD", "monthly"),
        sub("twd-yearly", 3000.0, "TWD", "yearly"),
        sub("jpy-monthly", 1000.0, "JPY", "monthly"),
    ];
    let table = rates(&[("TWD", 1.0), ("USD", 30.0), ("JPY", 0.2)]);
    let mut summary = normalize(&subs, &table, Period::Monthly, day(2024, 6, 1));
    sort_items(&mut summary.items, SortOrder::AmountAsc);
    let ids: Vec<&str> = summary.items.iter().map(|i| i.subscription.id.as_str()).collect();
    assert_eq!(ids, ["jpy-monthly", "twd-yearly", "usd-monthly"]);
}

#[test]
fn date_sort_uses_next_billing_date() {
    let mut early = sub("early", 1.0, "TWD", "monthly");
    early.billing_date = day(2024, 1, 20);
    let mut late = sub("late", 1.0, "TWD", "monthly");
    late.billing_date = day(2024, 1, 5);
    let mut yearly = sub("yearly", 1.0, "TWD", "yearly");
    yearly.billing_date = day(2023, 12, 1);
    let subs = vec![yearly, late, early];
    let today = day(2024, 3, 10);
    let mut summary = normalize(&subs, &rates(&[("TWD", 1.0)]), Period::Monthly, today);

    sort_items(&mut summary.items, SortOrder::DateAsc);
    let dates: Vec<NaiveDate> = summary.items.iter().map(|i| i.next_billing_date).collect();
    assert_eq!(dates, [day(2024, 3, 20), day(2024, 4, 5), day(2024, 12, 1)]);

    sort_items(&mut summary.items, SortOrder::DateDesc);
    let ids: Vec<&str> = summary.items.iter().map(|i| i.subscription.id.as_str()).collect();
    assert_eq!(ids, ["yearly", "late", "early"]);
}

#[test]
fn sort_order_cycles_in_fixed_order() {
    let mut order = SortOrder::AmountAsc;
    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(order.as_str());
        order = order.next();
    }
    assert_eq!(seen, ["amount_asc", "amount_desc", "date_asc", "date_desc"]);
    assert_eq!(order, SortOrder::AmountAsc);
    assert_eq!(SortOrder::parse("DATE_DESC"), Some(SortOrder::DateDesc));
    assert_eq!(SortOrder::parse("price"), None);
}

#[test]
fn normalization_is_deterministic() {
    let subs = vec![
        sub("a", 10.0, "USD", "halfyear"),
        sub("b", 7.5, "EUR", "odd-cycle"),
    ];
    let table = rates(&[("USD", 31.5), ("EUR", 34.0)]);
    let first = normalize(&subs, &table, Period::HalfYear, day(2024, 6, 1));
    let second = normalize(&subs, &table, Period::HalfYear, day(2024, 6, 1));
    assert_eq!(first.total_self, second.total_self);
    assert_eq!(first.items[1].self_amount, 7.5 * 34.0);
}
