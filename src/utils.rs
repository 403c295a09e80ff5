// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::errors::{Error, Result};
use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};
use comfy_table::{Cell, Table, presets::UTF8_FULL};
use rust_decimal::{Decimal, RoundingStrategy};

const UA: &str = concat!(
    "bookkeeper/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/alphavelocity/bookkeeper)"
);

pub fn http_client(timeout_secs: u64) -> Result<reqwest::blocking::Client> {
    let c = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .user_agent(UA)
        .build()?;
    Ok(c)
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| Error::invalid(format!("Invalid date '{}', expected YYYY-MM-DD", s)))
}

pub fn parse_decimal(s: &str) -> Result<Decimal> {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '$')
        .collect();
    cleaned
        .parse::<Decimal>()
        .map_err(|_| Error::invalid(format!("Invalid decimal '{}'", s)))
}

/// Round half to even, used for every presented amount.
pub fn round_bank(d: Decimal, dp: u32) -> Decimal {
    d.round_dp_with_strategy(dp, RoundingStrategy::MidpointNearestEven)
}

pub fn round_half_up(d: Decimal, dp: u32) -> Decimal {
    d.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

pub fn fmt_currency(d: Decimal) -> String {
    let v = round_bank(d, 2);
    if v.is_sign_negative() && !v.is_zero() {
        format!("-${:.2}", v.abs())
    } else {
        format!("${:.2}", v.abs())
    }
}

pub fn per_share(total: Decimal, shares: Decimal) -> Decimal {
    if shares.is_zero() {
        Decimal::ZERO
    } else {
        round_bank(total / shares, 4)
    }
}

pub fn price(d: Decimal) -> Decimal {
    round_bank(d, 3)
}

/// `part / whole` as a percentage rounded to two places.
pub fn percent(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        Decimal::ZERO
    } else {
        round_bank(part / whole * Decimal::ONE_HUNDRED, 2)
    }
}

/// Whole days from `from` to `to`. With `business`, weekend days inside the
/// span are not counted.
pub fn days_between(from: NaiveDate, to: NaiveDate, business: bool) -> i64 {
    let days = (to - from).num_days();
    if !business || days <= 0 {
        return days;
    }
    let full_weeks = days / 7;
    let mut weekend = full_weeks * 2;
    let mut d = from + Duration::days(full_weeks * 7);
    while d < to {
        d += Duration::days(1);
        if matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
            weekend += 1;
        }
    }
    days - weekend
}

pub fn year_start(year: i32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(|| Error::invalid(format!("Invalid year {}", year)))
}

pub fn pretty_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(headers.iter().map(|h| Cell::new(*h)));
    for r in rows {
        t.add_row(r.into_iter().map(Cell::new));
    }
    t
}

pub fn maybe_print_json<T: serde::Serialize>(json_flag: bool, v: &T) -> anyhow::Result<bool> {
    if json_flag {
        println!("{}", serde_json::to_string_pretty(v)?);
        return Ok(true);
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn bankers_rounding_goes_to_even() {
        assert_eq!(round_bank(dec!(2.345), 2), dec!(2.34));
        assert_eq!(round_bank(dec!(2.355), 2), dec!(2.36));
        assert_eq!(round_half_up(dec!(2.345), 2), dec!(2.35));
    }

    #[test]
    fn currency_formatting() {
        assert_eq!(fmt_currency(dec!(1250)), "$1250.00");
        assert_eq!(fmt_currency(dec!(-200.005)), "-$200.00");
        assert_eq!(percent(dec!(50), dec!(1300)), dec!(3.85));
        assert_eq!(per_share(dec!(2600), dec!(20)), dec!(130));
    }

    #[test]
    fn business_days_skip_weekends() {
        // 2024-03-01 is a Friday
        assert_eq!(days_between(d("2024-03-01"), d("2024-03-04"), false), 3);
        assert_eq!(days_between(d("2024-03-01"), d("2024-03-04"), true), 1);
        assert_eq!(days_between(d("2024-03-01"), d("2024-03-02"), true), 0);
        assert_eq!(days_between(d("2024-03-01"), d("2024-03-15"), true), 10);
        assert_eq!(days_between(d("2024-03-08"), d("2024-03-01"), true), -7);
    }

    #[test]
    fn parse_decimal_accepts_currency_text() {
        assert_eq!(parse_decimal(" $1,250.50 ").unwrap(), dec!(1250.50));
        assert!(matches!(parse_decimal("abc"), Err(Error::InvalidInput(_))));
    }
}
