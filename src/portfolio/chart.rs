// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::securities;
use super::trades;
use crate::errors::{Error, Result};
use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Price history in the shape chart.js consumes.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityChart {
    pub labels: Vec<String>,
    pub datasets: Vec<ChartDataSet>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDataSet {
    pub label: String,
    pub background_color: String,
    pub border_color: String,
    pub fill: String,
    pub data: Vec<Decimal>,
}

/// Last known price per month over the `days` before `today`: trade prices,
/// then the latest quote for its month.
pub fn security_chart(
    conn: &rusqlite::Connection,
    user_id: i64,
    security_id: i64,
    days: u32,
    today: NaiveDate,
) -> Result<SecurityChart> {
    if days == 0 {
        return Err(Error::invalid("Chart needs a positive day count"));
    }
    let sec = securities::get(conn, user_id, security_id)?;
    let since = today - Duration::days(i64::from(days));

    let mut months: BTreeMap<(i32, u32), Decimal> = BTreeMap::new();
    for t in trades::list(conn, user_id, sec.account_id, Some(sec.id))? {
        if t.date >= since && t.date <= today && t.price > Decimal::ZERO {
            months.insert((t.date.year(), t.date.month()), t.price);
        }
    }
    if let Some(quoted) = sec.last_quote_update.filter(|d| *d >= since && *d <= today) {
        let price = sec.price();
        if price > Decimal::ZERO {
            months.insert((quoted.year(), quoted.month()), price);
        }
    }
    debug!("Security {} chart: {} months over {} days", sec.id, months.len(), days);

    let labels = months
        .keys()
        .filter_map(|(y, m)| NaiveDate::from_ymd_opt(*y, *m, 1))
        .map(|d| d.format("%b %Y").to_string())
        .collect();
    let label = if sec.name.is_empty() { sec.symbol.clone() } else { sec.name.clone() };
    Ok(SecurityChart {
        labels,
        datasets: vec![ChartDataSet {
            label,
            background_color: "transparent".into(),
            border_color: "#3B82F6".into(),
            fill: "origin".into(),
            data: months.into_values().collect(),
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{self, NewAccount};
    use crate::db::open_in_memory;
    use crate::models::{AccountType, TradeType};
    use crate::portfolio::trades::{SecurityRef, TradeInput};
    use rust_decimal_macros::dec;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn monthly_prices_within_window() {
        let conn = open_in_memory().unwrap();
        let user = accounts::find_or_create_user(&conn, "alice").unwrap();
        let acct = accounts::create(
            &conn,
            user.id,
            &NewAccount {
                name: "Brokerage".into(),
                account_type: AccountType::Investment,
                currency: "USD".into(),
                taxable: true,
            },
        )
        .unwrap();
        let mut last = None;
        for (tt, date, shares, price) in [
            (TradeType::Buy, "2023-06-01", dec!(10), dec!(90)),
            (TradeType::Buy, "2024-01-05", dec!(2), dec!(100)),
            (TradeType::Buy, "2024-01-20", dec!(2), dec!(104)),
            (TradeType::Sell, "2024-03-11", dec!(4), dec!(111)),
        ] {
            let input = TradeInput {
                account_id: acct.id,
                security: SecurityRef::Symbol("VTI".into()),
                trade_type: tt,
                date: d(date),
                amount: shares * price,
                price,
                shares,
                tax_year: None,
                import_id: None,
            };
            last = Some(trades::create(&conn, user.id, &input, None).unwrap());
        }
        let sec_id = last.unwrap().security_id;

        let chart = security_chart(&conn, user.id, sec_id, 180, d("2024-04-01")).unwrap();
        assert_eq!(chart.labels, vec!["Jan 2024", "Mar 2024"]);
        assert_eq!(chart.datasets[0].data, vec![dec!(104), dec!(111)]);
        assert_eq!(chart.datasets[0].label, "VTI");

        let json = serde_json::to_value(&chart).unwrap();
        assert_eq!(json["datasets"][0]["borderColor"], "#3B82F6");

        let bob = accounts::find_or_create_user(&conn, "bob").unwrap();
        assert!(matches!(
            security_chart(&conn, bob.id, sec_id, 180, d("2024-04-01")),
            Err(Error::PermissionDenied)
        ));
    }
}
