// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Securities, trades, lot matching, the quote cache and company
//! research (filings, price charts).

pub mod chart;
pub mod filings;
pub mod lots;
pub mod position;
pub mod quotes;
pub mod securities;
pub mod trades;

pub use chart::SecurityChart;
pub use filings::{EdgarFetcher, Filing, FilingFetcher, FilingType};
pub use quotes::{Quote, QuoteCache, QuoteFetcher, YahooQuoteFetcher};

use crate::errors::Result;
use crate::models::Security;
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

fn quotable(sec: &Security) -> bool {
    sec.security_type.price_fetchable() && !sec.symbol.is_empty()
}

/// Revalues quotable positions from cache entries newer than their last
/// update. Never fetches. Returns how many securities changed.
pub fn apply_cached_quotes(conn: &Connection, cache: &QuoteCache, securities: &mut [Security]) -> Result<usize> {
    let mut updated = 0;
    for sec in securities.iter_mut().filter(|s| quotable(s)) {
        let Some(quote) = cache.get(&sec.symbol) else {
            continue;
        };
        if sec.last_quote_update.is_some_and(|d| d >= quote.last_quoted) {
            continue;
        }
        position::revalue(sec, quote.price, quote.last_quoted);
        securities::save_position(conn, sec)?;
        updated += 1;
    }
    Ok(updated)
}

/// Lists an account's securities valued from the cache and kicks off a
/// background refresh of their symbols. The refresh is not awaited.
pub fn list_valued(
    conn: &Connection,
    user_id: i64,
    account_id: i64,
    include_closed: bool,
    cache: &Arc<QuoteCache>,
) -> Result<Vec<Security>> {
    let mut list = securities::list(conn, user_id, account_id, include_closed)?;
    let n = apply_cached_quotes(conn, cache, &mut list)?;
    if n > 0 {
        debug!("Applied {} cached quotes on account {}", n, account_id);
    }
    let symbols: BTreeSet<String> = list
        .iter()
        .filter(|s| quotable(s) && !s.shares.is_zero())
        .map(|s| s.symbol.clone())
        .collect();
    if !symbols.is_empty() {
        cache.spawn_refresh(symbols.into_iter().collect());
    }
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{self, NewAccount};
    use crate::db;
    use crate::errors::Error;
    use crate::models::{AccountType, TradeType};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct Offline;

    impl QuoteFetcher for Offline {
        fn fetch(&self, _symbol: &str) -> Result<Decimal> {
            Err(Error::Quote("offline".into()))
        }
    }

    #[test]
    fn cached_quotes_revalue_listing() {
        let conn = db::open_in_memory().unwrap();
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
        let trade = trades::create(
            &conn,
            user.id,
            &trades::TradeInput {
                account_id: acct.id,
                security: trades::SecurityRef::Symbol("VTI".into()),
                trade_type: TradeType::Buy,
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                amount: dec!(2000),
                price: dec!(200),
                shares: dec!(10),
                tax_year: None,
                import_id: None,
            },
            None,
        )
        .unwrap();
        let cache = Arc::new(QuoteCache::new(Offline));
        let day = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        cache.insert("VTI", Quote { price: dec!(250.125), last_quoted: day });

        let listed = list_valued(&conn, user.id, acct.id, false, &cache).unwrap();
        assert_eq!(listed[0].value, dec!(2501.25));
        let sec = securities::get(&conn, user.id, trade.security_id).unwrap();
        assert_eq!(sec.last_quote_update, Some(day));

        // older entries are ignored
        cache.insert("VTI", Quote { price: dec!(1), last_quoted: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() });
        let mut list = securities::list(&conn, user.id, acct.id, false).unwrap();
        assert_eq!(apply_cached_quotes(&conn, &cache, &mut list).unwrap(), 0);
    }
}
