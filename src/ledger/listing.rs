// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::repeat_interval;
use crate::accounts;
use crate::errors::{Error, Result};
use crate::models::{CashFlow, RepeatInterval};
use chrono::NaiveDate;
use rusqlite::{Connection, Row, params};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct LedgerRow {
    #[serde(flatten)]
    pub cash_flow: CashFlow,
    pub payee: Option<String>,
    pub category: Option<String>,
    pub peer_account: Option<String>,
    /// Account balance after this row.
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledRow {
    #[serde(flatten)]
    pub cash_flow: CashFlow,
    pub payee: Option<String>,
    pub repeat: RepeatInterval,
}

const NAMED_COLUMNS: &str = "cf.id, cf.account_id, cf.date, cf.tax_year, cf.amount, cf.kind, cf.transfer, cf.payee_id, cf.category_id, cf.peer_id, cf.peer_account_id, cf.parent_id, cf.has_splits, cf.import_id, cf.trade_id, cf.transnum, cf.memo, p.name, c.name, pa.name";

fn named_row(r: &Row<'_>) -> rusqlite::Result<(CashFlow, Option<String>, Option<String>, Option<String>)> {
    Ok((CashFlow::from_row(r)?, r.get(17)?, r.get(18)?, r.get(19)?))
}

/// Posted rows of an account, newest first, each with the balance after it.
/// At most `limit` rows are returned (`None` for all); `since` drops older
/// ones.
pub fn list(
    conn: &Connection,
    user_id: i64,
    account_id: i64,
    limit: Option<usize>,
    since: Option<NaiveDate>,
) -> Result<Vec<LedgerRow>> {
    let account = accounts::get(conn, user_id, account_id)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM cash_flows cf
         LEFT JOIN payees p ON p.id = cf.payee_id
         LEFT JOIN categories c ON c.id = cf.category_id
         LEFT JOIN accounts pa ON pa.id = cf.peer_account_id
         WHERE cf.account_id=?1 AND cf.kind IN ('posted','trade')
           AND (?2 IS NULL OR cf.date >= ?2)
         ORDER BY cf.date DESC, cf.id DESC
         LIMIT ?3",
        NAMED_COLUMNS
    ))?;
    let limit = limit.map_or(-1, |l| l as i64);
    let rows = stmt.query_map(params![account.id, since, limit], named_row)?;

    let mut balance = account.cash_balance;
    let mut out = Vec::new();
    for row in rows {
        let (cash_flow, payee, category, peer_account) = row?;
        let amount = cash_flow.amount;
        out.push(LedgerRow {
            cash_flow,
            payee,
            category,
            peer_account,
            balance,
        });
        balance -= amount;
    }
    Ok(out)
}

/// Repeat templates of an account in next-due order.
pub fn list_scheduled(conn: &Connection, user_id: i64, account_id: i64) -> Result<Vec<ScheduledRow>> {
    let account = accounts::get(conn, user_id, account_id)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM cash_flows cf
         LEFT JOIN payees p ON p.id = cf.payee_id
         LEFT JOIN categories c ON c.id = cf.category_id
         LEFT JOIN accounts pa ON pa.id = cf.peer_account_id
         WHERE cf.account_id=?1 AND cf.kind='repeat'
         ORDER BY cf.date, cf.id",
        NAMED_COLUMNS
    ))?;
    let rows = stmt.query_map(params![account.id], named_row)?;
    let mut out = Vec::new();
    for row in rows {
        let (cash_flow, payee, _, _) = row?;
        let repeat = repeat_interval(conn, cash_flow.id)?
            .ok_or_else(|| Error::NotFound(format!("repeat interval of {}", cash_flow.id)))?;
        out.push(ScheduledRow {
            cash_flow,
            payee,
            repeat,
        });
    }
    Ok(out)
}
