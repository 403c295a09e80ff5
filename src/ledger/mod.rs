// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Cash-flow ledger: posting, splits, transfers, scheduled templates and
//! the running-balance listing.

mod cash_flow;
mod listing;
mod scheduled;

pub use cash_flow::{
    CashFlowInput, CashFlowUpdate, RepeatInput, SplitInput, create, create_split, delete,
    list_splits, update, update_repeat,
};
pub(crate) use cash_flow::remove;
pub use listing::{LedgerRow, ScheduledRow, list, list_scheduled};
pub use scheduled::{advance_date, apply_scheduled, average_daily_balance, expand_account};

use crate::accounts;
use crate::errors::{Error, Result};
use crate::models::{Account, CashFlow, RepeatInterval};
use rusqlite::{Connection, OptionalExtension, params};

pub(crate) fn load(conn: &Connection, id: i64) -> Result<CashFlow> {
    conn.query_row(
        &format!("SELECT {} FROM cash_flows WHERE id=?1", CashFlow::COLUMNS),
        params![id],
        CashFlow::from_row,
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("cash flow {}", id)))
}

/// Loads a cash flow together with its account, checking ownership.
pub(crate) fn load_owned(conn: &Connection, user_id: i64, id: i64) -> Result<(CashFlow, Account)> {
    let cf = load(conn, id)?;
    let account = accounts::get(conn, user_id, cf.account_id)?;
    Ok((cf, account))
}

pub(crate) fn insert(conn: &Connection, cf: &CashFlow) -> Result<i64> {
    conn.execute(
        "INSERT INTO cash_flows(account_id, date, tax_year, amount, kind, transfer, payee_id,
             category_id, peer_id, peer_account_id, parent_id, has_splits, import_id, trade_id,
             transnum, memo)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            cf.account_id,
            cf.date,
            cf.tax_year,
            cf.amount.to_string(),
            cf.kind.as_str(),
            cf.transfer,
            cf.payee_id,
            cf.category_id,
            cf.peer_id,
            cf.peer_account_id,
            cf.parent_id,
            cf.has_splits,
            cf.import_id,
            cf.trade_id,
            cf.transnum,
            cf.memo,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn save(conn: &Connection, cf: &CashFlow) -> Result<()> {
    conn.execute(
        "UPDATE cash_flows SET account_id=?1, date=?2, tax_year=?3, amount=?4, kind=?5,
             transfer=?6, payee_id=?7, category_id=?8, peer_id=?9, peer_account_id=?10,
             parent_id=?11, has_splits=?12, transnum=?13, memo=?14
         WHERE id=?15",
        params![
            cf.account_id,
            cf.date,
            cf.tax_year,
            cf.amount.to_string(),
            cf.kind.as_str(),
            cf.transfer,
            cf.payee_id,
            cf.category_id,
            cf.peer_id,
            cf.peer_account_id,
            cf.parent_id,
            cf.has_splits,
            cf.transnum,
            cf.memo,
            cf.id,
        ],
    )?;
    Ok(())
}

/// Split children of `parent_id`, oldest first.
pub(crate) fn children(conn: &Connection, parent_id: i64) -> Result<Vec<CashFlow>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM cash_flows WHERE parent_id=?1 AND kind='split' ORDER BY id",
        CashFlow::COLUMNS
    ))?;
    let rows = stmt.query_map(params![parent_id], CashFlow::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub(crate) fn repeat_interval(conn: &Connection, cash_flow_id: i64) -> Result<Option<RepeatInterval>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM repeat_intervals ri
                 JOIN repeat_interval_types t ON t.id = ri.repeat_interval_type_id
                 WHERE ri.cash_flow_id=?1",
                RepeatInterval::COLUMNS
            ),
            params![cash_flow_id],
            RepeatInterval::from_row,
        )
        .optional()?)
}

/// Balance contribution of a row; only posted and trade rows count.
pub(crate) fn posted_amount(cf: &CashFlow) -> rust_decimal::Decimal {
    if cf.kind.posts() {
        cf.amount
    } else {
        rust_decimal::Decimal::ZERO
    }
}
