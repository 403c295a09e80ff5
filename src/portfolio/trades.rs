// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::lots::{self, Disposal, Lot};
use super::position::{self, Direction, split_factor};
use super::quotes::QuoteCache;
use super::securities::{self, NewSecurity};
use crate::accounts;
use crate::db::decimal_at;
use crate::errors::{Error, Result};
use crate::ledger;
use crate::models::{
    BasisType, CashFlow, CashFlowKind, Security, SecurityType, Trade, TradeGain, TradeType,
};
use crate::utils::round_bank;
use chrono::{Datelike, NaiveDate};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

/// How a trade names its security. Symbols and names are found on the
/// account or created (Stock, FIFO).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityRef {
    Id(i64),
    Symbol(String),
    /// Imported security names carry no symbol.
    Name(String),
}

#[derive(Debug, Clone)]
pub struct TradeInput {
    pub account_id: i64,
    pub security: SecurityRef,
    pub trade_type: TradeType,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub price: Decimal,
    /// For splits, the split factor.
    pub shares: Decimal,
    pub tax_year: Option<i32>,
    pub import_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct TradeUpdate {
    pub date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub price: Option<Decimal>,
    pub shares: Option<Decimal>,
    pub tax_year: Option<i32>,
}

/// Types whose rows carry open lot shares.
const LOT_TYPES: &str = "1, 5, 6, 7";

fn validate(trade: &Trade) -> Result<()> {
    let negative_shares = trade.shares.is_sign_negative() && trade.trade_type != TradeType::Split;
    if trade.amount.is_sign_negative() || trade.price.is_sign_negative() || negative_shares {
        return Err(Error::invalid("Trade amounts must not be negative"));
    }
    let needs_shares = trade.trade_type.changes_shares();
    if needs_shares && trade.shares.is_zero() {
        return Err(Error::invalid(format!(
            "{} needs a share count",
            trade.trade_type.label()
        )));
    }
    Ok(())
}

fn opens_lot(t: TradeType) -> bool {
    t.opens_lot() || t == TradeType::SharesIn
}

fn resolve_security(conn: &Connection, user_id: i64, input: &TradeInput) -> Result<Security> {
    let (symbol, name) = match &input.security {
        SecurityRef::Id(id) => {
            let sec = securities::get(conn, user_id, *id)?;
            if sec.account_id != input.account_id {
                return Err(Error::invalid("Security belongs to another account"));
            }
            return Ok(sec);
        }
        SecurityRef::Symbol(s) => (s.as_str(), s.as_str()),
        SecurityRef::Name(n) => ("", n.as_str()),
    };
    let account = accounts::get(conn, user_id, input.account_id)?;
    if let Some(sec) = securities::find_by_import_name(conn, account.id, name)? {
        return Ok(sec);
    }
    securities::create(
        conn,
        user_id,
        account.id,
        &NewSecurity {
            symbol: symbol.to_string(),
            name: name.to_string(),
            security_type: SecurityType::Stock,
            basis_type: BasisType::Fifo,
        },
    )
}

fn load(conn: &Connection, id: i64) -> Result<Trade> {
    conn.query_row(
        &format!("SELECT {} FROM trades WHERE id=?1", Trade::COLUMNS),
        params![id],
        Trade::from_row,
    )
    .optional()?
    .ok_or(Error::PermissionDenied)
}

pub fn get(conn: &Connection, user_id: i64, trade_id: i64) -> Result<Trade> {
    let trade = load(conn, trade_id)?;
    accounts::get(conn, user_id, trade.account_id)?;
    Ok(trade)
}

fn insert(conn: &Connection, t: &Trade) -> Result<i64> {
    conn.execute(
        "INSERT INTO trades(account_id, security_id, trade_type_id, date, amount, price, shares,
             adjusted_shares, basis, closed, tax_year, import_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            t.account_id,
            t.security_id,
            t.trade_type.id(),
            t.date,
            t.amount.to_string(),
            t.price.to_string(),
            t.shares.to_string(),
            t.adjusted_shares.to_string(),
            t.basis.to_string(),
            t.closed,
            t.tax_year,
            t.import_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn save(conn: &Connection, t: &Trade) -> Result<()> {
    conn.execute(
        "UPDATE trades SET date=?1, amount=?2, price=?3, shares=?4, adjusted_shares=?5, basis=?6,
             closed=?7, tax_year=?8
         WHERE id=?9",
        params![
            t.date,
            t.amount.to_string(),
            t.price.to_string(),
            t.shares.to_string(),
            t.adjusted_shares.to_string(),
            t.basis.to_string(),
            t.closed,
            t.tax_year,
            t.id,
        ],
    )?;
    Ok(())
}

fn open_lots(conn: &Connection, security_id: i64) -> Result<Vec<Lot>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT id, date, adjusted_shares, basis FROM trades
         WHERE security_id=?1 AND closed=0 AND trade_type_id IN ({})
         ORDER BY date, id",
        LOT_TYPES
    ))?;
    let rows = stmt.query_map(params![security_id], |r| {
        Ok(Lot {
            trade_id: r.get(0)?,
            date: r.get(1)?,
            shares: decimal_at(r, 2)?,
            basis: decimal_at(r, 3)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn save_lots(conn: &Connection, lots: &[Lot]) -> Result<()> {
    for lot in lots {
        conn.execute(
            "UPDATE trades SET adjusted_shares=?1, basis=?2, closed=?3 WHERE id=?4",
            params![
                lot.shares.to_string(),
                lot.basis.to_string(),
                lot.is_closed(),
                lot.trade_id
            ],
        )?;
    }
    Ok(())
}

fn persist_disposal(conn: &Connection, trade: &Trade, disposal: &Disposal) -> Result<()> {
    save_lots(conn, &disposal.lots)?;
    for m in &disposal.matches {
        if trade.trade_type == TradeType::Sell {
            conn.execute(
                "INSERT INTO trade_gains(sell_id, buy_id, shares, days_held, basis) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![trade.id, m.buy_id, m.shares.to_string(), m.days_held, m.basis.to_string()],
            )?;
        } else {
            conn.execute(
                "INSERT INTO share_transfers(out_id, buy_id, shares) VALUES (?1, ?2, ?3)",
                params![trade.id, m.buy_id, m.shares.to_string()],
            )?;
        }
    }
    Ok(())
}

/// Lot shares handed out by a SharesOut trade, as (buy id, shares).
fn transfers_of(conn: &Connection, out_id: i64) -> Result<Vec<(i64, Decimal)>> {
    let mut stmt = conn.prepare_cached("SELECT buy_id, shares FROM share_transfers WHERE out_id=?1 ORDER BY id")?;
    let rows = stmt.query_map(params![out_id], |r| Ok((r.get(0)?, decimal_at(r, 1)?)))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn gains_of(conn: &Connection, sell_id: i64) -> Result<Vec<TradeGain>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM trade_gains WHERE sell_id=?1 ORDER BY id",
        TradeGain::COLUMNS
    ))?;
    let rows = stmt.query_map(params![sell_id], TradeGain::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn post_cash(conn: &Connection, sec: &Security, trade: &Trade) -> Result<()> {
    let Some(ty) = trade.trade_type.cash_flow_type() else {
        return Ok(());
    };
    let label = if sec.symbol.is_empty() { &sec.name } else { &sec.symbol };
    let cf = CashFlow {
        id: 0,
        account_id: trade.account_id,
        date: trade.date,
        tax_year: trade.tax_year,
        amount: ty.apply(trade.amount),
        kind: CashFlowKind::Trade,
        transfer: false,
        payee_id: None,
        category_id: None,
        peer_id: None,
        peer_account_id: None,
        parent_id: None,
        has_splits: false,
        import_id: trade.import_id,
        trade_id: Some(trade.id),
        transnum: String::new(),
        memo: format!("{} {}", trade.trade_type.label(), label),
    };
    ledger::insert(conn, &cf)?;
    accounts::post_to_balance(conn, cf.account_id, cf.amount)?;
    Ok(())
}

fn remove_cash(conn: &Connection, trade_id: i64) -> Result<()> {
    let cf = conn
        .query_row(
            &format!(
                "SELECT {} FROM cash_flows WHERE trade_id=?1 AND kind='trade'",
                CashFlow::COLUMNS
            ),
            params![trade_id],
            CashFlow::from_row,
        )
        .optional()?;
    if let Some(cf) = cf {
        ledger::remove(conn, &cf)?;
    }
    Ok(())
}

/// Runs a stored trade through lot matching, the position and the cash
/// ledger.
fn record(conn: &Connection, sec: &mut Security, trade: &mut Trade, cached: Option<Decimal>) -> Result<()> {
    match trade.trade_type {
        TradeType::Sell => {
            let lots = open_lots(conn, sec.id)?;
            let disposal = lots::match_sell(&lots, trade.date, trade.shares, sec.basis_type)?;
            persist_disposal(conn, trade, &disposal)?;
            trade.basis = disposal.basis;
            save(conn, trade)?;
            debug!(
                "Sell {} matched {} lots, basis {}",
                trade.id,
                disposal.matches.len(),
                trade.basis
            );
        }
        TradeType::SharesOut => {
            let lots = open_lots(conn, sec.id)?;
            let disposal = lots::take_shares(&lots, trade.date, trade.shares)?;
            persist_disposal(conn, trade, &disposal)?;
        }
        TradeType::Split => {
            let mut lots = open_lots(conn, sec.id)?;
            lots.retain(|l| l.date <= trade.date);
            if lots.is_empty() {
                return Err(Error::constraint("No Shares"));
            }
            let factor = split_factor(trade.shares);
            for lot in lots.iter_mut() {
                lot.shares *= factor;
            }
            save_lots(conn, &lots)?;
        }
        _ => {}
    }
    let old_price = sec.price();
    position::apply_trade(sec, trade, Direction::Apply);
    position::revalue_after_trade(sec, trade, old_price, cached);
    securities::save_position(conn, sec)?;
    post_cash(conn, sec, trade)
}

/// Undoes `record`, restoring matched lots.
fn unrecord(conn: &Connection, sec: &mut Security, trade: &Trade) -> Result<()> {
    match trade.trade_type {
        t if opens_lot(t) => {
            let (sold, moved, split): (i64, i64, i64) = conn.query_row(
                "SELECT (SELECT COUNT(*) FROM trade_gains WHERE buy_id=?1),
                        (SELECT COUNT(*) FROM share_transfers WHERE buy_id=?1),
                        (SELECT COUNT(*) FROM trades WHERE security_id=?2 AND trade_type_id=9 AND date>=?3)",
                params![trade.id, sec.id, trade.date],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )?;
            if sold > 0 {
                return Err(Error::constraint("Trade has matched sells"));
            }
            if moved > 0 {
                return Err(Error::constraint("Trade has shares transferred out"));
            }
            if split > 0 {
                return Err(Error::constraint("A later split depends on this trade"));
            }
        }
        TradeType::Sell => {
            for gain in gains_of(conn, trade.id)? {
                let mut buy = load(conn, gain.buy_id)?;
                buy.adjusted_shares += gain.shares;
                buy.basis += gain.basis;
                buy.closed = false;
                save(conn, &buy)?;
            }
            conn.execute("DELETE FROM trade_gains WHERE sell_id=?1", params![trade.id])?;
        }
        TradeType::SharesOut => {
            for (buy_id, shares) in transfers_of(conn, trade.id)? {
                let mut buy = load(conn, buy_id)?;
                buy.adjusted_shares += shares;
                buy.closed = false;
                save(conn, &buy)?;
            }
            conn.execute("DELETE FROM share_transfers WHERE out_id=?1", params![trade.id])?;
        }
        TradeType::Split => {
            let later: i64 = conn.query_row(
                "SELECT COUNT(*) FROM trades WHERE security_id=?1 AND id<>?2 AND date>=?3
                   AND trade_type_id IN (2, 8, 9)",
                params![sec.id, trade.id, trade.date],
                |r| r.get(0),
            )?;
            if later > 0 {
                return Err(Error::constraint("Later trades depend on this split"));
            }
            let mut lots = open_lots(conn, sec.id)?;
            lots.retain(|l| l.date <= trade.date);
            let factor = split_factor(trade.shares);
            for lot in lots.iter_mut() {
                lot.shares /= factor;
            }
            save_lots(conn, &lots)?;
        }
        _ => {}
    }
    let old_price = sec.price();
    position::apply_trade(sec, trade, Direction::Reverse);
    sec.value = round_bank(sec.shares * old_price, 2);
    securities::save_position(conn, sec)?;
    remove_cash(conn, trade.id)
}

fn cached_price(quotes: Option<&QuoteCache>, sec: &Security) -> Option<Decimal> {
    quotes.and_then(|q| q.get(&sec.symbol)).map(|q| q.price)
}

/// Records a trade with its gains, position change and cash flow.
pub fn create(conn: &Connection, user_id: i64, input: &TradeInput, quotes: Option<&QuoteCache>) -> Result<Trade> {
    let mut sec = resolve_security(conn, user_id, input)?;
    let tt = input.trade_type;
    let mut trade = Trade {
        id: 0,
        account_id: sec.account_id,
        security_id: sec.id,
        trade_type: tt,
        date: input.date,
        amount: input.amount,
        price: input.price,
        shares: input.shares,
        adjusted_shares: if opens_lot(tt) { input.shares } else { Decimal::ZERO },
        basis: if tt.opens_lot() { input.amount } else { Decimal::ZERO },
        closed: tt == TradeType::Sell || tt == TradeType::SharesOut,
        tax_year: input.tax_year.unwrap_or(input.date.year()),
        import_id: input.import_id,
    };
    validate(&trade)?;
    if trade.price.is_zero() && !trade.shares.is_zero() && tt != TradeType::Split {
        trade.price = crate::utils::price(trade.amount / trade.shares);
    }
    trade.id = insert(conn, &trade)?;
    let cached = cached_price(quotes, &sec);
    record(conn, &mut sec, &mut trade, cached)?;
    info!(
        "Created {} trade {} on security {} ({} shares, {})",
        tt.label(),
        trade.id,
        sec.id,
        trade.shares,
        trade.amount
    );
    Ok(trade)
}

/// Re-records a trade with new terms. Lots already drawn on by sells or
/// transfers, or scaled by a later split, are locked.
pub fn update(conn: &Connection, user_id: i64, trade_id: i64, upd: &TradeUpdate, quotes: Option<&QuoteCache>) -> Result<Trade> {
    let old = get(conn, user_id, trade_id)?;
    let mut sec = securities::get(conn, user_id, old.security_id)?;
    unrecord(conn, &mut sec, &old)?;

    let mut trade = old.clone();
    if let Some(date) = upd.date {
        trade.date = date;
        trade.tax_year = date.year();
    }
    if let Some(t) = upd.tax_year {
        trade.tax_year = t;
    }
    trade.amount = upd.amount.unwrap_or(trade.amount);
    trade.price = upd.price.unwrap_or(trade.price);
    trade.shares = upd.shares.unwrap_or(trade.shares);
    trade.adjusted_shares = if opens_lot(trade.trade_type) { trade.shares } else { Decimal::ZERO };
    trade.basis = if trade.trade_type.opens_lot() { trade.amount } else { Decimal::ZERO };
    validate(&trade)?;
    save(conn, &trade)?;
    let cached = cached_price(quotes, &sec);
    record(conn, &mut sec, &mut trade, cached)?;
    info!("Updated trade {}", trade.id);
    Ok(trade)
}

pub fn delete(conn: &Connection, user_id: i64, trade_id: i64) -> Result<()> {
    let trade = get(conn, user_id, trade_id)?;
    let mut sec = securities::get(conn, user_id, trade.security_id)?;
    unrecord(conn, &mut sec, &trade)?;
    conn.execute("DELETE FROM trades WHERE id=?1", params![trade.id])?;
    info!("Deleted trade {}", trade.id);
    Ok(())
}

/// Trades of an account, oldest first.
pub fn list(conn: &Connection, user_id: i64, account_id: i64, security_id: Option<i64>) -> Result<Vec<Trade>> {
    let account = accounts::get(conn, user_id, account_id)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM trades WHERE account_id=?1 AND (?2 IS NULL OR security_id=?2) ORDER BY date, id",
        Trade::COLUMNS
    ))?;
    let rows = stmt.query_map(params![account.id, security_id], Trade::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
pub struct GainRow {
    pub sell_id: i64,
    pub buy_id: i64,
    pub account_id: i64,
    pub symbol: String,
    pub name: String,
    pub buy_date: NaiveDate,
    pub sell_date: NaiveDate,
    pub tax_year: i32,
    pub shares: Decimal,
    pub days_held: i64,
    pub proceeds: Decimal,
    pub basis: Decimal,
    pub gain: Decimal,
    pub long_term: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GainTotals {
    pub proceeds: Decimal,
    pub basis: Decimal,
    pub gain: Decimal,
    pub short_term: Decimal,
    pub long_term: Decimal,
}

/// Realised gains, one row per matched lot, filtered by tax year and
/// account.
pub fn list_gains(conn: &Connection, user_id: i64, year: Option<i32>, account_id: Option<i64>) -> Result<Vec<GainRow>> {
    if let Some(id) = account_id {
        accounts::get(conn, user_id, id)?;
    }
    let mut stmt = conn.prepare(
        "SELECT g.sell_id, g.buy_id, s.account_id, c.symbol, c.name, b.date, s.date, s.tax_year,
                g.shares, g.days_held, g.basis, s.amount, s.shares
         FROM trade_gains g
         JOIN trades s ON s.id = g.sell_id
         JOIN trades b ON b.id = g.buy_id
         JOIN securities sec ON sec.id = s.security_id
         JOIN companies c ON c.id = sec.company_id
         JOIN accounts a ON a.id = s.account_id
         WHERE a.user_id=?1 AND s.trade_type_id=2
           AND (?2 IS NULL OR s.tax_year=?2)
           AND (?3 IS NULL OR s.account_id=?3)
         ORDER BY s.date, g.id",
    )?;
    let rows = stmt.query_map(params![user_id, year, account_id], |r| {
        let shares = decimal_at(r, 8)?;
        let basis = decimal_at(r, 10)?;
        let sell_amount = decimal_at(r, 11)?;
        let sell_shares = decimal_at(r, 12)?;
        let days_held: i64 = r.get(9)?;
        let proceeds = if sell_shares.is_zero() {
            Decimal::ZERO
        } else {
            round_bank(sell_amount / sell_shares * shares, 2)
        };
        Ok(GainRow {
            sell_id: r.get(0)?,
            buy_id: r.get(1)?,
            account_id: r.get(2)?,
            symbol: r.get(3)?,
            name: r.get(4)?,
            buy_date: r.get(5)?,
            sell_date: r.get(6)?,
            tax_year: r.get(7)?,
            shares,
            days_held,
            proceeds,
            basis,
            gain: proceeds - basis,
            long_term: days_held > 365,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// The lots matched by one sell.
pub fn gains_for_sell(conn: &Connection, user_id: i64, sell_id: i64) -> Result<Vec<GainRow>> {
    let sell = get(conn, user_id, sell_id)?;
    if sell.trade_type != TradeType::Sell {
        return Err(Error::invalid(format!("Trade {} is not a sell", sell_id)));
    }
    Ok(list_gains(conn, user_id, Some(sell.tax_year), Some(sell.account_id))?
        .into_iter()
        .filter(|g| g.sell_id == sell_id)
        .collect())
}

pub fn gain_totals(rows: &[GainRow]) -> GainTotals {
    rows.iter().fold(GainTotals::default(), |mut t, g| {
        t.proceeds += g.proceeds;
        t.basis += g.basis;
        t.gain += g.gain;
        if g.long_term {
            t.long_term += g.gain;
        } else {
            t.short_term += g.gain;
        }
        t
    })
}
