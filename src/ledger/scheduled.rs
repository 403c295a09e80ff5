// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::cash_flow::insert_peer;
use super::{children, insert, load_owned, posted_amount, repeat_interval, save};
use crate::accounts;
use crate::db::decimal_at;
use crate::errors::{Error, Result};
use crate::models::{CATEGORY_INTEREST_INCOME, CashFlow, CashFlowKind, RepeatInterval};
use crate::utils::round_bank;
use chrono::{Datelike, Duration, NaiveDate};
use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use tracing::{debug, info};

const RATE_WINDOW_DAYS: i64 = 30;

fn days_in_month(year: i32, month: u32) -> u32 {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(ny, nm, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

fn add_months_clamped(date: NaiveDate, months: u32, day: u32) -> NaiveDate {
    let total = date.year() * 12 + date.month0() as i32 + months as i32;
    let (year, month) = (total.div_euclid(12), total.rem_euclid(12) as u32 + 1);
    let day = day.clamp(1, days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(date)
}

/// Next occurrence of a schedule. Short intervals step by days, 15 means
/// twice a month, and 30 or more steps whole months pinned to `start_day`
/// (the current day when zero) and clamped to the month's end.
pub fn advance_date(date: NaiveDate, days: u32, start_day: u32) -> NaiveDate {
    if days < 15 {
        return date + Duration::days(days as i64);
    }
    if days >= 30 {
        let day = if start_day > 0 { start_day } else { date.day() };
        return add_months_clamped(date, days / 30, day);
    }
    if date.day() <= 15 {
        let next = date + Duration::days(15);
        if next.month() == date.month() {
            next
        } else {
            add_months_clamped(date, 0, 31)
        }
    } else {
        let mut day = if start_day > 0 { start_day } else { date.day() };
        if day > 15 {
            day -= 15;
        }
        add_months_clamped(date, 1, day)
    }
}

/// Mean end-of-day balance over the 30 days before `as_of`.
pub fn average_daily_balance(conn: &Connection, account_id: i64, as_of: NaiveDate) -> Result<Decimal> {
    let current: Decimal = conn.query_row(
        "SELECT cash_balance FROM accounts WHERE id=?1",
        params![account_id],
        |r| decimal_at(r, 0),
    )?;
    let start = as_of - Duration::days(RATE_WINDOW_DAYS);
    let mut stmt = conn.prepare_cached(
        "SELECT date, amount FROM cash_flows
         WHERE account_id=?1 AND kind IN ('posted','trade') AND date > ?2",
    )?;
    let rows = stmt.query_map(params![account_id, start], |r| {
        Ok((r.get::<_, NaiveDate>(0)?, decimal_at(r, 1)?))
    })?;
    let mut later = Vec::new();
    for row in rows {
        later.push(row?);
    }

    let mut total = Decimal::ZERO;
    for offset in 0..RATE_WINDOW_DAYS {
        let day = start + Duration::days(offset);
        let after: Decimal = later
            .iter()
            .filter(|(d, _)| *d > day)
            .map(|(_, a)| *a)
            .sum();
        total += current - after;
    }
    Ok(total / Decimal::from(RATE_WINDOW_DAYS))
}

/// Monthly interest for interest-income templates carrying a rate.
fn rate_amount(conn: &Connection, tpl: &CashFlow, repeat: &RepeatInterval) -> Result<Option<Decimal>> {
    if tpl.category_id != Some(CATEGORY_INTEREST_INCOME) || repeat.days != 30 || repeat.rate.is_zero() {
        return Ok(None);
    }
    let balance = average_daily_balance(conn, tpl.account_id, tpl.date)?;
    let amount = round_bank(balance * repeat.rate / Decimal::from(12), 2);
    debug!(
        "Interest on cash flow {}: balance {} rate {} -> {}",
        tpl.id, balance, repeat.rate, amount
    );
    Ok(Some(if tpl.amount.is_sign_negative() { -amount.abs() } else { amount }))
}

fn materialize(conn: &Connection, tpl: &CashFlow, splits: &[CashFlow]) -> Result<CashFlow> {
    let mut inst = CashFlow {
        id: 0,
        kind: CashFlowKind::Posted,
        peer_id: None,
        parent_id: Some(tpl.id),
        has_splits: !splits.is_empty(),
        import_id: None,
        ..tpl.clone()
    };
    inst.id = insert(conn, &inst)?;
    accounts::post_to_balance(conn, inst.account_id, posted_amount(&inst))?;
    if inst.transfer && inst.peer_account_id.is_some() {
        insert_peer(conn, &mut inst)?;
    }
    for split in splits {
        let child = CashFlow {
            id: 0,
            account_id: inst.account_id,
            date: inst.date,
            tax_year: inst.tax_year,
            parent_id: Some(inst.id),
            import_id: None,
            ..split.clone()
        };
        insert(conn, &child)?;
    }
    Ok(inst)
}

/// Posts every occurrence of a template dated on or before `today`, then
/// moves the template to its next date. Returns the number posted.
pub fn apply_scheduled(conn: &Connection, user_id: i64, template_id: i64, today: NaiveDate) -> Result<usize> {
    let (mut tpl, _) = load_owned(conn, user_id, template_id)?;
    if !tpl.is_scheduled() {
        return Err(Error::invalid("Cash flow is not scheduled"));
    }
    let mut repeat = repeat_interval(conn, tpl.id)?
        .ok_or_else(|| Error::NotFound(format!("repeat interval of {}", tpl.id)))?;
    if repeat.days == 0 {
        return Ok(0);
    }
    let splits = children(conn, tpl.id)?;

    let mut posted = 0;
    while repeat.is_active() && tpl.date <= today {
        if let Some(amount) = rate_amount(conn, &tpl, &repeat)? {
            tpl.amount = amount;
        }
        let inst = materialize(conn, &tpl, &splits)?;
        debug!("Posted {} from template {} on {}", inst.id, tpl.id, inst.date);
        posted += 1;
        repeat.repeats_left = repeat.repeats_left.map(|n| n - 1);

        let next = advance_date(tpl.date, repeat.days, repeat.start_day);
        if next <= tpl.date {
            break;
        }
        tpl.date = next;
        tpl.tax_year = next.year();
    }
    if posted == 0 {
        return Ok(0);
    }

    save(conn, &tpl)?;
    conn.execute(
        "UPDATE repeat_intervals SET repeats_left=?1 WHERE id=?2",
        params![repeat.repeats_left, repeat.id],
    )?;
    conn.execute(
        "UPDATE cash_flows SET date=?1, tax_year=?2 WHERE parent_id=?3 AND kind='split'",
        params![tpl.date, tpl.tax_year, tpl.id],
    )?;
    info!(
        "Template {} posted {} occurrence(s), next {}{}",
        tpl.id,
        posted,
        tpl.date,
        if repeat.is_active() { "" } else { " (finished)" }
    );
    Ok(posted)
}

/// Runs every schedule on the account.
pub fn expand_account(conn: &Connection, user_id: i64, account_id: i64, today: NaiveDate) -> Result<usize> {
    let account = accounts::get(conn, user_id, account_id)?;
    let ids: Vec<i64> = {
        let mut stmt = conn.prepare(
            "SELECT id FROM cash_flows WHERE account_id=?1 AND kind='repeat' AND date<=?2 ORDER BY date, id",
        )?;
        let rows = stmt.query_map(params![account.id, today], |r| r.get::<_, i64>(0))?;
        let ids = rows.collect::<rusqlite::Result<Vec<i64>>>()?;
        ids
    };
    let mut posted = 0;
    for id in ids {
        posted += apply_scheduled(conn, user_id, id, today)?;
    }
    Ok(posted)
}
