// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::db::{decimal_at, must_exist};
use crate::errors::{Error, Result};
use crate::models::{TAX_REGION_FEDERAL, TaxEntry, TaxType, TradeType};
use crate::utils::year_start;
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct NewTaxEntry {
    pub year: i32,
    pub tax_item_id: i64,
    pub tax_region_id: i64,
    pub amount: Decimal,
    pub memo: String,
}

impl NewTaxEntry {
    pub fn federal(year: i32, tax_item_id: i64, amount: Decimal) -> Self {
        Self {
            year,
            tax_item_id,
            tax_region_id: TAX_REGION_FEDERAL,
            amount,
            memo: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaxItem {
    pub id: i64,
    pub tax_type: TaxType,
    pub name: String,
}

pub fn item(conn: &Connection, tax_item_id: i64) -> Result<TaxItem> {
    let (tax_type, name): (i64, String) = must_exist(
        conn.query_row(
            "SELECT tax_type_id, name FROM tax_items WHERE id=?1",
            params![tax_item_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        ),
        || format!("tax item {}", tax_item_id),
    )?;
    Ok(TaxItem {
        id: tax_item_id,
        tax_type: TaxType::from_id(tax_type)?,
        name,
    })
}

pub fn item_by_name(conn: &Connection, name: &str) -> Result<Option<TaxItem>> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM tax_items WHERE name=?1 COLLATE NOCASE",
            params![name.trim()],
            |r| r.get(0),
        )
        .optional()?;
    found.map(|id| item(conn, id)).transpose()
}

pub fn get(conn: &Connection, user_id: i64, id: i64) -> Result<TaxEntry> {
    let entry = must_exist(
        conn.query_row(
            &format!("SELECT {} FROM tax_entries WHERE id=?1", TaxEntry::COLUMNS),
            params![id],
            TaxEntry::from_row,
        ),
        || format!("tax entry {}", id),
    )?;
    if entry.user_id != user_id {
        return Err(Error::PermissionDenied);
    }
    Ok(entry)
}

fn validate(new: &NewTaxEntry) -> Result<()> {
    if new.tax_region_id != TAX_REGION_FEDERAL {
        return Err(Error::invalid(format!("Unknown tax region {}", new.tax_region_id)));
    }
    year_start(new.year)?;
    Ok(())
}

pub fn create(conn: &Connection, user_id: i64, new: &NewTaxEntry) -> Result<TaxEntry> {
    validate(new)?;
    let item = item(conn, new.tax_item_id)?;
    conn.execute(
        "INSERT INTO tax_entries(user_id, year, tax_item_id, tax_region_id, tax_type_id, amount, memo)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user_id,
            year_start(new.year)?,
            item.id,
            new.tax_region_id,
            item.tax_type.id(),
            new.amount.to_string(),
            new.memo.trim(),
        ],
    )?;
    let id = conn.last_insert_rowid();
    info!("Created tax entry {} ({} {}) for user {}", id, item.name, new.amount, user_id);
    get(conn, user_id, id)
}

pub fn update(conn: &Connection, user_id: i64, id: i64, new: &NewTaxEntry) -> Result<TaxEntry> {
    get(conn, user_id, id)?;
    validate(new)?;
    let item = item(conn, new.tax_item_id)?;
    conn.execute(
        "UPDATE tax_entries SET year=?1, tax_item_id=?2, tax_region_id=?3, tax_type_id=?4,
             amount=?5, memo=?6
         WHERE id=?7",
        params![
            year_start(new.year)?,
            item.id,
            new.tax_region_id,
            item.tax_type.id(),
            new.amount.to_string(),
            new.memo.trim(),
            id,
        ],
    )?;
    info!("Updated tax entry {} for user {}", id, user_id);
    get(conn, user_id, id)
}

pub fn delete(conn: &Connection, user_id: i64, id: i64) -> Result<()> {
    get(conn, user_id, id)?;
    conn.execute("DELETE FROM tax_entries WHERE id=?1", params![id])?;
    info!("Deleted tax entry {} for user {}", id, user_id);
    Ok(())
}

/// Manually entered entries of `year`, plus synthesised ones when `auto`.
pub fn list(conn: &Connection, user_id: i64, year: i32, auto: bool) -> Result<Vec<TaxEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM tax_entries
         WHERE user_id=?1 AND year >= ?2 AND year < ?3
         ORDER BY tax_type_id, tax_item_id, id",
        TaxEntry::COLUMNS
    ))?;
    let rows = stmt.query_map(
        params![user_id, year_start(year)?, year_start(year + 1)?],
        TaxEntry::from_row,
    )?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    if auto {
        out.extend(automatic(conn, user_id, year)?);
    }
    Ok(out)
}

/// Posted and split-child cash flows of one category counted toward a
/// tax year. Transfers, templates, template children and split parents are
/// left out.
fn category_total(conn: &Connection, user_id: i64, year: i32, category_id: i64) -> Result<Decimal> {
    let mut stmt = conn.prepare_cached(
        "SELECT cf.amount FROM cash_flows cf
         JOIN accounts a ON a.id = cf.account_id
         WHERE a.user_id=?1 AND cf.category_id=?2 AND cf.tax_year=?3
           AND cf.kind IN ('posted','split') AND cf.transfer=0 AND cf.has_splits=0
           AND NOT (cf.kind='split' AND EXISTS (
               SELECT 1 FROM cash_flows p WHERE p.id = cf.parent_id AND p.kind = 'repeat'))",
    )?;
    let rows = stmt.query_map(params![user_id, category_id, year], |r| decimal_at(r, 0))?;
    let mut total = Decimal::ZERO;
    for row in rows {
        total += row?;
    }
    Ok(total)
}

/// Realised gain of sells, or the amount of other trades, in a tax year.
fn trade_total(conn: &Connection, user_id: i64, year: i32, trade_type: TradeType) -> Result<Decimal> {
    let mut stmt = conn.prepare_cached(
        "SELECT t.amount, t.basis FROM trades t
         JOIN accounts a ON a.id = t.account_id
         WHERE a.user_id=?1 AND t.trade_type_id=?2 AND t.tax_year=?3",
    )?;
    let rows = stmt.query_map(params![user_id, trade_type.id(), year], |r| {
        Ok((decimal_at(r, 0)?, decimal_at(r, 1)?))
    })?;
    let mut total = Decimal::ZERO;
    for row in rows {
        let (amount, basis) = row?;
        total += match trade_type {
            TradeType::Sell => amount - basis,
            _ => amount,
        };
    }
    Ok(total)
}

/// Entries synthesised from the tax item mappings. They are not stored;
/// ids are zero.
pub fn automatic(conn: &Connection, user_id: i64, year: i32) -> Result<Vec<TaxEntry>> {
    let year_date = year_start(year)?;
    let mut stmt = conn.prepare(
        "SELECT tc.tax_item_id, ti.tax_type_id, tc.category_id, tc.trade_type_id, c.name
         FROM tax_categories tc
         JOIN tax_items ti ON ti.id = tc.tax_item_id
         LEFT JOIN categories c ON c.id = tc.category_id
         ORDER BY tc.id",
    )?;
    let mappings = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, Option<i64>>(2)?,
                r.get::<_, Option<i64>>(3)?,
                r.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut out = Vec::new();
    for (item_id, type_id, category_id, trade_type_id, category_name) in mappings {
        let tax_type = TaxType::from_id(type_id)?;
        let (total, memo) = match (category_id, trade_type_id) {
            (Some(category), _) => (
                category_total(conn, user_id, year, category)?,
                category_name.unwrap_or_default(),
            ),
            (None, Some(tt)) => {
                let tt = TradeType::from_id(tt)?;
                (trade_total(conn, user_id, year, tt)?, tt.label().to_string())
            }
            (None, None) => continue,
        };
        if total.is_zero() {
            continue;
        }
        out.push(TaxEntry {
            id: 0,
            user_id,
            year: year_date,
            tax_item_id: item_id,
            tax_region_id: TAX_REGION_FEDERAL,
            tax_type,
            amount: if tax_type.flips_automatic() { -total } else { total },
            memo,
            automatic: true,
        });
    }
    debug!("Synthesised {} tax entries for user {} in {}", out.len(), user_id, year);
    Ok(out)
}

pub fn sum_type(entries: &[TaxEntry], region: i64, tax_type: TaxType) -> Decimal {
    entries
        .iter()
        .filter(|e| e.tax_region_id == region && e.tax_type == tax_type)
        .map(|e| e.amount)
        .sum()
}

pub fn sum_item(entries: &[TaxEntry], region: i64, tax_item_id: i64) -> Decimal {
    entries
        .iter()
        .filter(|e| e.tax_region_id == region && e.tax_item_id == tax_item_id)
        .map(|e| e.amount)
        .sum()
}
