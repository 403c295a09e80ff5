// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::db::{decimal_at, must_exist};
use crate::errors::{Error, Result};
use crate::models::{Account, AccountType, User};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use tracing::info;

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub account_type: AccountType,
    pub currency: String,
    pub taxable: bool,
}

pub fn find_or_create_user(conn: &Connection, login: &str) -> Result<User> {
    let login = login.trim();
    if login.is_empty() {
        return Err(Error::PermissionDenied);
    }
    conn.execute(
        "INSERT OR IGNORE INTO users(login) VALUES (?1)",
        params![login],
    )?;
    let user = conn.query_row(
        &format!("SELECT {} FROM users WHERE login=?1", User::COLUMNS),
        params![login],
        User::from_row,
    )?;
    Ok(user)
}

pub fn set_cashflow_limit(conn: &Connection, user_id: i64, limit: usize) -> Result<()> {
    conn.execute(
        "UPDATE users SET cashflow_limit=?1 WHERE id=?2",
        params![limit as i64, user_id],
    )?;
    Ok(())
}

pub fn create(conn: &Connection, user_id: i64, new: &NewAccount) -> Result<Account> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(Error::invalid("Account name is required"));
    }
    conn.execute(
        "INSERT INTO accounts(user_id, account_type_id, currency, name, taxable)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user_id,
            new.account_type.id(),
            new.currency.trim().to_uppercase(),
            name,
            new.taxable
        ],
    )?;
    let id = conn.last_insert_rowid();
    info!("Created account {} '{}'", id, name);
    get(conn, user_id, id)
}

/// Loads an account owned by `user_id`; anything else is permission denied.
pub fn get(conn: &Connection, user_id: i64, account_id: i64) -> Result<Account> {
    if account_id == 0 {
        return Err(Error::PermissionDenied);
    }
    let account = conn
        .query_row(
            &format!("SELECT {} FROM accounts WHERE id=?1", Account::COLUMNS),
            params![account_id],
            Account::from_row,
        )
        .optional()?
        .ok_or(Error::PermissionDenied)?;
    if account.user_id != user_id {
        return Err(Error::PermissionDenied);
    }
    Ok(account)
}

pub fn find_by_name(conn: &Connection, user_id: i64, name: &str) -> Result<Option<Account>> {
    let account = conn
        .query_row(
            &format!(
                "SELECT {} FROM accounts WHERE user_id=?1 AND name=?2 COLLATE NOCASE",
                Account::COLUMNS
            ),
            params![user_id, name.trim()],
            Account::from_row,
        )
        .optional()?;
    Ok(account)
}

pub fn list(conn: &Connection, user_id: i64, include_hidden: bool) -> Result<Vec<Account>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM accounts WHERE user_id=?1 AND (?2 OR hidden=0) ORDER BY account_type_id, name",
        Account::COLUMNS
    ))?;
    let rows = stmt.query_map(params![user_id, include_hidden], Account::from_row)?;
    let mut accounts = Vec::new();
    for row in rows {
        accounts.push(row?);
    }
    Ok(accounts)
}

pub fn update(
    conn: &Connection,
    user_id: i64,
    account_id: i64,
    name: Option<&str>,
    account_type: Option<AccountType>,
    taxable: Option<bool>,
) -> Result<Account> {
    let mut account = get(conn, user_id, account_id)?;
    if let Some(n) = name.map(str::trim).filter(|n| !n.is_empty()) {
        account.name = n.to_string();
    }
    if let Some(t) = account_type {
        account.account_type = t;
    }
    if let Some(t) = taxable {
        account.taxable = t;
    }
    conn.execute(
        "UPDATE accounts SET name=?1, account_type_id=?2, taxable=?3 WHERE id=?4",
        params![account.name, account.account_type.id(), account.taxable, account.id],
    )?;
    info!("Updated account {}", account.id);
    Ok(account)
}

/// Adds `delta` to the stored cash balance.
pub fn post_to_balance(conn: &Connection, account_id: i64, delta: Decimal) -> Result<()> {
    if delta.is_zero() {
        return Ok(());
    }
    let balance = must_exist(
        conn.query_row(
            "SELECT cash_balance FROM accounts WHERE id=?1",
            params![account_id],
            |r| decimal_at(r, 0),
        ),
        || format!("account {}", account_id),
    )?;
    conn.execute(
        "UPDATE accounts SET cash_balance=?1 WHERE id=?2",
        params![(balance + delta).to_string(), account_id],
    )?;
    Ok(())
}

pub fn mark_scheduled(conn: &Connection, account_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE accounts SET has_scheduled=1 WHERE id=?1",
        params![account_id],
    )?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Hidden,
    Purged,
}

/// First delete hides the account, deleting a hidden account purges it.
pub fn delete(conn: &Connection, user_id: i64, account_id: i64) -> Result<Removal> {
    let account = get(conn, user_id, account_id)?;
    if !account.hidden {
        conn.execute(
            "UPDATE accounts SET hidden=1 WHERE id=?1",
            params![account.id],
        )?;
        info!("Hid account {}", account.id);
        return Ok(Removal::Hidden);
    }

    // transfer peers living in other accounts become plain cash flows
    conn.execute(
        "UPDATE cash_flows SET transfer=0, peer_id=NULL, peer_account_id=NULL
         WHERE peer_account_id=?1 AND account_id<>?1",
        params![account.id],
    )?;
    conn.execute(
        "DELETE FROM trade_gains WHERE sell_id IN (SELECT id FROM trades WHERE account_id=?1)",
        params![account.id],
    )?;
    conn.execute(
        "DELETE FROM share_transfers WHERE out_id IN (SELECT id FROM trades WHERE account_id=?1)",
        params![account.id],
    )?;
    conn.execute("DELETE FROM trades WHERE account_id=?1", params![account.id])?;
    conn.execute(
        "DELETE FROM repeat_intervals WHERE cash_flow_id IN (SELECT id FROM cash_flows WHERE account_id=?1)",
        params![account.id],
    )?;
    conn.execute("DELETE FROM cash_flows WHERE account_id=?1", params![account.id])?;
    conn.execute("DELETE FROM securities WHERE account_id=?1", params![account.id])?;
    conn.execute("DELETE FROM imports WHERE account_id=?1", params![account.id])?;
    conn.execute("DELETE FROM accounts WHERE id=?1", params![account.id])?;
    info!("Purged account {}", account.id);
    Ok(Removal::Purged)
}
