// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::accounts;
use crate::errors::{Error, Result};
use crate::ledger;
use crate::models::{AccountType, BasisType, CashFlow, Company, Security, SecurityType};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

#[derive(Debug, Clone)]
pub struct NewSecurity {
    pub symbol: String,
    pub name: String,
    pub security_type: SecurityType,
    pub basis_type: BasisType,
}

const FROM: &str = "FROM securities s JOIN companies c ON c.id = s.company_id";

fn company_by(conn: &Connection, symbol: &str, name: &str) -> Result<Option<Company>> {
    let found = if symbol.is_empty() {
        conn.query_row(
            "SELECT id, name, symbol FROM companies WHERE symbol='' AND name=?1 COLLATE NOCASE",
            params![name],
            |r| Ok(Company { id: r.get(0)?, name: r.get(1)?, symbol: r.get(2)? }),
        )
    } else {
        conn.query_row(
            "SELECT id, name, symbol FROM companies WHERE symbol=?1 COLLATE NOCASE",
            params![symbol],
            |r| Ok(Company { id: r.get(0)?, name: r.get(1)?, symbol: r.get(2)? }),
        )
    };
    Ok(found.optional()?)
}

/// Companies are shared across users and keyed by symbol, or by name when
/// the symbol is unknown.
pub fn company_get_or_create(conn: &Connection, symbol: &str, name: &str) -> Result<Company> {
    let symbol = symbol.trim().to_uppercase();
    let name = name.trim();
    if symbol.is_empty() && name.is_empty() {
        return Err(Error::invalid("Security needs a symbol or a name"));
    }
    if let Some(c) = company_by(conn, &symbol, name)? {
        return Ok(c);
    }
    let name = if name.is_empty() { symbol.as_str() } else { name };
    conn.execute(
        "INSERT INTO companies(name, symbol) VALUES (?1, ?2)",
        params![name, symbol],
    )?;
    Ok(Company {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        symbol,
    })
}

pub fn update_company(conn: &Connection, user_id: i64, security_id: i64, name: Option<&str>, symbol: Option<&str>) -> Result<Security> {
    let sec = get(conn, user_id, security_id)?;
    let name = name.map(str::trim).filter(|n| !n.is_empty()).unwrap_or(sec.name.as_str());
    let symbol = symbol.map(|s| s.trim().to_uppercase()).unwrap_or_else(|| sec.symbol.clone());
    conn.execute(
        "UPDATE companies SET name=?1, symbol=?2 WHERE id=?3",
        params![name, symbol, sec.company_id],
    )?;
    get(conn, user_id, sec.id)
}

pub fn create(conn: &Connection, user_id: i64, account_id: i64, new: &NewSecurity) -> Result<Security> {
    let account = accounts::get(conn, user_id, account_id)?;
    if account.account_type != AccountType::Investment {
        return Err(Error::invalid(format!("{} is not an investment account", account.name)));
    }
    let company = company_get_or_create(conn, &new.symbol, &new.name)?;
    if let Some(existing) = find_by_company(conn, account.id, company.id)? {
        return Ok(existing);
    }
    conn.execute(
        "INSERT INTO securities(account_id, company_id, security_type_id, basis_type_id)
         VALUES (?1, ?2, ?3, ?4)",
        params![account.id, company.id, new.security_type.id(), new.basis_type.id()],
    )?;
    let id = conn.last_insert_rowid();
    info!("Created security {} ({}) on account {}", id, company.symbol, account.id);
    get(conn, user_id, id)
}

fn find_by_company(conn: &Connection, account_id: i64, company_id: i64) -> Result<Option<Security>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} {} WHERE s.account_id=?1 AND s.company_id=?2",
                Security::COLUMNS,
                FROM
            ),
            params![account_id, company_id],
            Security::from_row,
        )
        .optional()?)
}

/// Loads a security on an account owned by `user_id`.
pub fn get(conn: &Connection, user_id: i64, security_id: i64) -> Result<Security> {
    let sec = conn
        .query_row(
            &format!("SELECT {} {} WHERE s.id=?1", Security::COLUMNS, FROM),
            params![security_id],
            Security::from_row,
        )
        .optional()?
        .ok_or(Error::PermissionDenied)?;
    accounts::get(conn, user_id, sec.account_id)?;
    Ok(sec)
}

/// Matches an imported security name against symbol or company name.
pub fn find_by_import_name(conn: &Connection, account_id: i64, name: &str) -> Result<Option<Security>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} {} WHERE s.account_id=?1
                   AND (c.symbol=?2 COLLATE NOCASE OR c.name=?2 COLLATE NOCASE)
                 ORDER BY s.id LIMIT 1",
                Security::COLUMNS,
                FROM
            ),
            params![account_id, name.trim()],
            Security::from_row,
        )
        .optional()?)
}

pub fn list(conn: &Connection, user_id: i64, account_id: i64, include_closed: bool) -> Result<Vec<Security>> {
    let account = accounts::get(conn, user_id, account_id)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} {} WHERE s.account_id=?1 ORDER BY c.symbol, c.name",
        Security::COLUMNS,
        FROM
    ))?;
    let rows = stmt.query_map(params![account.id], Security::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        let sec = row?;
        if include_closed || !sec.shares.is_zero() {
            out.push(sec);
        }
    }
    Ok(out)
}

/// Every security of the user, for quote sweeps.
pub fn list_for_user(conn: &Connection, user_id: i64) -> Result<Vec<Security>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} {} JOIN accounts a ON a.id = s.account_id WHERE a.user_id=?1 ORDER BY s.id",
        Security::COLUMNS,
        FROM
    ))?;
    let rows = stmt.query_map(params![user_id], Security::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn update(
    conn: &Connection,
    user_id: i64,
    security_id: i64,
    security_type: Option<SecurityType>,
    basis_type: Option<BasisType>,
) -> Result<Security> {
    let mut sec = get(conn, user_id, security_id)?;
    if let Some(t) = security_type {
        sec.security_type = t;
    }
    if let Some(b) = basis_type {
        sec.basis_type = b;
    }
    conn.execute(
        "UPDATE securities SET security_type_id=?1, basis_type_id=?2 WHERE id=?3",
        params![sec.security_type.id(), sec.basis_type.id(), sec.id],
    )?;
    Ok(sec)
}

pub(crate) fn save_position(conn: &Connection, sec: &Security) -> Result<()> {
    conn.execute(
        "UPDATE securities SET shares=?1, basis=?2, value=?3, last_quote_update=?4 WHERE id=?5",
        params![
            sec.shares.to_string(),
            sec.basis.to_string(),
            sec.value.to_string(),
            sec.last_quote_update,
            sec.id
        ],
    )?;
    Ok(())
}

/// Deletes a security with its trades and gains. The cash side of each
/// trade is reversed out of the account balance.
pub fn delete(conn: &Connection, user_id: i64, security_id: i64) -> Result<()> {
    let sec = get(conn, user_id, security_id)?;
    let cash: Vec<CashFlow> = {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM cash_flows WHERE kind='trade'
               AND trade_id IN (SELECT id FROM trades WHERE security_id=?1)",
            CashFlow::COLUMNS
        ))?;
        let rows = stmt.query_map(params![sec.id], CashFlow::from_row)?;
        rows.collect::<rusqlite::Result<_>>()?
    };
    for cf in &cash {
        ledger::remove(conn, cf)?;
    }
    conn.execute(
        "DELETE FROM trade_gains WHERE sell_id IN (SELECT id FROM trades WHERE security_id=?1)",
        params![sec.id],
    )?;
    conn.execute(
        "DELETE FROM share_transfers WHERE out_id IN (SELECT id FROM trades WHERE security_id=?1)",
        params![sec.id],
    )?;
    let trades = conn.execute("DELETE FROM trades WHERE security_id=?1", params![sec.id])?;
    conn.execute("DELETE FROM securities WHERE id=?1", params![sec.id])?;
    info!("Deleted security {} with {} trades", sec.id, trades);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::NewAccount;
    use crate::db::open_in_memory;
    use crate::models::AccountType;

    #[test]
    fn securities_share_companies_and_dedupe_per_account() {
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
        let new = NewSecurity {
            symbol: "googl".into(),
            name: "Alphabet".into(),
            security_type: SecurityType::Stock,
            basis_type: BasisType::Fifo,
        };
        let a = create(&conn, user.id, acct.id, &new).unwrap();
        let b = create(&conn, user.id, acct.id, &new).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.symbol, "GOOGL");
        let found = find_by_import_name(&conn, acct.id, "alphabet").unwrap().unwrap();
        assert_eq!(found.id, a.id);
        assert!(list(&conn, user.id, acct.id, false).unwrap().is_empty());
        assert_eq!(list(&conn, user.id, acct.id, true).unwrap().len(), 1);

        let bob = accounts::find_or_create_user(&conn, "bob").unwrap();
        assert!(matches!(get(&conn, bob.id, a.id), Err(Error::PermissionDenied)));
    }

    #[test]
    fn only_investment_accounts_hold_securities() {
        let conn = open_in_memory().unwrap();
        let user = accounts::find_or_create_user(&conn, "alice").unwrap();
        let checking = accounts::create(
            &conn,
            user.id,
            &NewAccount {
                name: "Checking".into(),
                account_type: AccountType::Deposit,
                currency: "USD".into(),
                taxable: true,
            },
        )
        .unwrap();
        let new = NewSecurity {
            symbol: "VTI".into(),
            name: String::new(),
            security_type: SecurityType::MutualFund,
            basis_type: BasisType::Average,
        };
        assert!(matches!(create(&conn, user.id, checking.id, &new), Err(Error::InvalidInput(_))));
    }
}
