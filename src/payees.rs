// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::categories;
use crate::errors::{Error, Result};
use crate::models::{CATEGORY_UNCATEGORIZED, Payee, UNKNOWN_PAYEE};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

/// How a payee name resolved while importing.
#[derive(Debug, Clone)]
pub enum ImportPayee {
    Use(Payee),
    Skip,
}

fn collect(stmt: &mut rusqlite::Statement<'_>, p: impl rusqlite::Params) -> Result<Vec<Payee>> {
    let rows = stmt.query_map(p, Payee::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// All of a user's payees, or only those used by non-transfer cash flows on
/// `account_id`.
pub fn list(conn: &Connection, user_id: i64, account_id: Option<i64>) -> Result<Vec<Payee>> {
    match account_id {
        Some(account_id) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM payees WHERE user_id=?1 AND id IN (
                     SELECT payee_id FROM cash_flows
                     WHERE account_id=?2 AND transfer=0 AND kind<>'repeat' AND has_splits=0
                 ) ORDER BY name",
                Payee::COLUMNS
            ))?;
            collect(&mut stmt, params![user_id, account_id])
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM payees WHERE user_id=?1 ORDER BY name",
                Payee::COLUMNS
            ))?;
            collect(&mut stmt, params![user_id])
        }
    }
}

pub fn get(conn: &Connection, user_id: i64, payee_id: i64) -> Result<Payee> {
    let payee = conn
        .query_row(
            &format!("SELECT {} FROM payees WHERE id=?1", Payee::COLUMNS),
            params![payee_id],
            Payee::from_row,
        )
        .optional()?
        .ok_or(Error::PermissionDenied)?;
    if payee.user_id != user_id {
        return Err(Error::PermissionDenied);
    }
    Ok(payee)
}

pub fn find_by_name(conn: &Connection, user_id: i64, name: &str) -> Result<Option<Payee>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM payees WHERE user_id=?1 AND name=?2 COLLATE NOCASE",
                Payee::COLUMNS
            ),
            params![user_id, name.trim()],
            Payee::from_row,
        )
        .optional()?)
}

pub fn create(
    conn: &Connection,
    user_id: i64,
    name: &str,
    category_id: Option<i64>,
    skip_on_import: bool,
) -> Result<Payee> {
    let name = sanitize(name);
    if name.is_empty() {
        return Err(Error::invalid("Payee name is required"));
    }
    conn.execute(
        "INSERT INTO payees(user_id, name, category_id, skip_on_import) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, name, category_id, skip_on_import],
    )?;
    let id = conn.last_insert_rowid();
    info!("Created payee {} '{}'", id, name);
    get(conn, user_id, id)
}

/// Case-insensitive lookup, creating the payee on a miss.
pub fn get_or_create(conn: &Connection, user_id: i64, name: &str) -> Result<Payee> {
    if let Some(p) = find_by_name(conn, user_id, &sanitize(name))? {
        return Ok(p);
    }
    create(conn, user_id, name, None, false)
}

/// Import-time resolution: skip-on-import payees skip the record, names that
/// normalise onto several existing payees resolve to "Unknown".
pub fn resolve_for_import(conn: &Connection, user_id: i64, name: &str) -> Result<ImportPayee> {
    let clean = sanitize(name);
    if clean.is_empty() {
        return Ok(ImportPayee::Use(get_or_create(conn, user_id, UNKNOWN_PAYEE)?));
    }
    let payee = match find_by_name(conn, user_id, &clean)? {
        Some(p) => p,
        None => {
            let key = normalize(&clean);
            let mut candidates: Vec<Payee> = list(conn, user_id, None)?
                .into_iter()
                .filter(|p| normalize(&p.name) == key)
                .collect();
            match candidates.len() {
                0 => create(conn, user_id, &clean, None, false)?,
                1 => candidates.swap_remove(0),
                n => {
                    debug!("Payee '{}' matches {} payees, using Unknown", clean, n);
                    get_or_create(conn, user_id, UNKNOWN_PAYEE)?
                }
            }
        }
    };
    if payee.skip_on_import {
        debug!("Payee {} '{}' is skipped on import", payee.id, payee.name);
        return Ok(ImportPayee::Skip);
    }
    Ok(ImportPayee::Use(payee))
}

pub fn update(
    conn: &Connection,
    user_id: i64,
    payee_id: i64,
    name: Option<&str>,
    category_id: Option<Option<i64>>,
    skip_on_import: Option<bool>,
) -> Result<Payee> {
    let mut payee = get(conn, user_id, payee_id)?;
    if let Some(n) = name.map(sanitize).filter(|n| !n.is_empty()) {
        payee.name = n;
    }
    if let Some(c) = category_id {
        if let Some(id) = c {
            categories::get(conn, user_id, id)?;
        }
        payee.category_id = c;
    }
    if let Some(s) = skip_on_import {
        payee.skip_on_import = s;
    }
    conn.execute(
        "UPDATE payees SET name=?1, category_id=?2, skip_on_import=?3 WHERE id=?4",
        params![payee.name, payee.category_id, payee.skip_on_import, payee.id],
    )?;
    info!("Updated payee {}", payee.id);
    Ok(payee)
}

pub fn use_count(conn: &Connection, payee_id: i64) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM cash_flows WHERE payee_id=?1",
        params![payee_id],
        |r| r.get(0),
    )?)
}

/// Deletes the payee when no cash flow references it. Returns whether it
/// was removed.
pub fn delete(conn: &Connection, user_id: i64, payee_id: i64) -> Result<bool> {
    let payee = get(conn, user_id, payee_id)?;
    let count = use_count(conn, payee.id)?;
    info!("Delete payee {} if unused (count {})", payee.id, count);
    if count > 0 {
        return Ok(false);
    }
    conn.execute("DELETE FROM payees WHERE id=?1", params![payee.id])?;
    Ok(true)
}

/// Moves `from`'s plain cash flows onto `into`, then drops `from` if it is
/// no longer referenced.
pub fn merge(conn: &Connection, user_id: i64, into_id: i64, from_id: i64) -> Result<usize> {
    if into_id == from_id {
        return Err(Error::constraint("Cannot merge a payee with itself"));
    }
    let into = get(conn, user_id, into_id)?;
    let from = get(conn, user_id, from_id)?;
    let moved = conn.execute(
        "UPDATE cash_flows SET payee_id=?1
         WHERE payee_id=?2 AND kind IN ('posted','trade')",
        params![into.id, from.id],
    )?;
    info!("Merged payee {} into {} ({} cash flows)", from.id, into.id, moved);
    delete(conn, user_id, from.id)?;
    Ok(moved)
}

/// Merges every payee whose name starts with `into`'s name.
pub fn merge_duplicates(conn: &Connection, user_id: i64, into_id: i64) -> Result<usize> {
    let into = get(conn, user_id, into_id)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM payees WHERE user_id=?1 AND id<>?2 AND name LIKE ?3 ESCAPE '\\' ORDER BY name",
        Payee::COLUMNS
    ))?;
    let pattern = format!("{}%", into.name.replace('%', "\\%").replace('_', "\\_"));
    let dups = collect(&mut stmt, params![user_id, into.id, pattern])?;
    let mut moved = 0;
    for dup in dups {
        moved += merge(conn, user_id, into.id, dup.id)?;
    }
    Ok(moved)
}

/// Recategorises the payee's cash flows: all of them, or only uncategorised
/// ones. Repeat templates and split parents are left alone.
pub fn set_category(
    conn: &Connection,
    user_id: i64,
    payee_id: i64,
    category_id: i64,
    to_all: bool,
) -> Result<usize> {
    let payee = get(conn, user_id, payee_id)?;
    categories::get(conn, user_id, category_id)?;
    let changed = conn.execute(
        "UPDATE cash_flows SET category_id=?1
         WHERE payee_id=?2 AND transfer=0 AND kind<>'repeat' AND has_splits=0
           AND (?3 OR category_id IS NULL OR category_id=?4)",
        params![category_id, payee.id, to_all, CATEGORY_UNCATEGORIZED],
    )?;
    info!("Set category {} on {} cash flows of payee {}", category_id, changed, payee.id);
    Ok(changed)
}

fn sanitize(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn setup() -> Connection {
        let conn = open_in_memory().unwrap();
        conn.execute("INSERT INTO users(login) VALUES ('alice')", [])
            .unwrap();
        conn
    }

    #[test]
    fn get_or_create_is_case_insensitive() {
        let conn = setup();
        let a = get_or_create(&conn, 1, "Corner  Store").unwrap();
        let b = get_or_create(&conn, 1, "corner store").unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.name, "Corner Store");
    }

    #[test]
    fn import_resolution_handles_skip_and_ambiguity() {
        let conn = setup();
        create(&conn, 1, "Transfer In", None, true).unwrap();
        assert!(matches!(
            resolve_for_import(&conn, 1, "TRANSFER IN").unwrap(),
            ImportPayee::Skip
        ));

        create(&conn, 1, "ACME, Inc.", None, false).unwrap();
        create(&conn, 1, "Acme Inc", None, false).unwrap();
        match resolve_for_import(&conn, 1, "ACME INC.").unwrap() {
            ImportPayee::Use(p) => assert_eq!(p.name, UNKNOWN_PAYEE),
            ImportPayee::Skip => panic!("unexpected skip"),
        }
    }

    #[test]
    fn merge_with_self_is_rejected() {
        let conn = setup();
        let p = create(&conn, 1, "Cafe", None, false).unwrap();
        assert!(matches!(
            merge(&conn, 1, p.id, p.id),
            Err(Error::ConstraintViolation(_))
        ));
    }

    #[test]
    fn merge_duplicates_folds_prefix_matches() {
        let conn = setup();
        let into = create(&conn, 1, "Shell", None, false).unwrap();
        create(&conn, 1, "Shell Oil 1234", None, false).unwrap();
        create(&conn, 1, "Shell #88", None, false).unwrap();
        create(&conn, 1, "Chevron", None, false).unwrap();
        merge_duplicates(&conn, 1, into.id).unwrap();
        let names: Vec<String> = list(&conn, 1, None)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Chevron".to_string(), "Shell".to_string()]);
    }
}
