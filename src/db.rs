// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::config::Config;
use crate::errors::{Error, Result};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};
use rust_decimal::Decimal;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

static MIGRATIONS: &[(i64, &str, &str)] = &[
    (1, "schema", include_str!("../migrations/0001_schema.sql")),
    (
        2,
        "reference_data",
        include_str!("../migrations/0002_reference_data.sql"),
    ),
    (
        3,
        "share_transfers",
        include_str!("../migrations/0003_share_transfers.sql"),
    ),
];

/// Opens the configured database and brings its schema up to date.
pub fn open(cfg: &Config) -> Result<Connection> {
    match cfg.db.db.as_str() {
        "sqlite" | "sqlite3" => {}
        "mysql" => {
            return Err(Error::Config(
                "mysql driver is not available in this build; set GOBOOK_DB=sqlite".into(),
            ));
        }
        other => return Err(Error::Config(format!("Unknown database driver '{}'", other))),
    }
    let path = cfg.database_path();
    open_path(&path)
}

pub fn open_path(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    migrate(&mut conn)?;
    info!("Database ready at {}", path.display());
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    migrate(&mut conn)?;
    Ok(conn)
}

/// Applies every migration newer than the recorded version, in order.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         CREATE TABLE IF NOT EXISTS schema_migrations(
             version INTEGER PRIMARY KEY,
             name TEXT NOT NULL,
             applied_at TEXT NOT NULL DEFAULT (datetime('now'))
         );",
    )?;
    let current: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |r| r.get(0),
    )?;
    for (version, name, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_migrations(version, name) VALUES (?1, ?2)",
            params![version, name],
        )?;
        tx.commit()?;
        info!("Applied migration {} ({})", version, name);
    }
    Ok(())
}

/// Runs `f` inside one immediate transaction. Commits on `Ok`, rolls back on
/// `Err`; a busy/locked failure is retried once.
pub fn atomically<T, F>(conn: &mut Connection, mut f: F) -> Result<T>
where
    F: FnMut(&Transaction<'_>) -> Result<T>,
{
    match run_once(conn, &mut f) {
        Err(e) if e.is_transient() => {
            warn!("Retrying transaction after transient failure: {}", e);
            run_once(conn, &mut f)
        }
        other => other,
    }
}

fn run_once<T, F>(conn: &mut Connection, f: &mut F) -> Result<T>
where
    F: FnMut(&Transaction<'_>) -> Result<T>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let out = f(&tx)?;
    tx.commit()?;
    Ok(out)
}

pub fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str_exact(raw.trim())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub fn bool_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<bool> {
    Ok(row.get::<_, i64>(idx)? != 0)
}

/// Maps an empty lookup to `NotFound` naming the entity.
pub fn must_exist<T>(res: rusqlite::Result<T>, what: impl FnOnce() -> String) -> Result<T> {
    res.optional()?.ok_or_else(|| Error::NotFound(what()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let mut conn = open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, MIGRATIONS.len() as i64);
        let days: i64 = conn
            .query_row(
                "SELECT days FROM repeat_interval_types WHERE name='Monthly'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(days, 30);
    }

    #[test]
    fn failed_block_rolls_back() {
        let mut conn = open_in_memory().unwrap();
        let res: Result<()> = atomically(&mut conn, |tx| {
            tx.execute("INSERT INTO users(login) VALUES ('ghost')", [])?;
            Err(Error::invalid("abort"))
        });
        assert!(res.is_err());
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn mysql_driver_is_rejected() {
        let mut cfg = Config::default();
        cfg.db.db = "mysql".into();
        assert!(matches!(open(&cfg), Err(Error::Config(_))));
    }
}
