// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! File import. Each record commits on its own; the `Import` row that
//! groups them appears with the first committed record.

pub mod ofx;
pub mod qif;

use crate::accounts;
use crate::db::{self, atomically};
use crate::errors::{Error, Result};
use crate::ledger::{self, CashFlowInput, SplitInput};
use crate::models::{CashFlowType, Import, TradeType};
use crate::payees::{self, ImportPayee};
use crate::portfolio::QuoteCache;
use crate::portfolio::trades::{self, SecurityRef, TradeInput};
use crate::utils::{round_bank, today};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct SplitLine {
    pub category: Option<String>,
    pub memo: String,
    /// Signed like the parent.
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BankRecord {
    pub date: NaiveDate,
    /// Signed.
    pub amount: Decimal,
    pub payee: String,
    pub memo: String,
    pub transnum: String,
    pub category: Option<String>,
    pub transfer_account: Option<String>,
    pub splits: Vec<SplitLine>,
    /// `transnum` identifies the record across files (OFX FITID).
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub action: String,
    pub security: String,
    pub price: Decimal,
    pub shares: Decimal,
    pub amount: Decimal,
    pub commission: Decimal,
    pub memo: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Bank(BankRecord),
    Trade(TradeRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Qif,
    Ofx,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Format> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "qif" => Ok(Format::Qif),
            "ofx" | "qfx" => Ok(Format::Ofx),
            _ => Err(Error::ImportFailure(format!(
                "unsupported import file {}",
                path.display()
            ))),
        }
    }

    pub fn parse(self, text: &str) -> Result<Vec<Entry>> {
        match self {
            Format::Qif => qif::parse(text),
            Format::Ofx => ofx::parse(text),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub import_id: Option<i64>,
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportRow {
    #[serde(flatten)]
    pub import: Import,
    pub cash_flows: i64,
    pub trades: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    /// Treat priced `ShrsIn` as reinvested dividends.
    pub trade_fixups: bool,
}

/// A record ready to commit, or the reason it is skipped.
enum Staged {
    Bank(CashFlowInput, Vec<SplitInput>),
    Trade(TradeInput),
    Skip(&'static str),
}

fn duplicate(conn: &Connection, account_id: i64, transnum: &str) -> Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM cash_flows WHERE account_id=?1 AND transnum=?2 LIMIT 1",
            params![account_id, transnum],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn stage_bank(conn: &Connection, user_id: i64, account_id: i64, rec: &BankRecord) -> Result<Staged> {
    if rec.unique && !rec.transnum.is_empty() && duplicate(conn, account_id, &rec.transnum)? {
        return Ok(Staged::Skip("duplicate"));
    }
    let payee = match payees::resolve_for_import(conn, user_id, &rec.payee)? {
        ImportPayee::Use(p) => p,
        ImportPayee::Skip => return Ok(Staged::Skip("payee skipped on import")),
    };

    let mut category_name = rec.category.clone();
    let mut transfer_account_id = None;
    if let Some(name) = &rec.transfer_account {
        match accounts::find_by_name(conn, user_id, name)? {
            Some(peer) if peer.id != account_id => transfer_account_id = Some(peer.id),
            _ => category_name = Some(name.clone()),
        }
    }
    let ty = CashFlowType::from_signed(rec.amount, transfer_account_id.is_some());
    let mut input = CashFlowInput::new(account_id, rec.date, rec.amount.abs(), ty);
    input.payee_id = Some(payee.id);
    input.category_name = category_name;
    input.transfer_account_id = transfer_account_id;
    input.memo = rec.memo.clone();
    input.transnum = rec.transnum.clone();

    let splits = rec
        .splits
        .iter()
        .map(|s| SplitInput {
            amount: s.amount.abs(),
            payee_name: None,
            category_id: None,
            category_name: s.category.clone(),
            memo: s.memo.clone(),
        })
        .collect();
    Ok(Staged::Bank(input, splits))
}

fn stage_trade(account_id: i64, rec: &TradeRecord, opts: ImportOptions) -> Staged {
    let Some(mut trade_type) = TradeType::from_qif_action(&rec.action) else {
        return Staged::Skip("unsupported action");
    };
    if rec.security.trim().is_empty() {
        return Staged::Skip("no security");
    }
    if opts.trade_fixups
        && trade_type == TradeType::SharesIn
        && rec.price > Decimal::ZERO
        && rec.amount > Decimal::ZERO
    {
        trade_type = TradeType::ReinvestedDividend;
    }
    let mut shares = rec.shares.abs();
    let mut amount = rec.amount;
    match trade_type {
        // ratio scaled by ten: Q20 is two-for-one
        TradeType::Split => {
            shares = shares / Decimal::TEN;
            amount = Decimal::ZERO;
        }
        _ if amount.is_zero() && !shares.is_zero() => {
            let gross = round_bank(rec.price * shares, 2);
            amount = match trade_type {
                TradeType::Sell => gross - rec.commission,
                _ => gross + rec.commission,
            };
        }
        _ => {}
    }
    Staged::Trade(TradeInput {
        account_id,
        security: SecurityRef::Name(rec.security.trim().to_string()),
        trade_type,
        date: rec.date,
        amount: amount.abs(),
        price: rec.price.abs(),
        shares,
        tax_year: None,
        import_id: None,
    })
}

fn create_import(conn: &Connection, account_id: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO imports(account_id, created_on) VALUES (?1, ?2)",
        params![account_id, today()],
    )?;
    let id = conn.last_insert_rowid();
    info!("Created import {} on account {}", id, account_id);
    Ok(id)
}

fn commit(
    conn: &Connection,
    user_id: i64,
    staged: Staged,
    import_id: i64,
    quotes: Option<&QuoteCache>,
) -> Result<()> {
    match staged {
        Staged::Bank(mut input, splits) => {
            input.import_id = Some(import_id);
            let parent = ledger::create(conn, user_id, &input)?;
            for split in &splits {
                ledger::create_split(conn, user_id, parent.id, split)?;
            }
        }
        Staged::Trade(mut input) => {
            input.import_id = Some(import_id);
            trades::create(conn, user_id, &input, quotes)?;
        }
        Staged::Skip(_) => {}
    }
    Ok(())
}

/// Imports parsed entries into `account_id`. A failing record is logged
/// and counted; the rest still import.
pub fn import_entries(
    conn: &mut Connection,
    user_id: i64,
    account_id: i64,
    entries: &[Entry],
    opts: ImportOptions,
    quotes: Option<&QuoteCache>,
) -> Result<ImportSummary> {
    let account = accounts::get(conn, user_id, account_id)?;
    let mut summary = ImportSummary::default();

    for (idx, entry) in entries.iter().enumerate() {
        let current = summary.import_id;
        let result = atomically(conn, |tx| {
            let staged = match entry {
                Entry::Bank(rec) => stage_bank(tx, user_id, account.id, rec)?,
                Entry::Trade(rec) => stage_trade(account.id, rec, opts),
            };
            if let Staged::Skip(reason) = staged {
                return Ok(Err(reason));
            }
            let import_id = match current {
                Some(id) => id,
                None => create_import(tx, account.id)?,
            };
            commit(tx, user_id, staged, import_id, quotes)?;
            Ok(Ok(import_id))
        });
        match result {
            Ok(Ok(import_id)) => {
                summary.import_id = Some(import_id);
                summary.imported += 1;
            }
            Ok(Err(reason)) => {
                debug!("Import record {} skipped: {}", idx + 1, reason);
                summary.skipped += 1;
            }
            Err(e) => {
                warn!("Import record {} failed: {}", idx + 1, e);
                summary.failed += 1;
            }
        }
    }
    info!(
        "Import into account {}: {} imported, {} skipped, {} failed",
        account.id, summary.imported, summary.skipped, summary.failed
    );
    Ok(summary)
}

/// Reads, parses and imports one file; the format follows the extension.
pub fn import_file(
    conn: &mut Connection,
    user_id: i64,
    account_id: i64,
    path: &Path,
    opts: ImportOptions,
    quotes: Option<&QuoteCache>,
) -> Result<ImportSummary> {
    let format = Format::from_path(path)?;
    accounts::get(conn, user_id, account_id)?;
    let text = std::fs::read_to_string(path)?;
    let entries = format.parse(&text)?;
    debug!("Parsed {} entries from {}", entries.len(), path.display());
    import_entries(conn, user_id, account_id, &entries, opts, quotes)
}

fn load_import(conn: &Connection, user_id: i64, import_id: i64) -> Result<Import> {
    let import = db::must_exist(
        conn.query_row(
            "SELECT id, account_id, created_on FROM imports WHERE id=?1",
            params![import_id],
            |r| {
                Ok(Import {
                    id: r.get(0)?,
                    account_id: r.get(1)?,
                    created_on: r.get(2)?,
                })
            },
        ),
        || format!("import {}", import_id),
    )?;
    accounts::get(conn, user_id, import.account_id)?;
    Ok(import)
}

pub fn list(conn: &Connection, user_id: i64, account_id: i64) -> Result<Vec<ImportRow>> {
    let account = accounts::get(conn, user_id, account_id)?;
    let mut stmt = conn.prepare(
        "SELECT i.id, i.account_id, i.created_on,
                (SELECT COUNT(*) FROM cash_flows c WHERE c.import_id = i.id AND c.kind = 'posted'),
                (SELECT COUNT(*) FROM trades t WHERE t.import_id = i.id)
         FROM imports i WHERE i.account_id=?1 ORDER BY i.id DESC",
    )?;
    let rows = stmt.query_map(params![account.id], |r| {
        Ok(ImportRow {
            import: Import {
                id: r.get(0)?,
                account_id: r.get(1)?,
                created_on: r.get(2)?,
            },
            cash_flows: r.get(3)?,
            trades: r.get(4)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn ids(conn: &Connection, sql: &str, import_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![import_id], |r| r.get::<_, i64>(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<i64>>>()?)
}

/// Removes everything an import created through the regular delete paths,
/// then the import itself. Returns how many records went away.
pub fn undo(conn: &Connection, user_id: i64, import_id: i64) -> Result<usize> {
    let import = load_import(conn, user_id, import_id)?;
    let mut removed = 0;

    // newest first so sells release their lots before the buys go
    let trade_ids = ids(
        conn,
        "SELECT id FROM trades WHERE import_id=?1 ORDER BY date DESC, id DESC",
        import.id,
    )?;
    for id in trade_ids {
        trades::delete(conn, user_id, id)?;
        removed += 1;
    }

    let cash_ids = ids(
        conn,
        "SELECT id FROM cash_flows WHERE import_id=?1 AND kind='posted' ORDER BY id",
        import.id,
    )?;
    for id in cash_ids {
        // transfer peers go with their partner
        match ledger::delete(conn, user_id, id) {
            Ok(()) => removed += 1,
            Err(Error::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }

    conn.execute("DELETE FROM imports WHERE id=?1", params![import.id])?;
    info!("Undid import {} ({} records)", import.id, removed);
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::NewAccount;
    use crate::models::AccountType;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn setup() -> (Connection, i64, i64, i64) {
        let conn = db::open_in_memory().unwrap();
        let user = accounts::find_or_create_user(&conn, "alice").unwrap();
        let mk = |name: &str, ty| {
            accounts::create(
                &conn,
                user.id,
                &NewAccount {
                    name: name.into(),
                    account_type: ty,
                    currency: "USD".into(),
                    taxable: true,
                },
            )
            .unwrap()
            .id
        };
        let checking = mk("Checking", AccountType::Deposit);
        let savings = mk("Savings", AccountType::Deposit);
        (conn, user.id, checking, savings)
    }

    #[test]
    fn extension_picks_parser() {
        assert_eq!(Format::from_path(Path::new("a/b.QFX")).unwrap(), Format::Ofx);
        assert_eq!(Format::from_path(Path::new("x.qif")).unwrap(), Format::Qif);
        assert!(matches!(Format::from_path(Path::new("x.csv")), Err(Error::ImportFailure(_))));
    }

    #[test]
    fn qif_transfer_split_and_skip() {
        let (mut conn, user, checking, savings) = setup();
        payees::create(&conn, user, "Spam Corp", None, true).unwrap();
        let text = "!Type:Bank\n\
            D1/5'24\nT-200\nPBank\nL[Savings]\n^\n\
            D1/6'24\nT-75\nPMarket\nSFood\n$-50\nSHousehold\n$-25\n^\n\
            D1/7'24\nT-9.99\nPSpam Corp\n^\n\
            D1/8'24\nT-1\nPOver\nSFood\n$-5\n^\n";
        let mut file = tempfile::Builder::new().suffix(".qif").tempfile().unwrap();
        file.write_all(text.as_bytes()).unwrap();

        let summary = import_file(&mut conn, user, checking, file.path(), ImportOptions::default(), None).unwrap();
        assert_eq!((summary.imported, summary.skipped, summary.failed), (2, 1, 1));
        assert_eq!(accounts::get(&conn, user, checking).unwrap().cash_balance, dec!(-275));
        assert_eq!(accounts::get(&conn, user, savings).unwrap().cash_balance, dec!(200));

        let rows = ledger::list(&conn, user, checking, None, None).unwrap();
        let market = rows.iter().find(|r| r.payee.as_deref() == Some("Market")).unwrap();
        let (kids, residual) = ledger::list_splits(&conn, user, market.cash_flow.id).unwrap();
        assert_eq!(kids.len(), 2);
        assert_eq!(residual, Decimal::ZERO);

        let import_id = summary.import_id.unwrap();
        assert_eq!(undo(&conn, user, import_id).unwrap(), 2);
        assert_eq!(accounts::get(&conn, user, checking).unwrap().cash_balance, Decimal::ZERO);
        assert_eq!(accounts::get(&conn, user, savings).unwrap().cash_balance, Decimal::ZERO);
        assert!(list(&conn, user, checking).unwrap().is_empty());
    }

    #[test]
    fn investment_fixups_and_undo() {
        let (mut conn, user, _, _) = setup();
        let brokerage = accounts::create(
            &conn,
            user,
            &NewAccount {
                name: "Brokerage".into(),
                account_type: AccountType::Investment,
                currency: "USD".into(),
                taxable: true,
            },
        )
        .unwrap();
        let text = "!Type:Invst\n\
            D2/1'24\nNBuy\nYTotal Market Fund\nI100\nQ10\nT1000\n^\n\
            D3/1'24\nNShrsIn\nYTotal Market Fund\nI110\nQ1\nT110\n^\n\
            D4/1'24\nNSell\nYTotal Market Fund\nI120\nQ5\nT600\n^\n\
            D4/2'24\nNXIn\nT5\n^\n";
        let entries = qif::parse(text).unwrap();
        let opts = ImportOptions { trade_fixups: true };
        let summary = import_entries(&mut conn, user, brokerage.id, &entries, opts, None).unwrap();
        assert_eq!((summary.imported, summary.skipped, summary.failed), (3, 1, 0));

        let list = trades::list(&conn, user, brokerage.id, None).unwrap();
        assert_eq!(list[1].trade_type, TradeType::ReinvestedDividend);
        assert_eq!(list[2].basis, dec!(500));
        let sec = crate::portfolio::securities::get(&conn, user, list[0].security_id).unwrap();
        assert_eq!(sec.symbol, "");
        assert_eq!(sec.name, "Total Market Fund");
        assert_eq!(sec.shares, dec!(6));

        assert_eq!(undo(&conn, user, summary.import_id.unwrap()).unwrap(), 3);
        assert!(trades::list(&conn, user, brokerage.id, None).unwrap().is_empty());
        assert_eq!(accounts::get(&conn, user, brokerage.id).unwrap().cash_balance, Decimal::ZERO);
    }

    #[test]
    fn empty_file_leaves_no_import() {
        let (mut conn, user, checking, _) = setup();
        let summary = import_entries(&mut conn, user, checking, &[], ImportOptions::default(), None).unwrap();
        assert_eq!(summary, ImportSummary::default());
        assert!(list(&conn, user, checking).unwrap().is_empty());
    }
}
