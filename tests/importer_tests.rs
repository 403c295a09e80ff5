// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use bookkeeper::accounts::NewAccount;
use bookkeeper::config::Config;
use bookkeeper::db;
use bookkeeper::errors::{Error, Result};
use bookkeeper::models::AccountType;
use bookkeeper::portfolio::{QuoteCache, QuoteFetcher};
use bookkeeper::service::Session;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Serves fixed prices; unknown symbols fail like an unreachable feed.
struct Scripted(HashMap<&'static str, Decimal>);

impl QuoteFetcher for Scripted {
    fn fetch(&self, symbol: &str) -> Result<Decimal> {
        self.0
            .get(symbol)
            .copied()
            .ok_or_else(|| Error::Quote(format!("no quote for {}", symbol)))
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn session() -> Session {
    init_logging();
    let conn = db::open_in_memory().unwrap();
    let quotes = Arc::new(QuoteCache::new(Scripted(HashMap::from([("VTI", dec!(250))]))));
    Session::sign_in(conn, Config::default(), quotes, "alice").unwrap()
}

fn account(s: &mut Session, name: &str, ty: AccountType) -> i64 {
    s.create_account(&NewAccount {
        name: name.into(),
        account_type: ty,
        currency: "USD".into(),
        taxable: true,
    })
    .unwrap()
    .id
}

fn fixture(suffix: &str, text: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

const STATEMENT: &str = "OFXHEADER:100\nDATA:OFXSGML\nVERSION:102\n\n<OFX>\n<BANKMSGSRSV1>\n<STMTTRNRS>\n<STMTRS>\n<BANKTRANLIST>\n\
<STMTTRN>\n<TRNTYPE>CREDIT\n<DTPOSTED>20240301\n<TRNAMT>2500.00\n<FITID>20240301-1\n<NAME>ACME PAYROLL\n</STMTTRN>\n\
<STMTTRN>\n<TRNTYPE>DEBIT\n<DTPOSTED>20240302\n<TRNAMT>-64.20\n<FITID>20240302-1\n<NAME>CORNER GROCER\n</STMTTRN>\n\
<STMTTRN>\n<TRNTYPE>CHECK\n<DTPOSTED>20240303\n<TRNAMT>-900.00\n<FITID>20240303-1\n<CHECKNUM>311\n<NAME>LANDLORD\n</STMTTRN>\n\
</BANKTRANLIST>\n</STMTRS>\n</STMTTRNRS>\n</BANKMSGSRSV1>\n</OFX>\n";

#[test]
fn ofx_reimport_adds_nothing() {
    let mut s = session();
    let checking = account(&mut s, "Checking", AccountType::Deposit);
    let file = fixture(".ofx", STATEMENT);

    let first = s.import_file(checking, file.path()).unwrap();
    assert_eq!((first.imported, first.skipped, first.failed), (3, 0, 0));
    assert!(first.import_id.is_some());
    assert_eq!(s.account(checking).unwrap().cash_balance, dec!(1535.80));

    let again = s.import_file(checking, file.path()).unwrap();
    assert_eq!((again.imported, again.skipped), (0, 3));
    assert_eq!(again.import_id, None);
    assert_eq!(s.cash_flows(checking, None).unwrap().len(), 3);

    let imports = s.imports(checking).unwrap();
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].cash_flows, 3);
}

#[test]
fn same_statement_imports_into_another_account() {
    let mut s = session();
    let checking = account(&mut s, "Checking", AccountType::Deposit);
    let joint = account(&mut s, "Joint", AccountType::Deposit);
    let file = fixture(".qfx", STATEMENT);
    s.import_file(checking, file.path()).unwrap();
    let other = s.import_file(joint, file.path()).unwrap();
    assert_eq!(other.imported, 3);
}

#[test]
fn undo_removes_the_batch() {
    let mut s = session();
    let checking = account(&mut s, "Checking", AccountType::Deposit);
    let file = fixture(".ofx", STATEMENT);
    let summary = s.import_file(checking, file.path()).unwrap();

    assert_eq!(s.undo_import(summary.import_id.unwrap()).unwrap(), 3);
    assert_eq!(s.account(checking).unwrap().cash_balance, Decimal::ZERO);
    assert!(s.imports(checking).unwrap().is_empty());
    // the transaction ids are free again
    assert_eq!(s.import_file(checking, file.path()).unwrap().imported, 3);
}

#[test]
fn qif_investment_file_builds_positions() {
    let mut s = session();
    let brokerage = account(&mut s, "Brokerage", AccountType::Investment);
    let file = fixture(
        ".qif",
        "!Type:Invst\n\
         D1/3'24\nNBuy\nYVanguard Total Market\nI200\nQ5\nT1000\n^\n\
         D6/3'24\nNDiv\nYVanguard Total Market\nT12.40\n^\n\
         D9/3'24\nNSell\nYVanguard Total Market\nI240\nQ2\nT480\n^\n",
    );
    let summary = s.import_file(brokerage, file.path()).unwrap();
    assert_eq!(summary.imported, 3);

    let held = s.securities(brokerage, false).unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].shares, dec!(3));
    assert_eq!(held[0].basis, dec!(600));
    assert_eq!(
        s.account(brokerage).unwrap().cash_balance,
        dec!(-1000) + dec!(12.40) + dec!(480)
    );
    let gains = s.gains(Some(2024), Some(brokerage)).unwrap();
    assert_eq!(gains.len(), 1);
    assert_eq!(gains[0].gain, dec!(80));
}

#[test]
fn unknown_extension_is_an_import_failure() {
    let mut s = session();
    let checking = account(&mut s, "Checking", AccountType::Deposit);
    let file = fixture(".csv", "date,amount\n");
    assert!(matches!(
        s.import_file(checking, file.path()),
        Err(Error::ImportFailure(_))
    ));
}

#[test]
fn importing_into_an_unknown_account_is_denied() {
    let mut s = session();
    let file = fixture(".ofx", STATEMENT);
    assert!(matches!(
        s.import_file(9999, file.path()),
        Err(Error::PermissionDenied)
    ));
}
