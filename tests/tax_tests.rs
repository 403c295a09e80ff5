// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use bookkeeper::accounts::NewAccount;
use bookkeeper::config::Config;
use bookkeeper::db;
use bookkeeper::errors::{Error, Result};
use bookkeeper::ledger::CashFlowInput;
use bookkeeper::models::{AccountType, CashFlowType, FilingStatus, TaxType, TradeType};
use bookkeeper::portfolio::trades::{SecurityRef, TradeInput};
use bookkeeper::portfolio::{QuoteCache, QuoteFetcher};
use bookkeeper::service::Session;
use bookkeeper::tax::{NewTaxEntry, NewTaxReturn, TaxYear};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

struct Offline;

impl QuoteFetcher for Offline {
    fn fetch(&self, symbol: &str) -> Result<Decimal> {
        Err(Error::Quote(format!("offline: {}", symbol)))
    }
}

fn session() -> Session {
    let conn = db::open_in_memory().unwrap();
    Session::sign_in(conn, Config::default(), Arc::new(QuoteCache::new(Offline)), "alice").unwrap()
}

fn single(year: i32) -> NewTaxReturn {
    NewTaxReturn {
        year,
        filing_status: FilingStatus::Single,
        exemptions: 0,
    }
}

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[test]
fn single_filer_2023_standard_deduction() {
    let mut s = session();
    s.add_tax_entry(&NewTaxEntry::federal(2023, 1, dec!(50000))).unwrap();
    let tr = s.create_tax_return(&single(2023)).unwrap();
    assert_eq!(tr.income, dec!(50000));
    assert_eq!(tr.standard_deduction, dec!(13850));
    assert_eq!(tr.taxable_income, dec!(36150));
    // published 2023 table row 36,150-36,200 for single filers
    assert_eq!(tr.base_tax, dec!(4118));
    assert_eq!(tr.owed_tax, dec!(4118));
}

#[test]
fn withholding_and_credits_settle_the_balance() {
    let mut s = session();
    s.add_tax_entry(&NewTaxEntry::federal(2023, 1, dec!(50000))).unwrap();
    s.add_tax_entry(&NewTaxEntry::federal(2023, 16, dec!(500))).unwrap();
    let withheld = s.add_tax_entry(&NewTaxEntry::federal(2023, 17, dec!(4000))).unwrap();
    assert_eq!(withheld.tax_type, TaxType::Payments);

    let tr = s.create_tax_return(&single(2023)).unwrap();
    assert_eq!(tr.credits, dec!(500));
    assert_eq!(tr.total_tax, dec!(3618));
    assert_eq!(tr.owed_tax, dec!(-382));

    s.delete_tax_entry(withheld.id).unwrap();
    let again = s.recalculate_tax_return(tr.id).unwrap();
    assert_eq!(again.owed_tax, dec!(3618));
    assert_eq!(s.tax_returns(Some(2023)).unwrap().len(), 1);
}

#[test]
fn categorised_income_and_gains_feed_the_return() {
    let mut s = session();
    let checking = s
        .create_account(&NewAccount {
            name: "Checking".into(),
            account_type: AccountType::Deposit,
            currency: "USD".into(),
            taxable: true,
        })
        .unwrap();
    let brokerage = s
        .create_account(&NewAccount {
            name: "Brokerage".into(),
            account_type: AccountType::Investment,
            currency: "USD".into(),
            taxable: true,
        })
        .unwrap();

    let mut pay = CashFlowInput::new(checking.id, d("2023-03-31"), dec!(40000), CashFlowType::Credit);
    pay.category_id = Some(6);
    s.create_cash_flow(&pay).unwrap();

    let trade = |tt, date: &str, shares, amount| TradeInput {
        account_id: brokerage.id,
        security: SecurityRef::Symbol("ACME".into()),
        trade_type: tt,
        date: d(date),
        amount,
        price: Decimal::ZERO,
        shares,
        tax_year: None,
        import_id: None,
    };
    s.create_trade(&trade(TradeType::Buy, "2021-05-03", dec!(10), dec!(1000))).unwrap();
    s.create_trade(&trade(TradeType::Sell, "2023-06-01", dec!(10), dec!(3000))).unwrap();

    let entries = s.tax_entries(2023).unwrap();
    assert!(entries.iter().all(|e| e.automatic));
    assert!(entries.iter().any(|e| e.tax_type == TaxType::Income && e.amount == dec!(40000)));

    let tr = s.create_tax_return(&single(2023)).unwrap();
    assert_eq!(tr.income, dec!(42000));
    assert_eq!(tr.long_capgain_income, dec!(2000));
    assert_eq!(tr.taxable_income, dec!(28150));
}

#[test]
fn bracket_tax_never_decreases() {
    let conn = db::open_in_memory().unwrap();
    for year in [2022, 2023, 2024] {
        let table = TaxYear::load(&conn, year).unwrap();
        for status in FilingStatus::ALL.iter().copied() {
            assert_eq!(table.calculate_tax(status, Decimal::ZERO), Decimal::ZERO);
            let mut last = Decimal::ZERO;
            let mut income = Decimal::ZERO;
            while income < dec!(700000) {
                let tax = table.calculate_tax(status, income);
                assert!(tax >= last, "{} {:?}: {} taxed {} after {}", year, status, income, tax, last);
                last = tax;
                income += dec!(173.31);
            }
        }
    }
}

#[test]
fn unknown_year_is_not_found() {
    let mut s = session();
    assert!(matches!(s.create_tax_return(&single(1999)), Err(Error::NotFound(_))));
    let tr = s.create_tax_return(&single(2024)).unwrap();
    assert_eq!(tr.taxable_income, Decimal::ZERO);
    assert!(matches!(s.tax_return(tr.id + 1), Err(Error::NotFound(_))));
}
