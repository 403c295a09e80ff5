// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use bookkeeper::accounts::{self, NewAccount};
use bookkeeper::db;
use bookkeeper::errors::Error;
use bookkeeper::ledger::{self, CashFlowInput, CashFlowUpdate, SplitInput};
use bookkeeper::models::{AccountType, CashFlowType};
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn setup() -> (Connection, i64, i64, i64) {
    let conn = db::open_in_memory().unwrap();
    let user = accounts::find_or_create_user(&conn, "alice").unwrap();
    let mut ids = Vec::new();
    for name in ["Checking", "Savings"] {
        let acct = accounts::create(
            &conn,
            user.id,
            &NewAccount {
                name: name.into(),
                account_type: AccountType::Deposit,
                currency: "USD".into(),
                taxable: true,
            },
        )
        .unwrap();
        ids.push(acct.id);
    }
    (conn, user.id, ids[0], ids[1])
}

fn balance(conn: &Connection, user: i64, acct: i64) -> Decimal {
    accounts::get(conn, user, acct).unwrap().cash_balance
}

fn posted_sum(conn: &Connection, user: i64, acct: i64) -> Decimal {
    ledger::list(conn, user, acct, None, None)
        .unwrap()
        .iter()
        .map(|r| r.cash_flow.amount)
        .sum()
}

#[test]
fn transfer_posts_mirrored_pair() {
    let (conn, user, checking, savings) = setup();
    let mut input = CashFlowInput::new(checking, d("2024-02-01"), dec!(200), CashFlowType::DebitTransfer);
    input.transfer_account_id = Some(savings);
    let cf = ledger::create(&conn, user, &input).unwrap();

    assert_eq!(balance(&conn, user, checking), dec!(-200));
    assert_eq!(balance(&conn, user, savings), dec!(200));

    let peer = &ledger::list(&conn, user, savings, None, None).unwrap()[0].cash_flow;
    assert_eq!(cf.amount + peer.amount, Decimal::ZERO);
    assert_eq!(cf.peer_id, Some(peer.id));
    assert_eq!(peer.peer_id, Some(cf.id));
    assert_eq!(peer.peer_account_id, Some(checking));

    ledger::delete(&conn, user, peer.id).unwrap();
    assert!(ledger::list(&conn, user, checking, None, None).unwrap().is_empty());
    assert_eq!(balance(&conn, user, checking), Decimal::ZERO);
    assert_eq!(balance(&conn, user, savings), Decimal::ZERO);
}

#[test]
fn transfer_to_same_account_is_rejected() {
    let (conn, user, checking, _) = setup();
    let mut input = CashFlowInput::new(checking, d("2024-02-01"), dec!(5), CashFlowType::CreditTransfer);
    input.transfer_account_id = Some(checking);
    assert!(ledger::create(&conn, user, &input).is_err());
}

#[test]
fn split_parent_alone_moves_balance() {
    let (conn, user, checking, _) = setup();
    let parent = ledger::create(
        &conn,
        user,
        &CashFlowInput::new(checking, d("2024-03-10"), dec!(300), CashFlowType::Debit),
    )
    .unwrap();
    for (amount, category) in [(dec!(100), "Groceries"), (dec!(200), "Gas")] {
        ledger::create_split(
            &conn,
            user,
            parent.id,
            &SplitInput {
                amount,
                category_name: Some(category.into()),
                ..Default::default()
            },
        )
        .unwrap();
    }
    assert_eq!(balance(&conn, user, checking), dec!(-300));
    let (kids, unassigned) = ledger::list_splits(&conn, user, parent.id).unwrap();
    assert_eq!(kids.len(), 2);
    assert_eq!(unassigned, Decimal::ZERO);

    let over = ledger::create_split(
        &conn,
        user,
        parent.id,
        &SplitInput {
            amount: dec!(0.01),
            ..Default::default()
        },
    );
    assert!(matches!(over, Err(Error::ConstraintViolation(_))));

    ledger::delete(&conn, user, parent.id).unwrap();
    assert_eq!(balance(&conn, user, checking), Decimal::ZERO);
    assert!(matches!(
        ledger::list_splits(&conn, user, parent.id),
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        ledger::delete(&conn, user, kids[0].id),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn balance_tracks_posted_rows_through_edits() {
    let (conn, user, checking, savings) = setup();
    let mut ids = Vec::new();
    for (i, (amount, ty)) in [
        (dec!(1500), CashFlowType::Credit),
        (dec!(42.17), CashFlowType::Debit),
        (dec!(310), CashFlowType::DebitTransfer),
        (dec!(8.99), CashFlowType::Debit),
        (dec!(75), CashFlowType::CreditTransfer),
    ]
    .into_iter()
    .enumerate()
    {
        let mut input = CashFlowInput::new(checking, d("2024-01-01") + chrono::Duration::days(i as i64), amount, ty);
        if ty.is_transfer() {
            input.transfer_account_id = Some(savings);
        }
        ids.push(ledger::create(&conn, user, &input).unwrap().id);
    }
    let parent = ledger::create(
        &conn,
        user,
        &CashFlowInput::new(checking, d("2024-01-09"), dec!(60), CashFlowType::Debit),
    )
    .unwrap();
    ledger::create_split(
        &conn,
        user,
        parent.id,
        &SplitInput {
            amount: dec!(25),
            ..Default::default()
        },
    )
    .unwrap();

    ledger::update(
        &conn,
        user,
        ids[1],
        &CashFlowUpdate {
            amount: Some(dec!(50)),
            ..Default::default()
        },
    )
    .unwrap();
    ledger::update(
        &conn,
        user,
        ids[3],
        &CashFlowUpdate {
            account_id: Some(savings),
            ..Default::default()
        },
    )
    .unwrap();
    ledger::delete(&conn, user, ids[4]).unwrap();

    for acct in [checking, savings] {
        assert_eq!(balance(&conn, user, acct), posted_sum(&conn, user, acct));
    }
    assert_eq!(balance(&conn, user, checking), dec!(1500) - dec!(50) - dec!(310) - dec!(60));
    assert_eq!(balance(&conn, user, savings), dec!(310) - dec!(8.99));
}

#[test]
fn strangers_cannot_touch_cash_flows() {
    let (conn, user, checking, _) = setup();
    let cf = ledger::create(
        &conn,
        user,
        &CashFlowInput::new(checking, d("2024-01-01"), dec!(10), CashFlowType::Credit),
    )
    .unwrap();
    let bob = accounts::find_or_create_user(&conn, "bob").unwrap();
    assert!(matches!(
        ledger::delete(&conn, bob.id, cf.id),
        Err(Error::PermissionDenied)
    ));
    assert!(matches!(
        ledger::list(&conn, bob.id, checking, None, None),
        Err(Error::PermissionDenied)
    ));
}
