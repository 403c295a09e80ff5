// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::accounts::{NewAccount, Removal};
use crate::models::{Account, AccountType};
use crate::service::Session;
use crate::utils::{fmt_currency, maybe_print_json, pretty_table};
use anyhow::Result;

pub fn handle(session: &mut Session, m: &clap::ArgMatches, json: bool) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let new = NewAccount {
                name: sub.get_one::<String>("name").unwrap().trim().to_string(),
                account_type: AccountType::from_label(sub.get_one::<String>("type").unwrap())?,
                currency: sub.get_one::<String>("currency").unwrap().to_string(),
                taxable: !sub.get_flag("not-taxable"),
            };
            let account = session.create_account(&new)?;
            if !maybe_print_json(json, &account)? {
                println!(
                    "Added account {} '{}' ({}, {})",
                    account.id,
                    account.name,
                    account.account_type.label(),
                    account.currency
                );
            }
        }
        Some(("list", sub)) => {
            let list = session.accounts(sub.get_flag("all"))?;
            if !maybe_print_json(json, &list)? {
                print_accounts(&list);
            }
        }
        Some(("show", sub)) => {
            let account = session.account(*sub.get_one::<i64>("id").unwrap())?;
            if !maybe_print_json(json, &account)? {
                print_accounts(std::slice::from_ref(&account));
            }
        }
        Some(("rm", sub)) => {
            let id = *sub.get_one::<i64>("id").unwrap();
            match session.delete_account(id)? {
                Removal::Hidden => println!("Hid account {}; remove it again to purge", id),
                Removal::Purged => println!("Purged account {}", id),
            }
        }
        _ => {}
    }
    Ok(())
}

fn print_accounts(list: &[Account]) {
    let rows = list
        .iter()
        .map(|a| {
            vec![
                a.id.to_string(),
                a.name.clone(),
                a.account_type.label().to_string(),
                a.currency.clone(),
                fmt_currency(a.cash_balance),
                if a.taxable { "yes" } else { "no" }.to_string(),
                if a.hidden { "hidden" } else { "" }.to_string(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["Id", "Name", "Type", "CCY", "Balance", "Taxable", ""],
            rows
        )
    );
}
