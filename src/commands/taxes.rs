// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::models::{FilingStatus, TaxReturn};
use crate::service::Session;
use crate::tax::{NewTaxEntry, NewTaxReturn};
use crate::utils::{fmt_currency, maybe_print_json, parse_decimal, pretty_table};
use anyhow::Result;

pub fn handle(session: &mut Session, m: &clap::ArgMatches, json: bool) -> Result<()> {
    match m.subcommand() {
        Some(("entries", sub)) => {
            let list = session.tax_entries(*sub.get_one::<i32>("year").unwrap())?;
            if !maybe_print_json(json, &list)? {
                let rows = list
                    .iter()
                    .map(|e| {
                        vec![
                            if e.automatic { "auto".to_string() } else { e.id.to_string() },
                            e.tax_type.label().to_string(),
                            e.tax_item_id.to_string(),
                            fmt_currency(e.amount),
                            e.memo.clone(),
                        ]
                    })
                    .collect();
                println!("{}", pretty_table(&["Id", "Type", "Item", "Amount", "Memo"], rows));
            }
        }
        Some(("add-entry", sub)) => {
            let mut new = NewTaxEntry::federal(
                *sub.get_one::<i32>("year").unwrap(),
                *sub.get_one::<i64>("item").unwrap(),
                parse_decimal(sub.get_one::<String>("amount").unwrap())?,
            );
            new.memo = sub.get_one::<String>("memo").cloned().unwrap_or_default();
            let entry = session.add_tax_entry(&new)?;
            if !maybe_print_json(json, &entry)? {
                println!(
                    "Added tax entry {} ({} {})",
                    entry.id,
                    entry.tax_type.label(),
                    fmt_currency(entry.amount)
                );
            }
        }
        Some(("compute", sub)) => {
            let new = NewTaxReturn {
                year: *sub.get_one::<i32>("year").unwrap(),
                filing_status: FilingStatus::from_label(sub.get_one::<String>("status").unwrap())?,
                exemptions: *sub.get_one::<i64>("exemptions").unwrap(),
            };
            let tr = session.create_tax_return(&new)?;
            if !maybe_print_json(json, &tr)? {
                print_return(&tr);
            }
        }
        _ => {}
    }
    Ok(())
}

fn print_return(tr: &TaxReturn) {
    let lines = [
        ("Income", tr.income),
        ("Deductions for AGI", tr.for_agi),
        ("AGI", tr.agi_income),
        ("Standard deduction", tr.standard_deduction),
        ("Itemized deduction", tr.itemized_deduction),
        ("Exemption", tr.exemption),
        ("Deductions from AGI", tr.from_agi),
        ("Taxable income", tr.taxable_income),
        ("Base tax", tr.base_tax),
        ("Other tax", tr.other_tax),
        ("Credits", tr.credits),
        ("Total tax", tr.total_tax),
        ("Payments", tr.payments),
        ("Owed", tr.owed_tax),
        ("Long-term capital gains", tr.long_capgain_income),
    ];
    let rows = lines
        .iter()
        .map(|(label, v)| vec![label.to_string(), fmt_currency(*v)])
        .collect();
    println!("Tax return {} for {}", tr.id, tr.year);
    println!("{}", pretty_table(&["Line", "Amount"], rows));
}
