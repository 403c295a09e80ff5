// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::ledger::{CashFlowInput, CashFlowUpdate, LedgerRow, RepeatInput, SplitInput};
use crate::models::CashFlowType;
use crate::service::Session;
use crate::utils::{fmt_currency, maybe_print_json, parse_date, parse_decimal, pretty_table};
use anyhow::{Context, Result};
use rust_decimal::Decimal;

pub fn handle(session: &mut Session, m: &clap::ArgMatches, json: bool) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(session, sub, json)?,
        Some(("split", sub)) => split(session, sub, json)?,
        Some(("edit", sub)) => edit(session, sub, json)?,
        Some(("rm", sub)) => {
            let id = *sub.get_one::<i64>("id").unwrap();
            session.delete_cash_flow(id)?;
            println!("Deleted cash flow {}", id);
        }
        Some(("list", sub)) => list(session, sub, json)?,
        Some(("scheduled", sub)) => {
            let rows = session.scheduled(*sub.get_one::<i64>("account").unwrap())?;
            if !maybe_print_json(json, &rows)? {
                let data = rows
                    .iter()
                    .map(|r| {
                        vec![
                            r.cash_flow.id.to_string(),
                            r.cash_flow.date.to_string(),
                            r.payee.clone().unwrap_or_default(),
                            fmt_currency(r.cash_flow.amount),
                            format!("{} days", r.repeat.days),
                            r.repeat
                                .repeats_left
                                .map(|n| n.to_string())
                                .unwrap_or_else(|| "-".into()),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(&["Id", "Next", "Payee", "Amount", "Every", "Left"], data)
                );
            }
        }
        Some(("apply", sub)) => {
            let id = *sub.get_one::<i64>("id").unwrap();
            let posted = session.apply_scheduled(id)?;
            println!("Posted {} occurrence(s) of {}", posted, id);
        }
        _ => {}
    }
    Ok(())
}

fn opt_string(sub: &clap::ArgMatches, name: &str) -> Option<String> {
    sub.get_one::<String>(name)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn cash_flow_type(sub: &clap::ArgMatches) -> Result<Option<CashFlowType>> {
    match sub.get_one::<String>("type") {
        Some(t) => Ok(Some(CashFlowType::from_label(t)?)),
        None if sub.get_one::<i64>("to").is_some() => Ok(Some(CashFlowType::DebitTransfer)),
        None => Ok(None),
    }
}

fn add(session: &mut Session, sub: &clap::ArgMatches, json: bool) -> Result<()> {
    let date = parse_date(sub.get_one::<String>("date").unwrap())?;
    let raw = sub.get_one::<String>("amount").unwrap();
    let amount = parse_decimal(raw).with_context(|| format!("Invalid amount '{}'", raw))?;
    let ty = cash_flow_type(sub)?.unwrap_or(if amount.is_sign_negative() {
        CashFlowType::Debit
    } else {
        CashFlowType::Credit
    });

    let mut input = CashFlowInput::new(*sub.get_one::<i64>("account").unwrap(), date, amount.abs(), ty);
    input.payee_name = opt_string(sub, "payee");
    input.category_name = opt_string(sub, "category");
    input.transfer_account_id = sub.get_one::<i64>("to").copied();
    input.memo = opt_string(sub, "memo").unwrap_or_default();
    input.transnum = opt_string(sub, "num").unwrap_or_default();
    input.tax_year = sub.get_one::<i32>("tax-year").copied();
    if let Some(interval) = sub.get_one::<i64>("repeat") {
        let rate = match sub.get_one::<String>("rate") {
            Some(r) => parse_decimal(r)?,
            None => Decimal::ZERO,
        };
        input.repeat = Some(RepeatInput {
            interval_type_id: *interval,
            repeats_left: sub.get_one::<i64>("repeats").copied(),
            start_day: 0,
            rate,
        });
    }

    let cf = session.create_cash_flow(&input)?;
    if !maybe_print_json(json, &cf)? {
        println!(
            "Recorded cash flow {} {} on {} (account {})",
            cf.id,
            fmt_currency(cf.amount),
            cf.date,
            cf.account_id
        );
    }
    Ok(())
}

fn split(session: &mut Session, sub: &clap::ArgMatches, json: bool) -> Result<()> {
    let parent = *sub.get_one::<i64>("parent").unwrap();
    let split = SplitInput {
        amount: parse_decimal(sub.get_one::<String>("amount").unwrap())?.abs(),
        payee_name: opt_string(sub, "payee"),
        category_id: None,
        category_name: opt_string(sub, "category"),
        memo: opt_string(sub, "memo").unwrap_or_default(),
    };
    let child = session.create_split(parent, &split)?;
    if !maybe_print_json(json, &child)? {
        println!("Added split {} of {} to {}", child.id, fmt_currency(child.amount), parent);
    }
    Ok(())
}

fn edit(session: &mut Session, sub: &clap::ArgMatches, json: bool) -> Result<()> {
    let id = *sub.get_one::<i64>("id").unwrap();
    let upd = CashFlowUpdate {
        date: sub.get_one::<String>("date").map(|d| parse_date(d)).transpose()?,
        amount: sub
            .get_one::<String>("amount")
            .map(|a| parse_decimal(a).map(|d| d.abs()))
            .transpose()?,
        cash_flow_type: cash_flow_type(sub)?,
        payee_name: opt_string(sub, "payee"),
        category_name: opt_string(sub, "category"),
        transfer_account_id: sub.get_one::<i64>("to").copied(),
        memo: opt_string(sub, "memo"),
        transnum: opt_string(sub, "num"),
        tax_year: sub.get_one::<i32>("tax-year").copied(),
        ..Default::default()
    };
    let cf = session.update_cash_flow(id, &upd)?;
    if !maybe_print_json(json, &cf)? {
        println!("Updated cash flow {} ({})", cf.id, fmt_currency(cf.amount));
    }
    Ok(())
}

fn list(session: &mut Session, sub: &clap::ArgMatches, json: bool) -> Result<()> {
    let account = *sub.get_one::<i64>("account").unwrap();
    let since = sub.get_one::<String>("since").map(|d| parse_date(d)).transpose()?;
    let rows = session.cash_flows(account, since)?;
    if !maybe_print_json(json, &rows)? {
        println!(
            "{}",
            pretty_table(
                &["Id", "Date", "Payee", "Category", "Amount", "Balance", "Memo"],
                rows.iter().map(ledger_row).collect(),
            )
        );
    }
    Ok(())
}

fn ledger_row(r: &LedgerRow) -> Vec<String> {
    let category = match (&r.peer_account, &r.category) {
        (Some(peer), _) => format!("[{}]", peer),
        (None, Some(c)) => c.clone(),
        (None, None) if r.cash_flow.has_splits => "--splits--".to_string(),
        (None, None) => String::new(),
    };
    vec![
        r.cash_flow.id.to_string(),
        r.cash_flow.date.to_string(),
        r.payee.clone().unwrap_or_default(),
        category,
        fmt_currency(r.cash_flow.amount),
        fmt_currency(r.balance),
        r.cash_flow.memo.clone(),
    ]
}
