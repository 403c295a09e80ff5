// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::models::{BasisType, SecurityType, TradeType};
use crate::portfolio::filings::Filing;
use crate::portfolio::{EdgarFetcher, FilingType};
use crate::portfolio::securities::NewSecurity;
use crate::portfolio::trades::{GainRow, SecurityRef, TradeInput, TradeUpdate, gain_totals};
use crate::service::Session;
use crate::utils::{fmt_currency, maybe_print_json, parse_date, parse_decimal, percent, pretty_table};
use anyhow::{Result, anyhow};
use rust_decimal::Decimal;

fn decimal_arg(sub: &clap::ArgMatches, name: &str) -> Result<Option<Decimal>> {
    Ok(sub
        .get_one::<String>(name)
        .map(|raw| parse_decimal(raw.trim()))
        .transpose()?)
}

pub fn handle_security(session: &mut Session, m: &clap::ArgMatches, json: bool) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let symbol = sub.get_one::<String>("symbol").map(|s| s.trim().to_string()).unwrap_or_default();
            let name = sub.get_one::<String>("name").map(|s| s.trim().to_string()).unwrap_or_default();
            if symbol.is_empty() && name.is_empty() {
                return Err(anyhow!("A security needs a --symbol or a --name"));
            }
            let new = NewSecurity {
                symbol,
                name,
                security_type: SecurityType::from_label(sub.get_one::<String>("type").unwrap())?,
                basis_type: BasisType::from_label(sub.get_one::<String>("basis").unwrap())?,
            };
            let sec = session.create_security(*sub.get_one::<i64>("account").unwrap(), &new)?;
            if !maybe_print_json(json, &sec)? {
                println!("Added security {} {} ({})", sec.id, sec.symbol, sec.name);
            }
        }
        Some(("list", sub)) => {
            let list = session.securities(*sub.get_one::<i64>("account").unwrap(), sub.get_flag("all"))?;
            if !maybe_print_json(json, &list)? {
                let rows = list
                    .iter()
                    .map(|s| {
                        vec![
                            s.id.to_string(),
                            s.symbol.clone(),
                            s.name.clone(),
                            s.shares.normalize().to_string(),
                            fmt_currency(s.basis),
                            fmt_currency(s.value),
                            fmt_currency(s.value - s.basis),
                            format!("{}%", percent(s.value - s.basis, s.basis)),
                            s.last_quote_update.map(|d| d.to_string()).unwrap_or_default(),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(
                        &["Id", "Symbol", "Name", "Shares", "Basis", "Value", "Gain", "Gain %", "Quoted"],
                        rows
                    )
                );
            }
        }
        Some(("rm", sub)) => {
            let id = *sub.get_one::<i64>("id").unwrap();
            session.delete_security(id)?;
            println!("Deleted security {} and its trades", id);
        }
        Some(("financials", sub)) => {
            let form = FilingType::from_label(sub.get_one::<String>("type").unwrap())?;
            let fetcher = EdgarFetcher::new(session.config().global.quote_timeout_secs)?;
            let (company, filings) = session.company_financials(
                *sub.get_one::<i64>("company").unwrap(),
                form,
                *sub.get_one::<usize>("limit").unwrap(),
                &fetcher,
            )?;
            if !maybe_print_json(json, &filings)? {
                println!("{} ({}) {} filings", company.name, company.symbol, form.label());
                print_filings(&filings);
            }
        }
        Some(("chart", sub)) => {
            let chart = session.security_chart(
                *sub.get_one::<i64>("id").unwrap(),
                *sub.get_one::<u32>("days").unwrap(),
            )?;
            if !maybe_print_json(json, &chart)? {
                let prices = chart.datasets.first().map(|d| d.data.as_slice()).unwrap_or_default();
                let rows = chart
                    .labels
                    .iter()
                    .zip(prices)
                    .map(|(month, p)| vec![month.clone(), fmt_currency(*p)])
                    .collect();
                println!("{}", pretty_table(&["Month", "Price"], rows));
            }
        }
        _ => {}
    }
    Ok(())
}

fn print_filings(filings: &[Filing]) {
    let Some(first) = filings.first() else {
        println!("No filings");
        return;
    };
    let mut header = vec!["Item".to_string()];
    header.extend(filings.iter().map(|f| f.period_end.to_string()));
    let rows = first
        .lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let mut row = vec![line.name.clone()];
            row.extend(filings.iter().map(|f| match f.lines.get(i).and_then(|l| l.value) {
                Some(v) if line.shares => v.normalize().to_string(),
                Some(v) => fmt_currency(v),
                None => String::new(),
            }));
            row
        })
        .collect();
    let header: Vec<&str> = header.iter().map(String::as_str).collect();
    println!("{}", pretty_table(&header, rows));
}

pub fn handle_trade(session: &mut Session, m: &clap::ArgMatches, json: bool) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let input = TradeInput {
                account_id: *sub.get_one::<i64>("account").unwrap(),
                security: SecurityRef::Symbol(sub.get_one::<String>("symbol").unwrap().trim().to_string()),
                trade_type: TradeType::from_label(sub.get_one::<String>("type").unwrap())?,
                date: parse_date(sub.get_one::<String>("date").unwrap())?,
                amount: decimal_arg(sub, "amount")?.unwrap_or_default(),
                price: decimal_arg(sub, "price")?.unwrap_or_default(),
                shares: decimal_arg(sub, "shares")?.unwrap_or_default(),
                tax_year: sub.get_one::<i32>("tax-year").copied(),
                import_id: None,
            };
            let trade = session.create_trade(&input)?;
            if !maybe_print_json(json, &trade)? {
                println!(
                    "Recorded {} {} on {} ({} shares, {})",
                    trade.trade_type.label(),
                    trade.id,
                    trade.date,
                    trade.shares.normalize(),
                    fmt_currency(trade.amount)
                );
            }
        }
        Some(("edit", sub)) => {
            let upd = TradeUpdate {
                date: sub.get_one::<String>("date").map(|d| parse_date(d)).transpose()?,
                amount: decimal_arg(sub, "amount")?,
                price: decimal_arg(sub, "price")?,
                shares: decimal_arg(sub, "shares")?,
                tax_year: sub.get_one::<i32>("tax-year").copied(),
            };
            let trade = session.update_trade(*sub.get_one::<i64>("id").unwrap(), &upd)?;
            if !maybe_print_json(json, &trade)? {
                println!("Updated trade {}", trade.id);
            }
        }
        Some(("rm", sub)) => {
            let id = *sub.get_one::<i64>("id").unwrap();
            session.delete_trade(id)?;
            println!("Deleted trade {}", id);
        }
        Some(("list", sub)) => {
            let list = session.trades(
                *sub.get_one::<i64>("account").unwrap(),
                sub.get_one::<i64>("security").copied(),
            )?;
            if !maybe_print_json(json, &list)? {
                let rows = list
                    .iter()
                    .map(|t| {
                        vec![
                            t.id.to_string(),
                            t.date.to_string(),
                            t.trade_type.label().to_string(),
                            t.security_id.to_string(),
                            t.shares.normalize().to_string(),
                            t.price.normalize().to_string(),
                            fmt_currency(t.amount),
                            fmt_currency(t.basis),
                            t.tax_year.to_string(),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(
                        &["Id", "Date", "Type", "Security", "Shares", "Price", "Amount", "Basis", "Tax year"],
                        rows
                    )
                );
            }
        }
        _ => {}
    }
    Ok(())
}

pub fn handle_gains(session: &mut Session, m: &clap::ArgMatches, json: bool) -> Result<()> {
    let rows = match m.subcommand() {
        Some(("list", sub)) => session.gains(
            sub.get_one::<i32>("year").copied(),
            sub.get_one::<i64>("account").copied(),
        )?,
        Some(("show", sub)) => session.sell_gains(*sub.get_one::<i64>("id").unwrap())?,
        _ => return Ok(()),
    };
    if !maybe_print_json(json, &rows)? {
        print_gains(&rows);
    }
    Ok(())
}

fn print_gains(rows: &[GainRow]) {
    let mut data: Vec<Vec<String>> = rows
        .iter()
        .map(|g| {
            vec![
                g.sell_id.to_string(),
                g.symbol.clone(),
                g.buy_date.to_string(),
                g.sell_date.to_string(),
                g.shares.normalize().to_string(),
                fmt_currency(g.proceeds),
                fmt_currency(g.basis),
                fmt_currency(g.gain),
                if g.long_term { "long" } else { "short" }.to_string(),
            ]
        })
        .collect();
    let totals = gain_totals(rows);
    data.push(vec![
        "Total".into(),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        fmt_currency(totals.proceeds),
        fmt_currency(totals.basis),
        fmt_currency(totals.gain),
        String::new(),
    ]);
    println!(
        "{}",
        pretty_table(
            &["Sell", "Symbol", "Bought", "Sold", "Shares", "Proceeds", "Basis", "Gain", "Term"],
            data
        )
    );
}
