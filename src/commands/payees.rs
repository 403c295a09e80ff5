// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::service::Session;
use crate::utils::{maybe_print_json, pretty_table};
use anyhow::Result;

pub fn handle(session: &mut Session, m: &clap::ArgMatches, json: bool) -> Result<()> {
    match m.subcommand() {
        Some(("list", sub)) => {
            let list = session.payees(sub.get_one::<i64>("account").copied())?;
            if !maybe_print_json(json, &list)? {
                let rows = list
                    .iter()
                    .map(|p| {
                        vec![
                            p.id.to_string(),
                            p.name.clone(),
                            p.category_id.map(|c| c.to_string()).unwrap_or_default(),
                            if p.skip_on_import { "skip" } else { "" }.to_string(),
                        ]
                    })
                    .collect();
                println!("{}", pretty_table(&["Id", "Name", "Category", "Import"], rows));
            }
        }
        Some(("merge", sub)) => {
            let into = *sub.get_one::<i64>("into").unwrap();
            let moved = match sub.get_one::<i64>("from") {
                Some(from) => session.merge_payees(into, *from)?,
                None => session.merge_duplicate_payees(into)?,
            };
            println!("Moved {} cash flow(s) onto payee {}", moved, into);
        }
        Some(("set-category", sub)) => {
            let payee = *sub.get_one::<i64>("id").unwrap();
            let category = *sub.get_one::<i64>("category").unwrap();
            let changed = session.set_payee_category(payee, category, sub.get_flag("all"))?;
            println!("Recategorised {} cash flow(s) of payee {}", changed, payee);
        }
        _ => {}
    }
    Ok(())
}
