// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::service::Session;
use crate::utils::{maybe_print_json, pretty_table};
use anyhow::Result;

pub fn handle(session: &mut Session, m: &clap::ArgMatches, json: bool) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let name = sub.get_one::<String>("name").unwrap();
            let cat = session.create_category(name, sub.get_flag("income"))?;
            if !maybe_print_json(json, &cat)? {
                println!("Added category {} '{}'", cat.id, cat.name);
            }
        }
        Some(("list", _)) => {
            let list = session.categories()?;
            if !maybe_print_json(json, &list)? {
                let data = list
                    .iter()
                    .map(|c| {
                        vec![
                            c.id.to_string(),
                            c.name.clone(),
                            if c.category_type_id == 2 { "income" } else { "expense" }.to_string(),
                            if c.user_id.is_some() { "" } else { "shared" }.to_string(),
                        ]
                    })
                    .collect();
                println!("{}", pretty_table(&["Id", "Category", "Kind", "Scope"], data));
            }
        }
        _ => {}
    }
    Ok(())
}
