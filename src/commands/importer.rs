// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::service::Session;
use crate::utils::maybe_print_json;
use anyhow::{Context, Result};
use std::path::Path;

pub fn handle(session: &mut Session, m: &clap::ArgMatches, json: bool) -> Result<()> {
    let account = *m.get_one::<i64>("account").unwrap();
    let path = m.get_one::<String>("path").unwrap().trim();
    let summary = session
        .import_file(account, Path::new(path))
        .with_context(|| format!("Import {}", path))?;
    if !maybe_print_json(json, &summary)? {
        match summary.import_id {
            Some(id) => println!(
                "Import {}: {} imported, {} skipped, {} failed",
                id, summary.imported, summary.skipped, summary.failed
            ),
            None => println!(
                "Nothing imported from {} ({} skipped, {} failed)",
                path, summary.skipped, summary.failed
            ),
        }
    }
    Ok(())
}
