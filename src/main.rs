// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use bookkeeper::service::Session;
use bookkeeper::{cli, commands, config};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let matches = cli::build_cli().get_matches();
    let json = matches.get_flag("json");

    let config = config::load_app_configuration().context("Failed to load configuration")?;
    let requested = matches.get_one::<String>("user").unwrap();
    let login = if config.global.sessions {
        requested.as_str()
    } else {
        if requested != cli::DEFAULT_LOGIN {
            warn!("Sessions are disabled; ignoring --user {}", requested);
        }
        cli::DEFAULT_LOGIN
    };
    let db_path = config.database_path();
    let mut session = Session::open(config, login).context("Failed to open the database")?;

    match matches.subcommand() {
        Some(("init", _)) => {
            println!("Database ready at {}", db_path.display());
        }
        Some(("account", sub)) => commands::accounts::handle(&mut session, sub, json)?,
        Some(("cf", sub)) => commands::cash_flows::handle(&mut session, sub, json)?,
        Some(("security", sub)) => commands::portfolio::handle_security(&mut session, sub, json)?,
        Some(("trade", sub)) => commands::portfolio::handle_trade(&mut session, sub, json)?,
        Some(("import", sub)) => commands::importer::handle(&mut session, sub, json)?,
        Some(("gains", sub)) => commands::portfolio::handle_gains(&mut session, sub, json)?,
        Some(("payee", sub)) => commands::payees::handle(&mut session, sub, json)?,
        Some(("category", sub)) => commands::categories::handle(&mut session, sub, json)?,
        Some(("tax", sub)) => commands::taxes::handle(&mut session, sub, json)?,
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}
