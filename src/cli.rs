// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{Arg, ArgAction, Command, arg, value_parser};

pub const DEFAULT_LOGIN: &str = "default";

fn id(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .help(help)
        .required(true)
        .value_parser(value_parser!(i64))
}

fn account_opt() -> Arg {
    arg!(--account <ID> "Account id")
        .required(true)
        .value_parser(value_parser!(i64))
}

fn account_cmd() -> Command {
    Command::new("account")
        .about("Manage accounts")
        .subcommand_required(true)
        .subcommand(
            Command::new("add")
                .about("Add an account")
                .arg(arg!(--name <NAME> "Account name").required(true))
                .arg(
                    arg!(--"type" <TYPE> "Cash, Deposit, CreditCard, Investment, HealthCare, Loan, Asset or Crypto")
                        .required(true),
                )
                .arg(arg!(--currency <CCY> "Currency code").default_value("USD"))
                .arg(arg!(--"not-taxable" "Exclude the account from taxes")),
        )
        .subcommand(
            Command::new("list")
                .about("List accounts")
                .arg(arg!(--all "Include hidden accounts")),
        )
        .subcommand(Command::new("show").about("Show one account").arg(id("id", "Account id")))
        .subcommand(
            Command::new("rm")
                .about("Hide an account; removing a hidden account purges it")
                .arg(id("id", "Account id")),
        )
}

fn cash_flow_cmd() -> Command {
    let common = |c: Command| {
        c.arg(arg!(--"type" <TYPE> "Debit, Credit, DebitTransfer or CreditTransfer"))
            .arg(arg!(--payee <PAYEE> "Payee name"))
            .arg(arg!(--category <CATEGORY> "Category name"))
            .arg(arg!(--to <ACCOUNT> "Transfer account id").value_parser(value_parser!(i64)))
            .arg(arg!(--memo <MEMO> "Memo"))
            .arg(arg!(--num <NUM> "Check or transaction number"))
            .arg(arg!(--"tax-year" <YEAR> "Tax year").value_parser(value_parser!(i32)))
    };
    Command::new("cf")
        .about("Cash flows")
        .subcommand_required(true)
        .subcommand(common(
            Command::new("add")
                .about("Record a cash flow")
                .arg(account_opt())
                .arg(arg!(--date <DATE> "YYYY-MM-DD").required(true))
                .arg(arg!(--amount <AMOUNT> "Amount").required(true))
                .arg(
                    arg!(--repeat <INTERVAL> "Repeat interval id (1 weekly .. 7 annually)")
                        .value_parser(value_parser!(i64)),
                )
                .arg(arg!(--repeats <N> "Number of repeats").value_parser(value_parser!(i64)))
                .arg(arg!(--rate <RATE> "Annual interest rate of an interest schedule")),
        ))
        .subcommand(
            Command::new("split")
                .about("Add a split line to a cash flow")
                .arg(id("parent", "Parent cash flow id"))
                .arg(arg!(--amount <AMOUNT> "Amount").required(true))
                .arg(arg!(--payee <PAYEE> "Payee name"))
                .arg(arg!(--category <CATEGORY> "Category name"))
                .arg(arg!(--memo <MEMO> "Memo")),
        )
        .subcommand(common(
            Command::new("edit")
                .about("Change a cash flow")
                .arg(id("id", "Cash flow id"))
                .arg(arg!(--date <DATE> "YYYY-MM-DD"))
                .arg(arg!(--amount <AMOUNT> "Amount")),
        ))
        .subcommand(Command::new("rm").about("Delete a cash flow").arg(id("id", "Cash flow id")))
        .subcommand(
            Command::new("list")
                .about("List posted cash flows with running balance")
                .arg(account_opt())
                .arg(arg!(--since <DATE> "Only rows on or after YYYY-MM-DD")),
        )
        .subcommand(
            Command::new("scheduled")
                .about("List scheduled cash flows")
                .arg(account_opt()),
        )
        .subcommand(
            Command::new("apply")
                .about("Post the due occurrences of a scheduled cash flow")
                .arg(id("id", "Scheduled cash flow id")),
        )
}

fn security_cmd() -> Command {
    Command::new("security")
        .about("Securities held in investment accounts")
        .subcommand_required(true)
        .subcommand(
            Command::new("add")
                .about("Add a security")
                .arg(account_opt())
                .arg(arg!(--symbol <SYMBOL> "Ticker symbol"))
                .arg(arg!(--name <NAME> "Company name"))
                .arg(arg!(--"type" <TYPE> "Stock, Mutual Fund, Bond, ...").default_value("Stock"))
                .arg(arg!(--basis <BASIS> "FIFO or Average").default_value("FIFO")),
        )
        .subcommand(
            Command::new("list")
                .about("List positions valued from cached quotes")
                .arg(account_opt())
                .arg(arg!(--all "Include closed positions")),
        )
        .subcommand(
            Command::new("rm")
                .about("Delete a security with its trades")
                .arg(id("id", "Security id")),
        )
        .subcommand(
            Command::new("financials")
                .about("Consolidated statements from a held company's SEC filings")
                .arg(id("company", "Company id"))
                .arg(arg!(--"type" <TYPE> "10-K or 10-Q").default_value("10-K"))
                .arg(
                    arg!(--limit <N> "Number of filings")
                        .value_parser(value_parser!(usize))
                        .default_value("3"),
                ),
        )
        .subcommand(
            Command::new("chart")
                .about("Monthly price history as chart data")
                .arg(id("id", "Security id"))
                .arg(
                    arg!(--days <DAYS> "Days of history")
                        .value_parser(value_parser!(u32))
                        .default_value("365"),
                ),
        )
}

fn trade_cmd() -> Command {
    let values = |c: Command| {
        c.arg(arg!(--amount <AMOUNT> "Cash amount"))
            .arg(arg!(--price <PRICE> "Price per share"))
            .arg(arg!(--shares <SHARES> "Shares, or split ratio"))
            .arg(arg!(--"tax-year" <YEAR> "Tax year").value_parser(value_parser!(i32)))
    };
    Command::new("trade")
        .about("Investment trades")
        .subcommand_required(true)
        .subcommand(values(
            Command::new("add")
                .about("Record a trade")
                .arg(account_opt())
                .arg(arg!(--symbol <SYMBOL> "Ticker symbol").required(true))
                .arg(arg!(--"type" <TYPE> "Buy, Sell, Dividend, Split, ...").required(true))
                .arg(arg!(--date <DATE> "YYYY-MM-DD").required(true)),
        ))
        .subcommand(values(
            Command::new("edit")
                .about("Change a trade")
                .arg(id("id", "Trade id"))
                .arg(arg!(--date <DATE> "YYYY-MM-DD")),
        ))
        .subcommand(Command::new("rm").about("Delete a trade").arg(id("id", "Trade id")))
        .subcommand(
            Command::new("list")
                .about("List trades")
                .arg(account_opt())
                .arg(arg!(--security <ID> "Security id").value_parser(value_parser!(i64))),
        )
}

fn gains_cmd() -> Command {
    Command::new("gains")
        .about("Realised gains")
        .subcommand_required(true)
        .subcommand(
            Command::new("list")
                .about("Gains by tax year")
                .arg(arg!(--year <YEAR> "Tax year").value_parser(value_parser!(i32)))
                .arg(arg!(--account <ID> "Account id").value_parser(value_parser!(i64))),
        )
        .subcommand(
            Command::new("show")
                .about("Lots matched by one sell")
                .arg(id("id", "Sell trade id")),
        )
}

fn payee_cmd() -> Command {
    Command::new("payee")
        .about("Payees")
        .subcommand_required(true)
        .subcommand(
            Command::new("list")
                .about("List payees")
                .arg(arg!(--account <ID> "Only payees used on this account").value_parser(value_parser!(i64))),
        )
        .subcommand(
            Command::new("merge")
                .about("Merge a payee, or every payee starting with its name, into another")
                .arg(id("into", "Payee to keep"))
                .arg(
                    Arg::new("from")
                        .help("Payee to merge away")
                        .value_parser(value_parser!(i64)),
                ),
        )
        .subcommand(
            Command::new("set-category")
                .about("Recategorise a payee's cash flows")
                .arg(id("id", "Payee id"))
                .arg(id("category", "Category id"))
                .arg(arg!(--all "Also recategorise already categorised rows")),
        )
}

fn category_cmd() -> Command {
    Command::new("category")
        .about("Categories")
        .subcommand_required(true)
        .subcommand(
            Command::new("add")
                .about("Add a category; use ':' for subcategories")
                .arg(arg!(--name <NAME> "Category name").required(true))
                .arg(arg!(--income "Income category")),
        )
        .subcommand(Command::new("list").about("List shared and own categories"))
}

fn tax_cmd() -> Command {
    Command::new("tax")
        .about("Tax entries and returns")
        .subcommand_required(true)
        .subcommand(
            Command::new("entries")
                .about("List the entries of a year")
                .arg(
                    Arg::new("year")
                        .required(true)
                        .value_parser(value_parser!(i32)),
                ),
        )
        .subcommand(
            Command::new("add-entry")
                .about("Enter a tax item amount")
                .arg(arg!(--year <YEAR> "Tax year").required(true).value_parser(value_parser!(i32)))
                .arg(arg!(--item <ITEM> "Tax item id").required(true).value_parser(value_parser!(i64)))
                .arg(arg!(--amount <AMOUNT> "Amount").required(true))
                .arg(arg!(--memo <MEMO> "Memo")),
        )
        .subcommand(
            Command::new("compute")
                .about("Create and compute a return")
                .arg(arg!(--year <YEAR> "Tax year").required(true).value_parser(value_parser!(i32)))
                .arg(arg!(--status <STATUS> "S, MFJ, MFS or HH").default_value("S"))
                .arg(
                    arg!(--exemptions <N> "Number of exemptions")
                        .default_value("0")
                        .value_parser(value_parser!(i64)),
                ),
        )
}

pub fn build_cli() -> Command {
    Command::new("bookkeeper")
        .version(clap::crate_version!())
        .about("Personal finance ledger: accounts, portfolio and taxes")
        .arg(
            arg!(--user <LOGIN> "Login to act as (multi-user mode)")
                .global(true)
                .default_value(DEFAULT_LOGIN),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print JSON instead of tables")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(Command::new("init").about("Create or migrate the database"))
        .subcommand(account_cmd())
        .subcommand(cash_flow_cmd())
        .subcommand(security_cmd())
        .subcommand(trade_cmd())
        .subcommand(
            Command::new("import")
                .about("Import a QIF or OFX file into an account")
                .arg(id("account", "Account id"))
                .arg(Arg::new("path").required(true).help("File to import")),
        )
        .subcommand(gains_cmd())
        .subcommand(payee_cmd())
        .subcommand(category_cmd())
        .subcommand(tax_cmd())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn parses_cash_flow_add() {
        let m = build_cli()
            .try_get_matches_from([
                "bookkeeper", "--json", "cf", "add", "--account", "3", "--date", "2024-01-05",
                "--amount", "12.50", "--type", "Credit", "--tax-year", "2023",
            ])
            .unwrap();
        assert!(m.get_flag("json"));
        let (_, cf) = m.subcommand().unwrap();
        let (verb, add) = cf.subcommand().unwrap();
        assert_eq!(verb, "add");
        assert_eq!(add.get_one::<i64>("account"), Some(&3));
        assert_eq!(add.get_one::<i32>("tax-year"), Some(&2023));
        assert_eq!(m.get_one::<String>("user").map(String::as_str), Some(DEFAULT_LOGIN));
    }

    #[test]
    fn ids_must_be_numeric() {
        assert!(build_cli().try_get_matches_from(["bookkeeper", "account", "show", "abc"]).is_err());
    }
}
