// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! A signed-in user's view of the engine. Every mutation runs in one
//! atomic block against the session's connection.

use crate::accounts::{self, NewAccount, Removal};
use crate::categories;
use crate::config::{Config, DEFAULT_CASHFLOW_LIMIT};
use crate::db;
use crate::errors::{Error, Result};
use crate::importer::{self, ImportOptions, ImportRow, ImportSummary};
use crate::ledger::{self, CashFlowInput, CashFlowUpdate, LedgerRow, RepeatInput, ScheduledRow, SplitInput};
use crate::models::{
    Account, AccountType, BasisType, CashFlow, Category, Company, Payee, RepeatInterval, Security,
    SecurityType, TaxEntry, TaxReturn, Trade, User,
};
use crate::payees;
use crate::portfolio::trades::{self, GainRow, TradeInput, TradeUpdate};
use crate::portfolio::{
    self, Filing, FilingFetcher, FilingType, QuoteCache, SecurityChart, YahooQuoteFetcher, chart, filings,
    securities,
};
use crate::tax::{NewTaxEntry, NewTaxReturn, entries, returns};
use crate::utils::today;
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

pub struct Session {
    conn: Connection,
    config: Config,
    user: User,
    quotes: Arc<QuoteCache>,
}

impl Session {
    /// Opens the configured database with a live quote source.
    pub fn open(config: Config, login: &str) -> Result<Session> {
        let conn = db::open(&config)?;
        let fetcher = YahooQuoteFetcher::new(config.global.quote_timeout_secs)?;
        Session::sign_in(conn, config, Arc::new(QuoteCache::new(fetcher)), login)
    }

    /// Binds `login` (created on first use) and posts every scheduled cash
    /// flow that has come due. Expansion failures are logged only.
    pub fn sign_in(conn: Connection, config: Config, quotes: Arc<QuoteCache>, login: &str) -> Result<Session> {
        let user = accounts::find_or_create_user(&conn, login)?;
        let mut session = Session {
            conn,
            config,
            user,
            quotes,
        };
        let posted = session.expand_all(today());
        info!("Signed in {} ({} scheduled cash flows posted)", session.user.login, posted);
        Ok(session)
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn quotes(&self) -> &Arc<QuoteCache> {
        &self.quotes
    }

    fn atomically<T>(&mut self, mut f: impl FnMut(&Connection, i64) -> Result<T>) -> Result<T> {
        let user_id = self.user.id;
        db::atomically(&mut self.conn, |tx| f(tx, user_id))
    }

    /// Expands the schedules of every account as of `day`, one account per
    /// transaction.
    pub fn expand_all(&mut self, day: NaiveDate) -> usize {
        let scheduled: Vec<i64> = match accounts::list(&self.conn, self.user.id, true) {
            Ok(list) => list.into_iter().filter(|a| a.has_scheduled).map(|a| a.id).collect(),
            Err(e) => {
                error!("Listing accounts of user {} failed: {}", self.user.id, e);
                return 0;
            }
        };
        let mut posted = 0;
        for id in scheduled {
            match self.atomically(|c, u| ledger::expand_account(c, u, id, day)) {
                Ok(n) => posted += n,
                Err(e) => error!("Scheduled expansion of account {} failed: {}", id, e),
            }
        }
        posted
    }

    /// Page size of cash-flow listings: the user's, else the configured one.
    pub fn cashflow_limit(&self) -> usize {
        if self.user.cashflow_limit > 0 {
            self.user.cashflow_limit
        } else if self.config.global.cashflow_limit > 0 {
            self.config.global.cashflow_limit
        } else {
            DEFAULT_CASHFLOW_LIMIT
        }
    }

    pub fn set_cashflow_limit(&mut self, limit: usize) -> Result<()> {
        accounts::set_cashflow_limit(&self.conn, self.user.id, limit)?;
        self.user.cashflow_limit = limit;
        Ok(())
    }

    // accounts

    pub fn create_account(&mut self, new: &NewAccount) -> Result<Account> {
        self.atomically(|c, u| accounts::create(c, u, new))
    }

    pub fn accounts(&self, include_hidden: bool) -> Result<Vec<Account>> {
        accounts::list(&self.conn, self.user.id, include_hidden)
    }

    pub fn account(&self, id: i64) -> Result<Account> {
        accounts::get(&self.conn, self.user.id, id)
    }

    pub fn update_account(
        &mut self,
        id: i64,
        name: Option<&str>,
        account_type: Option<AccountType>,
        taxable: Option<bool>,
    ) -> Result<Account> {
        self.atomically(|c, u| accounts::update(c, u, id, name, account_type, taxable))
    }

    pub fn delete_account(&mut self, id: i64) -> Result<Removal> {
        self.atomically(|c, u| accounts::delete(c, u, id))
    }

    // cash flows

    pub fn create_cash_flow(&mut self, input: &CashFlowInput) -> Result<CashFlow> {
        self.atomically(|c, u| ledger::create(c, u, input))
    }

    pub fn create_split(&mut self, parent_id: i64, split: &SplitInput) -> Result<CashFlow> {
        self.atomically(|c, u| ledger::create_split(c, u, parent_id, split))
    }

    pub fn update_cash_flow(&mut self, id: i64, upd: &CashFlowUpdate) -> Result<CashFlow> {
        self.atomically(|c, u| ledger::update(c, u, id, upd))
    }

    pub fn update_repeat(&mut self, template_id: i64, repeat: &RepeatInput) -> Result<RepeatInterval> {
        self.atomically(|c, u| ledger::update_repeat(c, u, template_id, repeat))
    }

    pub fn delete_cash_flow(&mut self, id: i64) -> Result<()> {
        self.atomically(|c, u| ledger::delete(c, u, id))
    }

    /// Newest first. With `since` every row from that date on is returned,
    /// otherwise one page of `cashflow_limit` rows.
    pub fn cash_flows(&self, account_id: i64, since: Option<NaiveDate>) -> Result<Vec<LedgerRow>> {
        let limit = match since {
            Some(_) => None,
            None => Some(self.cashflow_limit()),
        };
        ledger::list(&self.conn, self.user.id, account_id, limit, since)
    }

    pub fn splits(&self, parent_id: i64) -> Result<(Vec<CashFlow>, Decimal)> {
        ledger::list_splits(&self.conn, self.user.id, parent_id)
    }

    pub fn scheduled(&self, account_id: i64) -> Result<Vec<ScheduledRow>> {
        ledger::list_scheduled(&self.conn, self.user.id, account_id)
    }

    pub fn apply_scheduled(&mut self, template_id: i64) -> Result<usize> {
        let day = today();
        self.atomically(|c, u| ledger::apply_scheduled(c, u, template_id, day))
    }

    // payees & categories

    pub fn payees(&self, account_id: Option<i64>) -> Result<Vec<Payee>> {
        payees::list(&self.conn, self.user.id, account_id)
    }

    pub fn update_payee(
        &mut self,
        id: i64,
        name: Option<&str>,
        category_id: Option<Option<i64>>,
        skip_on_import: Option<bool>,
    ) -> Result<Payee> {
        self.atomically(|c, u| payees::update(c, u, id, name, category_id, skip_on_import))
    }

    pub fn delete_payee(&mut self, id: i64) -> Result<bool> {
        self.atomically(|c, u| payees::delete(c, u, id))
    }

    pub fn merge_payees(&mut self, into_id: i64, from_id: i64) -> Result<usize> {
        self.atomically(|c, u| payees::merge(c, u, into_id, from_id))
    }

    pub fn merge_duplicate_payees(&mut self, into_id: i64) -> Result<usize> {
        self.atomically(|c, u| payees::merge_duplicates(c, u, into_id))
    }

    pub fn set_payee_category(&mut self, payee_id: i64, category_id: i64, to_all: bool) -> Result<usize> {
        self.atomically(|c, u| payees::set_category(c, u, payee_id, category_id, to_all))
    }

    pub fn categories(&self) -> Result<Vec<Category>> {
        categories::list(&self.conn, self.user.id)
    }

    pub fn create_category(&mut self, name: &str, income: bool) -> Result<Category> {
        self.atomically(|c, u| categories::create(c, u, name, income))
    }

    // securities, trades & gains

    pub fn create_security(&mut self, account_id: i64, new: &securities::NewSecurity) -> Result<Security> {
        self.atomically(|c, u| securities::create(c, u, account_id, new))
    }

    /// Positions valued from cached quotes; refreshes run in the background.
    pub fn securities(&mut self, account_id: i64, include_closed: bool) -> Result<Vec<Security>> {
        let quotes = Arc::clone(&self.quotes);
        self.atomically(|c, u| portfolio::list_valued(c, u, account_id, include_closed, &quotes))
    }

    pub fn update_security(
        &mut self,
        id: i64,
        security_type: Option<SecurityType>,
        basis_type: Option<BasisType>,
    ) -> Result<Security> {
        self.atomically(|c, u| securities::update(c, u, id, security_type, basis_type))
    }

    pub fn delete_security(&mut self, id: i64) -> Result<()> {
        self.atomically(|c, u| securities::delete(c, u, id))
    }

    pub fn create_trade(&mut self, input: &TradeInput) -> Result<Trade> {
        let quotes = Arc::clone(&self.quotes);
        self.atomically(|c, u| trades::create(c, u, input, Some(quotes.as_ref())))
    }

    pub fn update_trade(&mut self, id: i64, upd: &TradeUpdate) -> Result<Trade> {
        let quotes = Arc::clone(&self.quotes);
        self.atomically(|c, u| trades::update(c, u, id, upd, Some(quotes.as_ref())))
    }

    pub fn delete_trade(&mut self, id: i64) -> Result<()> {
        self.atomically(|c, u| trades::delete(c, u, id))
    }

    pub fn trades(&self, account_id: i64, security_id: Option<i64>) -> Result<Vec<Trade>> {
        trades::list(&self.conn, self.user.id, account_id, security_id)
    }

    pub fn gains(&self, year: Option<i32>, account_id: Option<i64>) -> Result<Vec<GainRow>> {
        trades::list_gains(&self.conn, self.user.id, year, account_id)
    }

    pub fn sell_gains(&self, sell_id: i64) -> Result<Vec<GainRow>> {
        trades::gains_for_sell(&self.conn, self.user.id, sell_id)
    }

    /// Latest filings of a company held by the user. Needs
    /// `enable_security_filings`.
    pub fn company_financials(
        &self,
        company_id: i64,
        form: FilingType,
        limit: usize,
        fetcher: &dyn FilingFetcher,
    ) -> Result<(Company, Vec<Filing>)> {
        if !self.config.global.enable_security_filings {
            return Err(Error::invalid("Security filings are disabled"));
        }
        filings::company_financials(&self.conn, self.user.id, company_id, form, limit, fetcher)
    }

    /// Needs `enable_security_charts`.
    pub fn security_chart(&self, security_id: i64, days: u32) -> Result<SecurityChart> {
        if !self.config.global.enable_security_charts {
            return Err(Error::invalid("Security charts are disabled"));
        }
        chart::security_chart(&self.conn, self.user.id, security_id, days, today())
    }

    // imports

    pub fn import_file(&mut self, account_id: i64, path: &Path) -> Result<ImportSummary> {
        let opts = ImportOptions {
            trade_fixups: self.config.global.enable_import_trade_fixups,
        };
        importer::import_file(
            &mut self.conn,
            self.user.id,
            account_id,
            path,
            opts,
            Some(self.quotes.as_ref()),
        )
    }

    pub fn imports(&self, account_id: i64) -> Result<Vec<ImportRow>> {
        importer::list(&self.conn, self.user.id, account_id)
    }

    pub fn undo_import(&mut self, import_id: i64) -> Result<usize> {
        self.atomically(|c, u| importer::undo(c, u, import_id))
    }

    // taxes

    fn auto_taxes(&self) -> bool {
        self.config.global.enable_auto_taxes
    }

    pub fn tax_entries(&self, year: i32) -> Result<Vec<TaxEntry>> {
        entries::list(&self.conn, self.user.id, year, self.auto_taxes())
    }

    pub fn add_tax_entry(&mut self, new: &NewTaxEntry) -> Result<TaxEntry> {
        self.atomically(|c, u| entries::create(c, u, new))
    }

    pub fn update_tax_entry(&mut self, id: i64, new: &NewTaxEntry) -> Result<TaxEntry> {
        self.atomically(|c, u| entries::update(c, u, id, new))
    }

    pub fn delete_tax_entry(&mut self, id: i64) -> Result<()> {
        self.atomically(|c, u| entries::delete(c, u, id))
    }

    pub fn create_tax_return(&mut self, new: &NewTaxReturn) -> Result<TaxReturn> {
        let auto = self.auto_taxes();
        self.atomically(|c, u| returns::create(c, u, new, auto))
    }

    pub fn tax_return(&self, id: i64) -> Result<TaxReturn> {
        returns::get(&self.conn, self.user.id, id)
    }

    pub fn tax_returns(&self, year: Option<i32>) -> Result<Vec<TaxReturn>> {
        returns::list(&self.conn, self.user.id, year)
    }

    pub fn recalculate_tax_return(&mut self, id: i64) -> Result<TaxReturn> {
        let auto = self.auto_taxes();
        self.atomically(|c, u| returns::recalculate(c, u, id, auto))
    }

    pub fn delete_tax_return(&mut self, id: i64) -> Result<()> {
        self.atomically(|c, u| returns::delete(c, u, id))
    }
}
