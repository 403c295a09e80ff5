// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::db::{bool_at, decimal_at};
use crate::errors::{Error, Result};
use chrono::NaiveDate;
use rusqlite::Row;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Enums whose variants are stored as well-known integer ids.
macro_rules! id_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $id:literal => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn id(self) -> i64 {
                match self {
                    $($name::$variant => $id),+
                }
            }

            pub fn from_id(id: i64) -> Result<Self> {
                match id {
                    $($id => Ok($name::$variant),)+
                    other => Err(Error::invalid(format!(
                        "Unknown {} id {}",
                        stringify!($name),
                        other
                    ))),
                }
            }

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Case-insensitive lookup by label.
            pub fn from_label(s: &str) -> Result<Self> {
                let wanted = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.label().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| Error::invalid(format!(
                        "Unknown {} '{}'",
                        stringify!($name),
                        wanted
                    )))
            }
        }
    };
}

id_enum!(AccountType {
    Cash = 1 => "Cash",
    Deposit = 2 => "Deposit",
    CreditCard = 3 => "CreditCard",
    Investment = 4 => "Investment",
    HealthCare = 5 => "HealthCare",
    Loan = 6 => "Loan",
    Asset = 7 => "Asset",
    Crypto = 8 => "Crypto",
});

id_enum!(
    /// Direction requested when entering a cash flow; amounts arrive positive.
    CashFlowType {
        Debit = 1 => "Debit",
        Credit = 2 => "Credit",
        DebitTransfer = 3 => "DebitTransfer",
        CreditTransfer = 4 => "CreditTransfer",
    }
);

impl CashFlowType {
    pub fn is_transfer(self) -> bool {
        matches!(self, CashFlowType::DebitTransfer | CashFlowType::CreditTransfer)
    }

    pub fn is_debit(self) -> bool {
        matches!(self, CashFlowType::Debit | CashFlowType::DebitTransfer)
    }

    /// Signed amount for a magnitude entered by the user.
    pub fn apply(self, magnitude: Decimal) -> Decimal {
        if self.is_debit() {
            -magnitude.abs()
        } else {
            magnitude.abs()
        }
    }

    pub fn from_signed(amount: Decimal, transfer: bool) -> Self {
        match (amount.is_sign_negative() && !amount.is_zero(), transfer) {
            (true, false) => CashFlowType::Debit,
            (false, false) => CashFlowType::Credit,
            (true, true) => CashFlowType::DebitTransfer,
            (false, true) => CashFlowType::CreditTransfer,
        }
    }
}

id_enum!(
    /// Investment trade kinds; ids follow the QIF action table.
    TradeType {
        Buy = 1 => "Buy",
        Sell = 2 => "Sell",
        Dividend = 3 => "Dividend",
        Distribution = 4 => "Distribution",
        ReinvestedDividend = 5 => "Reinvested Dividend",
        ReinvestedDistribution = 6 => "Reinvested Distribution",
        SharesIn = 7 => "Shares In",
        SharesOut = 8 => "Shares Out",
        Split = 9 => "Split",
    }
);

impl TradeType {
    /// Maps a QIF investment action code.
    pub fn from_qif_action(action: &str) -> Option<Self> {
        let lower = action.trim().to_ascii_lowercase();
        // BuyX/SellX/DivX move cash through another account
        let code = lower.strip_suffix('x').unwrap_or(&lower);
        Some(match code {
            "buy" => TradeType::Buy,
            "sell" => TradeType::Sell,
            "div" | "intinc" => TradeType::Dividend,
            "cglong" | "cgmid" | "cgshort" => TradeType::Distribution,
            "reinvdiv" | "reinvint" => TradeType::ReinvestedDividend,
            "reinvlg" | "reinvmd" | "reinvsh" => TradeType::ReinvestedDistribution,
            "stksplit" => TradeType::Split,
            "shrsin" => TradeType::SharesIn,
            "shrsout" => TradeType::SharesOut,
            _ => return None,
        })
    }

    /// Cash effect on the owning account, `None` when no cash moves.
    pub fn cash_flow_type(self) -> Option<CashFlowType> {
        match self {
            TradeType::Buy => Some(CashFlowType::Debit),
            TradeType::Sell | TradeType::Dividend | TradeType::Distribution => {
                Some(CashFlowType::Credit)
            }
            _ => None,
        }
    }

    pub fn is_reinvest(self) -> bool {
        matches!(
            self,
            TradeType::ReinvestedDividend | TradeType::ReinvestedDistribution
        )
    }

    /// Buys and reinvestments open lots.
    pub fn opens_lot(self) -> bool {
        matches!(self, TradeType::Buy) || self.is_reinvest()
    }

    pub fn changes_shares(self) -> bool {
        !matches!(self, TradeType::Dividend | TradeType::Distribution)
    }
}

id_enum!(SecurityType {
    Stock = 1 => "Stock",
    MutualFund = 2 => "Mutual Fund",
    Bond = 3 => "Bond",
    BondFund = 4 => "Bond Fund",
    MoneyMarket = 5 => "Money Market",
    Currency = 6 => "Currency",
    ForeignStock = 7 => "Foreign Stock",
    ForeignStockFund = 8 => "Foreign Stock Fund",
    ForeignBond = 9 => "Foreign Bond",
    ForeignBondFund = 10 => "Foreign Bond Fund",
    OtherStock = 13 => "Other Stock",
    OtherFunds = 14 => "Other Funds",
    Commodities = 15 => "Commodities",
    PreciousMetal = 16 => "Precious Metal",
    RealEstate = 17 => "Real Estate",
    Other = 18 => "Other",
    Options = 19 => "Options",
    Cryptocurrency = 20 => "Cryptocurrency",
});

impl SecurityType {
    pub fn price_fetchable(self) -> bool {
        matches!(
            self,
            SecurityType::Stock | SecurityType::MutualFund | SecurityType::BondFund
        )
    }
}

id_enum!(BasisType {
    Fifo = 1 => "FIFO",
    Average = 2 => "Average",
});

id_enum!(FilingStatus {
    Single = 1 => "S",
    MarriedJointly = 2 => "MFJ",
    MarriedSeparately = 3 => "MFS",
    HeadOfHousehold = 4 => "HH",
});

id_enum!(TaxType {
    Income = 1 => "Income",
    IncomeCapitalGain = 2 => "Capital Gain Income",
    DeductionsForAgi = 3 => "Deductions For AGI",
    DeductionsFromAgi = 4 => "Deductions From AGI",
    ItemizedDeduction = 5 => "Itemized Deduction",
    Tax = 6 => "Tax",
    Credits = 7 => "Credits",
    Payments = 8 => "Payments",
});

impl TaxType {
    /// Debits mapped to these types are reported as positive amounts.
    pub fn flips_automatic(self) -> bool {
        matches!(
            self,
            TaxType::ItemizedDeduction | TaxType::Credits | TaxType::Payments
        )
    }
}

pub const CATEGORY_UNCATEGORIZED: i64 = 1;
pub const CATEGORY_INTEREST: i64 = 34;
pub const CATEGORY_MORTGAGE_INTEREST: i64 = 35;
pub const CATEGORY_INTEREST_INCOME: i64 = 74;
pub const TAX_REGION_FEDERAL: i64 = 1;
pub const UNKNOWN_PAYEE: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CashFlowKind {
    /// Contributes to the account balance.
    Posted,
    /// Child of a split parent; never posted itself.
    Split,
    /// Scheduled template.
    Repeat,
    /// Cash side of a trade.
    Trade,
}

impl CashFlowKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CashFlowKind::Posted => "posted",
            CashFlowKind::Split => "split",
            CashFlowKind::Repeat => "repeat",
            CashFlowKind::Trade => "trade",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "posted" => Ok(CashFlowKind::Posted),
            "split" => Ok(CashFlowKind::Split),
            "repeat" => Ok(CashFlowKind::Repeat),
            "trade" => Ok(CashFlowKind::Trade),
            other => Err(Error::invalid(format!("Unknown cash flow kind '{}'", other))),
        }
    }

    pub fn posts(self) -> bool {
        matches!(self, CashFlowKind::Posted | CashFlowKind::Trade)
    }
}

fn conversion<T>(idx: usize, res: Result<T>) -> rusqlite::Result<T> {
    res.map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Integer,
            Box::new(std::io::Error::other(e.to_string())),
        )
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub cashflow_limit: usize,
}

impl User {
    pub(crate) const COLUMNS: &'static str = "id, login, cashflow_limit";

    pub(crate) fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            login: r.get(1)?,
            cashflow_limit: r.get::<_, i64>(2)?.max(0) as usize,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub account_type: AccountType,
    pub currency: String,
    pub name: String,
    pub cash_balance: Decimal,
    pub taxable: bool,
    pub hidden: bool,
    pub has_scheduled: bool,
}

impl Account {
    pub(crate) const COLUMNS: &'static str =
        "id, user_id, account_type_id, currency, name, cash_balance, taxable, hidden, has_scheduled";

    pub(crate) fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            user_id: r.get(1)?,
            account_type: conversion(2, AccountType::from_id(r.get(2)?))?,
            currency: r.get(3)?,
            name: r.get(4)?,
            cash_balance: decimal_at(r, 5)?,
            taxable: bool_at(r, 6)?,
            hidden: bool_at(r, 7)?,
            has_scheduled: bool_at(r, 8)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub user_id: Option<i64>,
    pub category_type_id: i64,
    pub name: String,
    pub omit_from_pie: bool,
}

impl Category {
    pub(crate) const COLUMNS: &'static str =
        "id, user_id, category_type_id, name, omit_from_pie";

    pub(crate) fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            user_id: r.get(1)?,
            category_type_id: r.get(2)?,
            name: r.get(3)?,
            omit_from_pie: bool_at(r, 4)?,
        })
    }

    pub fn is_interest_income(&self) -> bool {
        self.id == CATEGORY_INTEREST_INCOME
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payee {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub category_id: Option<i64>,
    pub skip_on_import: bool,
}

impl Payee {
    pub(crate) const COLUMNS: &'static str = "id, user_id, name, category_id, skip_on_import";

    pub(crate) fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            user_id: r.get(1)?,
            name: r.get(2)?,
            category_id: r.get(3)?,
            skip_on_import: bool_at(r, 4)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashFlow {
    pub id: i64,
    pub account_id: i64,
    pub date: NaiveDate,
    pub tax_year: i32,
    pub amount: Decimal,
    pub kind: CashFlowKind,
    pub transfer: bool,
    pub payee_id: Option<i64>,
    pub category_id: Option<i64>,
    pub peer_id: Option<i64>,
    pub peer_account_id: Option<i64>,
    pub parent_id: Option<i64>,
    pub has_splits: bool,
    pub import_id: Option<i64>,
    pub trade_id: Option<i64>,
    pub transnum: String,
    pub memo: String,
}

impl CashFlow {
    pub(crate) const COLUMNS: &'static str = "id, account_id, date, tax_year, amount, kind, transfer, payee_id, category_id, peer_id, peer_account_id, parent_id, has_splits, import_id, trade_id, transnum, memo";

    pub(crate) fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        let kind: String = r.get(5)?;
        Ok(Self {
            id: r.get(0)?,
            account_id: r.get(1)?,
            date: r.get(2)?,
            tax_year: r.get(3)?,
            amount: decimal_at(r, 4)?,
            kind: conversion(5, CashFlowKind::parse(&kind))?,
            transfer: bool_at(r, 6)?,
            payee_id: r.get(7)?,
            category_id: r.get(8)?,
            peer_id: r.get(9)?,
            peer_account_id: r.get(10)?,
            parent_id: r.get(11)?,
            has_splits: bool_at(r, 12)?,
            import_id: r.get(13)?,
            trade_id: r.get(14)?,
            transnum: r.get(15)?,
            memo: r.get(16)?,
        })
    }

    pub fn cash_flow_type(&self) -> CashFlowType {
        CashFlowType::from_signed(self.amount, self.transfer)
    }

    pub fn is_split_child(&self) -> bool {
        self.kind == CashFlowKind::Split
    }

    pub fn is_scheduled(&self) -> bool {
        self.kind == CashFlowKind::Repeat
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepeatInterval {
    pub id: i64,
    pub cash_flow_id: i64,
    pub interval_type_id: i64,
    pub days: u32,
    pub repeats_left: Option<i64>,
    pub start_day: u32,
    pub rate: Decimal,
}

impl RepeatInterval {
    pub(crate) const COLUMNS: &'static str = "ri.id, ri.cash_flow_id, ri.repeat_interval_type_id, t.days, ri.repeats_left, ri.start_day, ri.rate";

    pub(crate) fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            cash_flow_id: r.get(1)?,
            interval_type_id: r.get(2)?,
            days: r.get(3)?,
            repeats_left: r.get(4)?,
            start_day: r.get(5)?,
            rate: decimal_at(r, 6)?,
        })
    }

    pub fn is_active(&self) -> bool {
        self.repeats_left.is_none_or(|n| n > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Security {
    pub id: i64,
    pub account_id: i64,
    pub company_id: i64,
    pub security_type: SecurityType,
    pub basis_type: BasisType,
    pub shares: Decimal,
    pub basis: Decimal,
    pub value: Decimal,
    pub last_quote_update: Option<NaiveDate>,
    pub symbol: String,
    pub name: String,
}

impl Security {
    pub(crate) const COLUMNS: &'static str = "s.id, s.account_id, s.company_id, s.security_type_id, s.basis_type_id, s.shares, s.basis, s.value, s.last_quote_update, c.symbol, c.name";

    pub(crate) fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            account_id: r.get(1)?,
            company_id: r.get(2)?,
            security_type: conversion(3, SecurityType::from_id(r.get(3)?))?,
            basis_type: conversion(4, BasisType::from_id(r.get(4)?))?,
            shares: decimal_at(r, 5)?,
            basis: decimal_at(r, 6)?,
            value: decimal_at(r, 7)?,
            last_quote_update: r.get(8)?,
            symbol: r.get(9)?,
            name: r.get(10)?,
        })
    }

    /// Price implied by the stored value.
    pub fn price(&self) -> Decimal {
        if self.shares.is_zero() {
            Decimal::ZERO
        } else {
            crate::utils::round_bank(self.value / self.shares, 2)
        }
    }

    pub fn basis_price(&self) -> Decimal {
        if self.shares.is_zero() {
            Decimal::ZERO
        } else {
            crate::utils::round_bank(self.basis / self.shares, 2)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub account_id: i64,
    pub security_id: i64,
    pub trade_type: TradeType,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub price: Decimal,
    pub shares: Decimal,
    pub adjusted_shares: Decimal,
    pub basis: Decimal,
    pub closed: bool,
    pub tax_year: i32,
    pub import_id: Option<i64>,
}

impl Trade {
    pub(crate) const COLUMNS: &'static str = "id, account_id, security_id, trade_type_id, date, amount, price, shares, adjusted_shares, basis, closed, tax_year, import_id";

    pub(crate) fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            account_id: r.get(1)?,
            security_id: r.get(2)?,
            trade_type: conversion(3, TradeType::from_id(r.get(3)?))?,
            date: r.get(4)?,
            amount: decimal_at(r, 5)?,
            price: decimal_at(r, 6)?,
            shares: decimal_at(r, 7)?,
            adjusted_shares: decimal_at(r, 8)?,
            basis: decimal_at(r, 9)?,
            closed: bool_at(r, 10)?,
            tax_year: r.get(11)?,
            import_id: r.get(12)?,
        })
    }

    /// Realised gain of a sell.
    pub fn gain(&self) -> Decimal {
        self.amount - self.basis
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeGain {
    pub id: i64,
    pub sell_id: i64,
    pub buy_id: i64,
    pub shares: Decimal,
    pub days_held: i64,
    pub basis: Decimal,
}

impl TradeGain {
    pub(crate) const COLUMNS: &'static str = "id, sell_id, buy_id, shares, days_held, basis";

    pub(crate) fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            sell_id: r.get(1)?,
            buy_id: r.get(2)?,
            shares: decimal_at(r, 3)?,
            days_held: r.get(4)?,
            basis: decimal_at(r, 5)?,
        })
    }

    pub fn is_long_term(&self) -> bool {
        self.days_held > 365
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Import {
    pub id: i64,
    pub account_id: i64,
    pub created_on: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxEntry {
    pub id: i64,
    pub user_id: i64,
    pub year: NaiveDate,
    pub tax_item_id: i64,
    pub tax_region_id: i64,
    pub tax_type: TaxType,
    pub amount: Decimal,
    pub memo: String,
    /// Synthesised from categorised cash flows or realised gains.
    pub automatic: bool,
}

impl TaxEntry {
    pub(crate) const COLUMNS: &'static str =
        "id, user_id, year, tax_item_id, tax_region_id, tax_type_id, amount, memo";

    pub(crate) fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            user_id: r.get(1)?,
            year: r.get(2)?,
            tax_item_id: r.get(3)?,
            tax_region_id: r.get(4)?,
            tax_type: conversion(5, TaxType::from_id(r.get(5)?))?,
            amount: decimal_at(r, 6)?,
            memo: r.get(7)?,
            automatic: false,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxReturn {
    pub id: i64,
    pub user_id: i64,
    pub year: i32,
    pub filing_status: i64,
    pub tax_region_id: i64,
    pub exemptions: i64,
    pub income: Decimal,
    pub agi_income: Decimal,
    pub taxable_income: Decimal,
    pub for_agi: Decimal,
    pub from_agi: Decimal,
    pub standard_deduction: Decimal,
    pub itemized_deduction: Decimal,
    pub exemption: Decimal,
    pub credits: Decimal,
    pub payments: Decimal,
    pub base_tax: Decimal,
    pub other_tax: Decimal,
    pub total_tax: Decimal,
    pub owed_tax: Decimal,
    pub long_capgain_income: Decimal,
}

impl TaxReturn {
    pub(crate) const COLUMNS: &'static str = "id, user_id, year, filing_status, tax_region_id, exemptions, income, agi_income, taxable_income, for_agi, from_agi, standard_deduction, itemized_deduction, exemption, credits, payments, base_tax, other_tax, total_tax, owed_tax, long_capgain_income";

    pub(crate) fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            user_id: r.get(1)?,
            year: r.get(2)?,
            filing_status: r.get(3)?,
            tax_region_id: r.get(4)?,
            exemptions: r.get(5)?,
            income: decimal_at(r, 6)?,
            agi_income: decimal_at(r, 7)?,
            taxable_income: decimal_at(r, 8)?,
            for_agi: decimal_at(r, 9)?,
            from_agi: decimal_at(r, 10)?,
            standard_deduction: decimal_at(r, 11)?,
            itemized_deduction: decimal_at(r, 12)?,
            exemption: decimal_at(r, 13)?,
            credits: decimal_at(r, 14)?,
            payments: decimal_at(r, 15)?,
            base_tax: decimal_at(r, 16)?,
            other_tax: decimal_at(r, 17)?,
            total_tax: decimal_at(r, 18)?,
            owed_tax: decimal_at(r, 19)?,
            long_capgain_income: decimal_at(r, 20)?,
        })
    }
}
