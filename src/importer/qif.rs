// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Quicken interchange format: banking and investment sections.

use super::{BankRecord, Entry, SplitLine, TradeRecord};
use crate::errors::{Error, Result};
use crate::utils::parse_decimal;
use chrono::NaiveDate;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Bank,
    Invest,
    Other,
}

fn section_of(header: &str) -> Section {
    let h = header.trim().to_ascii_lowercase();
    match h.strip_prefix("!type:").map(str::trim) {
        Some("bank" | "cash" | "ccard" | "oth a" | "oth l") => Section::Bank,
        Some("invst") => Section::Invest,
        _ => Section::Other,
    }
}

/// `MM/DD/YY`, `MM/DD'YY` or `MM/DD/YYYY`, spaces allowed. An apostrophe
/// marks a 2000s year; a two-digit year after a slash below 50 does too.
pub fn parse_qif_date(s: &str) -> Result<NaiveDate> {
    let bad = || Error::ImportFailure(format!("bad QIF date '{}'", s.trim()));
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    let apostrophe = compact.contains('\'');
    let parts: Vec<&str> = compact.split(['/', '\'', '-']).collect();
    if parts.len() != 3 {
        return Err(bad());
    }
    let month: u32 = parts[0].parse().map_err(|_| bad())?;
    let day: u32 = parts[1].parse().map_err(|_| bad())?;
    let mut year: i32 = parts[2].parse().map_err(|_| bad())?;
    if parts[2].len() <= 2 {
        year += if apostrophe || year < 50 { 2000 } else { 1900 };
    }
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(bad)
}

fn amount(v: &str, line: usize) -> Result<Decimal> {
    parse_decimal(v).map_err(|_| Error::ImportFailure(format!("line {}: bad amount '{}'", line, v)))
}

/// `[Account]` names a transfer; a `/class` suffix is dropped.
fn category_field(v: &str) -> (Option<String>, Option<String>) {
    let v = v.split('/').next().unwrap_or_default().trim();
    if let Some(inner) = v.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        (None, Some(inner.trim().to_string()).filter(|s| !s.is_empty()))
    } else {
        (Some(v.to_string()).filter(|s| !s.is_empty()), None)
    }
}

#[derive(Default)]
struct Pending {
    date: Option<NaiveDate>,
    amount: Option<Decimal>,
    payee: String,
    memo: String,
    number: String,
    category: Option<String>,
    transfer: Option<String>,
    splits: Vec<SplitLine>,
    action: String,
    security: String,
    price: Decimal,
    shares: Decimal,
    commission: Decimal,
    touched: bool,
}

impl Pending {
    fn finish(self, section: Section, line: usize) -> Result<Option<Entry>> {
        if !self.touched || section == Section::Other {
            return Ok(None);
        }
        let date = self
            .date
            .ok_or_else(|| Error::ImportFailure(format!("line {}: record without a date", line)))?;
        Ok(Some(match section {
            Section::Bank => Entry::Bank(BankRecord {
                date,
                amount: self.amount.unwrap_or_default(),
                payee: self.payee,
                memo: self.memo,
                transnum: self.number,
                // a split record's L line only says "--Splits--"
                category: if self.splits.is_empty() { self.category } else { None },
                transfer_account: if self.splits.is_empty() { self.transfer } else { None },
                splits: self.splits,
                unique: false,
            }),
            _ => Entry::Trade(TradeRecord {
                date,
                action: self.action,
                security: self.security,
                price: self.price,
                shares: self.shares,
                amount: self.amount.unwrap_or_default().abs(),
                commission: self.commission,
                memo: self.memo,
            }),
        }))
    }
}

/// Parses a QIF document into importable entries. Sections other than
/// banking and investment transactions are skipped.
pub fn parse(text: &str) -> Result<Vec<Entry>> {
    let mut section = None;
    let mut pending = Pending::default();
    let mut out = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let lineno = idx + 1;
        let line = raw.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        if line.starts_with('!') {
            if line.to_ascii_lowercase().starts_with("!option") {
                continue;
            }
            section = Some(section_of(line));
            pending = Pending::default();
            continue;
        }
        let Some(current) = section else {
            return Err(Error::ImportFailure("QIF file has no !Type header".into()));
        };
        let mut chars = line.chars();
        let code = chars.next().unwrap_or('^');
        let value = chars.as_str().trim();
        if code == '^' {
            let done = std::mem::take(&mut pending);
            if let Some(entry) = done.finish(current, lineno)? {
                out.push(entry);
            }
            continue;
        }
        if current == Section::Other {
            continue;
        }
        pending.touched = true;
        match (current, code) {
            (_, 'D') => pending.date = Some(parse_qif_date(value)?),
            (_, 'T') => pending.amount = Some(amount(value, lineno)?),
            (_, 'U') if pending.amount.is_none() => pending.amount = Some(amount(value, lineno)?),
            (_, 'M') => pending.memo = value.to_string(),
            (Section::Bank, 'P') => pending.payee = value.to_string(),
            (Section::Bank, 'N') => pending.number = value.to_string(),
            (Section::Bank, 'L') => {
                let (category, transfer) = category_field(value);
                pending.category = category;
                pending.transfer = transfer;
            }
            (Section::Bank, 'S') => {
                let (category, transfer) = category_field(value);
                pending.splits.push(SplitLine {
                    category,
                    memo: transfer.unwrap_or_default(),
                    amount: Decimal::ZERO,
                });
            }
            (Section::Bank, 'E') => {
                if let Some(split) = pending.splits.last_mut() {
                    split.memo = value.to_string();
                }
            }
            (Section::Bank, '$') => {
                if let Some(split) = pending.splits.last_mut() {
                    split.amount = amount(value, lineno)?;
                }
            }
            (Section::Invest, 'N') => pending.action = value.to_string(),
            (Section::Invest, 'Y') => pending.security = value.to_string(),
            (Section::Invest, 'I') => pending.price = amount(value, lineno)?,
            (Section::Invest, 'Q') => pending.shares = amount(value, lineno)?,
            (Section::Invest, 'O') => pending.commission = amount(value, lineno)?,
            (Section::Invest, 'P') if pending.memo.is_empty() => pending.memo = value.to_string(),
            _ => {}
        }
    }
    if let Some(current) = section {
        if let Some(entry) = pending.finish(current, text.lines().count())? {
            out.push(entry);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn date_forms() {
        assert_eq!(parse_qif_date("1/ 5'24").unwrap(), d(2024, 1, 5));
        assert_eq!(parse_qif_date("12/31/99").unwrap(), d(1999, 12, 31));
        assert_eq!(parse_qif_date("03/07/2023").unwrap(), d(2023, 3, 7));
        assert_eq!(parse_qif_date(" 2/29/24").unwrap(), d(2024, 2, 29));
        assert!(parse_qif_date("2/30/24").is_err());
        assert!(parse_qif_date("yesterday").is_err());
    }

    #[test]
    fn banking_with_transfer_and_splits() {
        let text = "!Type:Bank\n\
            D1/ 5'24\nT-1,234.50\nPLandlord\nN1001\nLRent\n^\n\
            D1/ 6'24\nT-200.00\nPTransfer\nL[Savings]\n^\n\
            D1/ 7'24\nU-75.00\nPMarket\nL--Splits--\nSFood:Groceries\nEweekly\n$-50.00\nSHousehold\n$-25.00\n^\n";
        let entries = parse(text).unwrap();
        assert_eq!(entries.len(), 3);
        let Entry::Bank(rent) = &entries[0] else { panic!("expected bank record") };
        assert_eq!(rent.amount, dec!(-1234.50));
        assert_eq!(rent.transnum, "1001");
        assert_eq!(rent.category.as_deref(), Some("Rent"));
        let Entry::Bank(xfer) = &entries[1] else { panic!("expected bank record") };
        assert_eq!(xfer.transfer_account.as_deref(), Some("Savings"));
        assert!(xfer.category.is_none());
        let Entry::Bank(split) = &entries[2] else { panic!("expected bank record") };
        assert_eq!(split.amount, dec!(-75));
        assert!(split.category.is_none());
        assert_eq!(split.splits.len(), 2);
        assert_eq!(split.splits[0].category.as_deref(), Some("Food:Groceries"));
        assert_eq!(split.splits[0].memo, "weekly");
        assert_eq!(split.splits[1].amount, dec!(-25));
    }

    #[test]
    fn investment_records() {
        let text = "!Option:AutoSwitch\n!Type:Invst\n\
            D2/1'24\nNBuyX\nYVanguard Total Stock\nI250.10\nQ4\nT1000.40\nO0\n^\n\
            D3/1'24\nNStkSplit\nYVanguard Total Stock\nQ20\n^";
        let entries = parse(text).unwrap();
        assert_eq!(entries.len(), 2);
        let Entry::Trade(buy) = &entries[0] else { panic!("expected trade") };
        assert_eq!(buy.action, "BuyX");
        assert_eq!(buy.security, "Vanguard Total Stock");
        assert_eq!((buy.price, buy.shares, buy.amount), (dec!(250.10), dec!(4), dec!(1000.40)));
        let Entry::Trade(split) = &entries[1] else { panic!("expected trade") };
        assert_eq!(split.shares, dec!(20));
    }

    #[test]
    fn other_sections_are_ignored() {
        let text = "!Type:Cat\nNFood\nE\n^\n!Type:Bank\nD1/1/24\nT5\nPShop\n^\n";
        assert_eq!(parse(text).unwrap().len(), 1);
        assert!(matches!(parse("D1/1/24\n^\n"), Err(Error::ImportFailure(_))));
    }
}
