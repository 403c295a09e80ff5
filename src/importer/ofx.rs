// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! OFX 1.x (SGML) and 2.x (XML) statement transactions. Only the
//! `STMTTRN` aggregates of bank and credit-card statements are read.

use super::{BankRecord, Entry};
use crate::errors::{Error, Result};
use crate::utils::parse_decimal;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static OFX_ROOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<OFX>").expect("static regex"));
static STMTTRN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<STMTTRN>(.*?)</STMTTRN>").expect("static regex"));
// SGML leaves leaf elements unclosed, so a value runs to the next tag or line end
static ELEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<([A-Z0-9.]+)>([^<\r\n]*)").expect("static regex"));

fn unescape(v: &str) -> String {
    v.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn fields(block: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for cap in ELEMENT.captures_iter(block) {
        let value = unescape(cap[2].trim());
        if value.is_empty() {
            continue;
        }
        out.entry(cap[1].to_ascii_uppercase()).or_insert(value);
    }
    out
}

/// `YYYYMMDD` with any time and zone suffix ignored.
pub fn parse_ofx_date(s: &str) -> Result<NaiveDate> {
    s.get(..8)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y%m%d").ok())
        .ok_or_else(|| Error::ImportFailure(format!("bad OFX date '{}'", s)))
}

pub fn parse(text: &str) -> Result<Vec<Entry>> {
    if !OFX_ROOT.is_match(text) {
        return Err(Error::ImportFailure("not an OFX document".into()));
    }
    let mut out = Vec::new();
    for cap in STMTTRN.captures_iter(text) {
        let f = fields(&cap[1]);
        let get = |k: &str| f.get(k).cloned().unwrap_or_default();
        let raw_amount = f
            .get("TRNAMT")
            .ok_or_else(|| Error::ImportFailure("STMTTRN without TRNAMT".into()))?;
        let amount = parse_decimal(raw_amount)
            .map_err(|_| Error::ImportFailure(format!("bad TRNAMT '{}'", raw_amount)))?;
        if amount.normalize().scale() > 2 {
            return Err(Error::ImportFailure(format!(
                "TRNAMT '{}' has fractional cents",
                raw_amount
            )));
        }
        let posted = f
            .get("DTPOSTED")
            .ok_or_else(|| Error::ImportFailure("STMTTRN without DTPOSTED".into()))?;
        let fitid = get("FITID");
        out.push(Entry::Bank(BankRecord {
            date: parse_ofx_date(posted)?,
            amount,
            payee: get("NAME"),
            memo: get("MEMO"),
            transnum: if fitid.is_empty() { get("CHECKNUM") } else { fitid },
            category: None,
            transfer_account: None,
            splits: Vec::new(),
            unique: true,
        }));
    }
    Ok(out)
}
