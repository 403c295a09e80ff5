// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Consolidated financials of held companies, read from SEC EDGAR XBRL
//! company facts.

use crate::errors::{Error, Result};
use crate::models::Company;
use crate::utils::http_client;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

const SEC_TICKERS_URL: &str = "https://www.sec.gov/files/company_tickers.json";
const SEC_FACTS_URL: &str = "https://data.sec.gov/api/xbrl/companyfacts";

pub const DEFAULT_FILING_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FilingType {
    #[serde(rename = "10-K")]
    Annual,
    #[serde(rename = "10-Q")]
    Quarterly,
}

impl FilingType {
    pub fn label(self) -> &'static str {
        match self {
            FilingType::Annual => "10-K",
            FilingType::Quarterly => "10-Q",
        }
    }

    pub fn from_label(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "10-K" | "10K" => Ok(FilingType::Annual),
            "10-Q" | "10Q" => Ok(FilingType::Quarterly),
            other => Err(Error::invalid(format!("Unknown filing type '{}'", other))),
        }
    }
}

/// Display order of the consolidated statement, each line with the us-gaap
/// concepts that may report it, first match wins.
pub const FILING_ITEMS: &[(&str, &[&str])] = &[
    ("Cash", &["CashAndCashEquivalentsAtCarryingValue"]),
    ("Investments", &["MarketableSecuritiesCurrent", "ShortTermInvestments"]),
    ("Current Assets", &["AssetsCurrent"]),
    ("Goodwill", &["Goodwill"]),
    ("Intangibles", &["IntangibleAssetsNetExcludingGoodwill"]),
    ("Assets", &["Assets"]),
    ("Short-Term Debt", &["ShortTermBorrowings", "DebtCurrent"]),
    ("Unearned Revenue", &["ContractWithCustomerLiabilityCurrent", "DeferredRevenueCurrent"]),
    ("Current Liabilities", &["LiabilitiesCurrent"]),
    ("Long-Term Debt", &["LongTermDebtNoncurrent"]),
    ("Liabilities", &["Liabilities"]),
    ("Retained Earnings", &["RetainedEarningsAccumulatedDeficit"]),
    ("Equity", &["StockholdersEquity"]),
    ("Basic Shares", &["WeightedAverageNumberOfSharesOutstandingBasic"]),
    ("Diluted Shares", &["WeightedAverageNumberOfDilutedSharesOutstanding"]),
    ("Revenue", &["Revenues", "RevenueFromContractWithCustomerExcludingAssessedTax"]),
    ("Cost Of Revenue", &["CostOfRevenue", "CostOfGoodsAndServicesSold"]),
    ("Gross Profit", &["GrossProfit"]),
    ("Operating Expense", &["OperatingExpenses"]),
    ("Operating Income", &["OperatingIncomeLoss"]),
    ("Interest", &["InterestExpense"]),
    ("Net Income", &["NetIncomeLoss"]),
    ("Operating CashFlow", &["NetCashProvidedByUsedInOperatingActivities"]),
    ("CapEx", &["PaymentsToAcquirePropertyPlantAndEquipment"]),
    ("Dividend Paid", &["PaymentsOfDividends"]),
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanyFacts {
    #[serde(default, rename = "entityName")]
    pub entity_name: String,
    /// taxonomy -> concept -> facts
    #[serde(default)]
    pub facts: HashMap<String, HashMap<String, Concept>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Concept {
    #[serde(default)]
    pub units: HashMap<String, Vec<Fact>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Fact {
    pub start: Option<NaiveDate>,
    pub end: NaiveDate,
    pub val: Decimal,
    pub accn: String,
    pub form: String,
    pub filed: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilingLine {
    pub name: String,
    pub value: Option<Decimal>,
    pub shares: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Filing {
    pub form: FilingType,
    pub accession: String,
    pub period_end: NaiveDate,
    pub filed: NaiveDate,
    pub lines: Vec<FilingLine>,
}

pub trait FilingFetcher: Send + Sync {
    fn company_facts(&self, symbol: &str) -> Result<CompanyFacts>;
}

#[derive(Debug, Deserialize)]
struct TickerEntry {
    cik_str: u64,
    ticker: String,
}

pub struct EdgarFetcher {
    client: reqwest::blocking::Client,
}

impl EdgarFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
        })
    }

    fn cik(&self, symbol: &str) -> Result<u64> {
        let tickers: HashMap<String, TickerEntry> = self
            .client
            .get(SEC_TICKERS_URL)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| Error::Filing(e.to_string()))?;
        tickers
            .into_values()
            .find(|t| t.ticker.eq_ignore_ascii_case(symbol))
            .map(|t| t.cik_str)
            .ok_or_else(|| Error::NotFound(format!("SEC registrant for {}", symbol)))
    }
}

impl FilingFetcher for EdgarFetcher {
    fn company_facts(&self, symbol: &str) -> Result<CompanyFacts> {
        let cik = self.cik(symbol)?;
        debug!("Fetching company facts of {} (CIK {:010})", symbol, cik);
        self.client
            .get(format!("{}/CIK{:010}.json", SEC_FACTS_URL, cik))
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| Error::Filing(e.to_string()))
    }
}

/// Picks the fact of one concept reported by filing `accn` for its period.
/// Annual reports use the longest duration, quarterly ones the shortest.
fn pick<'a>(facts: &'a [Fact], accn: &str, end: NaiveDate, form: FilingType) -> Option<&'a Fact> {
    let candidates = facts.iter().filter(|f| f.accn == accn && f.end == end);
    match form {
        FilingType::Annual => candidates.min_by_key(|f| f.start),
        FilingType::Quarterly => candidates.max_by_key(|f| f.start),
    }
}

fn us_gaap<'a>(facts: &'a CompanyFacts, concept: &str) -> Option<(&'static str, &'a [Fact])> {
    let c = facts.facts.get("us-gaap")?.get(concept)?;
    if let Some(v) = c.units.get("USD") {
        return Some(("USD", v.as_slice()));
    }
    c.units.get("shares").map(|v| ("shares", v.as_slice()))
}

/// The newest `limit` filings of `form` with their statement lines.
pub fn filings_from_facts(facts: &CompanyFacts, form: FilingType, limit: usize) -> Vec<Filing> {
    // accession -> (period end, filed)
    let mut heads: BTreeMap<&str, (NaiveDate, NaiveDate)> = BTreeMap::new();
    for (_, concepts) in FILING_ITEMS {
        for concept in concepts.iter() {
            let Some((_, list)) = us_gaap(facts, concept) else {
                continue;
            };
            for f in list.iter().filter(|f| f.form == form.label()) {
                let head = heads.entry(f.accn.as_str()).or_insert((f.end, f.filed));
                head.0 = head.0.max(f.end);
            }
        }
    }
    let mut ordered: Vec<(&str, NaiveDate, NaiveDate)> =
        heads.into_iter().map(|(a, (end, filed))| (a, end, filed)).collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)));
    ordered.truncate(limit);

    ordered
        .into_iter()
        .map(|(accn, end, filed)| {
            let lines = FILING_ITEMS
                .iter()
                .map(|(name, concepts)| {
                    let found = concepts.iter().find_map(|c| {
                        let (unit, list) = us_gaap(facts, c)?;
                        pick(list, accn, end, form).map(|f| (unit, f.val))
                    });
                    FilingLine {
                        name: name.to_string(),
                        value: found.map(|(_, v)| v),
                        shares: found.is_some_and(|(u, _)| u == "shares"),
                    }
                })
                .collect();
            Filing {
                form,
                accession: accn.to_string(),
                period_end: end,
                filed,
                lines,
            }
        })
        .collect()
}

/// A company the user holds through at least one security.
fn held_company(conn: &Connection, user_id: i64, company_id: i64) -> Result<Company> {
    conn.query_row(
        "SELECT c.id, c.name, c.symbol FROM companies c
         JOIN securities s ON s.company_id = c.id
         JOIN accounts a ON a.id = s.account_id
         WHERE c.id=?1 AND a.user_id=?2
         LIMIT 1",
        params![company_id, user_id],
        |r| {
            Ok(Company {
                id: r.get(0)?,
                name: r.get(1)?,
                symbol: r.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or(Error::PermissionDenied)
}

/// Latest filings of a held company. Companies without a symbol have none.
pub fn company_financials(
    conn: &Connection,
    user_id: i64,
    company_id: i64,
    form: FilingType,
    limit: usize,
    fetcher: &dyn FilingFetcher,
) -> Result<(Company, Vec<Filing>)> {
    let company = held_company(conn, user_id, company_id)?;
    if company.symbol.is_empty() {
        return Ok((company, Vec::new()));
    }
    let limit = if limit == 0 { DEFAULT_FILING_LIMIT } else { limit };
    let facts = fetcher.company_facts(&company.symbol)?;
    let filings = filings_from_facts(&facts, form, limit);
    info!(
        "Company {} ({}): {} {} filings",
        company.id,
        company.symbol,
        filings.len(),
        form.label()
    );
    Ok((company, filings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const FACTS: &str = r#"{
      "cik": 1234, "entityName": "Acme Corp",
      "facts": { "us-gaap": {
        "Assets": { "units": { "USD": [
          {"end":"2022-12-31","val":900,"accn":"A-22","fy":2022,"fp":"FY","form":"10-K","filed":"2023-02-10"},
          {"end":"2023-12-31","val":1000,"accn":"A-23","fy":2023,"fp":"FY","form":"10-K","filed":"2024-02-09"},
          {"end":"2022-12-31","val":900,"accn":"A-23","fy":2023,"fp":"FY","form":"10-K","filed":"2024-02-09"},
          {"end":"2023-09-30","val":980,"accn":"Q-23","fy":2023,"fp":"Q3","form":"10-Q","filed":"2023-11-01"}
        ]}},
        "Revenues": { "units": { "USD": [
          {"start":"2023-01-01","end":"2023-12-31","val":400,"accn":"A-23","form":"10-K","filed":"2024-02-09"},
          {"start":"2023-10-01","end":"2023-12-31","val":110,"accn":"A-23","form":"10-K","filed":"2024-02-09"},
          {"start":"2023-07-01","end":"2023-09-30","val":100,"accn":"Q-23","form":"10-Q","filed":"2023-11-01"},
          {"start":"2023-01-01","end":"2023-09-30","val":290,"accn":"Q-23","form":"10-Q","filed":"2023-11-01"}
        ]}},
        "WeightedAverageNumberOfSharesOutstandingBasic": { "units": { "shares": [
          {"start":"2023-01-01","end":"2023-12-31","val":50,"accn":"A-23","form":"10-K","filed":"2024-02-09"}
        ]}}
      }}
    }"#;

    fn line<'a>(f: &'a Filing, name: &str) -> &'a FilingLine {
        f.lines.iter().find(|l| l.name == name).unwrap()
    }

    #[test]
    fn annual_filings_newest_first() {
        let facts: CompanyFacts = serde_json::from_str(FACTS).unwrap();
        assert_eq!(facts.entity_name, "Acme Corp");
        let filings = filings_from_facts(&facts, FilingType::Annual, 5);
        assert_eq!(filings.len(), 2);
        let latest = &filings[0];
        assert_eq!(latest.accession, "A-23");
        assert_eq!(latest.period_end, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert_eq!(line(latest, "Assets").value, Some(dec!(1000)));
        assert_eq!(line(latest, "Revenue").value, Some(dec!(400)));
        let shares = line(latest, "Basic Shares");
        assert!(shares.shares);
        assert_eq!(shares.value, Some(dec!(50)));
        assert_eq!(line(latest, "Goodwill").value, None);
        assert_eq!(latest.lines.len(), FILING_ITEMS.len());

        assert_eq!(filings_from_facts(&facts, FilingType::Annual, 1).len(), 1);
    }

    #[test]
    fn quarterly_filings_use_the_quarter() {
        let facts: CompanyFacts = serde_json::from_str(FACTS).unwrap();
        let filings = filings_from_facts(&facts, FilingType::Quarterly, 3);
        assert_eq!(filings.len(), 1);
        assert_eq!(line(&filings[0], "Revenue").value, Some(dec!(100)));
        assert_eq!(line(&filings[0], "Assets").value, Some(dec!(980)));
    }

    #[test]
    fn filing_type_labels() {
        assert_eq!(FilingType::from_label("10-q").unwrap(), FilingType::Quarterly);
        assert_eq!(FilingType::from_label("").unwrap(), FilingType::Annual);
        assert!(FilingType::from_label("8-K").is_err());
    }
}
