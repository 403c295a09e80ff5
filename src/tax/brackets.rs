// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::db::decimal_at;
use crate::errors::{Error, Result};
use crate::models::FilingStatus;
use crate::utils::round_half_up;
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Levels are numbered from one.
fn slot_index(level: i64) -> Option<usize> {
    usize::try_from(level).ok()?.checked_sub(1)
}

/// Reference data of one tax year.
#[derive(Debug, Clone, Serialize)]
pub struct TaxYear {
    pub year: i32,
    pub exemption_amount: Decimal,
    pub salt_maximum: Decimal,
    /// Below this taxable income the tax table (whole dollars) applies.
    pub table_max: Decimal,
    pub rates: [Decimal; 7],
    pub limits: HashMap<FilingStatus, [Decimal; 6]>,
    pub deductions: HashMap<FilingStatus, Decimal>,
}

impl TaxYear {
    pub fn load(conn: &Connection, year: i32) -> Result<TaxYear> {
        let (exemption, salt, table_max): (i64, i64, i64) = conn
            .query_row(
                "SELECT exemption_amount, salt_maximum, table_max FROM tax_years WHERE year=?1",
                params![year],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("tax year {}", year)))?;

        let mut rates = [Decimal::ZERO; 7];
        let mut stmt = conn.prepare("SELECT level, rate FROM tax_year_rates WHERE year=?1")?;
        let rows = stmt.query_map(params![year], |r| Ok((r.get::<_, i64>(0)?, decimal_at(r, 1)?)))?;
        for row in rows {
            let (level, rate) = row?;
            if let Some(slot) = slot_index(level).and_then(|i| rates.get_mut(i)) {
                *slot = rate;
            }
        }

        let mut limits: HashMap<FilingStatus, [Decimal; 6]> = HashMap::new();
        let mut stmt = conn.prepare(
            "SELECT filing_status, level, income_limit FROM tax_year_limits WHERE year=?1",
        )?;
        let rows = stmt.query_map(params![year], |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?, r.get::<_, i64>(2)?))
        })?;
        for row in rows {
            let (status, level, limit) = row?;
            let status = FilingStatus::from_id(status)?;
            let entry = limits.entry(status).or_insert([Decimal::ZERO; 6]);
            if let Some(slot) = slot_index(level).and_then(|i| entry.get_mut(i)) {
                *slot = Decimal::from(limit);
            }
        }

        let mut deductions = HashMap::new();
        let mut stmt =
            conn.prepare("SELECT filing_status, amount FROM tax_year_deductions WHERE year=?1")?;
        let rows = stmt.query_map(params![year], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)))?;
        for row in rows {
            let (status, amount) = row?;
            deductions.insert(FilingStatus::from_id(status)?, Decimal::from(amount));
        }

        Ok(TaxYear {
            year,
            exemption_amount: Decimal::from(exemption),
            salt_maximum: Decimal::from(salt),
            table_max: Decimal::from(table_max),
            rates,
            limits,
            deductions,
        })
    }

    pub fn standard_deduction(&self, status: FilingStatus) -> Decimal {
        self.deductions.get(&status).copied().unwrap_or_default()
    }

    pub fn limits(&self, status: FilingStatus) -> [Decimal; 6] {
        self.limits.get(&status).copied().unwrap_or_default()
    }

    /// Bracketed tax on `income`. Inside the tax table, income not on a
    /// $50 boundary is taxed at the midpoint of its row and the result is
    /// rounded to whole dollars; above it, to cents.
    pub fn calculate_tax(&self, status: FilingStatus, income: Decimal) -> Decimal {
        let mut income = income;
        let fifty = Decimal::from(50);
        let in_table = income < self.table_max;
        if in_table {
            let rem = income % fifty;
            if rem > Decimal::ZERO {
                income = income - rem + Decimal::from(25);
            }
        }
        if income <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let limits = self.limits(status);
        let mut tax = Decimal::ZERO;
        let mut last = Decimal::ZERO;
        for (level, rate) in self.rates.iter().enumerate() {
            let limit = limits.get(level).copied().unwrap_or(Decimal::ZERO);
            tax += bracket(income, limit, last, *rate);
            last = limit;
        }
        let tax = if in_table {
            round_half_up(tax, 0)
        } else {
            round_half_up(tax, 2)
        };
        debug!("Tax {} on income {} ({} {})", tax, income, self.year, status.label());
        tax
    }
}

/// Tax owed inside one bracket. A zero `limit` is the open top bracket,
/// or an unused one when `last` is zero too.
pub fn bracket(income: Decimal, limit: Decimal, last: Decimal, rate: Decimal) -> Decimal {
    if income <= last {
        return Decimal::ZERO;
    }
    if !limit.is_zero() {
        return (income.min(limit) - last) * rate;
    }
    if last.is_zero() {
        return Decimal::ZERO;
    }
    (income - last) * rate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use rust_decimal_macros::dec;

    #[test]
    fn bracket_edges() {
        assert_eq!(bracket(dec!(5000), dec!(11000), Decimal::ZERO, dec!(0.10)), dec!(500));
        assert_eq!(bracket(dec!(5000), dec!(44725), dec!(11000), dec!(0.12)), Decimal::ZERO);
        assert_eq!(bracket(dec!(700000), Decimal::ZERO, dec!(578125), dec!(0.37)), dec!(45093.75));
        assert_eq!(bracket(dec!(700000), Decimal::ZERO, Decimal::ZERO, dec!(0.37)), Decimal::ZERO);
    }

    #[test]
    fn single_2023_schedule() {
        let conn = open_in_memory().unwrap();
        let year = TaxYear::load(&conn, 2023).unwrap();
        assert_eq!(year.standard_deduction(FilingStatus::Single), dec!(13850));
        assert_eq!(year.calculate_tax(FilingStatus::Single, dec!(36150)), dec!(4118));
        // mid-row income is taxed at the row midpoint 36175
        assert_eq!(year.calculate_tax(FilingStatus::Single, dec!(36160)), dec!(4121));
        assert_eq!(year.calculate_tax(FilingStatus::Single, Decimal::ZERO), Decimal::ZERO);
        assert_eq!(year.calculate_tax(FilingStatus::Single, dec!(150000)), dec!(29400));
    }

    #[test]
    fn tax_never_decreases_with_income() {
        let conn = open_in_memory().unwrap();
        let year = TaxYear::load(&conn, 2024).unwrap();
        for status in FilingStatus::ALL.iter().copied() {
            let mut prev = Decimal::ZERO;
            let mut income = Decimal::ZERO;
            while income < dec!(800000) {
                let tax = year.calculate_tax(status, income);
                assert!(tax >= prev, "{:?} {} {} < {}", status, income, tax, prev);
                prev = tax;
                income += dec!(1237.37);
            }
        }
    }

    #[test]
    fn unknown_year_is_not_found() {
        let conn = open_in_memory().unwrap();
        assert!(matches!(TaxYear::load(&conn, 1990), Err(Error::NotFound(_))));
    }
}
