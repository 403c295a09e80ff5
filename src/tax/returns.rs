// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::brackets::TaxYear;
use super::entries::{self, sum_item, sum_type};
use crate::db::must_exist;
use crate::errors::{Error, Result};
use crate::models::{FilingStatus, TAX_REGION_FEDERAL, TaxEntry, TaxReturn, TaxType};
use crate::portfolio::trades;
use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use tracing::{debug, info};

const QUALIFIED_DIVIDENDS: &str = "Qualified Dividends";
const SALT_ITEMS: [&str; 3] = [
    "State Local Income Taxes",
    "Real Estate Taxes",
    "Personal Property Taxes",
];

#[derive(Debug, Clone)]
pub struct NewTaxReturn {
    pub year: i32,
    pub filing_status: FilingStatus,
    pub exemptions: i64,
}

pub fn get(conn: &Connection, user_id: i64, id: i64) -> Result<TaxReturn> {
    let tr = must_exist(
        conn.query_row(
            &format!("SELECT {} FROM tax_returns WHERE id=?1", TaxReturn::COLUMNS),
            params![id],
            TaxReturn::from_row,
        ),
        || format!("tax return {}", id),
    )?;
    if tr.user_id != user_id {
        return Err(Error::PermissionDenied);
    }
    Ok(tr)
}

pub fn list(conn: &Connection, user_id: i64, year: Option<i32>) -> Result<Vec<TaxReturn>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM tax_returns WHERE user_id=?1 AND (?2 IS NULL OR year=?2)
         ORDER BY year DESC, id",
        TaxReturn::COLUMNS
    ))?;
    let rows = stmt.query_map(params![user_id, year], TaxReturn::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Stores a return for the year and computes its derived lines.
pub fn create(conn: &Connection, user_id: i64, new: &NewTaxReturn, auto: bool) -> Result<TaxReturn> {
    if new.exemptions < 0 {
        return Err(Error::invalid("Exemptions cannot be negative"));
    }
    TaxYear::load(conn, new.year)?;
    conn.execute(
        "INSERT INTO tax_returns(user_id, year, filing_status, tax_region_id, exemptions)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user_id,
            new.year,
            new.filing_status.id(),
            TAX_REGION_FEDERAL,
            new.exemptions
        ],
    )?;
    let id = conn.last_insert_rowid();
    info!(
        "Created tax return {} ({} {}) for user {}",
        id,
        new.year,
        new.filing_status.label(),
        user_id
    );
    recalculate(conn, user_id, id, auto)
}

pub fn recalculate(conn: &Connection, user_id: i64, id: i64, auto: bool) -> Result<TaxReturn> {
    let mut tr = get(conn, user_id, id)?;
    if tr.tax_region_id == TAX_REGION_FEDERAL {
        let entries = entries::list(conn, user_id, tr.year, auto)?;
        compute(conn, &mut tr, &entries)?;
        save(conn, &tr)?;
    }
    Ok(tr)
}

pub fn delete(conn: &Connection, user_id: i64, id: i64) -> Result<()> {
    get(conn, user_id, id)?;
    conn.execute("DELETE FROM tax_returns WHERE id=?1", params![id])?;
    info!("Deleted tax return {} for user {}", id, user_id);
    Ok(())
}

fn item_total(conn: &Connection, entries: &[TaxEntry], name: &str) -> Result<Decimal> {
    Ok(entries::item_by_name(conn, name)?
        .map(|item| sum_item(entries, TAX_REGION_FEDERAL, item.id))
        .unwrap_or_default())
}

/// Fills the derived lines of `tr` from the year's entries.
pub fn compute(conn: &Connection, tr: &mut TaxReturn, entries: &[TaxEntry]) -> Result<()> {
    let year = TaxYear::load(conn, tr.year)?;
    let status = FilingStatus::from_id(tr.filing_status)?;
    let region = TAX_REGION_FEDERAL;
    let sum = |ty| sum_type(entries, region, ty);

    tr.income = sum(TaxType::Income) + sum(TaxType::IncomeCapitalGain)
        - item_total(conn, entries, QUALIFIED_DIVIDENDS)?;
    tr.for_agi = sum(TaxType::DeductionsForAgi);
    tr.credits = sum(TaxType::Credits);
    tr.payments = sum(TaxType::Payments);
    tr.other_tax = sum(TaxType::Tax);

    let mut itemized = sum(TaxType::ItemizedDeduction);
    if itemized > Decimal::ZERO && year.salt_maximum > Decimal::ZERO {
        let mut salt = Decimal::ZERO;
        for name in SALT_ITEMS {
            salt += item_total(conn, entries, name)?;
        }
        if salt > year.salt_maximum {
            itemized = itemized - salt + year.salt_maximum;
        }
    }
    tr.itemized_deduction = itemized;
    tr.exemption = Decimal::from(tr.exemptions) * year.exemption_amount;
    tr.standard_deduction = year.standard_deduction(status);

    tr.from_agi = sum(TaxType::DeductionsFromAgi);
    if tr.from_agi.is_zero() {
        tr.from_agi = tr.standard_deduction.max(tr.itemized_deduction) + tr.exemption;
    }

    tr.agi_income = (tr.income - tr.for_agi).max(Decimal::ZERO);
    tr.taxable_income = (tr.agi_income - tr.from_agi).max(Decimal::ZERO);
    tr.base_tax = year.calculate_tax(status, tr.taxable_income);
    tr.total_tax = tr.base_tax + tr.other_tax - tr.credits;
    tr.owed_tax = tr.total_tax - tr.payments;

    tr.long_capgain_income = trades::list_gains(conn, tr.user_id, Some(tr.year), None)?
        .iter()
        .filter(|g| g.long_term)
        .map(|g| g.gain)
        .sum();
    debug!(
        "Tax return {}: taxable {} base {} owed {}",
        tr.id, tr.taxable_income, tr.base_tax, tr.owed_tax
    );
    Ok(())
}

fn save(conn: &Connection, tr: &TaxReturn) -> Result<()> {
    conn.execute(
        "UPDATE tax_returns SET income=?1, agi_income=?2, taxable_income=?3, for_agi=?4,
             from_agi=?5, standard_deduction=?6, itemized_deduction=?7, exemption=?8,
             credits=?9, payments=?10, base_tax=?11, other_tax=?12, total_tax=?13,
             owed_tax=?14, long_capgain_income=?15
         WHERE id=?16",
        params![
            tr.income.to_string(),
            tr.agi_income.to_string(),
            tr.taxable_income.to_string(),
            tr.for_agi.to_string(),
            tr.from_agi.to_string(),
            tr.standard_deduction.to_string(),
            tr.itemized_deduction.to_string(),
            tr.exemption.to_string(),
            tr.credits.to_string(),
            tr.payments.to_string(),
            tr.base_tax.to_string(),
            tr.other_tax.to_string(),
            tr.total_tax.to_string(),
            tr.owed_tax.to_string(),
            tr.long_capgain_income.to_string(),
            tr.id,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts;
    use crate::db::open_in_memory;
    use crate::tax::entries::NewTaxEntry;
    use rust_decimal_macros::dec;

    fn setup() -> (Connection, i64) {
        let conn = open_in_memory().unwrap();
        let user = accounts::find_or_create_user(&conn, "alice").unwrap();
        (conn, user.id)
    }

    fn entry(conn: &Connection, user: i64, year: i32, item: i64, amount: Decimal) {
        entries::create(conn, user, &NewTaxEntry::federal(year, item, amount)).unwrap();
    }

    fn single(year: i32) -> NewTaxReturn {
        NewTaxReturn {
            year,
            filing_status: FilingStatus::Single,
            exemptions: 0,
        }
    }

    #[test]
    fn single_filer_with_standard_deduction() {
        let (conn, user) = setup();
        entry(&conn, user, 2023, 1, dec!(50000));
        let tr = create(&conn, user, &single(2023), false).unwrap();
        assert_eq!(tr.income, dec!(50000));
        assert_eq!(tr.standard_deduction, dec!(13850));
        assert_eq!(tr.from_agi, dec!(13850));
        assert_eq!(tr.taxable_income, dec!(36150));
        assert_eq!(tr.base_tax, dec!(4118));
        assert_eq!(tr.owed_tax, dec!(4118));
        // derived lines are stored
        let stored = get(&conn, user, tr.id).unwrap();
        assert_eq!(stored.base_tax, dec!(4118));
    }

    #[test]
    fn salt_cap_credits_and_payments() {
        let (conn, user) = setup();
        entry(&conn, user, 2023, 1, dec!(100000));
        entry(&conn, user, 2023, 10, dec!(8000));
        entry(&conn, user, 2023, 11, dec!(6000));
        entry(&conn, user, 2023, 13, dec!(7000));
        entry(&conn, user, 2023, 16, dec!(2000));
        entry(&conn, user, 2023, 17, dec!(15000));
        let tr = create(&conn, user, &single(2023), false).unwrap();
        assert_eq!(tr.itemized_deduction, dec!(17000));
        assert_eq!(tr.from_agi, dec!(17000));
        assert_eq!(tr.taxable_income, dec!(83000));
        assert_eq!(tr.base_tax, dec!(13568));
        assert_eq!(tr.total_tax, dec!(11568));
        assert_eq!(tr.owed_tax, dec!(-3432));
    }

    #[test]
    fn qualified_dividends_and_explicit_deductions() {
        let (conn, user) = setup();
        entry(&conn, user, 2023, 1, dec!(60000));
        entry(&conn, user, 2023, 3, dec!(1000));
        entry(&conn, user, 2023, 4, dec!(400));
        entry(&conn, user, 2023, 6, dec!(5000));
        entry(&conn, user, 2023, 8, dec!(20000));
        let tr = create(&conn, user, &single(2023), false).unwrap();
        assert_eq!(tr.income, dec!(61000));
        assert_eq!(tr.for_agi, dec!(5000));
        assert_eq!(tr.agi_income, dec!(56000));
        assert_eq!(tr.from_agi, dec!(20000));
        assert_eq!(tr.taxable_income, dec!(36000));
    }

    #[test]
    fn recalculate_picks_up_new_entries() {
        let (conn, user) = setup();
        let tr = create(&conn, user, &single(2024), false).unwrap();
        assert_eq!(tr.taxable_income, Decimal::ZERO);
        assert_eq!(tr.base_tax, Decimal::ZERO);
        entry(&conn, user, 2024, 1, dec!(30000));
        let tr = recalculate(&conn, user, tr.id, false).unwrap();
        assert_eq!(tr.taxable_income, dec!(15400));
        assert_eq!(list(&conn, user, Some(2024)).unwrap().len(), 1);
        assert!(list(&conn, user, Some(2023)).unwrap().is_empty());
    }

    #[test]
    fn returns_are_owned_and_need_a_known_year() {
        let (conn, user) = setup();
        assert!(matches!(create(&conn, user, &single(1999), false), Err(Error::NotFound(_))));
        let tr = create(&conn, user, &single(2022), false).unwrap();
        let bob = accounts::find_or_create_user(&conn, "bob").unwrap();
        assert!(matches!(get(&conn, bob.id, tr.id), Err(Error::PermissionDenied)));
        delete(&conn, user, tr.id).unwrap();
        assert!(matches!(get(&conn, user, tr.id), Err(Error::NotFound(_))));
    }
}
