// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Lot matching for disposals. Pure functions over in-memory lots; the
//! trade store persists what they return.

use crate::errors::{Error, Result};
use crate::models::BasisType;
use crate::utils::round_bank;
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// An open buy with shares still unsold.
#[derive(Debug, Clone, PartialEq)]
pub struct Lot {
    pub trade_id: i64,
    pub date: NaiveDate,
    pub shares: Decimal,
    pub basis: Decimal,
}

impl Lot {
    pub fn is_closed(&self) -> bool {
        self.shares <= Decimal::ZERO
    }
}

/// One buy lot's share of a disposal.
#[derive(Debug, Clone, PartialEq)]
pub struct LotMatch {
    pub buy_id: i64,
    pub shares: Decimal,
    pub days_held: i64,
    pub basis: Decimal,
}

#[derive(Debug, Clone)]
pub struct Disposal {
    pub matches: Vec<LotMatch>,
    /// Every eligible lot after the disposal, including rebased ones.
    pub lots: Vec<Lot>,
    pub basis: Decimal,
}

fn eligible(lots: &[Lot], date: NaiveDate, shares: Decimal) -> Result<Vec<Lot>> {
    if shares <= Decimal::ZERO {
        return Err(Error::invalid("Shares must be positive"));
    }
    if lots.iter().all(Lot::is_closed) {
        return Err(Error::constraint("No Shares"));
    }
    let mut open: Vec<Lot> = lots
        .iter()
        .filter(|l| !l.is_closed() && l.date <= date)
        .cloned()
        .collect();
    let available: Decimal = open.iter().map(|l| l.shares).sum();
    if available < shares {
        return Err(Error::constraint("Insufficient Shares"));
    }
    open.sort_by(|a, b| a.date.cmp(&b.date).then(a.trade_id.cmp(&b.trade_id)));
    Ok(open)
}

/// Spreads the pooled basis evenly per share; the newest lot absorbs the
/// rounding residue so the pool total is unchanged.
fn rebase_to_average(lots: &mut [Lot]) {
    let shares: Decimal = lots.iter().map(|l| l.shares).sum();
    let basis: Decimal = lots.iter().map(|l| l.basis).sum();
    if shares.is_zero() {
        return;
    }
    let per_share = basis / shares;
    let mut assigned = Decimal::ZERO;
    let last = lots.len().saturating_sub(1);
    for (i, lot) in lots.iter_mut().enumerate() {
        lot.basis = if i == last {
            basis - assigned
        } else {
            round_bank(per_share * lot.shares, 2)
        };
        assigned += lot.basis;
    }
}

/// Matches a sell of `shares` on `date` against `lots`.
pub fn match_sell(lots: &[Lot], date: NaiveDate, shares: Decimal, basis_type: BasisType) -> Result<Disposal> {
    let mut open = eligible(lots, date, shares)?;
    if basis_type == BasisType::Average {
        rebase_to_average(&mut open);
    }

    let mut remaining = shares;
    let mut matches = Vec::new();
    for lot in open.iter_mut() {
        if remaining <= Decimal::ZERO {
            break;
        }
        let take = remaining.min(lot.shares);
        let basis = if take == lot.shares {
            lot.basis
        } else {
            round_bank(lot.basis / lot.shares * take, 2)
        };
        matches.push(LotMatch {
            buy_id: lot.trade_id,
            shares: take,
            days_held: (date - lot.date).num_days(),
            basis,
        });
        lot.shares -= take;
        lot.basis -= basis;
        remaining -= take;
    }
    let basis = matches.iter().map(|m| m.basis).sum();
    Ok(Disposal {
        matches,
        lots: open,
        basis,
    })
}

/// Removes shares FIFO without moving basis, for shares transferred out.
pub fn take_shares(lots: &[Lot], date: NaiveDate, shares: Decimal) -> Result<Disposal> {
    let mut open = eligible(lots, date, shares)?;
    let mut remaining = shares;
    let mut matches = Vec::new();
    for lot in open.iter_mut() {
        if remaining <= Decimal::ZERO {
            break;
        }
        let take = remaining.min(lot.shares);
        matches.push(LotMatch {
            buy_id: lot.trade_id,
            shares: take,
            days_held: (date - lot.date).num_days(),
            basis: Decimal::ZERO,
        });
        lot.shares -= take;
        remaining -= take;
    }
    Ok(Disposal {
        matches,
        lots: open,
        basis: Decimal::ZERO,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn lot(id: i64, date: &str, shares: Decimal, basis: Decimal) -> Lot {
        Lot {
            trade_id: id,
            date: d(date),
            shares,
            basis,
        }
    }

    #[test]
    fn fifo_spans_lots_oldest_first() {
        let lots = vec![
            lot(2, "2024-02-01", dec!(5), dec!(600)),
            lot(1, "2024-01-01", dec!(5), dec!(500)),
        ];
        let out = match_sell(&lots, d("2024-03-01"), dec!(7), BasisType::Fifo).unwrap();
        assert_eq!(out.matches.len(), 2);
        assert_eq!(out.matches[0].buy_id, 1);
        assert_eq!(out.matches[0].basis, dec!(500));
        assert_eq!(out.matches[0].days_held, 60);
        assert_eq!(out.matches[1].shares, dec!(2));
        assert_eq!(out.matches[1].basis, dec!(240));
        assert_eq!(out.basis, dec!(740));
        assert!(out.lots[0].is_closed());
        assert_eq!(out.lots[1].basis, dec!(360));
    }

    #[test]
    fn same_day_lots_break_ties_by_id() {
        let lots = vec![
            lot(9, "2024-01-01", dec!(1), dec!(90)),
            lot(3, "2024-01-01", dec!(1), dec!(30)),
        ];
        let out = match_sell(&lots, d("2024-01-02"), dec!(1), BasisType::Fifo).unwrap();
        assert_eq!(out.matches[0].buy_id, 3);
    }

    #[test]
    fn average_basis_pools_lots() {
        let lots = vec![
            lot(1, "2024-01-01", dec!(10), dec!(1200)),
            lot(2, "2024-01-08", dec!(10), dec!(1400)),
        ];
        let out = match_sell(&lots, d("2024-01-15"), dec!(10), BasisType::Average).unwrap();
        assert_eq!(out.basis, dec!(1300));
        let left: Decimal = out.lots.iter().map(|l| l.basis).sum();
        assert_eq!(left, dec!(1300));
    }

    #[test]
    fn average_keeps_pool_total_with_uneven_shares() {
        let lots = vec![
            lot(1, "2024-01-01", dec!(3), dec!(100)),
            lot(2, "2024-01-02", dec!(3), dec!(100)),
            lot(3, "2024-01-03", dec!(3), dec!(100.01)),
        ];
        let out = match_sell(&lots, d("2024-01-04"), dec!(9), BasisType::Average).unwrap();
        assert_eq!(out.basis, dec!(300.01));
    }

    #[test]
    fn future_lots_do_not_count() {
        let lots = vec![
            lot(1, "2024-01-01", dec!(5), dec!(500)),
            lot(2, "2024-06-01", dec!(5), dec!(500)),
        ];
        let err = match_sell(&lots, d("2024-03-01"), dec!(6), BasisType::Fifo).unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation(m) if m == "Insufficient Shares"));
        let err = match_sell(&[], d("2024-03-01"), dec!(1), BasisType::Fifo).unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation(m) if m == "No Shares"));
    }

    #[test]
    fn shares_out_leaves_basis() {
        let lots = vec![lot(1, "2024-01-01", dec!(5), dec!(500))];
        let out = take_shares(&lots, d("2024-02-01"), dec!(2)).unwrap();
        assert_eq!(out.lots[0].shares, dec!(3));
        assert_eq!(out.lots[0].basis, dec!(500));
        assert_eq!(out.matches[0].basis, Decimal::ZERO);
    }
}
