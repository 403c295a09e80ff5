// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::models::{Security, Trade, TradeType};
use crate::utils::round_bank;
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Share multiplier of a split; a negative factor is a reverse split.
pub fn split_factor(shares: Decimal) -> Decimal {
    if shares.is_sign_negative() {
        Decimal::ONE / shares.abs()
    } else {
        shares
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Apply,
    Reverse,
}

/// Moves shares and basis of `sec` for one trade. The trade's `basis` must
/// already hold the matched basis for sells.
pub fn apply_trade(sec: &mut Security, trade: &Trade, direction: Direction) {
    let sign = match direction {
        Direction::Apply => Decimal::ONE,
        Direction::Reverse => Decimal::NEGATIVE_ONE,
    };
    match trade.trade_type {
        TradeType::Buy | TradeType::ReinvestedDividend | TradeType::ReinvestedDistribution => {
            sec.shares += sign * trade.shares;
            sec.basis += sign * trade.amount;
        }
        TradeType::Sell => {
            sec.shares -= sign * trade.shares;
            sec.basis -= sign * trade.basis;
        }
        TradeType::SharesIn => sec.shares += sign * trade.shares,
        TradeType::SharesOut => sec.shares -= sign * trade.shares,
        TradeType::Split if !trade.shares.is_zero() => match direction {
            Direction::Apply => sec.shares *= split_factor(trade.shares),
            Direction::Reverse => sec.shares /= split_factor(trade.shares),
        },
        TradeType::Split | TradeType::Dividend | TradeType::Distribution => {}
    }
    if sec.shares.is_zero() {
        sec.basis = Decimal::ZERO;
    }
}

/// Re-derives `value` after a trade. A trade newer than the last quote sets
/// the price; otherwise `cached` or the price implied by the old value is
/// used. Splits keep the value.
pub fn revalue_after_trade(sec: &mut Security, trade: &Trade, old_price: Decimal, cached: Option<Decimal>) {
    if sec.shares.is_zero() {
        sec.value = Decimal::ZERO;
        return;
    }
    if trade.trade_type == TradeType::Split {
        return;
    }
    let newer = sec.last_quote_update.is_none_or(|d| trade.date >= d);
    let price = if newer && trade.price > Decimal::ZERO {
        sec.last_quote_update = Some(trade.date);
        trade.price
    } else {
        cached.unwrap_or(old_price)
    };
    sec.value = round_bank(sec.shares * price, 2);
}

/// Sets value from a fresh quote.
pub fn revalue(sec: &mut Security, price: Decimal, quoted: NaiveDate) {
    sec.value = if sec.shares.is_zero() {
        Decimal::ZERO
    } else {
        round_bank(sec.shares * price, 2)
    };
    sec.last_quote_update = Some(quoted);
}
