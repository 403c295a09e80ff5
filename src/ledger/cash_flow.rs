// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::{children, insert, load, load_owned, posted_amount, repeat_interval, save};
use crate::accounts;
use crate::categories;
use crate::errors::{Error, Result};
use crate::models::{
    CATEGORY_UNCATEGORIZED, CashFlow, CashFlowKind, CashFlowType, RepeatInterval,
};
use crate::payees;
use chrono::{Datelike, NaiveDate};
use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct RepeatInput {
    pub interval_type_id: i64,
    /// `None` repeats forever.
    pub repeats_left: Option<i64>,
    pub start_day: u32,
    pub rate: Decimal,
}

#[derive(Debug, Clone)]
pub struct CashFlowInput {
    pub account_id: i64,
    pub date: NaiveDate,
    /// Magnitude; the sign comes from `cash_flow_type`.
    pub amount: Decimal,
    pub cash_flow_type: CashFlowType,
    pub payee_id: Option<i64>,
    pub payee_name: Option<String>,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub transfer_account_id: Option<i64>,
    pub memo: String,
    pub transnum: String,
    pub tax_year: Option<i32>,
    pub repeat: Option<RepeatInput>,
    pub split_parent_id: Option<i64>,
    pub import_id: Option<i64>,
}

impl CashFlowInput {
    pub fn new(account_id: i64, date: NaiveDate, amount: Decimal, cash_flow_type: CashFlowType) -> Self {
        Self {
            account_id,
            date,
            amount,
            cash_flow_type,
            payee_id: None,
            payee_name: None,
            category_id: None,
            category_name: None,
            transfer_account_id: None,
            memo: String::new(),
            transnum: String::new(),
            tax_year: None,
            repeat: None,
            split_parent_id: None,
            import_id: None,
        }
    }
}

/// Split children only need what differs from their parent.
#[derive(Debug, Clone, Default)]
pub struct SplitInput {
    pub amount: Decimal,
    pub payee_name: Option<String>,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub memo: String,
}

#[derive(Debug, Clone, Default)]
pub struct CashFlowUpdate {
    pub account_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub cash_flow_type: Option<CashFlowType>,
    pub payee_id: Option<i64>,
    pub payee_name: Option<String>,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub transfer_account_id: Option<i64>,
    pub memo: Option<String>,
    pub transnum: Option<String>,
    pub tax_year: Option<i32>,
}

fn resolve_payee(
    conn: &Connection,
    user_id: i64,
    id: Option<i64>,
    name: Option<&str>,
) -> Result<Option<crate::models::Payee>> {
    match (id, name.map(str::trim).filter(|n| !n.is_empty())) {
        (Some(id), _) => Ok(Some(payees::get(conn, user_id, id)?)),
        (None, Some(name)) => Ok(Some(payees::get_or_create(conn, user_id, name)?)),
        (None, None) => Ok(None),
    }
}

fn resolve_category(
    conn: &Connection,
    user_id: i64,
    id: Option<i64>,
    name: Option<&str>,
    income: bool,
) -> Result<Option<i64>> {
    if let Some(id) = id {
        return Ok(Some(categories::get(conn, user_id, id)?.id));
    }
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => match categories::find_by_name(conn, user_id, name)? {
            Some(cat) => Ok(Some(cat.id)),
            None => Ok(Some(categories::create(conn, user_id, name, income)?.id)),
        },
        None => Ok(None),
    }
}

fn transfer_target(conn: &Connection, user_id: i64, from: i64, to: Option<i64>) -> Result<i64> {
    let to = to.ok_or_else(|| Error::invalid("Transfer requires a destination account"))?;
    if to == from {
        return Err(Error::invalid("Cannot transfer to the same account"));
    }
    Ok(accounts::get(conn, user_id, to)?.id)
}

fn insert_repeat(conn: &Connection, cash_flow_id: i64, repeat: &RepeatInput) -> Result<()> {
    validate_repeat(conn, repeat)?;
    conn.execute(
        "INSERT INTO repeat_intervals(cash_flow_id, repeat_interval_type_id, repeats_left, start_day, rate)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            cash_flow_id,
            repeat.interval_type_id,
            repeat.repeats_left,
            repeat.start_day,
            repeat.rate.to_string()
        ],
    )?;
    Ok(())
}

fn validate_repeat(conn: &Connection, repeat: &RepeatInput) -> Result<()> {
    let known: i64 = conn.query_row(
        "SELECT COUNT(*) FROM repeat_interval_types WHERE id=?1",
        params![repeat.interval_type_id],
        |r| r.get(0),
    )?;
    if known == 0 {
        return Err(Error::invalid(format!(
            "Unknown repeat interval {}",
            repeat.interval_type_id
        )));
    }
    if repeat.repeats_left.is_some_and(|n| n < 0) || repeat.start_day > 31 {
        return Err(Error::invalid("Invalid repeat interval"));
    }
    Ok(())
}

/// Inserts the mirrored side of a transfer and links both rows.
pub(crate) fn insert_peer(conn: &Connection, cf: &mut CashFlow) -> Result<CashFlow> {
    let target = cf
        .peer_account_id
        .ok_or_else(|| Error::invalid("Transfer requires a destination account"))?;
    let mut peer = CashFlow {
        id: 0,
        account_id: target,
        amount: -cf.amount,
        peer_id: Some(cf.id),
        peer_account_id: Some(cf.account_id),
        parent_id: None,
        has_splits: false,
        category_id: None,
        ..cf.clone()
    };
    peer.id = insert(conn, &peer)?;
    accounts::post_to_balance(conn, peer.account_id, posted_amount(&peer))?;
    cf.peer_id = Some(peer.id);
    conn.execute(
        "UPDATE cash_flows SET peer_id=?1 WHERE id=?2",
        params![peer.id, cf.id],
    )?;
    debug!("Paired cash flow {} with {}", cf.id, peer.id);
    Ok(peer)
}

/// Creates a cash flow, its transfer peer or its repeat interval. Balances
/// move for posted rows only.
pub fn create(conn: &Connection, user_id: i64, input: &CashFlowInput) -> Result<CashFlow> {
    if let Some(parent_id) = input.split_parent_id {
        let split = SplitInput {
            amount: input.amount,
            payee_name: input.payee_name.clone(),
            category_id: input.category_id,
            category_name: input.category_name.clone(),
            memo: input.memo.clone(),
        };
        return create_split(conn, user_id, parent_id, &split);
    }

    let account = accounts::get(conn, user_id, input.account_id)?;
    let ty = input.cash_flow_type;
    let amount = ty.apply(input.amount);

    let payee = resolve_payee(conn, user_id, input.payee_id, input.payee_name.as_deref())?;
    let mut category_id = resolve_category(
        conn,
        user_id,
        input.category_id,
        input.category_name.as_deref(),
        !ty.is_debit(),
    )?;
    if category_id.is_none() && !ty.is_transfer() {
        category_id = Some(
            payee
                .as_ref()
                .and_then(|p| p.category_id)
                .unwrap_or(CATEGORY_UNCATEGORIZED),
        );
    }
    let peer_account_id = if ty.is_transfer() {
        Some(transfer_target(conn, user_id, account.id, input.transfer_account_id)?)
    } else {
        None
    };

    let mut cf = CashFlow {
        id: 0,
        account_id: account.id,
        date: input.date,
        tax_year: input.tax_year.unwrap_or(input.date.year()),
        amount,
        kind: if input.repeat.is_some() {
            CashFlowKind::Repeat
        } else {
            CashFlowKind::Posted
        },
        transfer: ty.is_transfer(),
        payee_id: payee.map(|p| p.id),
        category_id,
        peer_id: None,
        peer_account_id,
        parent_id: None,
        has_splits: false,
        import_id: input.import_id,
        trade_id: None,
        transnum: input.transnum.trim().to_string(),
        memo: input.memo.trim().to_string(),
    };
    cf.id = insert(conn, &cf)?;
    accounts::post_to_balance(conn, cf.account_id, posted_amount(&cf))?;

    match &input.repeat {
        Some(repeat) => {
            insert_repeat(conn, cf.id, repeat)?;
            accounts::mark_scheduled(conn, cf.account_id)?;
        }
        None if cf.transfer => {
            insert_peer(conn, &mut cf)?;
        }
        None => {}
    }
    info!(
        "Created cash flow {} on account {} ({} {})",
        cf.id,
        cf.account_id,
        ty.label(),
        cf.amount
    );
    Ok(cf)
}

fn ensure_splittable(parent: &CashFlow) -> Result<()> {
    if parent.transfer {
        return Err(Error::invalid("Transfers cannot be split"));
    }
    if parent.is_split_child() || parent.kind == CashFlowKind::Trade {
        return Err(Error::invalid("Cash flow cannot be split"));
    }
    Ok(())
}

fn split_total(conn: &Connection, parent_id: i64, excluding: Option<i64>) -> Result<Decimal> {
    Ok(children(conn, parent_id)?
        .iter()
        .filter(|c| Some(c.id) != excluding)
        .map(|c| c.amount.abs())
        .sum())
}

/// Adds a child to `parent_id`. The child inherits date, account and sign;
/// the children together may not exceed the parent.
pub fn create_split(
    conn: &Connection,
    user_id: i64,
    parent_id: i64,
    input: &SplitInput,
) -> Result<CashFlow> {
    let (parent, _) = load_owned(conn, user_id, parent_id)?;
    ensure_splittable(&parent)?;

    let magnitude = input.amount.abs();
    if split_total(conn, parent.id, None)? + magnitude > parent.amount.abs() {
        return Err(Error::constraint("Split amounts exceed the parent amount"));
    }
    let income = parent.amount.is_sign_positive();
    let payee = resolve_payee(conn, user_id, None, input.payee_name.as_deref())?;
    let category_id = resolve_category(
        conn,
        user_id,
        input.category_id,
        input.category_name.as_deref(),
        income,
    )?
    .or(Some(CATEGORY_UNCATEGORIZED));

    let mut child = CashFlow {
        id: 0,
        amount: if income { magnitude } else { -magnitude },
        kind: CashFlowKind::Split,
        transfer: false,
        payee_id: payee.map(|p| p.id).or(parent.payee_id),
        category_id,
        peer_id: None,
        peer_account_id: None,
        parent_id: Some(parent.id),
        has_splits: false,
        trade_id: None,
        transnum: String::new(),
        memo: input.memo.trim().to_string(),
        ..parent.clone()
    };
    child.id = insert(conn, &child)?;
    if !parent.has_splits {
        conn.execute(
            "UPDATE cash_flows SET has_splits=1 WHERE id=?1",
            params![parent.id],
        )?;
    }
    info!("Created split {} of cash flow {}", child.id, parent.id);
    Ok(child)
}

/// Children of a split parent and the amount not yet assigned to them.
pub fn list_splits(conn: &Connection, user_id: i64, parent_id: i64) -> Result<(Vec<CashFlow>, Decimal)> {
    let (parent, _) = load_owned(conn, user_id, parent_id)?;
    let kids = children(conn, parent.id)?;
    let assigned: Decimal = kids.iter().map(|c| c.amount).sum();
    Ok((kids, parent.amount - assigned))
}

pub fn update(conn: &Connection, user_id: i64, id: i64, upd: &CashFlowUpdate) -> Result<CashFlow> {
    let (old, _) = load_owned(conn, user_id, id)?;
    if old.kind == CashFlowKind::Trade {
        return Err(Error::invalid("Trade cash flows change through their trade"));
    }
    let mut cf = old.clone();

    if let Some(account_id) = upd.account_id.filter(|a| *a != old.account_id) {
        if old.is_split_child() {
            return Err(Error::invalid("A split cannot move to another account"));
        }
        cf.account_id = accounts::get(conn, user_id, account_id)?.id;
    }
    if !old.is_split_child() {
        if let Some(date) = upd.date {
            cf.date = date;
            cf.tax_year = date.year();
        }
    }
    if let Some(tax_year) = upd.tax_year {
        cf.tax_year = tax_year;
    }

    let ty = if old.is_split_child() {
        let parent = load(conn, old.parent_id.unwrap_or_default())?;
        if upd.cash_flow_type.is_some_and(CashFlowType::is_transfer) {
            return Err(Error::invalid("A split cannot be a transfer"));
        }
        CashFlowType::from_signed(parent.amount, false)
    } else {
        upd.cash_flow_type.unwrap_or_else(|| old.cash_flow_type())
    };
    cf.amount = ty.apply(upd.amount.unwrap_or(old.amount.abs()));
    cf.transfer = ty.is_transfer();

    if upd.payee_id.is_some() || upd.payee_name.is_some() {
        cf.payee_id = resolve_payee(conn, user_id, upd.payee_id, upd.payee_name.as_deref())?
            .map(|p| p.id);
    }
    if upd.category_id.is_some() || upd.category_name.is_some() {
        cf.category_id = resolve_category(
            conn,
            user_id,
            upd.category_id,
            upd.category_name.as_deref(),
            !ty.is_debit(),
        )?;
    }
    if let Some(memo) = &upd.memo {
        cf.memo = memo.trim().to_string();
    }
    if let Some(transnum) = &upd.transnum {
        cf.transnum = transnum.trim().to_string();
    }

    if cf.transfer {
        if cf.has_splits {
            return Err(Error::invalid("Transfers cannot be split"));
        }
        cf.peer_account_id = Some(transfer_target(
            conn,
            user_id,
            cf.account_id,
            upd.transfer_account_id.or(old.peer_account_id),
        )?);
    } else {
        cf.peer_account_id = None;
    }

    if let Some(parent_id) = cf.parent_id.filter(|_| cf.is_split_child()) {
        let parent = load(conn, parent_id)?;
        if split_total(conn, parent_id, Some(cf.id))? + cf.amount.abs() > parent.amount.abs() {
            return Err(Error::constraint("Split amounts exceed the parent amount"));
        }
    }
    if cf.has_splits && split_total(conn, cf.id, None)? > cf.amount.abs() {
        return Err(Error::constraint("Split amounts exceed the parent amount"));
    }

    accounts::post_to_balance(conn, old.account_id, -posted_amount(&old))?;
    accounts::post_to_balance(conn, cf.account_id, posted_amount(&cf))?;

    let wants_peer = cf.transfer && cf.kind == CashFlowKind::Posted;
    match (old.peer_id, wants_peer) {
        (Some(peer_id), true) => {
            let mut peer = load(conn, peer_id)?;
            accounts::post_to_balance(conn, peer.account_id, -posted_amount(&peer))?;
            peer.account_id = cf.peer_account_id.unwrap_or(peer.account_id);
            peer.peer_account_id = Some(cf.account_id);
            peer.amount = -cf.amount;
            peer.date = cf.date;
            peer.tax_year = cf.tax_year;
            peer.memo = cf.memo.clone();
            peer.transnum = cf.transnum.clone();
            save(conn, &peer)?;
            accounts::post_to_balance(conn, peer.account_id, posted_amount(&peer))?;
        }
        (Some(peer_id), false) => {
            let peer = load(conn, peer_id)?;
            accounts::post_to_balance(conn, peer.account_id, -posted_amount(&peer))?;
            conn.execute("DELETE FROM cash_flows WHERE id=?1", params![peer.id])?;
            cf.peer_id = None;
        }
        (None, true) => {
            save(conn, &cf)?;
            insert_peer(conn, &mut cf)?;
        }
        (None, false) => {}
    }
    save(conn, &cf)?;

    if cf.has_splits {
        let negative = cf.amount.is_sign_negative();
        for mut child in children(conn, cf.id)? {
            child.account_id = cf.account_id;
            child.date = cf.date;
            child.tax_year = cf.tax_year;
            child.amount = if negative {
                -child.amount.abs()
            } else {
                child.amount.abs()
            };
            save(conn, &child)?;
        }
    }
    info!("Updated cash flow {}", cf.id);
    Ok(cf)
}

/// Replaces the schedule of a repeat template.
pub fn update_repeat(
    conn: &Connection,
    user_id: i64,
    template_id: i64,
    repeat: &RepeatInput,
) -> Result<RepeatInterval> {
    let (cf, _) = load_owned(conn, user_id, template_id)?;
    if !cf.is_scheduled() {
        return Err(Error::invalid("Cash flow is not scheduled"));
    }
    validate_repeat(conn, repeat)?;
    conn.execute(
        "UPDATE repeat_intervals SET repeat_interval_type_id=?1, repeats_left=?2, start_day=?3, rate=?4
         WHERE cash_flow_id=?5",
        params![
            repeat.interval_type_id,
            repeat.repeats_left,
            repeat.start_day,
            repeat.rate.to_string(),
            cf.id
        ],
    )?;
    repeat_interval(conn, cf.id)?
        .ok_or_else(|| Error::NotFound(format!("repeat interval of {}", cf.id)))
}

pub fn delete(conn: &Connection, user_id: i64, id: i64) -> Result<()> {
    let (cf, _) = load_owned(conn, user_id, id)?;
    if cf.kind == CashFlowKind::Trade {
        return Err(Error::invalid("Trade cash flows are removed with their trade"));
    }
    remove(conn, &cf)
}

/// Removes a row with everything hanging off it: split children, the
/// transfer peer and the repeat interval.
pub(crate) fn remove(conn: &Connection, cf: &CashFlow) -> Result<()> {
    accounts::post_to_balance(conn, cf.account_id, -posted_amount(cf))?;
    conn.execute("DELETE FROM cash_flows WHERE id=?1", params![cf.id])?;

    if cf.is_split_child() {
        if let Some(parent_id) = cf.parent_id {
            conn.execute(
                "UPDATE cash_flows SET has_splits=0 WHERE id=?1
                 AND NOT EXISTS (SELECT 1 FROM cash_flows WHERE parent_id=?1 AND kind='split')",
                params![parent_id],
            )?;
        }
        info!("Deleted split {}", cf.id);
        return Ok(());
    }

    let removed_children = conn.execute(
        "DELETE FROM cash_flows WHERE parent_id=?1 AND kind='split'",
        params![cf.id],
    )?;
    if let Some(peer_id) = cf.peer_id {
        match load(conn, peer_id) {
            Ok(peer) => {
                accounts::post_to_balance(conn, peer.account_id, -posted_amount(&peer))?;
                conn.execute("DELETE FROM cash_flows WHERE id=?1", params![peer.id])?;
            }
            Err(Error::NotFound(_)) => debug!("Peer {} of cash flow {} already gone", peer_id, cf.id),
            Err(e) => return Err(e),
        }
    }
    if cf.is_scheduled() {
        conn.execute(
            "DELETE FROM repeat_intervals WHERE cash_flow_id=?1",
            params![cf.id],
        )?;
        // instances outlive their template
        conn.execute(
            "UPDATE cash_flows SET parent_id=NULL WHERE parent_id=?1",
            params![cf.id],
        )?;
    }
    info!(
        "Deleted cash flow {} ({} splits, peer {:?})",
        cf.id, removed_children, cf.peer_id
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::NewAccount;
    use crate::db::open_in_memory;
    use crate::models::AccountType;
    use rust_decimal_macros::dec;

    fn setup() -> (Connection, i64, i64, i64) {
        let conn = open_in_memory().unwrap();
        let user = accounts::find_or_create_user(&conn, "alice").unwrap();
        let mk = |name: &str| {
            accounts::create(
                &conn,
                user.id,
                &NewAccount {
                    name: name.into(),
                    account_type: AccountType::Deposit,
                    currency: "USD".into(),
                    taxable: true,
                },
            )
            .unwrap()
            .id
        };
        let a = mk("Checking");
        let b = mk("Savings");
        (conn, user.id, a, b)
    }

    fn balance(conn: &Connection, user: i64, account: i64) -> Decimal {
        accounts::get(conn, user, account).unwrap().cash_balance
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn debit_uses_payee_default_category() {
        let (conn, user, a, _) = setup();
        payees::create(&conn, user, "Grocer", Some(3), false).unwrap();
        let mut input = CashFlowInput::new(a, date("2024-03-01"), dec!(42.10), CashFlowType::Debit);
        input.payee_name = Some("grocer".into());
        let cf = create(&conn, user, &input).unwrap();
        assert_eq!(cf.amount, dec!(-42.10));
        assert_eq!(cf.category_id, Some(3));
        assert_eq!(cf.tax_year, 2024);
        assert_eq!(balance(&conn, user, a), dec!(-42.10));
    }

    #[test]
    fn update_moves_amount_between_accounts() {
        let (conn, user, a, b) = setup();
        let input = CashFlowInput::new(a, date("2024-03-01"), dec!(10), CashFlowType::Credit);
        let cf = create(&conn, user, &input).unwrap();
        let upd = CashFlowUpdate {
            account_id: Some(b),
            amount: Some(dec!(25)),
            ..Default::default()
        };
        update(&conn, user, cf.id, &upd).unwrap();
        assert_eq!(balance(&conn, user, a), Decimal::ZERO);
        assert_eq!(balance(&conn, user, b), dec!(25));
    }

    #[test]
    fn transfer_becomes_plain_and_drops_peer() {
        let (conn, user, a, b) = setup();
        let mut input = CashFlowInput::new(a, date("2024-03-01"), dec!(50), CashFlowType::DebitTransfer);
        input.transfer_account_id = Some(b);
        let cf = create(&conn, user, &input).unwrap();
        assert_eq!(balance(&conn, user, b), dec!(50));

        let upd = CashFlowUpdate {
            cash_flow_type: Some(CashFlowType::Debit),
            ..Default::default()
        };
        let cf = update(&conn, user, cf.id, &upd).unwrap();
        assert!(cf.peer_id.is_none());
        assert_eq!(balance(&conn, user, a), dec!(-50));
        assert_eq!(balance(&conn, user, b), Decimal::ZERO);
    }

    #[test]
    fn deleting_transfer_tolerates_missing_peer_only() {
        let (conn, user, a, b) = setup();
        let mut input = CashFlowInput::new(a, date("2024-03-01"), dec!(50), CashFlowType::DebitTransfer);
        input.transfer_account_id = Some(b);
        let gone = create(&conn, user, &input).unwrap();
        let broken = create(&conn, user, &input).unwrap();

        conn.execute("DELETE FROM cash_flows WHERE id=?1", params![gone.peer_id]).unwrap();
        delete(&conn, user, gone.id).unwrap();

        conn.execute("UPDATE cash_flows SET amount='fifty' WHERE id=?1", params![broken.peer_id])
            .unwrap();
        assert!(matches!(delete(&conn, user, broken.id), Err(Error::Storage(_))));
    }

    #[test]
    fn split_rules() {
        let (conn, user, a, b) = setup();
        let parent = create(
            &conn,
            user,
            &CashFlowInput::new(a, date("2024-03-01"), dec!(100), CashFlowType::Debit),
        )
        .unwrap();
        let half = SplitInput {
            amount: dec!(60),
            ..Default::default()
        };
        let child = create_split(&conn, user, parent.id, &half).unwrap();
        assert_eq!(child.amount, dec!(-60));
        assert!(matches!(
            create_split(&conn, user, parent.id, &half),
            Err(Error::ConstraintViolation(_))
        ));
        assert!(matches!(
            create_split(&conn, user, child.id, &half),
            Err(Error::InvalidInput(_))
        ));
        let (_, residual) = list_splits(&conn, user, parent.id).unwrap();
        assert_eq!(residual, dec!(-40));

        let mut transfer = CashFlowInput::new(a, date("2024-03-01"), dec!(5), CashFlowType::DebitTransfer);
        transfer.transfer_account_id = Some(b);
        let transfer = create(&conn, user, &transfer).unwrap();
        assert!(matches!(
            create_split(&conn, user, transfer.id, &half),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn deleting_last_split_clears_flag() {
        let (conn, user, a, _) = setup();
        let parent = create(
            &conn,
            user,
            &CashFlowInput::new(a, date("2024-03-01"), dec!(30), CashFlowType::Debit),
        )
        .unwrap();
        let child = create_split(
            &conn,
            user,
            parent.id,
            &SplitInput {
                amount: dec!(30),
                ..Default::default()
            },
        )
        .unwrap();
        delete(&conn, user, child.id).unwrap();
        assert!(!load(&conn, parent.id).unwrap().has_splits);
        assert_eq!(balance(&conn, user, a), dec!(-30));
    }

    #[test]
    fn repeat_template_does_not_post() {
        let (conn, user, a, _) = setup();
        let mut input = CashFlowInput::new(a, date("2024-03-01"), dec!(1000), CashFlowType::Credit);
        input.repeat = Some(RepeatInput {
            interval_type_id: 4,
            repeats_left: Some(3),
            start_day: 1,
            rate: Decimal::ZERO,
        });
        let cf = create(&conn, user, &input).unwrap();
        assert!(cf.is_scheduled());
        assert_eq!(balance(&conn, user, a), Decimal::ZERO);
        assert!(accounts::get(&conn, user, a).unwrap().has_scheduled);

        input.repeat = Some(RepeatInput {
            interval_type_id: 99,
            repeats_left: None,
            start_day: 0,
            rate: Decimal::ZERO,
        });
        assert!(matches!(create(&conn, user, &input), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn foreign_account_is_denied() {
        let (conn, user, a, _) = setup();
        let bob = accounts::find_or_create_user(&conn, "bob").unwrap();
        let cf = create(
            &conn,
            user,
            &CashFlowInput::new(a, date("2024-03-01"), dec!(1), CashFlowType::Debit),
        )
        .unwrap();
        assert!(matches!(delete(&conn, bob.id, cf.id), Err(Error::PermissionDenied)));
        assert!(matches!(
            create(
                &conn,
                bob.id,
                &CashFlowInput::new(a, date("2024-03-01"), dec!(1), CashFlowType::Debit)
            ),
            Err(Error::PermissionDenied)
        ));
    }
}
