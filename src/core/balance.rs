//! Per-round net balances.
//!
//! Every member starts at minus the fair share of the round total and is
//! credited with what they paid. Amounts stay at full decimal precision;
//! rounding happens only when a response is rendered.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use utoipa::ToSchema;

use crate::core::errors::RoomtabError;
use crate::core::models::{expense::Expense, room::Member};

/// Net position of one member: positive is owed money, negative owes money.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct MemberBalance {
    pub user_id: String,
    pub balance: Decimal,
}

pub fn total_spent(expenses: &[Expense]) -> Decimal {
    expenses.iter().map(|e| e.amount).sum()
}

/// Computes each member's balance for one round, in member-list order.
///
/// Fails with [`RoomtabError::EmptyMemberList`] when there is nobody to share
/// the costs, and with [`RoomtabError::PayerNotMember`] when an expense was
/// paid by someone outside `members`.
pub fn calculate_balances(expenses: &[Expense], members: &[Member]) -> Result<Vec<MemberBalance>, RoomtabError> {
    if members.is_empty() {
        return Err(RoomtabError::EmptyMemberList);
    }

    let total = total_spent(expenses);
    let fair_share = total / Decimal::from(members.len());

    let mut balances: Vec<MemberBalance> = members
        .iter()
        .map(|m| MemberBalance {
            user_id: m.user_id.clone(),
            balance: -fair_share,
        })
        .collect();

    let mut index: HashMap<&str, usize> = HashMap::with_capacity(members.len());
    for (i, member) in members.iter().enumerate() {
        index.entry(member.user_id.as_str()).or_insert(i);
    }

    for expense in expenses {
        let slot = index
            .get(expense.payer_id.as_str())
            .copied()
            .ok_or_else(|| RoomtabError::PayerNotMember(expense.payer_id.clone()))?;
        balances[slot].balance += expense.amount;
    }

    debug!(
        expenses = expenses.len(),
        members = members.len(),
        %total,
        %fair_share,
        "balances calculated"
    );
    Ok(balances)
}
