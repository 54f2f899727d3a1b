//! Turns a balance vector into directed payment obligations.
//!
//! The default pass walks creditors and debtors in the order the balances
//! were produced and pairs them greedily. It is not a minimum-transaction
//! optimiser: the number of obligations depends on member order.
//! [`MatchStrategy::LargestFirst`] sorts both sides by magnitude first,
//! which usually emits fewer rows but still gives no optimality guarantee.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

use crate::constants::SETTLEMENT_TOLERANCE;
use crate::core::balance::MemberBalance;
use crate::core::models::settlement::SettlementDraft;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    #[default]
    InsertionOrder,
    LargestFirst,
}

impl FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insertion" | "insertion_order" => Ok(MatchStrategy::InsertionOrder),
            "largest_first" | "largest" => Ok(MatchStrategy::LargestFirst),
            other => Err(format!("unknown settlement strategy: {other}")),
        }
    }
}

struct Party<'a> {
    user_id: &'a str,
    remaining: Decimal,
}

/// Pairs debtors with creditors until either side is exhausted.
///
/// Every emitted amount exceeds [`SETTLEMENT_TOLERANCE`]; balances inside the
/// tolerance band are treated as already settled.
pub fn match_settlements(balances: &[MemberBalance], strategy: MatchStrategy) -> Vec<SettlementDraft> {
    let mut creditors: Vec<Party> = balances
        .iter()
        .filter(|b| b.balance > SETTLEMENT_TOLERANCE)
        .map(|b| Party {
            user_id: &b.user_id,
            remaining: b.balance,
        })
        .collect();
    let mut debtors: Vec<Party> = balances
        .iter()
        .filter(|b| b.balance < -SETTLEMENT_TOLERANCE)
        .map(|b| Party {
            user_id: &b.user_id,
            remaining: -b.balance,
        })
        .collect();

    if strategy == MatchStrategy::LargestFirst {
        // stable sort keeps insertion order among equal amounts
        creditors.sort_by(|a, b| b.remaining.cmp(&a.remaining));
        debtors.sort_by(|a, b| b.remaining.cmp(&a.remaining));
    }

    let mut drafts = Vec::new();
    let (mut ci, mut di) = (0, 0);
    while ci < creditors.len() && di < debtors.len() {
        let creditor = &mut creditors[ci];
        let debtor = &mut debtors[di];
        let amount = creditor.remaining.min(debtor.remaining);

        if amount > SETTLEMENT_TOLERANCE {
            drafts.push(SettlementDraft {
                from_user_id: debtor.user_id.to_string(),
                to_user_id: creditor.user_id.to_string(),
                amount,
            });
        }

        creditor.remaining -= amount;
        debtor.remaining -= amount;

        if creditor.remaining <= SETTLEMENT_TOLERANCE {
            ci += 1;
        }
        if debtor.remaining <= SETTLEMENT_TOLERANCE {
            di += 1;
        }
    }

    drafts
}
