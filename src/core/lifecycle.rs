//! Round lifecycle: when settlements may be (re)generated, who may move a
//! settlement along PENDING -> PAID -> CONFIRMED, and closing a round once
//! every settlement is confirmed.
//!
//! Closure itself happens inside [`Storage::advance_settlement`] so the
//! status write, the "all confirmed" check and the successor round are one
//! atomic unit. This module only decides whether a request may reach it.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::core::balance::{self, MemberBalance};
use crate::core::errors::RoomtabError;
use crate::core::matcher;
use crate::core::models::{
    round::Round,
    settlement::{Settlement, SettlementStatus},
};
use crate::core::services::RoomtabService;
use crate::infrastructure::storage::{SettlementAdvance, Storage};

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq, Eq)]
pub struct RoundBalances {
    pub round_id: String,
    pub total: Decimal,
    pub fair_share: Decimal,
    pub balances: Vec<MemberBalance>,
}

impl<S: Storage> RoomtabService<S> {
    /// The room's OPEN round, created on demand.
    pub async fn current_round(&self, room_id: &str, caller: &str) -> Result<Round, RoomtabError> {
        self.require_membership(room_id, caller).await?;
        self.storage.ensure_open_round(room_id, Utc::now()).await
    }

    pub async fn list_rounds(&self, room_id: &str, caller: &str) -> Result<Vec<Round>, RoomtabError> {
        self.require_membership(room_id, caller).await?;
        self.storage.list_rounds(room_id).await
    }

    async fn round_in_room(&self, round_id: &str, caller: &str) -> Result<Round, RoomtabError> {
        let round = self
            .storage
            .get_round(round_id)
            .await?
            .ok_or_else(|| RoomtabError::RoundNotFound(round_id.to_string()))?;
        self.require_membership(&round.room_id, caller).await?;
        Ok(round)
    }

    async fn compute_balances(&self, round: &Round) -> Result<RoundBalances, RoomtabError> {
        let expenses = self.storage.list_expenses(&round.room_id, &round.id).await?;
        let members = self.storage.list_members(&round.room_id).await?;
        let balances = balance::calculate_balances(&expenses, &members)?;
        let total = balance::total_spent(&expenses);

        Ok(RoundBalances {
            round_id: round.id.clone(),
            fair_share: total / Decimal::from(members.len()),
            total,
            balances,
        })
    }

    /// Balances of the room's current OPEN round.
    pub async fn balances(&self, room_id: &str, caller: &str) -> Result<RoundBalances, RoomtabError> {
        let round = self.current_round(room_id, caller).await?;
        self.compute_balances(&round).await
    }

    /// Balances of any round of a room the caller belongs to, cleared ones included.
    pub async fn round_balances(&self, round_id: &str, caller: &str) -> Result<RoundBalances, RoomtabError> {
        let round = self.round_in_room(round_id, caller).await?;
        self.compute_balances(&round).await
    }

    /// Recomputes the OPEN round's obligations and replaces its settlement
    /// batch. Admin only. Calling it twice with unchanged expenses yields the
    /// same triples under new ids.
    pub async fn generate_settlements(&self, room_id: &str, caller: &str) -> Result<Vec<Settlement>, RoomtabError> {
        let member = self.require_membership(room_id, caller).await?;
        self.require_admin(&member)?;

        let round = self
            .storage
            .find_open_round(room_id)
            .await?
            .ok_or_else(|| RoomtabError::NoOpenRound(room_id.to_string()))?;

        let computed = self.compute_balances(&round).await?;
        let drafts = matcher::match_settlements(&computed.balances, self.settings.settlement_strategy);
        let settlements = self
            .storage
            .replace_settlements(room_id, &round.id, drafts, Utc::now())
            .await?;

        info!(
            room_id,
            round_id = %round.id,
            total = %computed.total,
            settlements = settlements.len(),
            strategy = ?self.settings.settlement_strategy,
            "settlements generated"
        );
        Ok(settlements)
    }

    /// Settlements of the room's current OPEN round.
    pub async fn list_settlements(&self, room_id: &str, caller: &str) -> Result<Vec<Settlement>, RoomtabError> {
        let round = self.current_round(room_id, caller).await?;
        self.storage.list_settlements(room_id, &round.id).await
    }

    pub async fn list_round_settlements(&self, round_id: &str, caller: &str) -> Result<Vec<Settlement>, RoomtabError> {
        let round = self.round_in_room(round_id, caller).await?;
        self.storage.list_settlements(&round.room_id, &round.id).await
    }

    /// The debtor marks a settlement PAID; the creditor marks it CONFIRMED.
    fn require_party(&self, settlement: &Settlement, caller: &str, next: SettlementStatus) -> Result<(), RoomtabError> {
        let allowed = match next {
            SettlementStatus::Paid => settlement.from_user_id == caller,
            SettlementStatus::Confirmed => settlement.to_user_id == caller,
            SettlementStatus::Pending => false,
        };
        if !allowed {
            return Err(RoomtabError::NotSettlementParty(caller.to_string(), next));
        }
        Ok(())
    }

    /// Moves a settlement one step along its status machine. The confirmation
    /// that completes a round clears it and opens the next one.
    ///
    /// A concurrent write on the same settlement makes the store report
    /// `WriteConflict`; the request is then re-validated against fresh state
    /// up to `conflict_retry_limit` times.
    pub async fn advance_settlement_status(
        &self,
        settlement_id: &str,
        caller: &str,
        requested: SettlementStatus,
    ) -> Result<SettlementAdvance, RoomtabError> {
        let mut attempt = 0;
        loop {
            let settlement = self
                .storage
                .get_settlement(settlement_id)
                .await?
                .ok_or_else(|| RoomtabError::SettlementNotFound(settlement_id.to_string()))?;
            self.require_membership(&settlement.room_id, caller).await?;

            let round = self
                .storage
                .get_round(&settlement.round_id)
                .await?
                .ok_or_else(|| RoomtabError::RoundNotFound(settlement.round_id.clone()))?;
            if !round.is_open() {
                return Err(RoomtabError::RoundNotOpen(round.id));
            }

            let next = settlement.status.advance_to(requested)?;
            self.require_party(&settlement, caller, next)?;

            match self
                .storage
                .advance_settlement(settlement_id, settlement.status, next, Utc::now())
                .await
            {
                Ok(advance) => {
                    info!(
                        settlement_id,
                        round_id = %round.id,
                        from = %settlement.status,
                        to = %next,
                        "settlement advanced"
                    );
                    if let (Some(cleared), Some(successor)) = (&advance.cleared_round, &advance.successor_round) {
                        info!(
                            room_id = %cleared.room_id,
                            round_id = %cleared.id,
                            successor_id = %successor.id,
                            "round closed"
                        );
                    }
                    return Ok(advance);
                }
                Err(RoomtabError::WriteConflict(_)) if attempt < self.settings.conflict_retry_limit => {
                    attempt += 1;
                    warn!(settlement_id, attempt, "settlement changed concurrently, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
