use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::core::errors::RoomtabError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum SettlementStatus {
    Pending,
    Paid,
    Confirmed,
}

impl std::fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SettlementStatus::Pending => "PENDING",
            SettlementStatus::Paid => "PAID",
            SettlementStatus::Confirmed => "CONFIRMED",
        };
        write!(f, "{}", s)
    }
}

impl SettlementStatus {
    /// The only legal moves are PENDING -> PAID and PAID -> CONFIRMED.
    pub fn advance_to(self, requested: SettlementStatus) -> Result<SettlementStatus, RoomtabError> {
        match (self, requested) {
            (SettlementStatus::Pending, SettlementStatus::Paid)
            | (SettlementStatus::Paid, SettlementStatus::Confirmed) => Ok(requested),
            (from, to) => Err(RoomtabError::InvalidStatusTransition { from, to }),
        }
    }
}

/// A computed obligation before it is persisted.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct SettlementDraft {
    pub from_user_id: String,
    pub to_user_id: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Settlement {
    pub id: String,
    pub room_id: String,
    pub round_id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub amount: Decimal,
    pub status: SettlementStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Settlement {
    pub fn from_draft(room_id: &str, round_id: &str, draft: SettlementDraft, created_at: DateTime<Utc>) -> Self {
        Settlement {
            id: uuid::Uuid::new_v4().to_string(),
            room_id: room_id.to_string(),
            round_id: round_id.to_string(),
            from_user_id: draft.from_user_id,
            to_user_id: draft.to_user_id,
            amount: draft.amount,
            status: SettlementStatus::Pending,
            created_at,
            updated_at: created_at,
        }
    }
}
