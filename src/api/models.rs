use axum::{Json, http::StatusCode, response::IntoResponse};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::constants::PRESENTATION_DECIMALS;
use crate::core::{
    balance::MemberBalance,
    errors::{ErrorKind, RoomtabError},
    lifecycle::RoundBalances,
    models::{
        round::Round,
        settlement::{Settlement, SettlementStatus},
    },
};
use crate::infrastructure::storage::SettlementAdvance;

#[derive(Deserialize, ToSchema)]
pub struct RegisterUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateRoomRequest {
    pub name: String,
}

#[derive(Deserialize, ToSchema)]
pub struct JoinRoomRequest {
    pub join_code: String,
}

#[derive(Deserialize, ToSchema)]
pub struct AdvanceSettlementRequest {
    pub status: SettlementStatus,
}

#[derive(Serialize, ToSchema)]
pub struct AdvanceSettlementResponse {
    pub settlement: Settlement,
    pub cleared_round: Option<Round>,
    pub successor_round: Option<Round>,
}

impl From<SettlementAdvance> for AdvanceSettlementResponse {
    fn from(advance: SettlementAdvance) -> Self {
        AdvanceSettlementResponse {
            settlement: present_settlement(advance.settlement),
            cleared_round: advance.cleared_round,
            successor_round: advance.successor_round,
        }
    }
}

/// Amounts are kept at full precision internally and rounded only here.
pub fn present_amount(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(PRESENTATION_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
}

pub fn present_settlement(mut settlement: Settlement) -> Settlement {
    settlement.amount = present_amount(settlement.amount);
    settlement
}

pub fn present_balances(balances: RoundBalances) -> RoundBalances {
    RoundBalances {
        round_id: balances.round_id,
        total: present_amount(balances.total),
        fair_share: present_amount(balances.fair_share),
        balances: balances
            .balances
            .into_iter()
            .map(|b| MemberBalance {
                user_id: b.user_id,
                balance: present_amount(b.balance),
            })
            .collect(),
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
}

// Newtype wrapper for RoomtabError to implement IntoResponse
pub struct ApiError(pub RoomtabError);

impl From<RoomtabError> for ApiError {
    fn from(err: RoomtabError) -> Self {
        ApiError(err)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::InvalidState | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if kind == ErrorKind::Internal {
            tracing::error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                kind,
            }),
        )
            .into_response()
    }
}
