use crate::core::errors::RoomtabError;
use crate::core::models::{
    expense::Expense,
    room::{Member, Room},
    round::Round,
    settlement::{Settlement, SettlementDraft, SettlementStatus},
    user::User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Outcome of a settlement status write, including any round closure it triggered.
#[derive(Clone, Debug, PartialEq)]
pub struct SettlementAdvance {
    pub settlement: Settlement,
    /// The round, if this write was the last confirmation and closed it.
    pub cleared_round: Option<Round>,
    /// The OPEN round that replaced `cleared_round`.
    pub successor_round: Option<Round>,
}

/// Persistence seam. Compound operations (`create_room`, `insert_expense`,
/// `ensure_open_round`, `replace_settlements`, `advance_settlement`) must be
/// atomic with respect to each other.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_user(&self, user: User) -> Result<User, RoomtabError>;
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, RoomtabError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, RoomtabError>;

    /// Stores the room with its admin and opens its first round.
    async fn create_room(&self, room: Room, admin: Member, now: DateTime<Utc>) -> Result<Round, RoomtabError>;
    async fn get_room(&self, room_id: &str) -> Result<Option<Room>, RoomtabError>;
    async fn get_room_by_join_code(&self, join_code: &str) -> Result<Option<Room>, RoomtabError>;
    async fn add_member(&self, member: Member) -> Result<Member, RoomtabError>;
    async fn get_member(&self, room_id: &str, user_id: &str) -> Result<Option<Member>, RoomtabError>;
    /// Members in join order.
    async fn list_members(&self, room_id: &str) -> Result<Vec<Member>, RoomtabError>;

    async fn get_round(&self, round_id: &str) -> Result<Option<Round>, RoomtabError>;
    async fn find_open_round(&self, room_id: &str) -> Result<Option<Round>, RoomtabError>;
    async fn ensure_open_round(&self, room_id: &str, now: DateTime<Utc>) -> Result<Round, RoomtabError>;
    /// Newest first.
    async fn list_rounds(&self, room_id: &str) -> Result<Vec<Round>, RoomtabError>;

    /// Files the expense under the room's OPEN round, opening one if needed.
    async fn insert_expense(&self, expense: Expense, now: DateTime<Utc>) -> Result<Expense, RoomtabError>;
    async fn get_expense(&self, expense_id: &str) -> Result<Option<Expense>, RoomtabError>;
    async fn update_expense(&self, expense: Expense) -> Result<Expense, RoomtabError>;
    async fn delete_expense(&self, expense_id: &str) -> Result<(), RoomtabError>;
    /// Expenses of one round in creation order.
    async fn list_expenses(&self, room_id: &str, round_id: &str) -> Result<Vec<Expense>, RoomtabError>;

    async fn get_settlement(&self, settlement_id: &str) -> Result<Option<Settlement>, RoomtabError>;
    async fn list_settlements(&self, room_id: &str, round_id: &str) -> Result<Vec<Settlement>, RoomtabError>;
    /// Deletes the round's batch and inserts `drafts` as PENDING rows.
    async fn replace_settlements(
        &self,
        room_id: &str,
        round_id: &str,
        drafts: Vec<SettlementDraft>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Settlement>, RoomtabError>;
    /// Compare-and-set on the settlement status followed by the round closure
    /// check. Fails with `WriteConflict` when the stored status is not `expected`.
    async fn advance_settlement(
        &self,
        settlement_id: &str,
        expected: SettlementStatus,
        next: SettlementStatus,
        now: DateTime<Utc>,
    ) -> Result<SettlementAdvance, RoomtabError>;
}

pub mod in_memory;
