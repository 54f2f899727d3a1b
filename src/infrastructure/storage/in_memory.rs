use crate::core::errors::RoomtabError;
use crate::core::models::{
    expense::Expense,
    room::{Member, Room},
    round::Round,
    settlement::{Settlement, SettlementDraft, SettlementStatus},
    user::User,
};
use crate::infrastructure::storage::{SettlementAdvance, Storage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    users_by_email: HashMap<String, String>,
    rooms: HashMap<String, Room>,
    rooms_by_join_code: HashMap<String, String>,
    members: HashMap<String, Vec<Member>>,
    rounds: Vec<Round>,
    expenses: Vec<Expense>,
    settlements: Vec<Settlement>,
}

impl Tables {
    fn open_round(&self, room_id: &str) -> Option<&Round> {
        self.rounds.iter().find(|r| r.room_id == room_id && r.is_open())
    }

    fn ensure_open_round(&mut self, room_id: &str, now: DateTime<Utc>) -> Round {
        if let Some(round) = self.open_round(room_id) {
            return round.clone();
        }
        let round = Round::open(room_id, now);
        info!(room_id, round_id = %round.id, "opened round");
        self.rounds.push(round.clone());
        round
    }

    fn require_open_round(&self, round_id: &str) -> Result<&Round, RoomtabError> {
        let round = self
            .rounds
            .iter()
            .find(|r| r.id == round_id)
            .ok_or_else(|| RoomtabError::RoundNotFound(round_id.to_string()))?;
        if !round.is_open() {
            return Err(RoomtabError::RoundNotOpen(round_id.to_string()));
        }
        Ok(round)
    }

    fn expense_index(&self, expense_id: &str) -> Result<usize, RoomtabError> {
        self.expenses
            .iter()
            .position(|e| e.id == expense_id)
            .ok_or_else(|| RoomtabError::ExpenseNotFound(expense_id.to_string()))
    }

    /// Clears the round once every one of its settlements is CONFIRMED and
    /// opens the successor. A round without settlements, or one already
    /// cleared, is left alone.
    fn close_round_if_all_confirmed(&mut self, round_id: &str, now: DateTime<Utc>) -> (Option<Round>, Option<Round>) {
        let mut batch = self.settlements.iter().filter(|s| s.round_id == round_id).peekable();
        if batch.peek().is_none() || !batch.all(|s| s.status == SettlementStatus::Confirmed) {
            return (None, None);
        }

        let Some(round) = self.rounds.iter_mut().find(|r| r.id == round_id) else {
            return (None, None);
        };
        if !round.clear(now) {
            return (None, None);
        }
        let cleared = round.clone();
        info!(room_id = %cleared.room_id, round_id, "round cleared");

        let successor = self.ensure_open_round(&cleared.room_id, now);
        (Some(cleared), Some(successor))
    }
}

/// Process-local store. All tables sit behind one lock, so each method is a
/// single serialised unit of work.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create_user(&self, user: User) -> Result<User, RoomtabError> {
        let mut tables = self.tables.write().await;
        let email_key = user.email.to_lowercase();
        if tables.users_by_email.contains_key(&email_key) {
            return Err(RoomtabError::EmailAlreadyRegistered(user.email));
        }
        tables.users_by_email.insert(email_key, user.id.clone());
        tables.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, RoomtabError> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(user_id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, RoomtabError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users_by_email
            .get(&email.to_lowercase())
            .and_then(|id| tables.users.get(id).cloned()))
    }

    async fn create_room(&self, room: Room, admin: Member, now: DateTime<Utc>) -> Result<Round, RoomtabError> {
        let mut tables = self.tables.write().await;
        if tables.rooms.contains_key(&room.id) {
            return Err(RoomtabError::StorageError(format!("Room {} already exists", room.id)));
        }
        tables.rooms_by_join_code.insert(room.join_code.clone(), room.id.clone());
        tables.members.insert(room.id.clone(), vec![admin]);
        tables.rooms.insert(room.id.clone(), room.clone());
        Ok(tables.ensure_open_round(&room.id, now))
    }

    async fn get_room(&self, room_id: &str) -> Result<Option<Room>, RoomtabError> {
        let tables = self.tables.read().await;
        Ok(tables.rooms.get(room_id).cloned())
    }

    async fn get_room_by_join_code(&self, join_code: &str) -> Result<Option<Room>, RoomtabError> {
        let tables = self.tables.read().await;
        Ok(tables
            .rooms_by_join_code
            .get(join_code)
            .and_then(|room_id| tables.rooms.get(room_id).cloned()))
    }

    async fn add_member(&self, member: Member) -> Result<Member, RoomtabError> {
        let mut tables = self.tables.write().await;
        if !tables.rooms.contains_key(&member.room_id) {
            return Err(RoomtabError::RoomNotFound(member.room_id));
        }
        let members = tables.members.entry(member.room_id.clone()).or_default();
        if members.iter().any(|m| m.user_id == member.user_id) {
            return Err(RoomtabError::AlreadyRoomMember(member.user_id));
        }
        members.push(member.clone());
        Ok(member)
    }

    async fn get_member(&self, room_id: &str, user_id: &str) -> Result<Option<Member>, RoomtabError> {
        let tables = self.tables.read().await;
        Ok(tables
            .members
            .get(room_id)
            .and_then(|members| members.iter().find(|m| m.user_id == user_id).cloned()))
    }

    async fn list_members(&self, room_id: &str) -> Result<Vec<Member>, RoomtabError> {
        let tables = self.tables.read().await;
        Ok(tables.members.get(room_id).cloned().unwrap_or_default())
    }

    async fn get_round(&self, round_id: &str) -> Result<Option<Round>, RoomtabError> {
        let tables = self.tables.read().await;
        Ok(tables.rounds.iter().find(|r| r.id == round_id).cloned())
    }

    async fn find_open_round(&self, room_id: &str) -> Result<Option<Round>, RoomtabError> {
        let tables = self.tables.read().await;
        Ok(tables.open_round(room_id).cloned())
    }

    async fn ensure_open_round(&self, room_id: &str, now: DateTime<Utc>) -> Result<Round, RoomtabError> {
        let mut tables = self.tables.write().await;
        if !tables.rooms.contains_key(room_id) {
            return Err(RoomtabError::RoomNotFound(room_id.to_string()));
        }
        Ok(tables.ensure_open_round(room_id, now))
    }

    async fn list_rounds(&self, room_id: &str) -> Result<Vec<Round>, RoomtabError> {
        let tables = self.tables.read().await;
        Ok(tables
            .rounds
            .iter()
            .rev()
            .filter(|r| r.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn insert_expense(&self, mut expense: Expense, now: DateTime<Utc>) -> Result<Expense, RoomtabError> {
        let mut tables = self.tables.write().await;
        if !tables.rooms.contains_key(&expense.room_id) {
            return Err(RoomtabError::RoomNotFound(expense.room_id));
        }
        expense.round_id = tables.ensure_open_round(&expense.room_id, now).id;
        tables.expenses.push(expense.clone());
        Ok(expense)
    }

    async fn get_expense(&self, expense_id: &str) -> Result<Option<Expense>, RoomtabError> {
        let tables = self.tables.read().await;
        Ok(tables.expenses.iter().find(|e| e.id == expense_id).cloned())
    }

    async fn update_expense(&self, expense: Expense) -> Result<Expense, RoomtabError> {
        let mut tables = self.tables.write().await;
        let idx = tables.expense_index(&expense.id)?;
        tables.require_open_round(&tables.expenses[idx].round_id)?;
        if tables.expenses[idx].round_id != expense.round_id {
            return Err(RoomtabError::StorageError(format!(
                "Expense {} cannot move between rounds",
                expense.id
            )));
        }
        tables.expenses[idx] = expense.clone();
        Ok(expense)
    }

    async fn delete_expense(&self, expense_id: &str) -> Result<(), RoomtabError> {
        let mut tables = self.tables.write().await;
        let idx = tables.expense_index(expense_id)?;
        tables.require_open_round(&tables.expenses[idx].round_id)?;
        tables.expenses.remove(idx);
        Ok(())
    }

    async fn list_expenses(&self, room_id: &str, round_id: &str) -> Result<Vec<Expense>, RoomtabError> {
        let tables = self.tables.read().await;
        Ok(tables
            .expenses
            .iter()
            .filter(|e| e.room_id == room_id && e.round_id == round_id)
            .cloned()
            .collect())
    }

    async fn get_settlement(&self, settlement_id: &str) -> Result<Option<Settlement>, RoomtabError> {
        let tables = self.tables.read().await;
        Ok(tables.settlements.iter().find(|s| s.id == settlement_id).cloned())
    }

    async fn list_settlements(&self, room_id: &str, round_id: &str) -> Result<Vec<Settlement>, RoomtabError> {
        let tables = self.tables.read().await;
        Ok(tables
            .settlements
            .iter()
            .filter(|s| s.room_id == room_id && s.round_id == round_id)
            .cloned()
            .collect())
    }

    async fn replace_settlements(
        &self,
        room_id: &str,
        round_id: &str,
        drafts: Vec<SettlementDraft>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Settlement>, RoomtabError> {
        let mut tables = self.tables.write().await;
        let round = tables.require_open_round(round_id)?;
        if round.room_id != room_id {
            return Err(RoomtabError::RoundNotFound(round_id.to_string()));
        }

        tables.settlements.retain(|s| s.round_id != round_id);
        let batch: Vec<Settlement> = drafts
            .into_iter()
            .map(|draft| Settlement::from_draft(room_id, round_id, draft, now))
            .collect();
        tables.settlements.extend(batch.iter().cloned());
        Ok(batch)
    }

    async fn advance_settlement(
        &self,
        settlement_id: &str,
        expected: SettlementStatus,
        next: SettlementStatus,
        now: DateTime<Utc>,
    ) -> Result<SettlementAdvance, RoomtabError> {
        let mut tables = self.tables.write().await;
        let idx = tables
            .settlements
            .iter()
            .position(|s| s.id == settlement_id)
            .ok_or_else(|| RoomtabError::SettlementNotFound(settlement_id.to_string()))?;

        let round_id = tables.settlements[idx].round_id.clone();
        tables.require_open_round(&round_id)?;

        if tables.settlements[idx].status != expected {
            return Err(RoomtabError::WriteConflict(settlement_id.to_string()));
        }
        expected.advance_to(next)?;

        let settlement = &mut tables.settlements[idx];
        settlement.status = next;
        settlement.updated_at = now;
        let settlement = settlement.clone();

        let (cleared_round, successor_round) = tables.close_round_if_all_confirmed(&round_id, now);
        Ok(SettlementAdvance {
            settlement,
            cleared_round,
            successor_round,
        })
    }
}
