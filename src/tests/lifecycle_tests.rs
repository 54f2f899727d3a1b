use super::{create_test_service, household, init_tracing, pay, test_settings};
use crate::core::errors::{ErrorKind, RoomtabError};
use crate::core::matcher::MatchStrategy;
use crate::core::models::{
    expense::{Expense, ExpenseChanges},
    room::{Member, Room},
    round::{Round, RoundStatus},
    settlement::{Settlement, SettlementDraft, SettlementStatus},
    user::User,
};
use crate::core::services::RoomtabService;
use crate::infrastructure::storage::{SettlementAdvance, Storage, in_memory::InMemoryStorage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn triples(settlements: &[Settlement]) -> Vec<(String, String, rust_decimal::Decimal)> {
    settlements
        .iter()
        .map(|s| (s.from_user_id.clone(), s.to_user_id.clone(), s.amount))
        .collect()
}

#[tokio::test]
async fn test_generate_settlements_for_single_payer() {
    let service = create_test_service();
    let house = household(&service, &["Alice", "Bob", "Carol"]).await;
    pay(&service, &house, 0, dec!(300)).await;

    let settlements = service.generate_settlements(&house.room.id, house.admin()).await.unwrap();

    assert_eq!(
        triples(&settlements),
        vec![
            (house.user(1).to_string(), house.admin().to_string(), dec!(100)),
            (house.user(2).to_string(), house.admin().to_string(), dec!(100)),
        ]
    );
    assert!(settlements.iter().all(|s| s.status == SettlementStatus::Pending));

    let balances = service.balances(&house.room.id, house.user(2)).await.unwrap();
    assert_eq!(balances.total, dec!(300));
    assert_eq!(balances.fair_share, dec!(100));
}

#[tokio::test]
async fn test_only_admin_generates() {
    let service = create_test_service();
    let house = household(&service, &["Alice", "Bob"]).await;

    let err = service.generate_settlements(&house.room.id, house.user(1)).await.unwrap_err();
    assert_eq!(err, RoomtabError::NotRoomAdmin(house.user(1).to_string()));
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn test_regeneration_replaces_batch() {
    let service = create_test_service();
    let house = household(&service, &["Alice", "Bob", "Carol"]).await;
    let expense = pay(&service, &house, 0, dec!(300)).await;

    let first = service.generate_settlements(&house.room.id, house.admin()).await.unwrap();
    let second = service.generate_settlements(&house.room.id, house.admin()).await.unwrap();

    assert_eq!(triples(&first), triples(&second));
    assert!(first.iter().all(|old| second.iter().all(|new| new.id != old.id)));

    let listed = service.list_settlements(&house.room.id, house.user(1)).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|s| second.iter().any(|n| n.id == s.id)));

    // an edit followed by regeneration reflects the new amount
    let changes = ExpenseChanges {
        amount: Some(dec!(150)),
        ..Default::default()
    };
    service.update_expense(&expense.id, house.admin(), changes).await.unwrap();
    let third = service.generate_settlements(&house.room.id, house.admin()).await.unwrap();
    assert!(third.iter().all(|s| s.amount == dec!(50)));
}

#[tokio::test]
async fn test_nothing_to_settle() {
    let service = create_test_service();
    let house = household(&service, &["Alice", "Bob"]).await;

    assert!(service.generate_settlements(&house.room.id, house.admin()).await.unwrap().is_empty());

    pay(&service, &house, 0, dec!(20)).await;
    pay(&service, &house, 1, dec!(20)).await;
    assert!(service.generate_settlements(&house.room.id, house.admin()).await.unwrap().is_empty());

    let rounds = service.list_rounds(&house.room.id, house.admin()).await.unwrap();
    assert_eq!(rounds.len(), 1);
    assert!(rounds[0].is_open());
}

#[tokio::test]
async fn test_status_moves_by_the_right_party() {
    let service = create_test_service();
    let house = household(&service, &["Alice", "Bob"]).await;
    pay(&service, &house, 0, dec!(50)).await;
    let settlement = service.generate_settlements(&house.room.id, house.admin()).await.unwrap()[0].clone();
    assert_eq!(settlement.from_user_id, house.user(1));

    // creditor cannot mark paid on the debtor's behalf
    let err = service
        .advance_settlement_status(&settlement.id, house.admin(), SettlementStatus::Paid)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let advance = service
        .advance_settlement_status(&settlement.id, house.user(1), SettlementStatus::Paid)
        .await
        .unwrap();
    assert_eq!(advance.settlement.status, SettlementStatus::Paid);
    assert!(advance.cleared_round.is_none());

    // debtor cannot confirm their own payment
    let err = service
        .advance_settlement_status(&settlement.id, house.user(1), SettlementStatus::Confirmed)
        .await
        .unwrap_err();
    assert_eq!(err, RoomtabError::NotSettlementParty(house.user(1).to_string(), SettlementStatus::Confirmed));

    let err = service
        .advance_settlement_status(&settlement.id, house.user(1), SettlementStatus::Paid)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RoomtabError::InvalidStatusTransition {
            from: SettlementStatus::Paid,
            to: SettlementStatus::Paid
        }
    );
}

#[tokio::test]
async fn test_pending_cannot_skip_to_confirmed() {
    let service = create_test_service();
    let house = household(&service, &["Alice", "Bob"]).await;
    pay(&service, &house, 0, dec!(50)).await;
    let settlement = service.generate_settlements(&house.room.id, house.admin()).await.unwrap()[0].clone();

    let err = service
        .advance_settlement_status(&settlement.id, house.admin(), SettlementStatus::Confirmed)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let err = service
        .advance_settlement_status(&settlement.id, house.user(1), SettlementStatus::Pending)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn test_transition_table() {
    use SettlementStatus::*;
    for from in [Pending, Paid, Confirmed] {
        for to in [Pending, Paid, Confirmed] {
            let legal = matches!((from, to), (Pending, Paid) | (Paid, Confirmed));
            assert_eq!(from.advance_to(to).is_ok(), legal, "{} -> {}", from, to);
        }
    }
}

#[tokio::test]
async fn test_last_confirmation_clears_round_once() {
    let service = create_test_service();
    let house = household(&service, &["Alice", "Bob", "Carol"]).await;
    let expense = pay(&service, &house, 0, dec!(300)).await;
    let settlements = service.generate_settlements(&house.room.id, house.admin()).await.unwrap();

    for s in &settlements {
        service
            .advance_settlement_status(&s.id, &s.from_user_id, SettlementStatus::Paid)
            .await
            .unwrap();
    }

    let first = service
        .advance_settlement_status(&settlements[0].id, house.admin(), SettlementStatus::Confirmed)
        .await
        .unwrap();
    assert!(first.cleared_round.is_none());
    assert!(first.successor_round.is_none());

    let last = service
        .advance_settlement_status(&settlements[1].id, house.admin(), SettlementStatus::Confirmed)
        .await
        .unwrap();
    let cleared = last.cleared_round.unwrap();
    let successor = last.successor_round.unwrap();
    assert_eq!(cleared.id, expense.round_id);
    assert_eq!(cleared.status, RoundStatus::Cleared);
    assert!(cleared.cleared_at.is_some());
    assert!(successor.is_open());

    let rounds = service.list_rounds(&house.room.id, house.admin()).await.unwrap();
    assert_eq!(rounds.len(), 2);
    assert_eq!(rounds.iter().filter(|r| r.is_open()).count(), 1);
    assert_eq!(service.current_round(&house.room.id, house.admin()).await.unwrap().id, successor.id);

    // the cleared round keeps its history
    let history = service.list_round_settlements(&cleared.id, house.user(1)).await.unwrap();
    assert!(history.iter().all(|s| s.status == SettlementStatus::Confirmed));
    let old_balances = service.round_balances(&cleared.id, house.user(2)).await.unwrap();
    assert_eq!(old_balances.total, dec!(300));
    assert!(service.list_settlements(&house.room.id, house.admin()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cleared_round_is_frozen() {
    let service = create_test_service();
    let house = household(&service, &["Alice", "Bob"]).await;
    let expense = pay(&service, &house, 0, dec!(40)).await;
    let settlement = service.generate_settlements(&house.room.id, house.admin()).await.unwrap()[0].clone();
    service
        .advance_settlement_status(&settlement.id, house.user(1), SettlementStatus::Paid)
        .await
        .unwrap();
    service
        .advance_settlement_status(&settlement.id, house.admin(), SettlementStatus::Confirmed)
        .await
        .unwrap();

    let changes = ExpenseChanges {
        title: Some("Late edit".to_string()),
        ..Default::default()
    };
    let err = service.update_expense(&expense.id, house.admin(), changes).await.unwrap_err();
    assert_eq!(err, RoomtabError::RoundNotOpen(expense.round_id.clone()));
    let err = service.delete_expense(&expense.id, house.admin()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    let err = service
        .advance_settlement_status(&settlement.id, house.admin(), SettlementStatus::Confirmed)
        .await
        .unwrap_err();
    assert_eq!(err, RoomtabError::RoundNotOpen(expense.round_id.clone()));

    // new expenses go to the successor
    let next = pay(&service, &house, 1, dec!(10)).await;
    assert_ne!(next.round_id, expense.round_id);
    let balances = service.balances(&house.room.id, house.admin()).await.unwrap();
    assert_eq!(balances.total, dec!(10));
}

#[tokio::test]
async fn test_regeneration_resets_paid_rows() {
    let service = create_test_service();
    let house = household(&service, &["Alice", "Bob"]).await;
    pay(&service, &house, 0, dec!(40)).await;
    let settlement = service.generate_settlements(&house.room.id, house.admin()).await.unwrap()[0].clone();
    service
        .advance_settlement_status(&settlement.id, house.user(1), SettlementStatus::Paid)
        .await
        .unwrap();

    let regenerated = service.generate_settlements(&house.room.id, house.admin()).await.unwrap();
    assert_eq!(regenerated.len(), 1);
    assert_eq!(regenerated[0].status, SettlementStatus::Pending);

    let err = service
        .advance_settlement_status(&settlement.id, house.admin(), SettlementStatus::Confirmed)
        .await
        .unwrap_err();
    assert_eq!(err, RoomtabError::SettlementNotFound(settlement.id));
}

#[tokio::test]
async fn test_store_rejects_stale_status() {
    let service = create_test_service();
    let house = household(&service, &["Alice", "Bob"]).await;
    pay(&service, &house, 0, dec!(40)).await;
    let settlement = service.generate_settlements(&house.room.id, house.admin()).await.unwrap()[0].clone();
    service
        .advance_settlement_status(&settlement.id, house.user(1), SettlementStatus::Paid)
        .await
        .unwrap();

    let err = service
        .storage
        .advance_settlement(&settlement.id, SettlementStatus::Pending, SettlementStatus::Paid, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, RoomtabError::WriteConflict(_)));
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_largest_first_strategy_is_used() {
    let mut settings = test_settings();
    settings.settlement_strategy = MatchStrategy::LargestFirst;
    let service = RoomtabService::new(InMemoryStorage::new(), settings);
    let house = household(&service, &["Alice", "Bob", "Carol", "Dave"]).await;
    // balances: Alice +10, Bob +90, Carol -90, Dave -10
    pay(&service, &house, 0, dec!(100)).await;
    pay(&service, &house, 1, dec!(180)).await;
    pay(&service, &house, 3, dec!(80)).await;

    let settlements = service.generate_settlements(&house.room.id, house.admin()).await.unwrap();

    assert_eq!(
        triples(&settlements),
        vec![
            (house.user(2).to_string(), house.user(1).to_string(), dec!(90)),
            (house.user(3).to_string(), house.admin().to_string(), dec!(10)),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_confirmations_close_round_once() {
    let service = Arc::new(create_test_service());
    let house = household(&service, &["Alice", "Bob", "Carol", "Dave"]).await;
    pay(&service, &house, 0, dec!(400)).await;
    let settlements = service.generate_settlements(&house.room.id, house.admin()).await.unwrap();
    assert_eq!(settlements.len(), 3);
    for s in &settlements {
        service
            .advance_settlement_status(&s.id, &s.from_user_id, SettlementStatus::Paid)
            .await
            .unwrap();
    }

    let tasks: Vec<_> = settlements
        .iter()
        .map(|s| {
            let service = Arc::clone(&service);
            let id = s.id.clone();
            let admin = house.admin().to_string();
            tokio::spawn(async move {
                service
                    .advance_settlement_status(&id, &admin, SettlementStatus::Confirmed)
                    .await
            })
        })
        .collect();

    let mut closures = 0;
    for result in futures::future::join_all(tasks).await {
        let advance = result.unwrap().unwrap();
        if advance.cleared_round.is_some() {
            closures += 1;
        }
    }
    assert_eq!(closures, 1);

    let rounds = service.list_rounds(&house.room.id, house.admin()).await.unwrap();
    assert_eq!(rounds.len(), 2);
    assert_eq!(rounds.iter().filter(|r| r.is_open()).count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_payments_on_one_settlement() {
    let service = Arc::new(create_test_service());

    for i in 0..10 {
        let (owner, payer) = (format!("Owner{i}"), format!("Payer{i}"));
        let house = household(&service, &[owner.as_str(), payer.as_str()]).await;
        pay(&service, &house, 0, dec!(30)).await;
        let settlement = service.generate_settlements(&house.room.id, house.admin()).await.unwrap()[0].clone();

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let service = Arc::clone(&service);
                let id = settlement.id.clone();
                let debtor = settlement.from_user_id.clone();
                tokio::spawn(async move {
                    service
                        .advance_settlement_status(&id, &debtor, SettlementStatus::Paid)
                        .await
                })
            })
            .collect();

        let mut paid = 0;
        for result in futures::future::join_all(tasks).await {
            match result.unwrap() {
                Ok(advance) => {
                    assert_eq!(advance.settlement.status, SettlementStatus::Paid);
                    paid += 1;
                }
                Err(err) => assert_eq!(
                    err,
                    RoomtabError::InvalidStatusTransition {
                        from: SettlementStatus::Paid,
                        to: SettlementStatus::Paid
                    }
                ),
            }
        }
        assert_eq!(paid, 1);
    }
}

/// Delegates to an in-memory store but reports `WriteConflict` for the
/// first `conflicts` status writes.
struct ConflictingStorage {
    inner: InMemoryStorage,
    conflicts: AtomicUsize,
    writes: AtomicUsize,
}

impl ConflictingStorage {
    fn new(inner: InMemoryStorage, conflicts: usize) -> Self {
        ConflictingStorage {
            inner,
            conflicts: AtomicUsize::new(conflicts),
            writes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Storage for ConflictingStorage {
    async fn create_user(&self, user: User) -> Result<User, RoomtabError> {
        self.inner.create_user(user).await
    }
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, RoomtabError> {
        self.inner.get_user(user_id).await
    }
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, RoomtabError> {
        self.inner.get_user_by_email(email).await
    }
    async fn create_room(&self, room: Room, admin: Member, now: DateTime<Utc>) -> Result<Round, RoomtabError> {
        self.inner.create_room(room, admin, now).await
    }
    async fn get_room(&self, room_id: &str) -> Result<Option<Room>, RoomtabError> {
        self.inner.get_room(room_id).await
    }
    async fn get_room_by_join_code(&self, join_code: &str) -> Result<Option<Room>, RoomtabError> {
        self.inner.get_room_by_join_code(join_code).await
    }
    async fn add_member(&self, member: Member) -> Result<Member, RoomtabError> {
        self.inner.add_member(member).await
    }
    async fn get_member(&self, room_id: &str, user_id: &str) -> Result<Option<Member>, RoomtabError> {
        self.inner.get_member(room_id, user_id).await
    }
    async fn list_members(&self, room_id: &str) -> Result<Vec<Member>, RoomtabError> {
        self.inner.list_members(room_id).await
    }
    async fn get_round(&self, round_id: &str) -> Result<Option<Round>, RoomtabError> {
        self.inner.get_round(round_id).await
    }
    async fn find_open_round(&self, room_id: &str) -> Result<Option<Round>, RoomtabError> {
        self.inner.find_open_round(room_id).await
    }
    async fn ensure_open_round(&self, room_id: &str, now: DateTime<Utc>) -> Result<Round, RoomtabError> {
        self.inner.ensure_open_round(room_id, now).await
    }
    async fn list_rounds(&self, room_id: &str) -> Result<Vec<Round>, RoomtabError> {
        self.inner.list_rounds(room_id).await
    }
    async fn insert_expense(&self, expense: Expense, now: DateTime<Utc>) -> Result<Expense, RoomtabError> {
        self.inner.insert_expense(expense, now).await
    }
    async fn get_expense(&self, expense_id: &str) -> Result<Option<Expense>, RoomtabError> {
        self.inner.get_expense(expense_id).await
    }
    async fn update_expense(&self, expense: Expense) -> Result<Expense, RoomtabError> {
        self.inner.update_expense(expense).await
    }
    async fn delete_expense(&self, expense_id: &str) -> Result<(), RoomtabError> {
        self.inner.delete_expense(expense_id).await
    }
    async fn list_expenses(&self, room_id: &str, round_id: &str) -> Result<Vec<Expense>, RoomtabError> {
        self.inner.list_expenses(room_id, round_id).await
    }
    async fn get_settlement(&self, settlement_id: &str) -> Result<Option<Settlement>, RoomtabError> {
        self.inner.get_settlement(settlement_id).await
    }
    async fn list_settlements(&self, room_id: &str, round_id: &str) -> Result<Vec<Settlement>, RoomtabError> {
        self.inner.list_settlements(room_id, round_id).await
    }
    async fn replace_settlements(
        &self,
        room_id: &str,
        round_id: &str,
        drafts: Vec<SettlementDraft>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Settlement>, RoomtabError> {
        self.inner.replace_settlements(room_id, round_id, drafts, now).await
    }
    async fn advance_settlement(
        &self,
        settlement_id: &str,
        expected: SettlementStatus,
        next: SettlementStatus,
        now: DateTime<Utc>,
    ) -> Result<SettlementAdvance, RoomtabError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let pending = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending.is_ok() {
            return Err(RoomtabError::WriteConflict(settlement_id.to_string()));
        }
        self.inner.advance_settlement(settlement_id, expected, next, now).await
    }
}

async fn settlement_behind_conflicts(conflicts: usize) -> (RoomtabService<ConflictingStorage>, Settlement) {
    init_tracing();
    let storage = InMemoryStorage::new();
    let setup = RoomtabService::new(storage.clone(), test_settings());
    let house = household(&setup, &["Alice", "Bob"]).await;
    pay(&setup, &house, 0, dec!(30)).await;
    let settlement = setup.generate_settlements(&house.room.id, house.admin()).await.unwrap()[0].clone();

    let service = RoomtabService::new(ConflictingStorage::new(storage, conflicts), test_settings());
    (service, settlement)
}

#[tokio::test]
async fn test_write_conflict_is_retried() {
    let (service, settlement) = settlement_behind_conflicts(2).await;

    let advance = service
        .advance_settlement_status(&settlement.id, &settlement.from_user_id, SettlementStatus::Paid)
        .await
        .unwrap();

    assert_eq!(advance.settlement.status, SettlementStatus::Paid);
    assert_eq!(service.storage.writes.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_write_conflict_surfaces_after_retry_limit() {
    let limit = test_settings().conflict_retry_limit;
    let (service, settlement) = settlement_behind_conflicts(limit + 1).await;

    let err = service
        .advance_settlement_status(&settlement.id, &settlement.from_user_id, SettlementStatus::Paid)
        .await
        .unwrap_err();

    assert_eq!(err, RoomtabError::WriteConflict(settlement.id.clone()));
    assert_eq!(service.storage.writes.load(Ordering::SeqCst), limit + 1);
    let stored = service.storage.get_settlement(&settlement.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SettlementStatus::Pending);
}
