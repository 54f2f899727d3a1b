mod config_tests;
mod lifecycle_tests;

use crate::core::matcher::MatchStrategy;
use crate::core::models::{expense::Expense, room::Room, user::User};
use crate::core::services::{NewExpense, RoomtabService, ServiceSettings};
use crate::infrastructure::storage::in_memory::InMemoryStorage;
use rust_decimal::Decimal;

// bcrypt rejects anything cheaper
pub const TEST_BCRYPT_COST: u32 = 4;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn test_settings() -> ServiceSettings {
    ServiceSettings {
        jwt_secret: "test-secret".to_string(),
        jwt_ttl_secs: 3600,
        bcrypt_cost: TEST_BCRYPT_COST,
        settlement_strategy: MatchStrategy::InsertionOrder,
        conflict_retry_limit: 5,
    }
}

pub fn create_test_service() -> RoomtabService<InMemoryStorage> {
    init_tracing();
    RoomtabService::new(InMemoryStorage::new(), test_settings())
}

pub async fn register(service: &RoomtabService<InMemoryStorage>, name: &str) -> User {
    service
        .register_user(
            name.to_string(),
            format!("{}@example.com", name.to_lowercase()),
            "hunter2".to_string(),
        )
        .await
        .unwrap()
}

/// A room whose first user is the admin and the rest joined by code, in order.
pub struct Household {
    pub room: Room,
    pub users: Vec<User>,
}

impl Household {
    pub fn admin(&self) -> &str {
        &self.users[0].id
    }

    pub fn user(&self, i: usize) -> &str {
        &self.users[i].id
    }
}

pub async fn household(service: &RoomtabService<InMemoryStorage>, names: &[&str]) -> Household {
    let mut users = Vec::new();
    for name in names {
        users.push(register(service, name).await);
    }
    let room = service.create_room("Flat 4B".to_string(), &users[0].id).await.unwrap();
    for user in &users[1..] {
        service.join_room(&room.join_code, &user.id).await.unwrap();
    }
    Household { room, users }
}

pub async fn pay(
    service: &RoomtabService<InMemoryStorage>,
    house: &Household,
    payer: usize,
    amount: Decimal,
) -> Expense {
    service
        .add_expense(
            &house.room.id,
            house.user(payer),
            NewExpense {
                title: "Groceries".to_string(),
                amount,
                payer_id: None,
                notes: None,
            },
        )
        .await
        .unwrap()
}
