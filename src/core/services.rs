use crate::auth::jwt::{Claims, JwtService};
use crate::config::Config;
use crate::constants::{MAX_AMOUNT_DECIMALS, MAX_EXPENSE_AMOUNT, MAX_NAME_LENGTH, MAX_NOTES_LENGTH};
use crate::core::errors::RoomtabError;
use crate::core::matcher::MatchStrategy;
use crate::core::models::{
    expense::{Expense, ExpenseChanges},
    room::{Member, Role, Room},
    user::User,
};
use crate::infrastructure::storage::Storage;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Runtime knobs for [`RoomtabService`], usually taken from [`Config`].
#[derive(Clone, Debug)]
pub struct ServiceSettings {
    pub jwt_secret: String,
    pub jwt_ttl_secs: u64,
    pub bcrypt_cost: u32,
    pub settlement_strategy: MatchStrategy,
    pub conflict_retry_limit: usize,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        ServiceSettings {
            jwt_secret: config.jwt_secret.clone(),
            jwt_ttl_secs: config.jwt_ttl_secs,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            settlement_strategy: config.settlement_strategy,
            conflict_retry_limit: config.conflict_retry_limit,
        }
    }
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct NewExpense {
    pub title: String,
    pub amount: Decimal,
    /// Defaults to the caller.
    pub payer_id: Option<String>,
    pub notes: Option<String>,
}

pub struct RoomtabService<S: Storage> {
    pub(crate) storage: S,
    pub(crate) settings: ServiceSettings,
    jwt_service: JwtService,
}

impl<S: Storage> RoomtabService<S> {
    pub fn new(storage: S, settings: ServiceSettings) -> Self {
        RoomtabService {
            jwt_service: JwtService::new(settings.jwt_secret.clone(), settings.jwt_ttl_secs),
            storage,
            settings,
        }
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, RoomtabError> {
        self.jwt_service.validate_token(token)
    }

    /// Resolves the caller's membership in `room_id`.
    pub(crate) async fn require_membership(&self, room_id: &str, user_id: &str) -> Result<Member, RoomtabError> {
        if self.storage.get_room(room_id).await?.is_none() {
            return Err(RoomtabError::RoomNotFound(room_id.to_string()));
        }
        self.storage
            .get_member(room_id, user_id)
            .await?
            .ok_or_else(|| RoomtabError::NotRoomMember(user_id.to_string()))
    }

    pub(crate) fn require_admin(&self, member: &Member) -> Result<(), RoomtabError> {
        if !member.is_admin() {
            warn!(room_id = %member.room_id, user_id = %member.user_id, "admin action refused");
            return Err(RoomtabError::NotRoomAdmin(member.user_id.clone()));
        }
        Ok(())
    }

    fn validate_string_input(&self, field: &str, value: &str, max_length: usize) -> Result<(), RoomtabError> {
        if value.trim().is_empty() {
            return Err(RoomtabError::invalid_input(
                field,
                format!("Invalid {}", field),
                format!("{} cannot be empty", field),
            ));
        }
        if value.chars().count() > max_length {
            return Err(RoomtabError::invalid_input(
                field,
                format!("{} Too Long", field),
                format!("{} cannot exceed {} characters", field, max_length),
            ));
        }
        if value.chars().any(|c| c.is_control() || "<>{}[]".contains(c)) {
            return Err(RoomtabError::invalid_input(
                field,
                format!("Invalid {}", field),
                format!("{} contains invalid characters", field),
            ));
        }
        Ok(())
    }

    fn validate_notes(&self, notes: Option<&str>) -> Result<(), RoomtabError> {
        match notes {
            Some(notes) if notes.chars().count() > MAX_NOTES_LENGTH => Err(RoomtabError::invalid_input(
                "notes",
                "notes Too Long",
                format!("notes cannot exceed {} characters", MAX_NOTES_LENGTH),
            )),
            _ => Ok(()),
        }
    }

    /// Zero and negative amounts are rejected here rather than skipped later.
    fn validate_amount_input(&self, field: &str, amount: Decimal) -> Result<(), RoomtabError> {
        if amount <= Decimal::ZERO {
            return Err(RoomtabError::invalid_input(
                field,
                "Invalid Amount",
                "Amount must be greater than 0",
            ));
        }
        if amount > MAX_EXPENSE_AMOUNT {
            return Err(RoomtabError::invalid_input(
                field,
                "Amount Too Large",
                format!("Amount cannot exceed {}", MAX_EXPENSE_AMOUNT),
            ));
        }
        if amount.normalize().scale() > MAX_AMOUNT_DECIMALS {
            return Err(RoomtabError::invalid_input(
                field,
                "Invalid Amount",
                format!("Amount cannot have more than {} decimal places", MAX_AMOUNT_DECIMALS),
            ));
        }
        Ok(())
    }

    fn validate_email(&self, email: &str) -> Result<(), RoomtabError> {
        if email.trim().is_empty() {
            return Err(RoomtabError::MissingEmail);
        }
        let well_formed = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.ends_with('.'));
        if !well_formed || email.len() < 5 {
            return Err(RoomtabError::InvalidEmail(email.to_string()));
        }
        Ok(())
    }

    pub async fn register_user(&self, name: String, email: String, password: String) -> Result<User, RoomtabError> {
        self.validate_email(&email)?;
        self.validate_string_input("name", &name, MAX_NAME_LENGTH)?;
        if password.is_empty() {
            return Err(RoomtabError::invalid_input(
                "password",
                "Invalid password",
                "Password cannot be empty",
            ));
        }

        let password_hash = bcrypt::hash(&password, self.settings.bcrypt_cost)
            .map_err(|e| RoomtabError::InternalServerError(format!("Password hashing error: {}", e)))?;
        let user = self
            .storage
            .create_user(User {
                id: Uuid::new_v4().to_string(),
                name,
                email,
                password_hash,
                created_at: Utc::now(),
            })
            .await?;

        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> Result<String, RoomtabError> {
        let user = self
            .storage
            .get_user_by_email(email)
            .await?
            .ok_or(RoomtabError::InvalidCredentials)?;

        let verified = bcrypt::verify(password, &user.password_hash)
            .map_err(|e| RoomtabError::InternalServerError(format!("Password verification error: {}", e)))?;
        if !verified {
            warn!(user_id = %user.id, "login refused");
            return Err(RoomtabError::InvalidCredentials);
        }
        self.jwt_service.generate_token(&user.id)
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, RoomtabError> {
        self.storage.get_user(user_id).await
    }

    /// Creates a room with the caller as its ADMIN and opens its first round.
    pub async fn create_room(&self, name: String, created_by: &str) -> Result<Room, RoomtabError> {
        self.validate_string_input("name", &name, MAX_NAME_LENGTH)?;
        if self.storage.get_user(created_by).await?.is_none() {
            return Err(RoomtabError::UserNotFound(created_by.to_string()));
        }

        let now = Utc::now();
        let room = Room {
            id: Uuid::new_v4().to_string(),
            name,
            join_code: Uuid::new_v4().simple().to_string(),
            created_at: now,
        };
        let admin = Member {
            user_id: created_by.to_string(),
            room_id: room.id.clone(),
            role: Role::Admin,
            joined_at: now,
        };
        let round = self.storage.create_room(room.clone(), admin, now).await?;

        info!(room_id = %room.id, round_id = %round.id, user_id = created_by, "room created");
        Ok(room)
    }

    pub async fn join_room(&self, join_code: &str, user_id: &str) -> Result<Member, RoomtabError> {
        if join_code.trim().is_empty() {
            return Err(RoomtabError::JoinCodeNotFound);
        }
        let room = self
            .storage
            .get_room_by_join_code(join_code.trim())
            .await?
            .ok_or(RoomtabError::JoinCodeNotFound)?;
        if self.storage.get_user(user_id).await?.is_none() {
            return Err(RoomtabError::UserNotFound(user_id.to_string()));
        }

        let member = self
            .storage
            .add_member(Member {
                user_id: user_id.to_string(),
                room_id: room.id.clone(),
                role: Role::Member,
                joined_at: Utc::now(),
            })
            .await?;

        info!(room_id = %room.id, user_id, "member joined");
        Ok(member)
    }

    pub async fn get_room(&self, room_id: &str, caller: &str) -> Result<Room, RoomtabError> {
        self.require_membership(room_id, caller).await?;
        self.storage
            .get_room(room_id)
            .await?
            .ok_or_else(|| RoomtabError::RoomNotFound(room_id.to_string()))
    }

    pub async fn list_members(&self, room_id: &str, caller: &str) -> Result<Vec<Member>, RoomtabError> {
        self.require_membership(room_id, caller).await?;
        self.storage.list_members(room_id).await
    }

    /// Posts an expense into the room's OPEN round.
    pub async fn add_expense(&self, room_id: &str, caller: &str, new: NewExpense) -> Result<Expense, RoomtabError> {
        self.require_membership(room_id, caller).await?;
        self.validate_string_input("title", &new.title, MAX_NAME_LENGTH)?;
        self.validate_amount_input("amount", new.amount)?;
        self.validate_notes(new.notes.as_deref())?;

        let payer_id = new.payer_id.unwrap_or_else(|| caller.to_string());
        if self.storage.get_member(room_id, &payer_id).await?.is_none() {
            return Err(RoomtabError::PayerNotMember(payer_id));
        }

        let now = Utc::now();
        let expense = self
            .storage
            .insert_expense(
                Expense {
                    id: Uuid::new_v4().to_string(),
                    room_id: room_id.to_string(),
                    round_id: String::new(),
                    payer_id,
                    amount: new.amount,
                    title: new.title,
                    notes: new.notes,
                    created_by: caller.to_string(),
                    created_at: now,
                    updated_at: now,
                },
                now,
            )
            .await?;

        info!(
            room_id,
            round_id = %expense.round_id,
            expense_id = %expense.id,
            amount = %expense.amount,
            "expense posted"
        );
        Ok(expense)
    }

    async fn editable_expense(&self, expense_id: &str, caller: &str) -> Result<Expense, RoomtabError> {
        let expense = self
            .storage
            .get_expense(expense_id)
            .await?
            .ok_or_else(|| RoomtabError::ExpenseNotFound(expense_id.to_string()))?;
        if expense.created_by != caller {
            return Err(RoomtabError::NotExpenseCreator(caller.to_string()));
        }
        let round = self
            .storage
            .get_round(&expense.round_id)
            .await?
            .ok_or_else(|| RoomtabError::RoundNotFound(expense.round_id.clone()))?;
        if !round.is_open() {
            return Err(RoomtabError::RoundNotOpen(round.id));
        }
        Ok(expense)
    }

    /// Edits an expense. Only its creator may do so, and only while its round is open.
    pub async fn update_expense(
        &self,
        expense_id: &str,
        caller: &str,
        changes: ExpenseChanges,
    ) -> Result<Expense, RoomtabError> {
        let mut expense = self.editable_expense(expense_id, caller).await?;

        if let Some(title) = changes.title {
            self.validate_string_input("title", &title, MAX_NAME_LENGTH)?;
            expense.title = title;
        }
        if let Some(amount) = changes.amount {
            self.validate_amount_input("amount", amount)?;
            expense.amount = amount;
        }
        if let Some(payer_id) = changes.payer_id {
            if self.storage.get_member(&expense.room_id, &payer_id).await?.is_none() {
                return Err(RoomtabError::PayerNotMember(payer_id));
            }
            expense.payer_id = payer_id;
        }
        if let Some(notes) = changes.notes {
            self.validate_notes(Some(&notes))?;
            expense.notes = if notes.trim().is_empty() { None } else { Some(notes) };
        }
        expense.updated_at = Utc::now();

        let expense = self.storage.update_expense(expense).await?;
        debug!(expense_id, round_id = %expense.round_id, "expense updated");
        Ok(expense)
    }

    pub async fn delete_expense(&self, expense_id: &str, caller: &str) -> Result<(), RoomtabError> {
        let expense = self.editable_expense(expense_id, caller).await?;
        self.storage.delete_expense(&expense.id).await?;
        info!(expense_id, round_id = %expense.round_id, "expense deleted");
        Ok(())
    }

    /// Expenses of the room's current OPEN round.
    pub async fn list_expenses(&self, room_id: &str, caller: &str) -> Result<Vec<Expense>, RoomtabError> {
        self.require_membership(room_id, caller).await?;
        let round = self.storage.ensure_open_round(room_id, Utc::now()).await?;
        self.storage.list_expenses(room_id, &round.id).await
    }
}
