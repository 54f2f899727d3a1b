use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::core::models::settlement::SettlementStatus;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub title: String,
    pub description: String,
}

/// Stable error categories surfaced to callers; the API maps these to HTTP statuses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidState,
    Validation,
    Conflict,
    Unauthorized,
    Internal,
}

#[derive(Error, Debug, Clone, Serialize, PartialEq, Eq)]
pub enum RoomtabError {
    #[error("Email is required")]
    MissingEmail,
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),
    #[error("Email {0} already registered")]
    EmailAlreadyRegistered(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("User {0} not found")]
    UserNotFound(String),
    #[error("Room {0} not found")]
    RoomNotFound(String),
    #[error("Join code not found")]
    JoinCodeNotFound,
    #[error("Expense {0} not found")]
    ExpenseNotFound(String),
    #[error("Round {0} not found")]
    RoundNotFound(String),
    #[error("Settlement {0} not found")]
    SettlementNotFound(String),

    #[error("User {0} is not a room member")]
    NotRoomMember(String),
    #[error("User {0} is already a room member")]
    AlreadyRoomMember(String),
    #[error("User {0} is not a room admin")]
    NotRoomAdmin(String),
    #[error("User {0} did not create expense")]
    NotExpenseCreator(String),
    #[error("User {0} may not move settlement to {1}")]
    NotSettlementParty(String, SettlementStatus),

    #[error("Round {0} is not open")]
    RoundNotOpen(String),
    #[error("Room {0} has no open round")]
    NoOpenRound(String),
    #[error("Illegal settlement transition {from} -> {to}")]
    InvalidStatusTransition { from: SettlementStatus, to: SettlementStatus },

    #[error("Invalid input for field `{0}`: {1:?}")]
    InvalidInput(String, FieldError),
    #[error("Cannot compute balances without members")]
    EmptyMemberList,
    #[error("Payer {0} is not a room member")]
    PayerNotMember(String),

    #[error("Concurrent write on settlement {0}")]
    WriteConflict(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl RoomtabError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoomtabError::UserNotFound(_)
            | RoomtabError::RoomNotFound(_)
            | RoomtabError::JoinCodeNotFound
            | RoomtabError::ExpenseNotFound(_)
            | RoomtabError::RoundNotFound(_)
            | RoomtabError::SettlementNotFound(_) => ErrorKind::NotFound,
            RoomtabError::NotRoomMember(_)
            | RoomtabError::NotRoomAdmin(_)
            | RoomtabError::NotExpenseCreator(_)
            | RoomtabError::NotSettlementParty(..) => ErrorKind::Forbidden,
            RoomtabError::RoundNotOpen(_)
            | RoomtabError::NoOpenRound(_)
            | RoomtabError::InvalidStatusTransition { .. } => ErrorKind::InvalidState,
            RoomtabError::MissingEmail
            | RoomtabError::InvalidEmail(_)
            | RoomtabError::InvalidInput(..)
            | RoomtabError::EmptyMemberList
            | RoomtabError::PayerNotMember(_) => ErrorKind::Validation,
            RoomtabError::EmailAlreadyRegistered(_)
            | RoomtabError::AlreadyRoomMember(_)
            | RoomtabError::WriteConflict(_) => ErrorKind::Conflict,
            RoomtabError::InvalidCredentials | RoomtabError::InvalidToken(_) => ErrorKind::Unauthorized,
            RoomtabError::StorageError(_) | RoomtabError::InternalServerError(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn invalid_input(field: &str, title: impl Into<String>, description: impl Into<String>) -> Self {
        RoomtabError::InvalidInput(
            field.to_string(),
            FieldError {
                field: field.to_string(),
                title: title.into(),
                description: description.into(),
            },
        )
    }
}
