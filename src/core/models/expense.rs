use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Expense {
    pub id: String,
    pub room_id: String,
    pub round_id: String,
    /// User credited with the amount; not necessarily the creator.
    pub payer_id: String,
    pub amount: Decimal,
    pub title: String,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields an expense creator may change while the round is open. `None` keeps the stored value.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct ExpenseChanges {
    pub title: Option<String>,
    pub amount: Option<Decimal>,
    pub payer_id: Option<String>,
    pub notes: Option<String>,
}
