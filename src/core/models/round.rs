use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoundStatus {
    Open,
    Cleared,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Round {
    pub id: String,
    pub room_id: String,
    pub status: RoundStatus,
    pub created_at: DateTime<Utc>,
    pub cleared_at: Option<DateTime<Utc>>,
}

impl Round {
    pub fn open(room_id: &str, created_at: DateTime<Utc>) -> Self {
        Round {
            id: uuid::Uuid::new_v4().to_string(),
            room_id: room_id.to_string(),
            status: RoundStatus::Open,
            created_at,
            cleared_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == RoundStatus::Open
    }

    /// Moves the round to CLEARED. Returns `false` if it was already cleared.
    pub fn clear(&mut self, at: DateTime<Utc>) -> bool {
        if !self.is_open() {
            return false;
        }
        self.status = RoundStatus::Cleared;
        self.cleared_at = Some(at);
        true
    }
}
