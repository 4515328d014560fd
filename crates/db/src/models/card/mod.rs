//! Cards: the ordered members of a column.
//!
//! A card belongs to exactly one column at a time. Archived cards stay in their column
//! but hold no slot in its ordering and are left out of metrics; restoring one places it
//! again like a fresh move.

/// Columns of `card` in [`Card`] field order.
macro_rules! card_columns {
    () => {
        "id, column_id, title, description, start_date, due_date, priority, archived, \
         archived_at, position, created_at, updated_at"
    };
}

mod archive;
mod movement;
mod queries;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

pub(crate) use movement::{LockedCard, PendingCard, insert, lock_card, reserve_card_slot};

use crate::validation::{ValidationError, validate_priority_code};

/// Card priority, stored as its numeric code.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Type,
    Serialize,
    Deserialize,
    TS,
    Display,
    EnumString,
)]
#[repr(i32)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    High = 1,
    #[default]
    Medium = 2,
    Low = 3,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn code(self) -> i64 {
        self as i64
    }

    /// Map a numeric code (1 = High, 2 = Medium, 3 = Low) to a priority.
    pub fn from_code(code: i64) -> Result<Self, ValidationError> {
        validate_priority_code(code)?;
        Ok(match code {
            1 => Self::High,
            3 => Self::Low,
            _ => Self::Medium,
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Card {
    pub id: Uuid,
    pub column_id: Uuid,
    pub title: String,
    pub description: String,
    #[ts(type = "string | null")]
    pub start_date: Option<NaiveDate>,
    #[ts(type = "string | null")]
    pub due_date: Option<NaiveDate>,
    pub priority: Priority,
    pub archived: bool,
    #[ts(type = "Date | null")]
    pub archived_at: Option<DateTime<Utc>>,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateCard {
    pub column_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[ts(type = "string | null")]
    pub start_date: Option<NaiveDate>,
    #[ts(type = "string | null")]
    pub due_date: Option<NaiveDate>,
    pub priority: Option<Priority>,
}

impl CreateCard {
    pub fn titled(column_id: Uuid, title: impl Into<String>) -> Self {
        Self {
            column_id,
            title: title.into(),
            description: None,
            start_date: None,
            due_date: None,
            priority: None,
        }
    }
}

/// Partial card update. Column membership and position are never changed here.
#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct UpdateCard {
    pub title: Option<String>,
    pub description: Option<String>,
    /// `Some(None)` clears the date.
    #[ts(type = "string | null | undefined")]
    pub start_date: Option<Option<NaiveDate>>,
    #[ts(type = "string | null | undefined")]
    pub due_date: Option<Option<NaiveDate>>,
    pub priority: Option<Priority>,
}

impl Card {
    /// Active card whose due date is before `today`.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.archived && self.due_date.is_some_and(|due| due < today)
    }
}
