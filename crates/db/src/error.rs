//! Error types for the board store.
//!
//! [`BoardError`] covers every entity-graph and ordering operation and is recoverable at
//! the caller. [`SchemaError`] is raised only while opening and evolving the store and
//! aborts startup.

use serde::Serialize;
use strum_macros::Display;
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use crate::{ordering::Container, retry::is_retryable_error, validation::ValidationError};

/// The kinds of entity the store persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, TS)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    Board,
    Column,
    Card,
    Label,
    Checklist,
    ChecklistItem,
    Attachment,
    CardTemplate,
}

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Uuid },

    #[error("{kind} {id} belongs to board {found}, not board {expected}")]
    CrossBoard {
        kind: EntityKind,
        id: Uuid,
        expected: Uuid,
        found: Uuid,
    },

    #[error("destination index {index} is outside 0..={len}")]
    InvalidIndex { index: usize, len: usize },

    /// Two active siblings share a position. Reaching this is a bug in the ordering code;
    /// the transaction that produced it is rolled back.
    #[error("duplicate position {position} in {container}")]
    DuplicatePosition { container: Container, position: i64 },

    #[error("no free position left in {0}")]
    PositionSpaceExhausted(Container),

    #[error("board {0} is inactive")]
    InactiveBoard(Uuid),

    #[error("card {0} is archived")]
    CardArchived(Uuid),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid card template snapshot: {0}")]
    Template(#[from] serde_json::Error),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl BoardError {
    pub fn not_found(kind: EntityKind, id: Uuid) -> Self {
        Self::NotFound { kind, id }
    }

    /// Whether the failure came from transient SQLite contention and the whole
    /// operation can be retried by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(e) if is_retryable_error(e))
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to open storage: {0}")]
    Open(#[source] sqlx::Error),

    #[error("storage is corrupt: {0}")]
    Corrupt(String),

    #[error("failed to reconcile table {table}: {source}")]
    Write {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
