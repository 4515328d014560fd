use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use tracing::info;
use ts_rs::TS;
use uuid::Uuid;

use super::{
    card::Card,
    cascade::{self, CascadeSummary},
    column::Column,
};
use crate::{
    BoardError, DBService, EntityKind,
    ordering::evenly_spaced,
    validation::validate_name,
};

/// Name and columns of the board seeded into an empty store.
pub const DEFAULT_BOARD_NAME: &str = "Kanban";
pub const DEFAULT_COLUMNS: [&str; 3] = ["Backlog", "In Progress", "Done"];

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Board {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Inactive boards are kept for reference but accept no new cards.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateBoard {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct UpdateBoard {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// A column with its active cards, in position order.
#[derive(Debug, Clone, Serialize, TS)]
pub struct ColumnView {
    #[serde(flatten)]
    #[ts(flatten)]
    pub column: Column,
    pub cards: Vec<Card>,
}

/// Everything needed to render one board.
#[derive(Debug, Clone, Serialize, TS)]
pub struct BoardView {
    pub board: Board,
    pub columns: Vec<ColumnView>,
}

impl Board {
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Board>(
            r#"SELECT id, name, description, is_active, created_at, updated_at
               FROM board
               ORDER BY created_at ASC, rowid ASC"#,
        )
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Board>(
            r#"SELECT id, name, description, is_active, created_at, updated_at
               FROM board
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Like [`Board::find_by_id`], but a missing board is an error.
    pub async fn require<'e, E>(executor: E, id: Uuid) -> Result<Self, BoardError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        Self::find_by_id(executor, id)
            .await?
            .ok_or(BoardError::not_found(EntityKind::Board, id))
    }

    pub async fn create(pool: &SqlitePool, data: &CreateBoard) -> Result<Self, BoardError> {
        let name = validate_name(&data.name)?;
        let board = sqlx::query_as::<_, Board>(
            r#"INSERT INTO board (id, name, description, created_at, updated_at)
               VALUES ($1, $2, $3, datetime('now', 'subsec'), datetime('now', 'subsec'))
               RETURNING id, name, description, is_active, created_at, updated_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(data.description.as_deref().unwrap_or_default())
        .fetch_one(pool)
        .await?;
        Ok(board)
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateBoard,
    ) -> Result<Self, BoardError> {
        let existing = Self::require(pool, id).await?;
        let name = match &data.name {
            Some(name) => validate_name(name)?,
            None => existing.name,
        };
        let description = data.description.as_ref().unwrap_or(&existing.description);

        let board = sqlx::query_as::<_, Board>(
            r#"UPDATE board
               SET name = $2, description = $3, updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id, name, description, is_active, created_at, updated_at"#,
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .fetch_optional(pool)
        .await?;
        board.ok_or(BoardError::not_found(EntityKind::Board, id))
    }

    /// Activate or deactivate a board. Inactive boards reject new cards.
    pub async fn set_active(pool: &SqlitePool, id: Uuid, active: bool) -> Result<Self, BoardError> {
        let board = sqlx::query_as::<_, Board>(
            r#"UPDATE board
               SET is_active = $2, updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id, name, description, is_active, created_at, updated_at"#,
        )
        .bind(id)
        .bind(active)
        .fetch_optional(pool)
        .await?;
        board.ok_or(BoardError::not_found(EntityKind::Board, id))
    }

    /// Delete a board with all its columns, cards, labels and their descendants.
    pub async fn delete(db: &DBService, id: Uuid) -> Result<CascadeSummary, BoardError> {
        cascade::delete_board(db, id).await
    }

    /// Return the oldest board, creating the default board with its three columns when
    /// the store has none.
    ///
    /// Callers resolve the board they work on explicitly; nothing in this crate keeps a
    /// current board.
    pub async fn ensure_default(db: &DBService) -> Result<Self, BoardError> {
        let mut tx = db.begin_write().await?;

        let existing = sqlx::query_as::<_, Board>(
            r#"SELECT id, name, description, is_active, created_at, updated_at
               FROM board
               ORDER BY created_at ASC, rowid ASC
               LIMIT 1"#,
        )
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(board) = existing {
            return Ok(board);
        }

        let board = sqlx::query_as::<_, Board>(
            r#"INSERT INTO board (id, name, description, created_at, updated_at)
               VALUES ($1, $2, '', datetime('now', 'subsec'), datetime('now', 'subsec'))
               RETURNING id, name, description, is_active, created_at, updated_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(DEFAULT_BOARD_NAME)
        .fetch_one(&mut *tx)
        .await?;

        for (name, position) in DEFAULT_COLUMNS.iter().zip(evenly_spaced(DEFAULT_COLUMNS.len())) {
            sqlx::query(
                r#"INSERT INTO "column" (id, board_id, name, position, created_at, updated_at)
                   VALUES ($1, $2, $3, $4, datetime('now', 'subsec'), datetime('now', 'subsec'))"#,
            )
            .bind(Uuid::new_v4())
            .bind(board.id)
            .bind(*name)
            .bind(position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(board_id = %board.id, name = %board.name, "Seeded default board");
        Ok(board)
    }

    /// Load a board with its columns and their active cards from one consistent
    /// snapshot.
    pub async fn load_view(pool: &SqlitePool, id: Uuid) -> Result<BoardView, BoardError> {
        let mut tx = pool.begin().await?;
        let board = Self::require(&mut *tx, id).await?;
        let columns = Column::find_by_board(&mut *tx, id).await?;
        let cards = Card::find_active_by_board(&mut *tx, id).await?;
        tx.commit().await?;

        let columns = columns
            .into_iter()
            .map(|column| ColumnView {
                cards: cards
                    .iter()
                    .filter(|card| card.column_id == column.id)
                    .cloned()
                    .collect(),
                column,
            })
            .collect();

        Ok(BoardView { board, columns })
    }
}
