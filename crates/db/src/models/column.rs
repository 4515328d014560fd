use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    board::Board,
    cascade::{self, CascadeSummary},
};
use crate::{
    BoardError, DBService, EntityKind,
    ordering::{self, Container},
    validation::{validate_name, validate_wip_limit},
};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Column {
    pub id: Uuid,
    pub board_id: Uuid,
    pub name: String,
    pub position: i64,
    /// Soft work-in-progress limit; exceeding it is reported, never enforced.
    pub wip_limit: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateColumn {
    pub board_id: Uuid,
    pub name: String,
    pub wip_limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct UpdateColumn {
    pub name: Option<String>,
    /// `Some(None)` clears the limit.
    pub wip_limit: Option<Option<i64>>,
}

impl Column {
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Column>(
            r#"SELECT id, board_id, name, position, wip_limit, created_at, updated_at
               FROM "column"
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn require<'e, E>(executor: E, id: Uuid) -> Result<Self, BoardError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        Self::find_by_id(executor, id)
            .await?
            .ok_or(BoardError::not_found(EntityKind::Column, id))
    }

    /// Columns of a board in display order.
    pub async fn find_by_board<'e, E>(executor: E, board_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Column>(
            r#"SELECT id, board_id, name, position, wip_limit, created_at, updated_at
               FROM "column"
               WHERE board_id = $1
               ORDER BY position ASC, rowid ASC"#,
        )
        .bind(board_id)
        .fetch_all(executor)
        .await
    }

    /// Create a column after the board's last column.
    pub async fn create(db: &DBService, data: &CreateColumn) -> Result<Self, BoardError> {
        let name = validate_name(&data.name)?;
        validate_wip_limit(data.wip_limit)?;

        let container = Container::Board(data.board_id);
        let _guard = db.locks.lock(container).await;
        let mut tx = db.begin_write().await?;
        Board::require(&mut *tx, data.board_id).await?;

        let slot = ordering::claim_slot(&mut tx, container, None, None).await?;
        let column = sqlx::query_as::<_, Column>(
            r#"INSERT INTO "column" (id, board_id, name, position, wip_limit, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, datetime('now', 'subsec'), datetime('now', 'subsec'))
               RETURNING id, board_id, name, position, wip_limit, created_at, updated_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(data.board_id)
        .bind(name)
        .bind(slot.position)
        .bind(data.wip_limit)
        .fetch_one(&mut *tx)
        .await?;

        ordering::verify_distinct(&mut tx, container).await?;
        tx.commit().await?;
        Ok(column)
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateColumn,
    ) -> Result<Self, BoardError> {
        let existing = Self::require(pool, id).await?;
        let name = match &data.name {
            Some(name) => validate_name(name)?,
            None => existing.name,
        };
        let wip_limit = data.wip_limit.unwrap_or(existing.wip_limit);
        validate_wip_limit(wip_limit)?;

        let column = sqlx::query_as::<_, Column>(
            r#"UPDATE "column"
               SET name = $2, wip_limit = $3, updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id, board_id, name, position, wip_limit, created_at, updated_at"#,
        )
        .bind(id)
        .bind(name)
        .bind(wip_limit)
        .fetch_optional(pool)
        .await?;
        column.ok_or(BoardError::not_found(EntityKind::Column, id))
    }

    /// Move a column to `index` among the other columns of its board.
    pub async fn move_to(db: &DBService, id: Uuid, index: usize) -> Result<Self, BoardError> {
        let column = Self::require(&db.pool, id).await?;
        ordering::reorder_within(db, Container::Board(column.board_id), id, index).await?;
        Self::require(&db.pool, id).await
    }

    /// Delete a column with its cards and their descendants, then compact the board's
    /// remaining columns.
    pub async fn delete(db: &DBService, id: Uuid) -> Result<CascadeSummary, BoardError> {
        cascade::delete_column(db, id).await
    }
}
