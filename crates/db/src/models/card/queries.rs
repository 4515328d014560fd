//! Card lookups and field updates.

use sqlx::{Executor, Sqlite, SqlitePool};
use uuid::Uuid;

use super::{Card, UpdateCard};
use crate::{BoardError, EntityKind, validation::validate_title};

impl Card {
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Card>(concat!("SELECT ", card_columns!(), " FROM card WHERE id = $1"))
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
            .ok_or(BoardError::not_found(EntityKind::Card, id))
    }

    /// Active cards of a column in position order.
    pub async fn find_by_column<'e, E>(executor: E, column_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Card>(concat!(
            "SELECT ",
            card_columns!(),
            " FROM card WHERE column_id = $1 AND archived = 0 ORDER BY position ASC, rowid ASC"
        ))
        .bind(column_id)
        .fetch_all(executor)
        .await
    }

    /// Active cards of every column of a board, each column's cards in position order.
    pub async fn find_active_by_board<'e, E>(
        executor: E,
        board_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Card>(concat!(
            "SELECT ",
            card_columns!(),
            r#" FROM card
                WHERE archived = 0
                  AND column_id IN (SELECT id FROM "column" WHERE board_id = $1)
                ORDER BY position ASC, rowid ASC"#
        ))
        .bind(board_id)
        .fetch_all(executor)
        .await
    }

    /// Archived cards of a board, most recently archived first.
    pub async fn find_archived_by_board(
        pool: &SqlitePool,
        board_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Card>(concat!(
            "SELECT ",
            card_columns!(),
            r#" FROM card
                WHERE archived = 1
                  AND column_id IN (SELECT id FROM "column" WHERE board_id = $1)
                ORDER BY archived_at DESC, rowid DESC"#
        ))
        .bind(board_id)
        .fetch_all(pool)
        .await
    }

    /// Board that owns a card, through its column.
    pub async fn board_id<'e, E>(executor: E, card_id: Uuid) -> Result<Option<Uuid>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar(
            r#"SELECT c.board_id
               FROM card
               JOIN "column" c ON c.id = card.column_id
               WHERE card.id = $1"#,
        )
        .bind(card_id)
        .fetch_optional(executor)
        .await
    }

    /// Update title, description, dates and priority. A blank title is rejected.
    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateCard,
    ) -> Result<Self, BoardError> {
        let existing = Self::require(pool, id).await?;
        let title = match &data.title {
            Some(title) => validate_title(title)?,
            None => existing.title,
        };
        let description = data.description.as_ref().unwrap_or(&existing.description);
        let start_date = data.start_date.unwrap_or(existing.start_date);
        let due_date = data.due_date.unwrap_or(existing.due_date);
        let priority = data.priority.unwrap_or(existing.priority);

        let card = sqlx::query_as::<_, Card>(concat!(
            r#"UPDATE card
               SET title = $2, description = $3, start_date = $4, due_date = $5,
                   priority = $6, updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING "#,
            card_columns!()
        ))
        .bind(id)
        .bind(title)
        .bind(description)
        .bind(start_date)
        .bind(due_date)
        .bind(priority)
        .fetch_optional(pool)
        .await?;
        card.ok_or(BoardError::not_found(EntityKind::Card, id))
    }
}
