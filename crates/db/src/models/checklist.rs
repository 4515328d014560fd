use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

use super::{card::Card, cascade::CascadeSummary};
use crate::{
    BoardError, DBService, EntityKind,
    ordering::{self, Container},
    validation::validate_title,
};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Checklist {
    pub id: Uuid,
    pub card_id: Uuid,
    pub title: String,
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ChecklistItem {
    pub id: Uuid,
    pub checklist_id: Uuid,
    pub text: String,
    pub checked: bool,
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

/// Checked vs. total items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize, TS)]
pub struct ChecklistProgress {
    pub done: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct ChecklistWithItems {
    #[serde(flatten)]
    #[ts(flatten)]
    pub checklist: Checklist,
    pub items: Vec<ChecklistItem>,
    pub progress: ChecklistProgress,
}

impl ChecklistProgress {
    fn of(items: &[ChecklistItem]) -> Self {
        Self {
            done: items.iter().filter(|i| i.checked).count() as i64,
            total: items.len() as i64,
        }
    }

    /// Progress over every checklist of a card.
    pub async fn for_card(pool: &SqlitePool, card_id: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ChecklistProgress>(
            r#"SELECT COALESCE(SUM(checked), 0) AS done, COUNT(*) AS total
               FROM checklist_item
               WHERE checklist_id IN (SELECT id FROM checklist WHERE card_id = $1)"#,
        )
        .bind(card_id)
        .fetch_one(pool)
        .await
    }
}

impl Checklist {
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Checklist>(
            "SELECT id, card_id, title, position, created_at FROM checklist WHERE id = $1",
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
            .ok_or(BoardError::not_found(EntityKind::Checklist, id))
    }

    pub async fn find_by_card<'e, E>(executor: E, card_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Checklist>(
            r#"SELECT id, card_id, title, position, created_at
               FROM checklist
               WHERE card_id = $1
               ORDER BY position ASC, rowid ASC"#,
        )
        .bind(card_id)
        .fetch_all(executor)
        .await
    }

    /// Checklists of a card with their items and progress, all in order.
    pub async fn find_with_items(
        pool: &SqlitePool,
        card_id: Uuid,
    ) -> Result<Vec<ChecklistWithItems>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let checklists = Self::find_by_card(&mut *tx, card_id).await?;
        let mut result = Vec::with_capacity(checklists.len());
        for checklist in checklists {
            let items = ChecklistItem::find_by_checklist(&mut *tx, checklist.id).await?;
            result.push(ChecklistWithItems {
                progress: ChecklistProgress::of(&items),
                checklist,
                items,
            });
        }
        tx.commit().await?;
        Ok(result)
    }

    /// Add a checklist after the card's last one.
    pub async fn create(db: &DBService, card_id: Uuid, title: &str) -> Result<Self, BoardError> {
        let title = validate_title(title)?;
        let container = Container::Card(card_id);
        let _guard = db.locks.lock(container).await;
        let mut tx = db.begin_write().await?;
        Card::require(&mut *tx, card_id).await?;

        let slot = ordering::claim_slot(&mut tx, container, None, None).await?;
        let checklist = sqlx::query_as::<_, Checklist>(
            r#"INSERT INTO checklist (id, card_id, title, position, created_at)
               VALUES ($1, $2, $3, $4, datetime('now', 'subsec'))
               RETURNING id, card_id, title, position, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(card_id)
        .bind(title)
        .bind(slot.position)
        .fetch_one(&mut *tx)
        .await?;

        ordering::verify_distinct(&mut tx, container).await?;
        tx.commit().await?;
        Ok(checklist)
    }

    pub async fn rename(pool: &SqlitePool, id: Uuid, title: &str) -> Result<Self, BoardError> {
        let title = validate_title(title)?;
        let checklist = sqlx::query_as::<_, Checklist>(
            r#"UPDATE checklist SET title = $2 WHERE id = $1
               RETURNING id, card_id, title, position, created_at"#,
        )
        .bind(id)
        .bind(title)
        .fetch_optional(pool)
        .await?;
        checklist.ok_or(BoardError::not_found(EntityKind::Checklist, id))
    }

    pub async fn move_to(db: &DBService, id: Uuid, index: usize) -> Result<Self, BoardError> {
        let checklist = Self::require(&db.pool, id).await?;
        ordering::reorder_within(db, Container::Card(checklist.card_id), id, index).await?;
        Self::require(&db.pool, id).await
    }

    /// Delete a checklist with its items and compact the card's remaining checklists.
    pub async fn delete(db: &DBService, id: Uuid) -> Result<CascadeSummary, BoardError> {
        let checklist = Self::require(&db.pool, id).await?;
        let container = Container::Card(checklist.card_id);
        let guard = db
            .locks
            .lock_all(&[container, Container::Checklist(id)])
            .await;
        let mut tx = db.begin_write().await?;
        Self::require(&mut *tx, id).await?;

        let checklist_items = sqlx::query("DELETE FROM checklist_item WHERE checklist_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let checklists = sqlx::query("DELETE FROM checklist WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        ordering::compact(&mut tx, container).await?;
        ordering::verify_distinct(&mut tx, container).await?;
        tx.commit().await?;

        drop(guard);
        db.locks.forget(Container::Checklist(id));
        Ok(CascadeSummary {
            checklists,
            checklist_items,
            ..Default::default()
        })
    }
}

impl ChecklistItem {
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, ChecklistItem>(
            r#"SELECT id, checklist_id, text, checked, position, created_at
               FROM checklist_item
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
            .ok_or(BoardError::not_found(EntityKind::ChecklistItem, id))
    }

    pub async fn find_by_checklist<'e, E>(
        executor: E,
        checklist_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, ChecklistItem>(
            r#"SELECT id, checklist_id, text, checked, position, created_at
               FROM checklist_item
               WHERE checklist_id = $1
               ORDER BY position ASC, rowid ASC"#,
        )
        .bind(checklist_id)
        .fetch_all(executor)
        .await
    }

    /// Add an unchecked item at the end of a checklist.
    pub async fn create(db: &DBService, checklist_id: Uuid, text: &str) -> Result<Self, BoardError> {
        let text = validate_title(text)?;
        let container = Container::Checklist(checklist_id);
        let _guard = db.locks.lock(container).await;
        let mut tx = db.begin_write().await?;
        Checklist::require(&mut *tx, checklist_id).await?;

        let slot = ordering::claim_slot(&mut tx, container, None, None).await?;
        let item = sqlx::query_as::<_, ChecklistItem>(
            r#"INSERT INTO checklist_item (id, checklist_id, text, position, created_at)
               VALUES ($1, $2, $3, $4, datetime('now', 'subsec'))
               RETURNING id, checklist_id, text, checked, position, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(checklist_id)
        .bind(text)
        .bind(slot.position)
        .fetch_one(&mut *tx)
        .await?;

        ordering::verify_distinct(&mut tx, container).await?;
        tx.commit().await?;
        Ok(item)
    }

    pub async fn update_text(pool: &SqlitePool, id: Uuid, text: &str) -> Result<Self, BoardError> {
        let text = validate_title(text)?;
        let item = sqlx::query_as::<_, ChecklistItem>(
            r#"UPDATE checklist_item SET text = $2 WHERE id = $1
               RETURNING id, checklist_id, text, checked, position, created_at"#,
        )
        .bind(id)
        .bind(text)
        .fetch_optional(pool)
        .await?;
        item.ok_or(BoardError::not_found(EntityKind::ChecklistItem, id))
    }

    pub async fn set_checked(pool: &SqlitePool, id: Uuid, checked: bool) -> Result<Self, BoardError> {
        let item = sqlx::query_as::<_, ChecklistItem>(
            r#"UPDATE checklist_item SET checked = $2 WHERE id = $1
               RETURNING id, checklist_id, text, checked, position, created_at"#,
        )
        .bind(id)
        .bind(checked)
        .fetch_optional(pool)
        .await?;
        item.ok_or(BoardError::not_found(EntityKind::ChecklistItem, id))
    }

    pub async fn move_to(db: &DBService, id: Uuid, index: usize) -> Result<Self, BoardError> {
        let item = Self::require(&db.pool, id).await?;
        ordering::reorder_within(db, Container::Checklist(item.checklist_id), id, index).await?;
        Self::require(&db.pool, id).await
    }

    pub async fn delete(db: &DBService, id: Uuid) -> Result<CascadeSummary, BoardError> {
        let item = Self::require(&db.pool, id).await?;
        let container = Container::Checklist(item.checklist_id);
        let _guard = db.locks.lock(container).await;
        let mut tx = db.begin_write().await?;

        let checklist_items = sqlx::query("DELETE FROM checklist_item WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if checklist_items == 0 {
            return Err(BoardError::not_found(EntityKind::ChecklistItem, id));
        }
        ordering::compact(&mut tx, container).await?;
        ordering::verify_distinct(&mut tx, container).await?;
        tx.commit().await?;

        Ok(CascadeSummary {
            checklist_items,
            ..Default::default()
        })
    }
}
