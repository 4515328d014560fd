use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

use super::{board::Board, card::Card, cascade::CascadeSummary};
use crate::{
    BoardError, EntityKind, begin_write,
    validation::{validate_color, validate_name},
};

/// A board-scoped label for visual card categorization
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Label {
    pub id: Uuid,
    pub board_id: Uuid,
    pub name: String,
    /// Hex color code (e.g., "#3b82f6")
    pub color: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateLabel {
    pub board_id: Uuid,
    pub name: String,
    #[serde(default = "default_color")]
    pub color: String,
}

pub fn default_color() -> String {
    "#6b7280".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct UpdateLabel {
    pub name: Option<String>,
    pub color: Option<String>,
}

impl Label {
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Label>(
            "SELECT id, board_id, name, color, created_at FROM label WHERE id = $1",
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
            .ok_or(BoardError::not_found(EntityKind::Label, id))
    }

    pub async fn find_by_board(pool: &SqlitePool, board_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Label>(
            r#"SELECT id, board_id, name, color, created_at
               FROM label
               WHERE board_id = $1
               ORDER BY name ASC"#,
        )
        .bind(board_id)
        .fetch_all(pool)
        .await
    }

    /// Labels assigned to a card
    pub async fn find_by_card(pool: &SqlitePool, card_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Label>(
            r#"SELECT l.id, l.board_id, l.name, l.color, l.created_at
               FROM label l
               JOIN card_label cl ON cl.label_id = l.id
               WHERE cl.card_id = $1
               ORDER BY l.name ASC"#,
        )
        .bind(card_id)
        .fetch_all(pool)
        .await
    }

    pub async fn create(pool: &SqlitePool, data: &CreateLabel) -> Result<Self, BoardError> {
        let name = validate_name(&data.name)?;
        validate_color(&data.color)?;
        Board::require(pool, data.board_id).await?;

        let label = sqlx::query_as::<_, Label>(
            r#"INSERT INTO label (id, board_id, name, color, created_at)
               VALUES ($1, $2, $3, $4, datetime('now', 'subsec'))
               RETURNING id, board_id, name, color, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(data.board_id)
        .bind(name)
        .bind(&data.color)
        .fetch_one(pool)
        .await?;
        Ok(label)
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateLabel,
    ) -> Result<Self, BoardError> {
        let existing = Self::require(pool, id).await?;
        let name = match &data.name {
            Some(name) => validate_name(name)?,
            None => existing.name,
        };
        let color = data.color.as_ref().unwrap_or(&existing.color);
        validate_color(color)?;

        let label = sqlx::query_as::<_, Label>(
            r#"UPDATE label
               SET name = $2, color = $3
               WHERE id = $1
               RETURNING id, board_id, name, color, created_at"#,
        )
        .bind(id)
        .bind(name)
        .bind(color)
        .fetch_optional(pool)
        .await?;
        label.ok_or(BoardError::not_found(EntityKind::Label, id))
    }

    /// Delete a label together with its card assignments.
    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<CascadeSummary, BoardError> {
        let mut tx = begin_write(pool).await?;
        Self::require(&mut *tx, id).await?;

        let label_assignments = sqlx::query("DELETE FROM card_label WHERE label_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let labels = sqlx::query("DELETE FROM label WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;

        Ok(CascadeSummary {
            labels,
            label_assignments,
            ..Default::default()
        })
    }

    /// Assign a label to a card. Returns `false` when it was already assigned.
    ///
    /// The label must belong to the card's board.
    pub async fn assign(pool: &SqlitePool, card_id: Uuid, label_id: Uuid) -> Result<bool, BoardError> {
        let mut tx = begin_write(pool).await?;
        let label = Self::require(&mut *tx, label_id).await?;
        let board_id = Card::board_id(&mut *tx, card_id)
            .await?
            .ok_or(BoardError::not_found(EntityKind::Card, card_id))?;
        if label.board_id != board_id {
            return Err(BoardError::CrossBoard {
                kind: EntityKind::Label,
                id: label_id,
                expected: board_id,
                found: label.board_id,
            });
        }

        let inserted = sqlx::query(
            r#"INSERT INTO card_label (id, card_id, label_id, created_at)
               VALUES ($1, $2, $3, datetime('now', 'subsec'))
               ON CONFLICT (card_id, label_id) DO NOTHING"#,
        )
        .bind(Uuid::new_v4())
        .bind(card_id)
        .bind(label_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;
        Ok(inserted > 0)
    }

    /// Remove a label from a card. Returns `false` when it was not assigned.
    pub async fn unassign(
        pool: &SqlitePool,
        card_id: Uuid,
        label_id: Uuid,
    ) -> Result<bool, BoardError> {
        let mut tx = begin_write(pool).await?;
        Card::require(&mut *tx, card_id).await?;
        Self::require(&mut *tx, label_id).await?;

        let removed = sqlx::query("DELETE FROM card_label WHERE card_id = $1 AND label_id = $2")
            .bind(card_id)
            .bind(label_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(removed > 0)
    }

    /// Replace the full label set of a card.
    pub async fn set_card_labels(
        pool: &SqlitePool,
        card_id: Uuid,
        label_ids: &[Uuid],
    ) -> Result<Vec<Self>, BoardError> {
        let mut tx = begin_write(pool).await?;
        let board_id = Card::board_id(&mut *tx, card_id)
            .await?
            .ok_or(BoardError::not_found(EntityKind::Card, card_id))?;

        let wanted: HashSet<Uuid> = label_ids.iter().copied().collect();
        for &label_id in &wanted {
            let label = Self::require(&mut *tx, label_id).await?;
            if label.board_id != board_id {
                return Err(BoardError::CrossBoard {
                    kind: EntityKind::Label,
                    id: label_id,
                    expected: board_id,
                    found: label.board_id,
                });
            }
        }

        let current: Vec<Uuid> =
            sqlx::query_scalar("SELECT label_id FROM card_label WHERE card_id = $1")
                .bind(card_id)
                .fetch_all(&mut *tx)
                .await?;
        for label_id in current.iter().filter(|id| !wanted.contains(*id)) {
            sqlx::query("DELETE FROM card_label WHERE card_id = $1 AND label_id = $2")
                .bind(card_id)
                .bind(label_id)
                .execute(&mut *tx)
                .await?;
        }
        for label_id in wanted.iter().filter(|id| !current.contains(*id)) {
            sqlx::query(
                "INSERT INTO card_label (id, card_id, label_id, created_at)
                 VALUES ($1, $2, $3, datetime('now', 'subsec'))",
            )
            .bind(Uuid::new_v4())
            .bind(card_id)
            .bind(label_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(Self::find_by_card(pool, card_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        DBService,
        models::{
            board::CreateBoard,
            card::CreateCard,
            column::{Column, CreateColumn},
        },
        test_utils::create_test_db,
    };

    async fn card_on_default_board(db: &DBService) -> (Uuid, Card) {
        let board = Board::ensure_default(db).await.unwrap();
        let column = Column::find_by_board(&db.pool, board.id).await.unwrap()[0].id;
        let card = Card::create(db, &CreateCard::titled(column, "tagged"))
            .await
            .unwrap();
        (board.id, card)
    }

    fn label(board_id: Uuid, name: &str) -> CreateLabel {
        CreateLabel {
            board_id,
            name: name.to_string(),
            color: default_color(),
        }
    }

    #[tokio::test]
    async fn test_assign_is_idempotent() {
        let (db, _dir) = create_test_db().await;
        let (board_id, card) = card_on_default_board(&db).await;
        let urgent = Label::create(&db.pool, &label(board_id, "urgent")).await.unwrap();
        assert_eq!(urgent.color, "#6b7280");

        assert!(Label::assign(&db.pool, card.id, urgent.id).await.unwrap());
        assert!(!Label::assign(&db.pool, card.id, urgent.id).await.unwrap());
        assert_eq!(Label::find_by_card(&db.pool, card.id).await.unwrap().len(), 1);

        assert!(Label::unassign(&db.pool, card.id, urgent.id).await.unwrap());
        assert!(!Label::unassign(&db.pool, card.id, urgent.id).await.unwrap());
        assert!(Label::find_by_card(&db.pool, card.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_assign_label_from_other_board_is_rejected() {
        let (db, _dir) = create_test_db().await;
        let (board_id, card) = card_on_default_board(&db).await;
        let other = Board::create(
            &db.pool,
            &CreateBoard {
                name: "Work".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
        Column::create(
            &db,
            &CreateColumn {
                board_id: other.id,
                name: "Inbox".to_string(),
                wip_limit: None,
            },
        )
        .await
        .unwrap();
        let foreign = Label::create(&db.pool, &label(other.id, "meeting")).await.unwrap();

        let err = Label::assign(&db.pool, card.id, foreign.id).await.unwrap_err();
        assert!(matches!(
            err,
            BoardError::CrossBoard { kind: EntityKind::Label, expected, found, .. }
                if expected == board_id && found == other.id
        ));

        let err = Label::set_card_labels(&db.pool, card.id, &[foreign.id])
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::CrossBoard { .. }));
    }

    #[tokio::test]
    async fn test_assign_missing_ids() {
        let (db, _dir) = create_test_db().await;
        let (board_id, card) = card_on_default_board(&db).await;
        let home = Label::create(&db.pool, &label(board_id, "home")).await.unwrap();

        let err = Label::assign(&db.pool, Uuid::new_v4(), home.id).await.unwrap_err();
        assert!(matches!(err, BoardError::NotFound { kind: EntityKind::Card, .. }));
        let err = Label::assign(&db.pool, card.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BoardError::NotFound { kind: EntityKind::Label, .. }));
    }

    #[tokio::test]
    async fn test_set_card_labels_replaces_set() {
        let (db, _dir) = create_test_db().await;
        let (board_id, card) = card_on_default_board(&db).await;
        let a = Label::create(&db.pool, &label(board_id, "a")).await.unwrap();
        let b = Label::create(&db.pool, &label(board_id, "b")).await.unwrap();
        let c = Label::create(&db.pool, &label(board_id, "c")).await.unwrap();

        Label::set_card_labels(&db.pool, card.id, &[a.id, b.id]).await.unwrap();
        let labels = Label::set_card_labels(&db.pool, card.id, &[b.id, c.id, c.id])
            .await
            .unwrap();
        let names: Vec<&str> = labels.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_delete_removes_assignments() {
        let (db, _dir) = create_test_db().await;
        let (board_id, card) = card_on_default_board(&db).await;
        let a = Label::create(&db.pool, &label(board_id, "a")).await.unwrap();
        Label::assign(&db.pool, card.id, a.id).await.unwrap();

        let summary = Label::delete(&db.pool, a.id).await.unwrap();
        assert_eq!(summary.labels, 1);
        assert_eq!(summary.label_assignments, 1);
        assert!(Label::find_by_card(&db.pool, card.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_color() {
        let (db, _dir) = create_test_db().await;
        let board = Board::ensure_default(&db).await.unwrap();
        let err = Label::create(
            &db.pool,
            &CreateLabel {
                board_id: board.id,
                name: "x".to_string(),
                color: "red".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BoardError::Validation(_)));
    }
}
