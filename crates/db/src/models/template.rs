//! Reusable card templates.
//!
//! A template stores a JSON snapshot of card fields and checklists. Instantiating one
//! creates a fresh card at the end of a column with its checklists recreated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use tracing::debug;
use ts_rs::TS;
use uuid::Uuid;

use super::{
    card::{Card, CreateCard, PendingCard, Priority, insert, reserve_card_slot},
    cascade::CascadeSummary,
    checklist::Checklist,
};
use crate::{
    BoardError, DBService, EntityKind,
    ordering::{self, Container, evenly_spaced},
    validation::{validate_name, validate_title},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(default)]
pub struct ChecklistSnapshot {
    pub title: String,
    pub items: Vec<String>,
}

/// Card fields captured by a template. Missing fields deserialize to their defaults so
/// older snapshots stay readable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(default)]
pub struct CardSnapshot {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub checklists: Vec<ChecklistSnapshot>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct CardTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    #[sqlx(json)]
    pub snapshot: CardSnapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateCardTemplate {
    pub name: String,
    pub description: Option<String>,
    pub snapshot: CardSnapshot,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct UpdateCardTemplate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub snapshot: Option<CardSnapshot>,
}

impl CardTemplate {
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, CardTemplate>(
            r#"SELECT id, name, description, snapshot, created_at, updated_at
               FROM card_template
               ORDER BY name ASC"#,
        )
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, CardTemplate>(
            r#"SELECT id, name, description, snapshot, created_at, updated_at
               FROM card_template
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
            .ok_or(BoardError::not_found(EntityKind::CardTemplate, id))
    }

    pub async fn create(pool: &SqlitePool, data: &CreateCardTemplate) -> Result<Self, BoardError> {
        let name = validate_name(&data.name)?;
        let snapshot = serde_json::to_string(&data.snapshot)?;

        let template = sqlx::query_as::<_, CardTemplate>(
            r#"INSERT INTO card_template (id, name, description, snapshot, created_at, updated_at)
               VALUES ($1, $2, $3, $4, datetime('now', 'subsec'), datetime('now', 'subsec'))
               RETURNING id, name, description, snapshot, created_at, updated_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(data.description.as_deref().unwrap_or_default())
        .bind(snapshot)
        .fetch_one(pool)
        .await?;
        Ok(template)
    }

    /// Save an existing card's fields and checklists as a new template.
    pub async fn capture(pool: &SqlitePool, card_id: Uuid, name: &str) -> Result<Self, BoardError> {
        let card = Card::require(pool, card_id).await?;
        let checklists = Checklist::find_with_items(pool, card_id).await?;

        let snapshot = CardSnapshot {
            title: card.title,
            description: card.description,
            priority: card.priority,
            checklists: checklists
                .into_iter()
                .map(|list| ChecklistSnapshot {
                    title: list.checklist.title,
                    items: list.items.into_iter().map(|item| item.text).collect(),
                })
                .collect(),
        };

        Self::create(
            pool,
            &CreateCardTemplate {
                name: name.to_string(),
                description: None,
                snapshot,
            },
        )
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateCardTemplate,
    ) -> Result<Self, BoardError> {
        let existing = Self::require(pool, id).await?;
        let name = match &data.name {
            Some(name) => validate_name(name)?,
            None => existing.name,
        };
        let description = data.description.as_ref().unwrap_or(&existing.description);
        let snapshot = serde_json::to_string(data.snapshot.as_ref().unwrap_or(&existing.snapshot))?;

        let template = sqlx::query_as::<_, CardTemplate>(
            r#"UPDATE card_template
               SET name = $2, description = $3, snapshot = $4,
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id, name, description, snapshot, created_at, updated_at"#,
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(snapshot)
        .fetch_optional(pool)
        .await?;
        template.ok_or(BoardError::not_found(EntityKind::CardTemplate, id))
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<CascadeSummary, BoardError> {
        let card_templates = sqlx::query("DELETE FROM card_template WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?
            .rows_affected();
        if card_templates == 0 {
            return Err(BoardError::not_found(EntityKind::CardTemplate, id));
        }
        Ok(CascadeSummary {
            card_templates,
            ..Default::default()
        })
    }

    /// Create a card from a template at the end of `column_id`, checklists included,
    /// in one transaction. An untitled snapshot takes the template's name.
    pub async fn instantiate(db: &DBService, id: Uuid, column_id: Uuid) -> Result<Card, BoardError> {
        let template = Self::require(&db.pool, id).await?;
        let snapshot = template.snapshot;
        let title = if snapshot.title.trim().is_empty() {
            validate_title(&template.name)?
        } else {
            validate_title(&snapshot.title)?
        };

        let PendingCard {
            mut tx,
            position,
            _guard,
        } = reserve_card_slot(db, column_id).await?;

        let data = CreateCard {
            column_id,
            title: title.clone(),
            description: Some(snapshot.description),
            start_date: None,
            due_date: None,
            priority: Some(snapshot.priority),
        };
        let card = insert(&mut tx, &data, &title, position).await?;

        let list_positions = evenly_spaced(snapshot.checklists.len());
        for (list, list_position) in snapshot.checklists.iter().zip(list_positions) {
            let checklist_id = Uuid::new_v4();
            sqlx::query(
                "INSERT INTO checklist (id, card_id, title, position, created_at)
                 VALUES ($1, $2, $3, $4, datetime('now', 'subsec'))",
            )
            .bind(checklist_id)
            .bind(card.id)
            .bind(&list.title)
            .bind(list_position)
            .execute(&mut *tx)
            .await?;

            for (text, item_position) in list.items.iter().zip(evenly_spaced(list.items.len())) {
                sqlx::query(
                    "INSERT INTO checklist_item (id, checklist_id, text, position, created_at)
                     VALUES ($1, $2, $3, $4, datetime('now', 'subsec'))",
                )
                .bind(Uuid::new_v4())
                .bind(checklist_id)
                .bind(text)
                .bind(item_position)
                .execute(&mut *tx)
                .await?;
            }
        }

        ordering::verify_distinct(&mut tx, Container::Column(column_id)).await?;
        tx.commit().await?;

        debug!(template_id = %id, card_id = %card.id, "Instantiated card template");
        Ok(card)
    }
}
