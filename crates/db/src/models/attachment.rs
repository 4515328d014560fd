//! Attachment metadata. The file bytes live wherever `storage_path` points; this
//! crate never reads or writes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

use super::{card::Card, cascade::CascadeSummary};
use crate::{BoardError, EntityKind, validation::validate_name};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Attachment {
    pub id: Uuid,
    pub card_id: Uuid,
    pub filename: String,
    pub storage_path: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateAttachment {
    pub card_id: Uuid,
    pub filename: String,
    pub storage_path: String,
    pub size_bytes: i64,
    /// Guessed from the filename when absent.
    pub mime_type: Option<String>,
}

/// MIME type for a filename, `application/octet-stream` when unknown.
pub fn guess_mime_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

impl Attachment {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Attachment>(
            r#"SELECT id, card_id, filename, storage_path, size_bytes, mime_type, uploaded_at
               FROM attachment
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_card(pool: &SqlitePool, card_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Attachment>(
            r#"SELECT id, card_id, filename, storage_path, size_bytes, mime_type, uploaded_at
               FROM attachment
               WHERE card_id = $1
               ORDER BY uploaded_at ASC, rowid ASC"#,
        )
        .bind(card_id)
        .fetch_all(pool)
        .await
    }

    pub async fn create(pool: &SqlitePool, data: &CreateAttachment) -> Result<Self, BoardError> {
        let filename = validate_name(&data.filename)?;
        Card::require(pool, data.card_id).await?;
        let mime_type = data
            .mime_type
            .clone()
            .unwrap_or_else(|| guess_mime_type(&filename));

        let attachment = sqlx::query_as::<_, Attachment>(
            r#"INSERT INTO attachment (id, card_id, filename, storage_path, size_bytes, mime_type, uploaded_at)
               VALUES ($1, $2, $3, $4, $5, $6, datetime('now', 'subsec'))
               RETURNING id, card_id, filename, storage_path, size_bytes, mime_type, uploaded_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(data.card_id)
        .bind(filename)
        .bind(&data.storage_path)
        .bind(data.size_bytes)
        .bind(mime_type)
        .fetch_one(pool)
        .await?;
        Ok(attachment)
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<CascadeSummary, BoardError> {
        let attachments = sqlx::query("DELETE FROM attachment WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?
            .rows_affected();
        if attachments == 0 {
            return Err(BoardError::not_found(EntityKind::Attachment, id));
        }
        Ok(CascadeSummary {
            attachments,
            ..Default::default()
        })
    }
}
