use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

use super::board::Board;
use crate::BoardError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct PriorityCounts {
    pub high: i64,
    pub medium: i64,
    pub low: i64,
}

/// Active card count for one column, with its WIP limit if set.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ColumnCount {
    pub column_id: Uuid,
    pub name: String,
    pub count: i64,
    pub wip_limit: Option<i64>,
    pub over_limit: bool,
}

/// Dashboard counts for one board. Archived cards are never counted.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Metrics {
    pub board_id: Uuid,
    pub total: i64,
    pub by_priority: PriorityCounts,
    pub overdue: i64,
    pub by_column: Vec<ColumnCount>,
}

#[derive(FromRow)]
struct Totals {
    total: i64,
    high: i64,
    medium: i64,
    low: i64,
    overdue: i64,
}

impl Metrics {
    pub async fn compute(pool: &SqlitePool, board_id: Uuid) -> Result<Self, BoardError> {
        Self::compute_as_of(pool, board_id, Utc::now().date_naive()).await
    }

    /// Compute metrics treating `today` as the current date for overdue checks.
    ///
    /// Runs in a read transaction so every count comes from the same committed state.
    pub async fn compute_as_of(
        pool: &SqlitePool,
        board_id: Uuid,
        today: NaiveDate,
    ) -> Result<Self, BoardError> {
        let mut tx = pool.begin().await?;
        Board::require(&mut *tx, board_id).await?;

        let totals = sqlx::query_as::<_, Totals>(
            r#"SELECT
  COUNT(c.id)                                              AS total,
  COALESCE(SUM(c.priority = 1), 0)                         AS high,
  COALESCE(SUM(c.priority = 2), 0)                         AS medium,
  COALESCE(SUM(c.priority = 3), 0)                         AS low,
  COALESCE(SUM(c.due_date IS NOT NULL AND c.due_date < $2), 0) AS overdue
FROM card c
JOIN "column" col ON col.id = c.column_id
WHERE col.board_id = $1
  AND c.archived = 0"#,
        )
        .bind(board_id)
        .bind(today)
        .fetch_one(&mut *tx)
        .await?;

        let by_column = sqlx::query_as::<_, ColumnCount>(
            r#"SELECT
  col.id                         AS column_id,
  col.name                       AS name,
  COUNT(c.id)                    AS count,
  col.wip_limit                  AS wip_limit,
  (col.wip_limit IS NOT NULL AND COUNT(c.id) > col.wip_limit) AS over_limit
FROM "column" col
LEFT JOIN card c ON c.column_id = col.id AND c.archived = 0
WHERE col.board_id = $1
GROUP BY col.id
ORDER BY col.position ASC"#,
        )
        .bind(board_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Metrics {
            board_id,
            total: totals.total,
            by_priority: PriorityCounts {
                high: totals.high,
                medium: totals.medium,
                low: totals.low,
            },
            overdue: totals.overdue,
            by_column,
        })
    }
}
