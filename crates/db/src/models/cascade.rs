//! Deletes that remove an entity with everything it owns.
//!
//! Descendants are deleted children first inside one write transaction, so a failure
//! anywhere leaves the whole subtree in place. Deleting a column or an active card also
//! compacts the siblings it leaves behind.

use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::info;
use ts_rs::TS;
use uuid::Uuid;

use super::{
    attachment::Attachment,
    board::Board,
    card::{LockedCard, lock_card},
    checklist::{Checklist, ChecklistItem},
    column::Column,
    label::Label,
    template::CardTemplate,
};
use crate::{
    BoardError, DBService, EntityKind,
    ordering::{self, Container},
};

/// Rows removed by one delete, per entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, TS)]
pub struct CascadeSummary {
    pub boards: u64,
    pub columns: u64,
    pub cards: u64,
    pub labels: u64,
    pub label_assignments: u64,
    pub checklists: u64,
    pub checklist_items: u64,
    pub attachments: u64,
    pub card_templates: u64,
}

impl CascadeSummary {
    pub fn total(&self) -> u64 {
        self.boards
            + self.columns
            + self.cards
            + self.labels
            + self.label_assignments
            + self.checklists
            + self.checklist_items
            + self.attachments
            + self.card_templates
    }
}

/// Root of a subtree whose cards are being deleted.
#[derive(Debug, Clone, Copy)]
enum Scope {
    Board(Uuid),
    Column(Uuid),
    Card(Uuid),
}

impl Scope {
    fn id(&self) -> Uuid {
        match self {
            Self::Board(id) | Self::Column(id) | Self::Card(id) => *id,
        }
    }

    /// Subquery yielding the ids of every card in scope, archived ones included.
    fn card_ids(&self) -> &'static str {
        match self {
            Self::Board(_) => {
                r#"SELECT id FROM card WHERE column_id IN (SELECT id FROM "column" WHERE board_id = $1)"#
            }
            Self::Column(_) => "SELECT id FROM card WHERE column_id = $1",
            Self::Card(_) => "SELECT $1",
        }
    }
}

async fn execute(conn: &mut SqliteConnection, sql: &str, id: Uuid) -> Result<u64, sqlx::Error> {
    Ok(sqlx::query(sql)
        .bind(id)
        .execute(conn)
        .await?
        .rows_affected())
}

/// Delete the cards in scope and everything hanging off them.
async fn delete_cards(
    conn: &mut SqliteConnection,
    scope: Scope,
    summary: &mut CascadeSummary,
) -> Result<(), sqlx::Error> {
    let cards = scope.card_ids();
    let id = scope.id();

    summary.checklist_items += execute(
        conn,
        &format!(
            "DELETE FROM checklist_item WHERE checklist_id IN \
             (SELECT id FROM checklist WHERE card_id IN ({cards}))"
        ),
        id,
    )
    .await?;
    summary.checklists += execute(
        conn,
        &format!("DELETE FROM checklist WHERE card_id IN ({cards})"),
        id,
    )
    .await?;
    summary.attachments += execute(
        conn,
        &format!("DELETE FROM attachment WHERE card_id IN ({cards})"),
        id,
    )
    .await?;
    summary.label_assignments += execute(
        conn,
        &format!("DELETE FROM card_label WHERE card_id IN ({cards})"),
        id,
    )
    .await?;
    summary.cards += execute(conn, &format!("DELETE FROM card WHERE id IN ({cards})"), id).await?;
    Ok(())
}

pub async fn delete_board(db: &DBService, id: Uuid) -> Result<CascadeSummary, BoardError> {
    let container = Container::Board(id);
    let guard = db.locks.lock(container).await;
    let mut tx = db.begin_write().await?;
    Board::require(&mut *tx, id).await?;

    let mut summary = CascadeSummary::default();
    delete_cards(&mut tx, Scope::Board(id), &mut summary).await?;
    summary.label_assignments += execute(
        &mut tx,
        "DELETE FROM card_label WHERE label_id IN (SELECT id FROM label WHERE board_id = $1)",
        id,
    )
    .await?;
    summary.labels += execute(&mut tx, "DELETE FROM label WHERE board_id = $1", id).await?;
    summary.columns += execute(&mut tx, r#"DELETE FROM "column" WHERE board_id = $1"#, id).await?;
    summary.boards += execute(&mut tx, "DELETE FROM board WHERE id = $1", id).await?;
    tx.commit().await?;

    drop(guard);
    db.locks.forget(container);
    info!(board_id = %id, ?summary, "Deleted board");
    Ok(summary)
}

pub async fn delete_column(db: &DBService, id: Uuid) -> Result<CascadeSummary, BoardError> {
    let column = Column::require(&db.pool, id).await?;
    let board = Container::Board(column.board_id);
    let guard = db
        .locks
        .lock_all(&[board, Container::Column(id)])
        .await;
    let mut tx = db.begin_write().await?;
    Column::require(&mut *tx, id).await?;

    let mut summary = CascadeSummary::default();
    delete_cards(&mut tx, Scope::Column(id), &mut summary).await?;
    summary.columns += execute(&mut tx, r#"DELETE FROM "column" WHERE id = $1"#, id).await?;
    ordering::compact(&mut tx, board).await?;
    ordering::verify_distinct(&mut tx, board).await?;
    tx.commit().await?;

    drop(guard);
    db.locks.forget(Container::Column(id));
    info!(column_id = %id, board_id = %column.board_id, ?summary, "Deleted column");
    Ok(summary)
}

pub async fn delete_card(db: &DBService, id: Uuid) -> Result<CascadeSummary, BoardError> {
    let LockedCard { card, mut tx, _guard } =
        lock_card(db, id, |card| Some(Container::Card(card.id))).await?;

    let mut summary = CascadeSummary::default();
    delete_cards(&mut tx, Scope::Card(id), &mut summary).await?;

    let column = Container::Column(card.column_id);
    if !card.archived {
        ordering::compact(&mut tx, column).await?;
    }
    ordering::verify_distinct(&mut tx, column).await?;
    tx.commit().await?;

    drop(_guard);
    db.locks.forget(Container::Card(id));
    info!(card_id = %id, column_id = %card.column_id, ?summary, "Deleted card");
    Ok(summary)
}

impl super::card::Card {
    /// Delete a card with its checklists, attachments and label assignments, then
    /// compact the column it leaves.
    pub async fn delete(db: &DBService, id: Uuid) -> Result<CascadeSummary, BoardError> {
        delete_card(db, id).await
    }
}

/// Delete any entity by kind, with its owned descendants.
pub async fn delete_entity(
    db: &DBService,
    kind: EntityKind,
    id: Uuid,
) -> Result<CascadeSummary, BoardError> {
    match kind {
        EntityKind::Board => delete_board(db, id).await,
        EntityKind::Column => delete_column(db, id).await,
        EntityKind::Card => delete_card(db, id).await,
        EntityKind::Label => Label::delete(&db.pool, id).await,
        EntityKind::Checklist => Checklist::delete(db, id).await,
        EntityKind::ChecklistItem => ChecklistItem::delete(db, id).await,
        EntityKind::Attachment => Attachment::delete(&db.pool, id).await,
        EntityKind::CardTemplate => CardTemplate::delete(&db.pool, id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::card::{Card, CreateCard},
        test_utils::create_test_db,
    };

    #[tokio::test]
    async fn test_delete_card_compacts_column() {
        let (db, _dir) = create_test_db().await;
        let board = Board::ensure_default(&db).await.unwrap();
        let backlog = Column::find_by_board(&db.pool, board.id).await.unwrap()[0].id;
        let mut ids = Vec::new();
        for title in ["a", "b", "c"] {
            ids.push(Card::create(&db, &CreateCard::titled(backlog, title)).await.unwrap().id);
        }

        let summary = Card::delete(&db, ids[0]).await.unwrap();
        assert_eq!(summary.cards, 1);
        assert_eq!(summary.total(), 1);

        let positions: Vec<i64> = Card::find_by_column(&db.pool, backlog)
            .await
            .unwrap()
            .iter()
            .map(|c| c.position)
            .collect();
        assert_eq!(positions, vec![1000, 2000]);
    }

    #[tokio::test]
    async fn test_delete_column_compacts_board() {
        let (db, _dir) = create_test_db().await;
        let board = Board::ensure_default(&db).await.unwrap();
        let columns = Column::find_by_board(&db.pool, board.id).await.unwrap();
        Card::create(&db, &CreateCard::titled(columns[0].id, "gone"))
            .await
            .unwrap();

        let summary = delete_entity(&db, EntityKind::Column, columns[0].id).await.unwrap();
        assert_eq!(summary.columns, 1);
        assert_eq!(summary.cards, 1);

        let remaining = Column::find_by_board(&db.pool, board.id).await.unwrap();
        let positions: Vec<i64> = remaining.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![1000, 2000]);
        assert_eq!(remaining[0].name, "In Progress");
    }

    #[tokio::test]
    async fn test_delete_missing_entity_is_not_found() {
        let (db, _dir) = create_test_db().await;
        for kind in [EntityKind::Board, EntityKind::Column, EntityKind::Card] {
            let err = delete_entity(&db, kind, Uuid::new_v4()).await.unwrap_err();
            assert!(matches!(err, BoardError::NotFound { kind: k, .. } if k == kind));
        }
    }
}
