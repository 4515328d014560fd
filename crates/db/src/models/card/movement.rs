//! Card creation and moves between positions and columns.

use sqlx::{Sqlite, SqliteConnection, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::{Card, CreateCard};
use crate::{
    BoardError, DBService, EntityKind,
    locks::ContainerGuard,
    models::{board::Board, column::Column},
    ordering::{self, Container},
    validation::validate_title,
};

/// A card re-read inside a write transaction while the lock of its column (and of any
/// other container the operation touches) is held.
pub(crate) struct LockedCard {
    pub card: Card,
    pub tx: Transaction<'static, Sqlite>,
    pub _guard: ContainerGuard,
}

/// Lock the column a card sits in, plus the container `also` picks, and re-read the card.
///
/// The card may change column between the first read and the lock being granted; the
/// lookup then starts over with its new column.
pub(crate) async fn lock_card<F>(db: &DBService, id: Uuid, also: F) -> Result<LockedCard, BoardError>
where
    F: Fn(&Card) -> Option<Container>,
{
    loop {
        let seen = Card::require(&db.pool, id).await?;
        let mut containers = vec![Container::Column(seen.column_id)];
        containers.extend(also(&seen));

        let guard = db.locks.lock_all(&containers).await;
        let mut tx = db.begin_write().await?;
        let card = Card::require(&mut *tx, id).await?;
        if card.column_id == seen.column_id {
            return Ok(LockedCard {
                card,
                tx,
                _guard: guard,
            });
        }
        debug!(card_id = %id, "Card changed column while waiting for its lock, retrying");
    }
}

/// Fail with [`BoardError::CrossBoard`] unless both columns belong to the same board.
pub(crate) async fn ensure_same_board(
    conn: &mut SqliteConnection,
    card_id: Uuid,
    from_column: Uuid,
    to_column: Uuid,
) -> Result<(), BoardError> {
    let from = Column::require(&mut *conn, from_column).await?;
    let to = Column::require(&mut *conn, to_column).await?;
    if from.board_id != to.board_id {
        return Err(BoardError::CrossBoard {
            kind: EntityKind::Card,
            id: card_id,
            expected: to.board_id,
            found: from.board_id,
        });
    }
    Ok(())
}

/// Insert a card row at `position`. The caller holds the column's lock and validated
/// the title.
pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    data: &CreateCard,
    title: &str,
    position: i64,
) -> Result<Card, sqlx::Error> {
    sqlx::query_as::<_, Card>(concat!(
        r#"INSERT INTO card (id, column_id, title, description, start_date, due_date, priority, position,
                             created_at, updated_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, datetime('now', 'subsec'), datetime('now', 'subsec'))
           RETURNING "#,
        card_columns!()
    ))
    .bind(Uuid::new_v4())
    .bind(data.column_id)
    .bind(title)
    .bind(data.description.as_deref().unwrap_or_default())
    .bind(data.start_date)
    .bind(data.due_date)
    .bind(data.priority.unwrap_or_default())
    .bind(position)
    .fetch_one(conn)
    .await
}

/// A slot at the end of a column, reserved under the column's lock.
pub(crate) struct PendingCard {
    pub tx: Transaction<'static, Sqlite>,
    pub position: i64,
    pub _guard: ContainerGuard,
}

/// Lock a column for a new card, check that its board accepts cards, and pick the
/// position after its last active card.
pub(crate) async fn reserve_card_slot(
    db: &DBService,
    column_id: Uuid,
) -> Result<PendingCard, BoardError> {
    let container = Container::Column(column_id);
    let guard = db.locks.lock(container).await;
    let mut tx = db.begin_write().await?;

    let column = Column::require(&mut *tx, column_id).await?;
    let board = Board::require(&mut *tx, column.board_id).await?;
    if !board.is_active {
        return Err(BoardError::InactiveBoard(board.id));
    }

    let slot = ordering::claim_slot(&mut tx, container, None, None).await?;
    Ok(PendingCard {
        tx,
        position: slot.position,
        _guard: guard,
    })
}

impl Card {
    /// Create a card at the end of a column.
    pub async fn create(db: &DBService, data: &CreateCard) -> Result<Self, BoardError> {
        let title = validate_title(&data.title)?;
        let PendingCard {
            mut tx,
            position,
            _guard,
        } = reserve_card_slot(db, data.column_id).await?;

        let card = insert(&mut tx, data, &title, position).await?;
        ordering::verify_distinct(&mut tx, Container::Column(data.column_id)).await?;
        tx.commit().await?;

        debug!(card_id = %card.id, column_id = %card.column_id, position = card.position, "Created card");
        Ok(card)
    }

    /// Move a card to `index` among the active cards of `column_id`, which may be its
    /// current column or another column of the same board.
    ///
    /// Leaving the source column and entering the destination happen in one transaction.
    /// Moving a card to the index it already holds writes nothing.
    pub async fn move_to(
        db: &DBService,
        id: Uuid,
        column_id: Uuid,
        index: usize,
    ) -> Result<Self, BoardError> {
        Self::relocate(db, id, column_id, Some(index)).await
    }

    /// [`Card::move_to`] with the end of the destination as default.
    pub(crate) async fn relocate(
        db: &DBService,
        id: Uuid,
        column_id: Uuid,
        index: Option<usize>,
    ) -> Result<Self, BoardError> {
        Column::require(&db.pool, column_id).await?;
        let LockedCard {
            card,
            mut tx,
            _guard,
        } = lock_card(db, id, |_| Some(Container::Column(column_id))).await?;

        if card.archived {
            return Err(BoardError::CardArchived(id));
        }
        ensure_same_board(&mut tx, id, card.column_id, column_id).await?;

        let container = Container::Column(column_id);
        let member = (card.column_id == column_id).then_some(id);
        let slot = ordering::claim_slot(&mut tx, container, member, index).await?;
        if slot.unchanged {
            return Ok(card);
        }

        let moved = sqlx::query_as::<_, Card>(concat!(
            r#"UPDATE card
               SET column_id = $2, position = $3, updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING "#,
            card_columns!()
        ))
        .bind(id)
        .bind(column_id)
        .bind(slot.position)
        .fetch_one(&mut *tx)
        .await?;

        ordering::verify_distinct(&mut tx, container).await?;
        tx.commit().await?;

        debug!(
            card_id = %id,
            from = %card.column_id,
            to = %column_id,
            position = moved.position,
            "Moved card"
        );
        Ok(moved)
    }

    /// Renumber the active cards of a column one step apart. Returns the number of
    /// cards whose position changed.
    pub async fn compact_column(db: &DBService, column_id: Uuid) -> Result<usize, BoardError> {
        Column::require(&db.pool, column_id).await?;
        ordering::compact_container(db, Container::Column(column_id)).await
    }
}
