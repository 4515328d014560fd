use tracing::info;
use uuid::Uuid;

use super::{
    Card,
    movement::{LockedCard, ensure_same_board, lock_card},
};
use crate::{
    BoardError, DBService,
    ordering::{self, Container},
};

impl Card {
    /// Archive a card. It keeps its column, children and stored position but stops
    /// occupying a slot. Archiving an archived card changes nothing.
    pub async fn archive(db: &DBService, id: Uuid) -> Result<Self, BoardError> {
        let LockedCard {
            card,
            mut tx,
            _guard,
        } = lock_card(db, id, |_| None).await?;
        if card.archived {
            return Ok(card);
        }

        let archived = sqlx::query_as::<_, Card>(concat!(
            r#"UPDATE card
               SET archived = 1,
                   archived_at = datetime('now', 'subsec'),
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING "#,
            card_columns!()
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(card_id = %id, column_id = %archived.column_id, "Archived card");
        Ok(archived)
    }

    /// Bring an archived card back at `index` of `column_id`, using the same placement
    /// as a move. The column defaults to the one it was archived from and the index to
    /// the end of the column.
    ///
    /// Restoring a card that is not archived moves it when a destination is given and
    /// otherwise changes nothing.
    pub async fn restore(
        db: &DBService,
        id: Uuid,
        column_id: Option<Uuid>,
        index: Option<usize>,
    ) -> Result<Self, BoardError> {
        let LockedCard {
            card,
            mut tx,
            _guard,
        } = lock_card(db, id, |_| column_id.map(Container::Column)).await?;

        if !card.archived {
            if column_id.is_none() && index.is_none() {
                return Ok(card);
            }
            drop(tx);
            drop(_guard);
            let destination = column_id.unwrap_or(card.column_id);
            return Self::relocate(db, id, destination, index).await;
        }

        let destination = column_id.unwrap_or(card.column_id);
        ensure_same_board(&mut tx, id, card.column_id, destination).await?;

        let container = Container::Column(destination);
        let slot = ordering::claim_slot(&mut tx, container, None, index).await?;
        let restored = sqlx::query_as::<_, Card>(concat!(
            r#"UPDATE card
               SET archived = 0,
                   archived_at = NULL,
                   column_id = $2,
                   position = $3,
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING "#,
            card_columns!()
        ))
        .bind(id)
        .bind(destination)
        .bind(slot.position)
        .fetch_one(&mut *tx)
        .await?;

        ordering::verify_distinct(&mut tx, container).await?;
        tx.commit().await?;

        info!(card_id = %id, column_id = %destination, position = restored.position, "Restored card");
        Ok(restored)
    }
}
