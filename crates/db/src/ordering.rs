//! Sparse integer ordering of siblings inside a container.
//!
//! Positions are signed integers that only need to be distinct and ascending. New
//! members go [`POSITION_STEP`] past the last one; a member placed between two others
//! takes the integer midpoint of their positions. Only when two neighbours are adjacent
//! integers is the container renumbered, after which the midpoint always exists.
//!
//! Every function that touches the database here expects to run inside a write
//! transaction opened with [`crate::DBService::begin_write`], while the caller holds the
//! container's lock from [`crate::ContainerLocks`].

use std::fmt;

use serde::Serialize;
use sqlx::{FromRow, SqliteConnection};
use tracing::{debug, error, warn};
use ts_rs::TS;
use uuid::Uuid;

use crate::{BoardError, DBService, EntityKind};

/// Gap left between consecutive siblings on append and after a renumber pass.
pub const POSITION_STEP: i64 = 1000;

/// A sibling scope: the members whose positions are compared with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, TS)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Container {
    /// The columns of a board.
    Board(Uuid),
    /// The active (non-archived) cards of a column.
    Column(Uuid),
    /// The checklists of a card.
    Card(Uuid),
    /// The items of a checklist.
    Checklist(Uuid),
}

impl Container {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Board(id) | Self::Column(id) | Self::Card(id) | Self::Checklist(id) => *id,
        }
    }

    /// Kind of entity ordered inside this container.
    pub fn member_kind(&self) -> EntityKind {
        match self {
            Self::Board(_) => EntityKind::Column,
            Self::Column(_) => EntityKind::Card,
            Self::Card(_) => EntityKind::Checklist,
            Self::Checklist(_) => EntityKind::ChecklistItem,
        }
    }

    /// Table holding the members (quoted where the name is an SQL keyword).
    fn table(&self) -> &'static str {
        match self {
            Self::Board(_) => "\"column\"",
            Self::Column(_) => "card",
            Self::Card(_) => "checklist",
            Self::Checklist(_) => "checklist_item",
        }
    }

    fn parent_column(&self) -> &'static str {
        match self {
            Self::Board(_) => "board_id",
            Self::Column(_) => "column_id",
            Self::Card(_) => "card_id",
            Self::Checklist(_) => "checklist_id",
        }
    }

    /// Archived cards keep their position but no longer occupy a slot.
    fn active_filter(&self) -> &'static str {
        match self {
            Self::Column(_) => " AND archived = 0",
            _ => "",
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Board(id) => write!(f, "columns of board {id}"),
            Self::Column(id) => write!(f, "cards of column {id}"),
            Self::Card(id) => write!(f, "checklists of card {id}"),
            Self::Checklist(id) => write!(f, "items of checklist {id}"),
        }
    }
}

// ============================================================================
// Position arithmetic
// ============================================================================

/// Position strictly between `before` and `after`, or `None` when the two are adjacent
/// (or the step would overflow).
///
/// A missing neighbour stands for "far below the minimum" / "far above the maximum":
/// appending yields `before + STEP`, prepending yields `after - STEP`, and an empty
/// container starts at `STEP`.
pub fn slot_between(before: Option<i64>, after: Option<i64>) -> Option<i64> {
    match (before, after) {
        (None, None) => Some(POSITION_STEP),
        (Some(before), None) => before.checked_add(POSITION_STEP),
        (None, Some(after)) => after.checked_sub(POSITION_STEP),
        (Some(before), Some(after)) => {
            let (lo, hi) = (i128::from(before), i128::from(after));
            if hi - lo < 2 {
                return None;
            }
            i64::try_from(lo + (hi - lo) / 2).ok()
        }
    }
}

/// `n` ascending positions one step apart, starting at `STEP`.
pub fn evenly_spaced(n: usize) -> Vec<i64> {
    (1..=n as i64).map(|i| i * POSITION_STEP).collect()
}

/// Where a member lands, and the fresh positions of its siblings if they had to be
/// renumbered first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub position: i64,
    pub renumbered: Option<Vec<i64>>,
}

/// Plan an insert at `index` among `siblings`, which must be sorted ascending and must
/// not contain the member being placed.
pub fn plan_insert(
    container: Container,
    siblings: &[i64],
    index: usize,
) -> Result<Placement, BoardError> {
    if index > siblings.len() {
        return Err(BoardError::InvalidIndex {
            index,
            len: siblings.len(),
        });
    }

    let neighbours = |positions: &[i64]| {
        let before = index.checked_sub(1).map(|i| positions[i]);
        let after = positions.get(index).copied();
        slot_between(before, after)
    };

    if let Some(position) = neighbours(siblings) {
        return Ok(Placement {
            position,
            renumbered: None,
        });
    }

    let renumbered = evenly_spaced(siblings.len());
    let position =
        neighbours(&renumbered).ok_or(BoardError::PositionSpaceExhausted(container))?;
    Ok(Placement {
        position,
        renumbered: Some(renumbered),
    })
}

// ============================================================================
// Container reads and writes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct Slot {
    pub id: Uuid,
    pub position: i64,
}

/// Active members of a container in order. Ties are broken by insertion order so the
/// result is deterministic.
pub async fn load_slots(
    conn: &mut SqliteConnection,
    container: Container,
) -> Result<Vec<Slot>, sqlx::Error> {
    let sql = format!(
        "SELECT id, position FROM {} WHERE {} = $1{} ORDER BY position, rowid",
        container.table(),
        container.parent_column(),
        container.active_filter(),
    );
    sqlx::query_as::<_, Slot>(&sql)
        .bind(container.id())
        .fetch_all(conn)
        .await
}

/// Outcome of [`claim_slot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotClaim {
    pub position: i64,
    /// The member already sat at the requested index; nothing was written.
    pub unchanged: bool,
}

/// Reserve a position in `container` for `member` at `index` (end when `None`).
///
/// `member` is the id of the entity being placed when it may already belong to the
/// container (a reorder); it is excluded from the sibling list so that `index` means its
/// final index. If it already sits at that index nothing changes. Siblings are renumbered
/// here when no integer is free at the requested index, or when two of them share a
/// position; the member's own position is left for the caller to write.
pub async fn claim_slot(
    conn: &mut SqliteConnection,
    container: Container,
    member: Option<Uuid>,
    index: Option<usize>,
) -> Result<SlotClaim, BoardError> {
    let slots = load_slots(conn, container).await?;
    let current = member.and_then(|id| slots.iter().position(|slot| slot.id == id));
    let others: Vec<Slot> = slots
        .iter()
        .filter(|slot| Some(slot.id) != member)
        .copied()
        .collect();
    let index = index.unwrap_or(others.len());

    if let Some(current) = current {
        if current == index {
            return Ok(SlotClaim {
                position: slots[current].position,
                unchanged: true,
            });
        }
    }

    let mut positions: Vec<i64> = others.iter().map(|slot| slot.position).collect();
    if positions.windows(2).any(|pair| pair[0] == pair[1]) {
        warn!(%container, siblings = others.len(), "Tied sibling positions, renumbering container");
        positions = evenly_spaced(others.len());
        for (slot, position) in others.iter().zip(&positions) {
            write_position(conn, container, slot.id, *position).await?;
        }
    }
    let placement = plan_insert(container, &positions, index)?;

    if let Some(renumbered) = &placement.renumbered {
        warn!(
            %container,
            siblings = others.len(),
            index,
            "No free position between neighbours, renumbering container"
        );
        for (slot, position) in others.iter().zip(renumbered) {
            write_position(conn, container, slot.id, *position).await?;
        }
    }

    debug!(%container, index, position = placement.position, "Claimed slot");
    Ok(SlotClaim {
        position: placement.position,
        unchanged: false,
    })
}

/// Set the position of one member of `container`.
pub async fn write_position(
    conn: &mut SqliteConnection,
    container: Container,
    id: Uuid,
    position: i64,
) -> Result<(), sqlx::Error> {
    let sql = format!(
        "UPDATE {} SET position = $2 WHERE id = $1",
        container.table()
    );
    sqlx::query(&sql)
        .bind(id)
        .bind(position)
        .execute(conn)
        .await?;
    Ok(())
}

/// Fail with [`BoardError::DuplicatePosition`] if two active members share a position.
///
/// Called before every ordering commit; a hit means the transaction is rolled back.
pub async fn verify_distinct(
    conn: &mut SqliteConnection,
    container: Container,
) -> Result<(), BoardError> {
    let sql = format!(
        "SELECT position FROM {} WHERE {} = $1{} GROUP BY position HAVING COUNT(*) > 1 LIMIT 1",
        container.table(),
        container.parent_column(),
        container.active_filter(),
    );
    let duplicate: Option<i64> = sqlx::query_scalar(&sql)
        .bind(container.id())
        .fetch_optional(conn)
        .await?;

    match duplicate {
        Some(position) => {
            error!(%container, position, "Duplicate sibling position, rolling back");
            Err(BoardError::DuplicatePosition {
                container,
                position,
            })
        }
        None => Ok(()),
    }
}

/// Reassign evenly spaced positions to the active members of a container, keeping their
/// order. Returns how many rows were rewritten.
pub async fn compact(
    conn: &mut SqliteConnection,
    container: Container,
) -> Result<usize, sqlx::Error> {
    let slots = load_slots(conn, container).await?;
    let mut rewritten = 0;
    for (slot, position) in slots.iter().zip(evenly_spaced(slots.len())) {
        if slot.position != position {
            write_position(conn, container, slot.id, position).await?;
            rewritten += 1;
        }
    }
    if rewritten > 0 {
        debug!(%container, members = slots.len(), rewritten, "Compacted container");
    }
    Ok(rewritten)
}

/// Compact a container in its own transaction.
pub async fn compact_container(db: &DBService, container: Container) -> Result<usize, BoardError> {
    let _guard = db.locks.lock(container).await;
    let mut tx = db.begin_write().await?;
    let rewritten = compact(&mut tx, container).await?;
    verify_distinct(&mut tx, container).await?;
    tx.commit().await?;
    Ok(rewritten)
}

/// Move `member` to `index` among the other members of the container it already
/// belongs to. Returns the member's position afterwards.
pub async fn reorder_within(
    db: &DBService,
    container: Container,
    member: Uuid,
    index: usize,
) -> Result<i64, BoardError> {
    let _guard = db.locks.lock(container).await;
    let mut tx = db.begin_write().await?;

    let slots = load_slots(&mut tx, container).await?;
    if !slots.iter().any(|slot| slot.id == member) {
        return Err(BoardError::not_found(container.member_kind(), member));
    }

    let claim = claim_slot(&mut tx, container, Some(member), Some(index)).await?;
    if claim.unchanged {
        return Ok(claim.position);
    }

    write_position(&mut tx, container, member, claim.position).await?;
    verify_distinct(&mut tx, container).await?;
    tx.commit().await?;
    Ok(claim.position)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column() -> Container {
        Container::Column(Uuid::nil())
    }

    #[test]
    fn test_slot_between_empty_container_starts_at_step() {
        assert_eq!(slot_between(None, None), Some(POSITION_STEP));
    }

    #[test]
    fn test_slot_between_ends() {
        assert_eq!(slot_between(Some(3000), None), Some(4000));
        assert_eq!(slot_between(None, Some(1000)), Some(0));
        assert_eq!(slot_between(None, Some(-500)), Some(-1500));
        assert_eq!(slot_between(Some(i64::MAX - 10), None), None);
        assert_eq!(slot_between(None, Some(i64::MIN + 10)), None);
    }

    #[test]
    fn test_slot_between_midpoint() {
        assert_eq!(slot_between(Some(1000), Some(2000)), Some(1500));
        assert_eq!(slot_between(Some(1000), Some(1002)), Some(1001));
        assert_eq!(slot_between(Some(-3), Some(4)), Some(0));
        assert_eq!(slot_between(Some(1000), Some(1001)), None);
        assert_eq!(slot_between(Some(i64::MIN), Some(i64::MAX)), Some(-1));
    }

    #[test]
    fn test_evenly_spaced() {
        assert_eq!(evenly_spaced(0), Vec::<i64>::new());
        assert_eq!(evenly_spaced(3), vec![1000, 2000, 3000]);
    }

    #[test]
    fn test_plan_insert_append_and_prepend() {
        let siblings = [1000, 2000];
        assert_eq!(plan_insert(column(), &siblings, 2).unwrap().position, 3000);
        assert_eq!(plan_insert(column(), &siblings, 0).unwrap().position, 0);
        assert_eq!(plan_insert(column(), &siblings, 1).unwrap().position, 1500);
        assert_eq!(plan_insert(column(), &[], 0).unwrap().position, POSITION_STEP);
    }

    #[test]
    fn test_plan_insert_rejects_out_of_range_index() {
        let err = plan_insert(column(), &[1000, 2000], 3).unwrap_err();
        assert!(matches!(err, BoardError::InvalidIndex { index: 3, len: 2 }));
    }

    #[test]
    fn test_plan_insert_renumbers_adjacent_neighbours() {
        let placement = plan_insert(column(), &[1000, 1001], 1).unwrap();
        assert_eq!(placement.renumbered, Some(vec![1000, 2000]));
        assert_eq!(placement.position, 1500);
    }

    #[test]
    fn test_renumber_preserves_relative_order() {
        let siblings = [-7, 1, 2, 3, 900];
        let placement = plan_insert(column(), &siblings, 2).unwrap();
        let renumbered = placement.renumbered.unwrap();
        assert!(renumbered.windows(2).all(|w| w[0] < w[1]));
        assert!(renumbered[1] < placement.position && placement.position < renumbered[2]);
    }

    #[test]
    fn test_plan_insert_after_overflowing_tail_renumbers() {
        let placement = plan_insert(column(), &[5, i64::MAX], 2).unwrap();
        assert_eq!(placement.renumbered, Some(vec![1000, 2000]));
        assert_eq!(placement.position, 3000);
    }

    #[test]
    fn test_container_display_and_kind() {
        let id = Uuid::nil();
        assert_eq!(
            Container::Board(id).to_string(),
            format!("columns of board {id}")
        );
        assert_eq!(Container::Checklist(id).member_kind(), EntityKind::ChecklistItem);
    }
}
