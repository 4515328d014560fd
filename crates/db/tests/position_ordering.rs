//! Integration tests for sparse-integer ordering.
//!
//! These tests drive cards, columns and checklist items through the public model API and
//! check the ordering guarantees readers depend on:
//! - positions inside a container stay pairwise distinct after any sequence of operations
//! - moving a member to the index it already holds writes nothing
//! - a move between columns is all-or-nothing
//! - a renumber pass preserves relative order

use db::{
    BoardError, DBService, DbConfig,
    models::{
        board::{Board, CreateBoard},
        card::{Card, CreateCard},
        checklist::{Checklist, ChecklistItem},
        column::{Column, CreateColumn},
    },
};
use tempfile::TempDir;
use uuid::Uuid;

async fn setup_db() -> (DBService, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db = DBService::open(&DbConfig::new(temp_dir.path().join("kanban.db")))
        .await
        .expect("Failed to open store");
    (db, temp_dir)
}

async fn create_board(db: &DBService, name: &str, columns: &[&str]) -> (Board, Vec<Column>) {
    let board = Board::create(
        &db.pool,
        &CreateBoard {
            name: name.to_string(),
            description: None,
        },
    )
    .await
    .unwrap();

    let mut created = Vec::new();
    for name in columns {
        created.push(
            Column::create(
                db,
                &CreateColumn {
                    board_id: board.id,
                    name: name.to_string(),
                    wip_limit: None,
                },
            )
            .await
            .unwrap(),
        );
    }
    (board, created)
}

async fn positions(db: &DBService, column_id: Uuid) -> Vec<(String, i64)> {
    Card::find_by_column(&db.pool, column_id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| (c.title, c.position))
        .collect()
}

fn assert_strictly_ascending(values: &[i64]) {
    assert!(
        values.windows(2).all(|w| w[0] < w[1]),
        "positions not strictly ascending: {values:?}"
    );
}

#[tokio::test]
async fn test_personal_board_scenario() {
    let (db, _temp_dir) = setup_db().await;
    let (_board, columns) = create_board(&db, "Personal", &["To Do", "Done"]).await;
    let (todo, done) = (&columns[0], &columns[1]);
    assert_eq!(todo.position, 1000);
    assert_eq!(done.position, 2000);

    let card = Card::create(&db, &CreateCard::titled(todo.id, "Write plan"))
        .await
        .unwrap();
    assert_eq!(card.position, 1000);

    let moved = Card::move_to(&db, card.id, done.id, 0).await.unwrap();
    assert_eq!(moved.column_id, done.id);
    assert_eq!(moved.position, 1000, "empty destination starts at one step");
    assert!(positions(&db, todo.id).await.is_empty());
    assert_eq!(positions(&db, done.id).await, vec![("Write plan".to_string(), 1000)]);
}

#[tokio::test]
async fn test_adjacent_positions_force_renumber() {
    let (db, _temp_dir) = setup_db().await;
    let (_board, columns) = create_board(&db, "Tight", &["Only"]).await;
    let column = columns[0].id;

    let a = Card::create(&db, &CreateCard::titled(column, "a")).await.unwrap();
    let b = Card::create(&db, &CreateCard::titled(column, "b")).await.unwrap();
    let c = Card::create(&db, &CreateCard::titled(column, "c")).await.unwrap();
    sqlx::query("UPDATE card SET position = $2 WHERE id = $1")
        .bind(b.id)
        .bind(1001_i64)
        .execute(&db.pool)
        .await
        .unwrap();
    sqlx::query("UPDATE card SET position = $2 WHERE id = $1")
        .bind(c.id)
        .bind(5000_i64)
        .execute(&db.pool)
        .await
        .unwrap();
    assert_eq!(a.position, 1000);

    // c lands between a (1000) and b (1001), which have no integer between them
    let moved = Card::move_to(&db, c.id, column, 1).await.unwrap();

    let after = positions(&db, column).await;
    let titles: Vec<&str> = after.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(titles, vec!["a", "c", "b"]);
    let values: Vec<i64> = after.iter().map(|(_, p)| *p).collect();
    assert_strictly_ascending(&values);
    assert!(values[0] > 0 && values[2] - values[0] >= 2);
    assert_eq!(moved.position, values[1]);
}

#[tokio::test]
async fn test_move_to_current_index_changes_nothing() {
    let (db, _temp_dir) = setup_db().await;
    let (_board, columns) = create_board(&db, "Idle", &["Only"]).await;
    let column = columns[0].id;
    let mut ids = Vec::new();
    for title in ["a", "b", "c"] {
        ids.push(Card::create(&db, &CreateCard::titled(column, title)).await.unwrap());
    }

    let before = positions(&db, column).await;
    let same = Card::move_to(&db, ids[1].id, column, 1).await.unwrap();
    assert_eq!(same.updated_at, ids[1].updated_at);
    assert_eq!(positions(&db, column).await, before);
}

#[tokio::test]
async fn test_destination_index_out_of_range() {
    let (db, _temp_dir) = setup_db().await;
    let (_board, columns) = create_board(&db, "Range", &["From", "To"]).await;
    let card = Card::create(&db, &CreateCard::titled(columns[0].id, "x"))
        .await
        .unwrap();
    Card::create(&db, &CreateCard::titled(columns[1].id, "y"))
        .await
        .unwrap();

    // The destination holds one card, so valid indexes are 0 and 1
    let err = Card::move_to(&db, card.id, columns[1].id, 2).await.unwrap_err();
    assert!(matches!(err, BoardError::InvalidIndex { index: 2, len: 1 }));

    // Within its own column the card does not count itself
    let err = Card::move_to(&db, card.id, columns[0].id, 1).await.unwrap_err();
    assert!(matches!(err, BoardError::InvalidIndex { index: 1, len: 0 }));

    let unchanged = Card::find_by_id(&db.pool, card.id).await.unwrap().unwrap();
    assert_eq!(unchanged.column_id, columns[0].id);
}

#[tokio::test]
async fn test_total_order_after_mixed_operations() {
    let (db, _temp_dir) = setup_db().await;
    let (_board, columns) = create_board(&db, "Churn", &["A", "B", "C"]).await;

    let mut cards = Vec::new();
    for i in 0..12 {
        let column = columns[i % 3].id;
        cards.push(
            Card::create(&db, &CreateCard::titled(column, format!("card {i}")))
                .await
                .unwrap()
                .id,
        );
    }

    // A fixed but irregular sequence of moves, archives and deletes
    for step in 0..40usize {
        let card = cards[(step * 7) % cards.len()];
        let destination = columns[(step * 5 + 1) % 3].id;
        let len = Card::find_by_column(&db.pool, destination).await.unwrap().len();
        let current = Card::find_by_id(&db.pool, card).await.unwrap().unwrap();
        let len = if current.column_id == destination { len - 1 } else { len };
        Card::move_to(&db, card, destination, (step * 3) % (len + 1))
            .await
            .unwrap();

        if step % 11 == 5 {
            Card::archive(&db, cards[step % cards.len()]).await.unwrap();
        }
        if step % 13 == 12 {
            let victim = cards.remove(step % cards.len());
            Card::delete(&db, victim).await.unwrap();
        }
        if step % 11 == 5 {
            let archived = cards[step % cards.len()];
            let card = Card::find_by_id(&db.pool, archived).await.unwrap().unwrap();
            if card.archived {
                Card::restore(&db, archived, None, Some(0)).await.unwrap();
            }
        }
    }

    let mut seen = 0;
    for column in &columns {
        let values: Vec<i64> = positions(&db, column.id).await.into_iter().map(|(_, p)| p).collect();
        assert_strictly_ascending(&values);
        seen += values.len();
    }
    assert_eq!(seen, cards.len(), "every surviving card sits in exactly one column");
}

#[tokio::test]
async fn test_column_reorder_uses_same_placement() {
    let (db, _temp_dir) = setup_db().await;
    let (board, columns) = create_board(&db, "Cols", &["One", "Two", "Three"]).await;

    Column::move_to(&db, columns[2].id, 0).await.unwrap();
    let names: Vec<String> = Column::find_by_board(&db.pool, board.id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["Three", "One", "Two"]);

    let err = Column::move_to(&db, columns[0].id, 3).await.unwrap_err();
    assert!(matches!(err, BoardError::InvalidIndex { index: 3, len: 2 }));
}

#[tokio::test]
async fn test_checklist_item_reorder_and_delete() {
    let (db, _temp_dir) = setup_db().await;
    let (_board, columns) = create_board(&db, "Lists", &["Only"]).await;
    let card = Card::create(&db, &CreateCard::titled(columns[0].id, "Trip"))
        .await
        .unwrap();
    let list = Checklist::create(&db, card.id, "Pack").await.unwrap();
    let mut items = Vec::new();
    for text in ["passport", "charger", "socks"] {
        items.push(ChecklistItem::create(&db, list.id, text).await.unwrap());
    }

    ChecklistItem::move_to(&db, items[2].id, 0).await.unwrap();
    ChecklistItem::delete(&db, items[0].id).await.unwrap();

    let remaining = ChecklistItem::find_by_checklist(&db.pool, list.id).await.unwrap();
    let texts: Vec<&str> = remaining.iter().map(|i| i.text.as_str()).collect();
    assert_eq!(texts, vec!["socks", "charger"]);
    let values: Vec<i64> = remaining.iter().map(|i| i.position).collect();
    assert_eq!(values, vec![1000, 2000]);
}

#[tokio::test]
async fn test_cross_column_move_rolls_back_on_failure() {
    let (db, _temp_dir) = setup_db().await;
    let (_board, columns) = create_board(&db, "Atomic", &["Source", "Target"]).await;
    let (source, target) = (columns[0].id, columns[1].id);
    let card = Card::create(&db, &CreateCard::titled(source, "fragile"))
        .await
        .unwrap();
    Card::create(&db, &CreateCard::titled(target, "resident"))
        .await
        .unwrap();

    // Fail the reattachment after the destination slot has been computed
    sqlx::query(
        r#"CREATE TRIGGER fail_move BEFORE UPDATE OF column_id ON card
           WHEN NEW.column_id != OLD.column_id
           BEGIN SELECT RAISE(ABORT, 'simulated failure'); END"#,
    )
    .execute(&db.pool)
    .await
    .unwrap();

    let err = Card::move_to(&db, card.id, target, 0).await.unwrap_err();
    assert!(matches!(err, BoardError::Database(_)));

    let in_source = positions(&db, source).await;
    let in_target = positions(&db, target).await;
    assert_eq!(in_source, vec![("fragile".to_string(), 1000)]);
    assert_eq!(in_target, vec![("resident".to_string(), 1000)]);

    sqlx::query("DROP TRIGGER fail_move")
        .execute(&db.pool)
        .await
        .unwrap();
    let moved = Card::move_to(&db, card.id, target, 0).await.unwrap();
    assert_eq!(moved.column_id, target);
    assert!(positions(&db, source).await.is_empty());
    assert_eq!(positions(&db, target).await.len(), 2);
}

#[tokio::test]
async fn test_concurrent_moves_into_one_column_stay_distinct() {
    let (db, _temp_dir) = setup_db().await;
    let (_board, columns) = create_board(&db, "Busy", &["Left", "Middle", "Right"]).await;
    let middle = columns[1].id;
    for title in ["m1", "m2"] {
        Card::create(&db, &CreateCard::titled(middle, title)).await.unwrap();
    }

    let mut movers = Vec::new();
    for i in 0..8 {
        let source = if i % 2 == 0 { columns[0].id } else { columns[2].id };
        movers.push(
            Card::create(&db, &CreateCard::titled(source, format!("mover {i}")))
                .await
                .unwrap()
                .id,
        );
    }

    // Every mover asks for index 1 at the same time
    let results = futures::future::join_all(
        movers
            .iter()
            .map(|id| Card::move_to(&db, *id, middle, 1)),
    )
    .await;
    for result in results {
        result.unwrap();
    }

    let values: Vec<i64> = positions(&db, middle).await.into_iter().map(|(_, p)| p).collect();
    assert_eq!(values.len(), 10);
    assert_strictly_ascending(&values);
    assert!(positions(&db, columns[0].id).await.is_empty());
    assert!(positions(&db, columns[2].id).await.is_empty());
}
