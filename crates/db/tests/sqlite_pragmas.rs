//! Integration tests for SQLite connection settings.
//!
//! These tests verify that every pooled connection handed out by `DBService::open` has:
//! - journal_mode = WAL
//! - synchronous = NORMAL
//! - foreign_keys = ON
//! - temp_store = MEMORY
//! - mmap_size = 64MB (debug) / 256MB (release)
//! - cache_size = -64000 (64MB)

use db::{DBService, DbConfig};
use sqlx::{Executor, Row};
use tempfile::TempDir;

async fn setup_db() -> (DBService, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db = DBService::open(&DbConfig::new(temp_dir.path().join("pragmas.db")))
        .await
        .expect("Failed to open store");
    (db, temp_dir)
}

#[tokio::test]
async fn test_sqlite_pragma_journal_mode_wal() {
    let (db, _temp_dir) = setup_db().await;

    let row = db
        .pool
        .fetch_one(sqlx::query("PRAGMA journal_mode"))
        .await
        .expect("Failed to query journal_mode");

    let journal_mode: String = row.get(0);
    assert_eq!(journal_mode.to_lowercase(), "wal", "Journal mode should be WAL");
}

#[tokio::test]
async fn test_sqlite_pragma_synchronous_normal() {
    let (db, _temp_dir) = setup_db().await;

    let row = db
        .pool
        .fetch_one(sqlx::query("PRAGMA synchronous"))
        .await
        .expect("Failed to query synchronous");

    let synchronous: i32 = row.get(0);
    // NORMAL = 1
    assert_eq!(synchronous, 1, "Synchronous should be NORMAL (1)");
}

#[tokio::test]
async fn test_sqlite_pragma_foreign_keys_on() {
    let (db, _temp_dir) = setup_db().await;

    let row = db
        .pool
        .fetch_one(sqlx::query("PRAGMA foreign_keys"))
        .await
        .expect("Failed to query foreign_keys");

    let foreign_keys: i32 = row.get(0);
    assert_eq!(foreign_keys, 1, "Foreign keys should be enforced");
}

#[tokio::test]
async fn test_sqlite_pragma_mmap_size() {
    let (db, _temp_dir) = setup_db().await;

    let row = db
        .pool
        .fetch_one(sqlx::query("PRAGMA mmap_size"))
        .await
        .expect("Failed to query mmap_size");

    let mmap_size: i64 = row.get(0);
    let expected = if cfg!(debug_assertions) {
        67_108_864
    } else {
        268_435_456
    };
    assert_eq!(mmap_size, expected);
}

#[tokio::test]
async fn test_sqlite_pragma_cache_size() {
    let (db, _temp_dir) = setup_db().await;

    let row = db
        .pool
        .fetch_one(sqlx::query("PRAGMA cache_size"))
        .await
        .expect("Failed to query cache_size");

    let cache_size: i32 = row.get(0);
    // -64000 means 64MB (negative means KB)
    assert_eq!(cache_size, -64000, "cache_size should be -64000 (64MB)");
}

#[tokio::test]
async fn test_sqlite_pragmas_applied_to_all_connections() {
    let (db, _temp_dir) = setup_db().await;

    // Hold several connections at once so each is a distinct one
    let mut conns = Vec::new();
    for _ in 0..3 {
        conns.push(db.pool.acquire().await.expect("Failed to acquire connection"));
    }

    for (i, conn) in conns.iter_mut().enumerate() {
        let row = sqlx::query("PRAGMA temp_store")
            .fetch_one(&mut **conn)
            .await
            .expect("Failed to query temp_store");

        let temp_store: i32 = row.get(0);
        assert_eq!(temp_store, 2, "Connection {i} should have temp_store = MEMORY");
    }
}
