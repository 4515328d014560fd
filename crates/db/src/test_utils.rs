//! Test utilities for database tests.
//!
//! Every test gets its own store file, copied from a template that has already been
//! evolved, so the full schema is in place without reconciling it from scratch each time.

use std::{path::Path, sync::OnceLock};

use tempfile::TempDir;
use tokio::sync::OnceCell;

use crate::{DBService, DbConfig};

/// Shared template database, evolved once per test binary.
static TEMPLATE_DIR: OnceLock<TempDir> = OnceLock::new();
static TEMPLATE_READY: OnceCell<()> = OnceCell::const_new();

const TEMPLATE_FILE: &str = "template.db";

fn get_template_dir() -> &'static TempDir {
    TEMPLATE_DIR.get_or_init(|| TempDir::new().expect("Failed to create template temp dir"))
}

async fn ensure_template_ready() {
    TEMPLATE_READY
        .get_or_init(|| async {
            let template_path = get_template_dir().path().join(TEMPLATE_FILE);
            let db = DBService::open(&DbConfig::new(&template_path))
                .await
                .expect("Failed to evolve template database");

            // Closing the last connection checkpoints the WAL into the main file
            db.close().await;

            tracing::debug!("Template database ready at {:?}", template_path);
        })
        .await;
}

fn copy_with_sidecars(from: &Path, to: &Path) {
    std::fs::copy(from, to).expect("Failed to copy template database");
    for suffix in ["-wal", "-shm"] {
        let mut sidecar = from.as_os_str().to_owned();
        sidecar.push(suffix);
        let sidecar = Path::new(&sidecar);
        if sidecar.exists() {
            let mut target = to.as_os_str().to_owned();
            target.push(suffix);
            let _ = std::fs::copy(sidecar, Path::new(&target));
        }
    }
}

/// Create an evolved, empty store in a fresh temp directory.
///
/// Returns the service and the TempDir, which must be kept alive for the duration of
/// the test.
pub async fn create_test_db() -> (DBService, TempDir) {
    ensure_template_ready().await;

    let temp_dir = TempDir::new().expect("Failed to create test temp dir");
    let db_path = temp_dir.path().join("test.db");
    copy_with_sidecars(&get_template_dir().path().join(TEMPLATE_FILE), &db_path);

    let mut config = DbConfig::new(&db_path);
    config.max_connections = 5;
    let db = DBService::open(&config)
        .await
        .expect("Failed to open test database");

    (db, temp_dir)
}
