use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use sqlx::{
    Connection, Error, Executor, Pool, Sqlite, Transaction,
    sqlite::{
        SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
        SqliteSynchronous,
    },
};
use tracing::{error, info};
use utils::assets::database_path;

pub mod error;
pub mod locks;
pub mod models;
pub mod ordering;
pub mod retry;
pub mod schema;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod validation;

pub use error::{BoardError, EntityKind, SchemaError};
pub use locks::ContainerLocks;
pub use ordering::{Container, POSITION_STEP};
pub use retry::{RetryConfig, is_retryable_error, with_retry};
pub use schema::{EvolutionReport, evolve};

// ============================================================================
// Connection Pool Configuration
// ============================================================================

/// Default maximum connections in the pool.
/// SQLite benefits from limited connections due to single-writer model.
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Minimum idle connections to maintain.
const DEFAULT_MIN_CONNECTIONS: u32 = 1;

/// Connection acquisition and busy timeout in seconds.
const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 30;

/// Idle connection timeout in seconds (10 minutes).
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

const MAX_CONNECTIONS_ENV: &str = "KANBAN_SQLITE_MAX_CONNECTIONS";

/// Where the store lives and how the pool is sized.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl DbConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: Duration::from_secs(DEFAULT_BUSY_TIMEOUT_SECS),
        }
    }

    /// Read `KANBAN_DB` and `KANBAN_SQLITE_MAX_CONNECTIONS`.
    pub fn from_env() -> Self {
        let mut config = Self::new(database_path());
        config.max_connections = std::env::var(MAX_CONNECTIONS_ENV)
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|&n| n > 0 && n <= 100)
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        config
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(&self.database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(self.busy_timeout)
    }
}

/// Apply performance pragmas to a SQLite connection.
/// These pragmas are applied on every new connection via `after_connect`.
///
/// - `temp_store = MEMORY` (2)
/// - `mmap_size`: 64MB in debug builds, 256MB in release builds
/// - `synchronous = NORMAL`, set after `mmap_size` so mmap'ed writes still fsync
/// - `cache_size = -64000`: 64MB page cache (negative = KB)
/// - `wal_autocheckpoint = 2000`: checkpoint every ~8MB
async fn apply_performance_pragmas(conn: &mut SqliteConnection) -> Result<(), Error> {
    conn.execute("PRAGMA temp_store = 2").await?;

    #[cfg(debug_assertions)]
    conn.execute("PRAGMA mmap_size = 67108864").await?;

    #[cfg(not(debug_assertions))]
    conn.execute("PRAGMA mmap_size = 268435456").await?;

    conn.execute("PRAGMA synchronous = NORMAL").await?;
    conn.execute("PRAGMA cache_size = -64000").await?;
    conn.execute("PRAGMA wal_autocheckpoint = 2000").await?;

    Ok(())
}

// ============================================================================
// Database Integrity Check
// ============================================================================

/// Check an existing database file with `PRAGMA quick_check`.
///
/// A missing file is healthy (it will be created). A file SQLite cannot read as a
/// database, or one failing the check, is reported as corrupt.
async fn check_database_integrity(db_path: &Path) -> Result<(), SchemaError> {
    if !db_path.exists() {
        return Ok(());
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .read_only(true);
    let mut conn = SqliteConnection::connect_with(&options)
        .await
        .map_err(SchemaError::Open)?;

    let result: Result<String, Error> = sqlx::query_scalar("PRAGMA quick_check")
        .fetch_one(&mut conn)
        .await;
    if let Err(e) = conn.close().await {
        tracing::warn!(error = ?e, "Failed to close integrity check connection");
    }

    match result {
        Ok(status) if status == "ok" => Ok(()),
        Ok(status) => Err(SchemaError::Corrupt(status)),
        Err(e) => Err(SchemaError::Corrupt(e.to_string())),
    }
}

/// Handle to the persisted board store.
///
/// Cloning is cheap: the pool, the container locks and the startup evolution report
/// are shared.
#[derive(Clone)]
pub struct DBService {
    pub pool: Pool<Sqlite>,
    pub locks: ContainerLocks,
    pub evolution: Arc<EvolutionReport>,
}

impl DBService {
    /// Open the store named by the environment (see [`DbConfig::from_env`]).
    pub async fn new() -> Result<DBService, SchemaError> {
        Self::open(&DbConfig::from_env()).await
    }

    /// Open the store, reconciling its schema before any pooled connection exists.
    ///
    /// Evolution runs on a dedicated connection that is closed before the pool is built,
    /// so no request-serving connection can observe a half-evolved schema. Any failure
    /// here is fatal for startup.
    pub async fn open(config: &DbConfig) -> Result<DBService, SchemaError> {
        let db_path = &config.database_path;

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        if let Err(e) = check_database_integrity(db_path).await {
            error!(path = %db_path.display(), error = %e, "DATABASE CORRUPTION DETECTED");
            return Err(e);
        }

        let report = run_evolution(config).await?;

        info!(
            path = %db_path.display(),
            max_connections = config.max_connections,
            min_connections = DEFAULT_MIN_CONNECTIONS,
            "Initializing SQLite connection pool"
        );

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(DEFAULT_MIN_CONNECTIONS)
            .acquire_timeout(config.busy_timeout)
            .idle_timeout(Some(Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS)))
            .after_connect(|conn, _meta| {
                Box::pin(async move { apply_performance_pragmas(conn).await })
            })
            .connect_with(config.connect_options().foreign_keys(true))
            .await
            .map_err(SchemaError::Open)?;

        Ok(DBService {
            pool,
            locks: ContainerLocks::default(),
            evolution: Arc::new(report),
        })
    }

    /// Wrap an existing pool whose schema is already reconciled.
    pub fn from_pool(pool: Pool<Sqlite>) -> DBService {
        DBService {
            pool,
            locks: ContainerLocks::default(),
            evolution: Arc::new(EvolutionReport::default()),
        }
    }

    /// Start a write transaction that takes the database write lock immediately.
    ///
    /// Ordering operations read sibling positions and then write them; a deferred
    /// transaction could be overtaken by another writer between the two.
    pub async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, Error> {
        begin_write(&self.pool).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// `BEGIN IMMEDIATE` on a pooled connection, for writes that read before they write.
pub async fn begin_write(pool: &Pool<Sqlite>) -> Result<Transaction<'static, Sqlite>, Error> {
    pool.begin_with("BEGIN IMMEDIATE").await
}

/// Reconcile the schema on a single connection with foreign keys off.
async fn run_evolution(config: &DbConfig) -> Result<EvolutionReport, SchemaError> {
    let options = config.connect_options().foreign_keys(false);
    let mut conn = SqliteConnection::connect_with(&options)
        .await
        .map_err(SchemaError::Open)?;

    let result = evolve(&mut conn).await;
    if let Err(e) = conn.close().await {
        tracing::warn!(error = ?e, "Failed to close schema evolution connection");
    }
    let report = result?;

    if report.is_empty() {
        info!("Schema is up to date");
    } else {
        info!(
            tables_created = report.tables_created.len(),
            columns_added = report.columns_added.len(),
            indexes_created = report.indexes_created.len(),
            "Schema evolved"
        );
    }
    Ok(report)
}
