use std::collections::HashSet;

use sqlx::{Connection, FromRow, SqliteConnection};
use tracing::{debug, info, warn};

use super::{
    EvolutionReport,
    tables::{self, EXPECTED, TableSpec},
};
use crate::SchemaError;

/// Reconcile the store with the expected schema. Safe to run on every start.
pub async fn evolve(conn: &mut SqliteConnection) -> Result<EvolutionReport, SchemaError> {
    evolve_with(conn, EXPECTED).await
}

/// Reconcile the store with an explicit list of tables, in the given order.
///
/// Each table is reconciled in its own `BEGIN IMMEDIATE` transaction, so a failure
/// leaves that table either untouched or fully reconciled. Tables already committed
/// stay reconciled. Foreign keys are not enforced while this runs, since rebuilding a
/// table drops the old copy its children still point at by name.
pub async fn evolve_with(
    conn: &mut SqliteConnection,
    expected: &[TableSpec],
) -> Result<EvolutionReport, SchemaError> {
    let enforced: bool = sqlx::query_scalar("PRAGMA foreign_keys")
        .fetch_one(&mut *conn)
        .await
        .map_err(SchemaError::Open)?;
    if enforced {
        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&mut *conn)
            .await
            .map_err(SchemaError::Open)?;
    }

    let mut report = EvolutionReport::default();
    let mut result = Ok(());
    for table in expected {
        if let Err(source) = reconcile_table(conn, table, &mut report).await {
            result = Err(SchemaError::Write {
                table: table.name.to_string(),
                source,
            });
            break;
        }
    }

    if enforced {
        if let Err(e) = sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await {
            warn!(error = ?e, "Failed to re-enable foreign keys after evolution");
        }
    }
    result.map(|()| report)
}

/// One row of `pragma_table_info`.
#[derive(Debug, FromRow)]
struct ColumnInfo {
    name: String,
    declared_type: String,
    not_null: bool,
    default_value: Option<String>,
    pk: i64,
}

impl ColumnInfo {
    /// Inserts that do not name this column fail.
    fn blocks_inserts(&self) -> bool {
        self.not_null && self.default_value.is_none() && self.pk == 0
    }
}

async fn table_info(
    conn: &mut SqliteConnection,
    table: &str,
) -> Result<Vec<ColumnInfo>, sqlx::Error> {
    sqlx::query_as::<_, ColumnInfo>(
        r#"SELECT name, type AS declared_type, "notnull" AS not_null,
                  dflt_value AS default_value, pk
           FROM pragma_table_info($1)
           ORDER BY cid"#,
    )
    .bind(table)
    .fetch_all(conn)
    .await
}

async fn reconcile_table(
    conn: &mut SqliteConnection,
    table: &TableSpec,
    report: &mut EvolutionReport,
) -> Result<(), sqlx::Error> {
    let mut tx = conn.begin_with("BEGIN IMMEDIATE").await?;
    let mut created = false;
    let mut added = Vec::new();
    let mut rebuilt = false;
    let mut renumbered = 0;
    let mut indexes = Vec::new();
    let mut deduplicated = 0;

    if !object_exists(&mut tx, "table", table.name).await? {
        sqlx::query(&tables::create_table_sql(table))
            .execute(&mut *tx)
            .await?;
        created = true;
    } else {
        let actual = table_info(&mut tx, table.name).await?;
        let present: HashSet<&str> = actual.iter().map(|c| c.name.as_str()).collect();

        for column in table.columns {
            if present.contains(column.name) {
                continue;
            }
            sqlx::query(&tables::add_column_sql(table.name, column))
                .execute(&mut *tx)
                .await?;
            if let Some(backfill) = tables::backfill_sql(table.name, column) {
                let rows = sqlx::query(&backfill).execute(&mut *tx).await?;
                debug!(
                    table = table.name,
                    column = column.name,
                    rows = rows.rows_affected(),
                    "Backfilled added column"
                );
            }
            if let Some(former) = column.formerly.filter(|f| present.contains(f)) {
                if let Some(copy) = tables::copy_former_sql(table.name, column) {
                    let rows = sqlx::query(&copy).execute(&mut *tx).await?;
                    info!(
                        table = table.name,
                        column = column.name,
                        former,
                        rows = rows.rows_affected(),
                        "Copied values from former column"
                    );
                }
            }
            added.push(column.name);
        }

        for column in table.columns {
            let Some(fill) = tables::fill_nulls_sql(table.name, column) else {
                continue;
            };
            let rows = sqlx::query(&fill).execute(&mut *tx).await?.rows_affected();
            if rows > 0 {
                warn!(table = table.name, column = column.name, rows, "Filled NULLs in required column");
            }
        }

        let undeclared: Vec<&ColumnInfo> = actual
            .iter()
            .filter(|c| table.column(&c.name).is_none())
            .collect();
        if undeclared.iter().any(|c| c.blocks_inserts()) {
            rebuild_table(&mut tx, table, &undeclared).await?;
            rebuilt = true;
        } else {
            for column in &undeclared {
                debug!(table = table.name, column = %column.name, "Retaining undeclared column");
            }
        }

        if let Some(parent) = table.parent_column() {
            renumbered = renumber_ties(&mut tx, table, parent).await?;
        }
    }

    for index in table.indexes {
        if object_exists(&mut tx, "index", index.name).await? {
            continue;
        }
        if index.unique && !created {
            deduplicated += sqlx::query(&tables::dedupe_sql(table, index))
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        sqlx::query(&tables::create_index_sql(table, index))
            .execute(&mut *tx)
            .await?;
        indexes.push(index.name);
    }

    tx.commit().await?;

    if created {
        info!(table = table.name, "Created table");
        report.tables_created.push(table.name.to_string());
    }
    for column in added {
        warn!(table = table.name, column, "Added missing column to existing table");
        report
            .columns_added
            .push((table.name.to_string(), column.to_string()));
    }
    if rebuilt {
        warn!(table = table.name, "Rebuilt table to relax undeclared required columns");
        report.tables_rebuilt.push(table.name.to_string());
    }
    if renumbered > 0 {
        warn!(table = table.name, rows = renumbered, "Renumbered containers with tied positions");
        report
            .positions_renumbered
            .push((table.name.to_string(), renumbered));
    }
    if deduplicated > 0 {
        warn!(table = table.name, rows = deduplicated, "Removed rows duplicating a unique key");
        report
            .duplicates_removed
            .push((table.name.to_string(), deduplicated));
    }
    for index in indexes {
        debug!(table = table.name, index, "Created index");
        report.indexes_created.push(index.to_string());
    }
    Ok(())
}

/// Recreate `table` with its declared columns followed by the `undeclared` ones, which
/// keep their values and type but lose `NOT NULL`. Indexes and triggers on the table
/// are recreated from their stored SQL.
async fn rebuild_table(
    conn: &mut SqliteConnection,
    table: &TableSpec,
    undeclared: &[&ColumnInfo],
) -> Result<(), sqlx::Error> {
    let temp = format!("{}__rebuild", table.name);
    let dependents: Vec<String> = sqlx::query_scalar(
        "SELECT sql FROM sqlite_master
         WHERE tbl_name = $1 AND type IN ('index', 'trigger') AND sql IS NOT NULL",
    )
    .bind(table.name)
    .fetch_all(&mut *conn)
    .await?;

    let extra: Vec<(&str, &str)> = undeclared
        .iter()
        .map(|c| (c.name.as_str(), c.declared_type.as_str()))
        .collect();
    sqlx::query(&tables::create_table_as_sql(table, &temp, &extra))
        .execute(&mut *conn)
        .await?;

    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|c| c.name)
        .chain(extra.iter().map(|(name, _)| *name))
        .map(|name| format!("\"{name}\""))
        .collect();
    let columns = columns.join(", ");
    sqlx::query(&format!(
        r#"INSERT INTO "{temp}" ({columns}) SELECT {columns} FROM "{table}" ORDER BY rowid"#,
        table = table.name,
    ))
    .execute(&mut *conn)
    .await?;

    sqlx::query(&format!(r#"DROP TABLE "{}""#, table.name))
        .execute(&mut *conn)
        .await?;
    sqlx::query(&format!(r#"ALTER TABLE "{temp}" RENAME TO "{}""#, table.name))
        .execute(&mut *conn)
        .await?;
    for sql in &dependents {
        sqlx::query(sql).execute(&mut *conn).await?;
    }
    Ok(())
}

/// Give every container of `table` that holds two active rows at the same position
/// fresh positions one step apart, keeping `(position, rowid)` order. Returns the
/// number of rows rewritten.
async fn renumber_ties(
    conn: &mut SqliteConnection,
    table: &TableSpec,
    parent: &str,
) -> Result<u64, sqlx::Error> {
    let moves: Vec<(i64, i64)> = sqlx::query_as(&tables::tie_renumbering_sql(table, parent))
        .fetch_all(&mut *conn)
        .await?;

    let update = format!(r#"UPDATE "{}" SET position = $2 WHERE rowid = $1"#, table.name);
    for (row_id, position) in &moves {
        sqlx::query(&update)
            .bind(row_id)
            .bind(position)
            .execute(&mut *conn)
            .await?;
    }
    Ok(moves.len() as u64)
}

async fn object_exists(
    conn: &mut SqliteConnection,
    kind: &str,
    name: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = $1 AND name = $2)")
        .bind(kind)
        .bind(name)
        .fetch_one(conn)
        .await
}
