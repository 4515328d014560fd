//! The expected schema, declared as data.
//!
//! Tables are listed parents first so every `REFERENCES` target exists before the table
//! that points at it.

use crate::ordering::POSITION_STEP;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Blob,
    Text,
    Integer,
}

impl SqlType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Blob => "BLOB",
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
        }
    }
}

/// Value a column takes on insert and the value existing rows receive when the column
/// is added to an older table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDefault {
    /// No default; inserts must supply a value.
    None,
    /// A constant SQL literal such as `0`, `''` or `'#6b7280'`.
    Literal(&'static str),
    /// The current UTC time.
    Now,
    /// Ascending sparse positions in insertion order (`rowid * STEP`).
    Sequence,
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub default: ColumnDefault,
    pub primary_key: bool,
    pub references: Option<&'static str>,
    /// Older name of this column. When the column is added to a table that still has
    /// the old one, existing rows are filled from it.
    pub formerly: Option<&'static str>,
}

impl ColumnSpec {
    pub const fn new(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            nullable: false,
            default: ColumnDefault::None,
            primary_key: false,
            references: None,
            formerly: None,
        }
    }

    pub const fn id() -> Self {
        let mut column = Self::new("id", SqlType::Blob);
        column.primary_key = true;
        column
    }

    pub const fn blob(name: &'static str) -> Self {
        Self::new(name, SqlType::Blob)
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, SqlType::Text)
    }

    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, SqlType::Integer)
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn default(mut self, default: ColumnDefault) -> Self {
        self.default = default;
        self
    }

    pub const fn literal(self, literal: &'static str) -> Self {
        self.default(ColumnDefault::Literal(literal))
    }

    pub const fn now(self) -> Self {
        self.default(ColumnDefault::Now)
    }

    pub const fn references(mut self, table: &'static str) -> Self {
        self.references = Some(table);
        self
    }

    pub const fn formerly(mut self, name: &'static str) -> Self {
        self.formerly = Some(name);
        self
    }

    /// Sparse ordering key.
    pub const fn position() -> Self {
        Self::integer("position").default(ColumnDefault::Sequence)
    }

    pub const fn timestamp(name: &'static str) -> Self {
        Self::text(name).now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IndexSpec {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub unique: bool,
}

impl IndexSpec {
    pub const fn new(name: &'static str, columns: &'static [&'static str]) -> Self {
        Self {
            name,
            columns,
            unique: false,
        }
    }

    pub const fn unique(name: &'static str, columns: &'static [&'static str]) -> Self {
        Self {
            name,
            columns,
            unique: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: &'static [ColumnSpec],
    pub indexes: &'static [IndexSpec],
}

impl TableSpec {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// For a positioned table, the column naming the container its rows are ordered in.
    pub fn parent_column(&self) -> Option<&'static str> {
        self.column("position")?;
        self.columns
            .iter()
            .find(|c| c.references.is_some())
            .map(|c| c.name)
    }

    /// Rows that hold a slot in their container. Archived cards keep a position but
    /// are not compared with their siblings.
    pub fn active_filter(&self) -> &'static str {
        if self.column("archived").is_some() {
            " AND archived = 0"
        } else {
            ""
        }
    }
}

fn quote(ident: &str) -> String {
    format!("\"{ident}\"")
}

fn default_clause(column: &ColumnSpec) -> Option<String> {
    match column.default {
        ColumnDefault::None | ColumnDefault::Sequence => None,
        ColumnDefault::Literal(literal) => Some(format!("DEFAULT {literal}")),
        ColumnDefault::Now => Some("DEFAULT (datetime('now', 'subsec'))".to_string()),
    }
}

fn column_definition(column: &ColumnSpec) -> String {
    let mut parts = vec![quote(column.name), column.sql_type.as_sql().to_string()];
    if column.primary_key {
        parts.push("PRIMARY KEY".to_string());
    } else if !column.nullable {
        parts.push("NOT NULL".to_string());
    }
    if let Some(default) = default_clause(column) {
        parts.push(default);
    }
    if let Some(target) = column.references {
        parts.push(format!("REFERENCES {}(\"id\") ON DELETE CASCADE", quote(target)));
    }
    parts.join(" ")
}

pub fn create_table_sql(table: &TableSpec) -> String {
    create_table_as_sql(table, table.name, &[])
}

/// `CREATE TABLE` for `table`'s declared columns under another name, followed by
/// `extra` columns given as `(name, declared type)`. Extra columns are nullable and
/// have no default.
pub fn create_table_as_sql(table: &TableSpec, name: &str, extra: &[(&str, &str)]) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(column_definition)
        .chain(extra.iter().map(|(column, sql_type)| {
            format!("{} {sql_type}", quote(column)).trim_end().to_string()
        }))
        .map(|definition| format!("    {definition}"))
        .collect();
    format!("CREATE TABLE {} (\n{}\n)", quote(name), columns.join(",\n"))
}

pub fn create_index_sql(table: &TableSpec, index: &IndexSpec) -> String {
    let columns: Vec<String> = index.columns.iter().map(|c| quote(c)).collect();
    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        quote(index.name),
        quote(table.name),
        columns.join(", ")
    )
}

/// `ALTER TABLE .. ADD COLUMN` for a column missing from an existing table.
///
/// SQLite cannot add a primary key or a column with a non-constant default, so those
/// are added as plain nullable columns and filled by [`backfill_sql`]. A `NOT NULL`
/// column without a literal default gets the empty value of its type.
pub fn add_column_sql(table: &str, column: &ColumnSpec) -> String {
    let mut parts = vec![quote(column.name), column.sql_type.as_sql().to_string()];
    match (column.default, column.primary_key, column.nullable) {
        (ColumnDefault::Literal(literal), false, nullable) => {
            if !nullable {
                parts.push("NOT NULL".to_string());
            }
            parts.push(format!("DEFAULT {literal}"));
        }
        (ColumnDefault::Sequence, false, _) => {
            parts.push("NOT NULL DEFAULT 0".to_string());
        }
        (ColumnDefault::None, false, false) => match column.sql_type {
            SqlType::Text => parts.push("NOT NULL DEFAULT ''".to_string()),
            SqlType::Integer => parts.push("NOT NULL DEFAULT 0".to_string()),
            SqlType::Blob => {}
        },
        _ => {}
    }
    if let (Some(target), ColumnDefault::None, false) =
        (column.references, column.default, column.primary_key)
    {
        parts.push(format!("REFERENCES {}(\"id\") ON DELETE CASCADE", quote(target)));
    }
    format!(
        "ALTER TABLE {} ADD COLUMN {}",
        quote(table),
        parts.join(" ")
    )
}

/// Statement filling a freshly added column on pre-existing rows, when the `ADD COLUMN`
/// default alone does not.
pub fn backfill_sql(table: &str, column: &ColumnSpec) -> Option<String> {
    let value = if column.primary_key {
        "randomblob(16)".to_string()
    } else {
        match column.default {
            ColumnDefault::Now => "datetime('now', 'subsec')".to_string(),
            ColumnDefault::Sequence => format!("rowid * {POSITION_STEP}"),
            ColumnDefault::None | ColumnDefault::Literal(_) => return None,
        }
    };
    Some(format!(
        "UPDATE {} SET {} = {value}",
        quote(table),
        quote(column.name)
    ))
}

/// Copy an older column's values into its replacement on the rows that have one.
pub fn copy_former_sql(table: &str, column: &ColumnSpec) -> Option<String> {
    let former = column.formerly?;
    Some(format!(
        "UPDATE {table} SET {column} = {former} WHERE {former} IS NOT NULL",
        table = quote(table),
        column = quote(column.name),
        former = quote(former),
    ))
}

/// Fill NULLs left in a declared `NOT NULL` column of an older table, which SQLite
/// permits when the column was created nullable. `None` when the column has no value
/// to fall back on (primary and foreign keys).
pub fn fill_nulls_sql(table: &str, column: &ColumnSpec) -> Option<String> {
    if column.nullable || column.primary_key {
        return None;
    }
    let value = match (column.default, column.sql_type) {
        (ColumnDefault::Literal(literal), _) => literal.to_string(),
        (ColumnDefault::Now, _) => "datetime('now', 'subsec')".to_string(),
        (ColumnDefault::Sequence, _) => format!("rowid * {POSITION_STEP}"),
        (ColumnDefault::None, SqlType::Text) => "''".to_string(),
        (ColumnDefault::None, SqlType::Integer) => "0".to_string(),
        (ColumnDefault::None, SqlType::Blob) => return None,
    };
    Some(format!(
        "UPDATE {table} SET {column} = {value} WHERE {column} IS NULL",
        table = quote(table),
        column = quote(column.name),
    ))
}

/// Delete rows that would violate a unique index, keeping the first of each group.
/// Rows with a NULL in an indexed column never conflict and are left alone.
pub fn dedupe_sql(table: &TableSpec, index: &IndexSpec) -> String {
    let columns: Vec<String> = index.columns.iter().map(|c| quote(c)).collect();
    let not_null: Vec<String> = columns.iter().map(|c| format!("{c} IS NOT NULL")).collect();
    format!(
        "DELETE FROM {table} WHERE {not_null} AND rowid NOT IN \
         (SELECT MIN(rowid) FROM {table} GROUP BY {columns})",
        table = quote(table.name),
        not_null = not_null.join(" AND "),
        columns = columns.join(", "),
    )
}

/// Select `(rowid, position)` for every active row of a container that has two active
/// rows sharing a position, with the position it takes when the container is renumbered
/// in `(position, rowid)` order. Rows already at that position are left out.
pub fn tie_renumbering_sql(table: &TableSpec, parent: &str) -> String {
    format!(
        "SELECT row_id, slot FROM (\
             SELECT rowid AS row_id, position, \
                    ROW_NUMBER() OVER (PARTITION BY {parent} ORDER BY position, rowid) * {POSITION_STEP} AS slot \
             FROM {table} \
             WHERE {parent} IN (\
                 SELECT {parent} FROM {table} WHERE {parent} IS NOT NULL{active} \
                 GROUP BY {parent}, position HAVING COUNT(*) > 1\
             ){active}\
         ) WHERE slot IS NOT position",
        table = quote(table.name),
        parent = quote(parent),
        active = table.active_filter(),
    )
}

// ============================================================================
// Expected schema
// ============================================================================

pub const BOARD: TableSpec = TableSpec {
    name: "board",
    columns: &[
        ColumnSpec::id(),
        ColumnSpec::text("name"),
        ColumnSpec::text("description").literal("''"),
        ColumnSpec::integer("is_active").literal("1"),
        ColumnSpec::timestamp("created_at"),
        ColumnSpec::timestamp("updated_at"),
    ],
    indexes: &[],
};

pub const COLUMN: TableSpec = TableSpec {
    name: "column",
    columns: &[
        ColumnSpec::id(),
        ColumnSpec::blob("board_id").references("board"),
        ColumnSpec::text("name").formerly("title"),
        ColumnSpec::position(),
        ColumnSpec::integer("wip_limit").nullable(),
        ColumnSpec::timestamp("created_at"),
        ColumnSpec::timestamp("updated_at"),
    ],
    indexes: &[IndexSpec::new(
        "idx_column_board_id_position",
        &["board_id", "position"],
    )],
};

pub const CARD: TableSpec = TableSpec {
    name: "card",
    columns: &[
        ColumnSpec::id(),
        ColumnSpec::blob("column_id").references("column"),
        ColumnSpec::text("title"),
        ColumnSpec::text("description").literal("''"),
        ColumnSpec::text("start_date").nullable(),
        ColumnSpec::text("due_date").nullable(),
        ColumnSpec::integer("priority").literal("2"),
        ColumnSpec::integer("archived").literal("0"),
        ColumnSpec::text("archived_at").nullable(),
        ColumnSpec::position(),
        ColumnSpec::timestamp("created_at"),
        ColumnSpec::timestamp("updated_at"),
    ],
    indexes: &[
        IndexSpec::new("idx_card_column_id_position", &["column_id", "position"]),
        IndexSpec::new("idx_card_due_date", &["due_date"]),
    ],
};

pub const LABEL: TableSpec = TableSpec {
    name: "label",
    columns: &[
        ColumnSpec::id(),
        ColumnSpec::blob("board_id").references("board"),
        ColumnSpec::text("name"),
        ColumnSpec::text("color").literal("'#6b7280'"),
        ColumnSpec::timestamp("created_at"),
    ],
    indexes: &[IndexSpec::new("idx_label_board_id", &["board_id"])],
};

pub const CARD_LABEL: TableSpec = TableSpec {
    name: "card_label",
    columns: &[
        ColumnSpec::id(),
        ColumnSpec::blob("card_id").references("card"),
        ColumnSpec::blob("label_id").references("label"),
        ColumnSpec::timestamp("created_at"),
    ],
    indexes: &[
        IndexSpec::unique("idx_card_label_card_id_label_id", &["card_id", "label_id"]),
        IndexSpec::new("idx_card_label_label_id", &["label_id"]),
    ],
};

pub const CHECKLIST: TableSpec = TableSpec {
    name: "checklist",
    columns: &[
        ColumnSpec::id(),
        ColumnSpec::blob("card_id").references("card"),
        ColumnSpec::text("title"),
        ColumnSpec::position(),
        ColumnSpec::timestamp("created_at"),
    ],
    indexes: &[IndexSpec::new(
        "idx_checklist_card_id_position",
        &["card_id", "position"],
    )],
};

pub const CHECKLIST_ITEM: TableSpec = TableSpec {
    name: "checklist_item",
    columns: &[
        ColumnSpec::id(),
        ColumnSpec::blob("checklist_id").references("checklist"),
        ColumnSpec::text("text"),
        ColumnSpec::integer("checked").literal("0"),
        ColumnSpec::position(),
        ColumnSpec::timestamp("created_at"),
    ],
    indexes: &[IndexSpec::new(
        "idx_checklist_item_checklist_id_position",
        &["checklist_id", "position"],
    )],
};

pub const ATTACHMENT: TableSpec = TableSpec {
    name: "attachment",
    columns: &[
        ColumnSpec::id(),
        ColumnSpec::blob("card_id").references("card"),
        ColumnSpec::text("filename"),
        ColumnSpec::text("storage_path"),
        ColumnSpec::integer("size_bytes").literal("0"),
        ColumnSpec::text("mime_type").literal("'application/octet-stream'"),
        ColumnSpec::timestamp("uploaded_at"),
    ],
    indexes: &[IndexSpec::new("idx_attachment_card_id", &["card_id"])],
};

pub const CARD_TEMPLATE: TableSpec = TableSpec {
    name: "card_template",
    columns: &[
        ColumnSpec::id(),
        ColumnSpec::text("name"),
        ColumnSpec::text("description").literal("''"),
        ColumnSpec::text("snapshot").literal("'{}'"),
        ColumnSpec::timestamp("created_at"),
        ColumnSpec::timestamp("updated_at"),
    ],
    indexes: &[],
};

/// Every table the store expects, parents before children.
pub const EXPECTED: &[TableSpec] = &[
    BOARD,
    COLUMN,
    CARD,
    LABEL,
    CARD_LABEL,
    CHECKLIST,
    CHECKLIST_ITEM,
    ATTACHMENT,
    CARD_TEMPLATE,
];
