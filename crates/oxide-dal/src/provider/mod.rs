//! Dialect providers.
//!
//! A [`Provider`] renders every statement the rest of the crate needs and
//! reads table metadata back from the catalog. The default methods carry the
//! shared generation logic (back-quoted identifiers, `@name` placeholders,
//! legacy integer display widths, `FIRST`/`AFTER` column placement); each
//! dialect overrides only the pieces where its engine differs.

mod defaults;
mod mysql;
mod postgres;
mod registry;
mod sqlite;

pub use defaults::DefaultValues;
pub use mysql::MySqlProvider;
pub use postgres::PostgresProvider;
pub use registry::ProviderRegistry;
pub use sqlite::SqliteProvider;

use async_trait::async_trait;

use crate::connection::Connection;
use crate::error::{DalError, Result};
use crate::filter::{compile, Filter};
use crate::schema::{Column, ForeignKeyRef, TableSchema};
use crate::value::Record;

/// How the value of an auto-increment column is read back after an insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityFetch {
    /// Run this statement on the same connection right after the insert.
    FollowUp(String),
    /// The insert carries a `RETURNING` clause; its scalar result is the identity.
    Returning,
}

/// An INSERT statement together with its identity strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertSql {
    /// Statement text.
    pub sql: String,
    /// Set when the table has an auto-increment column.
    pub identity: Option<IdentityFetch>,
}

/// Whether a diffed column is new or altered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Column missing from the old schema.
    Add,
    /// Column present in both with a different type or length.
    Change,
}

/// Where a diffed column goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// At the start of the table.
    First,
    /// After the named column.
    After(String),
}

/// One column the old schema must gain or alter to match the new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnChange<'a> {
    /// Add or change.
    pub kind: ChangeKind,
    /// The column as the new schema defines it.
    pub column: &'a Column,
    /// Position relative to the new schema's column list.
    pub placement: Placement,
}

/// Diffs two snapshots of a table, walking `new` in physical order.
///
/// A column is an add when `old` has no column of that name, a change when
/// the raw type differs (case-insensitively) or both lengths are non-zero and
/// differ. Changes are only reported when `allow_change` is set. The first
/// reported column is placed `FIRST`; each later one goes after whichever
/// column precedes it in `new`, changed or not.
#[must_use]
pub fn diff_columns<'a>(
    new: &'a TableSchema,
    old: &TableSchema,
    allow_change: bool,
) -> Vec<ColumnChange<'a>> {
    let columns = new.ordered_columns();
    let mut changes = Vec::new();
    for (index, column) in columns.iter().enumerate() {
        let kind = match old.get_column(&column.name) {
            None => ChangeKind::Add,
            Some(existing) => {
                let type_differs = !existing
                    .column_type
                    .eq_ignore_ascii_case(&column.column_type);
                let length_differs = existing.length != 0
                    && column.length != 0
                    && existing.length != column.length;
                if allow_change && (type_differs || length_differs) {
                    ChangeKind::Change
                } else {
                    continue;
                }
            }
        };
        let placement = if changes.is_empty() {
            Placement::First
        } else {
            Placement::After(columns[index - 1].name.clone())
        };
        changes.push(ColumnChange {
            kind,
            column,
            placement,
        });
    }
    changes
}

/// Dialect-specific SQL generation and catalog introspection.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// The provider's own default-value map.
    fn default_values(&self) -> &DefaultValues;

    /// Catalog query listing base tables; parameter `@database`.
    fn tables_sql(&self) -> &'static str;

    /// Catalog query returning one row per column; parameters `@database`
    /// and `@table`.
    fn table_schema_sql(&self) -> &'static str;

    /// Query returning a count > 0 when the table exists; parameters
    /// `@database` and `@table`.
    fn exists_table_sql(&self) -> &'static str;

    /// How the identity of `column` is read back after inserting into `table`.
    fn last_identity(&self, table: &TableSchema, column: &Column) -> IdentityFetch;

    /// Quotes an identifier.
    fn quote_identifier(&self, name: &str) -> String {
        format!("`{name}`")
    }

    /// Named placeholder as written into generated SQL.
    fn parameter_placeholder(&self, name: &str) -> String {
        format!("@{name}")
    }

    /// Native positional placeholder for the `index`-th (1-based) bound value.
    fn positional_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    /// Whether a backslash escapes the next character inside string literals.
    fn backslash_escapes(&self) -> bool {
        false
    }

    /// The pattern expression a `Contains` comparison is matched against.
    fn contains_pattern(&self, placeholder: &str) -> String {
        format!("CONCAT('%',{placeholder},'%')")
    }

    /// Rewrites a statement to return `limit` rows starting at `offset`.
    fn page_sql(&self, sql: &str, offset: u64, limit: u64) -> String {
        format!("{sql}\nLIMIT {limit} OFFSET {offset}")
    }

    /// Whether ALTER may change the type of an existing column.
    fn supports_column_change(&self) -> bool {
        true
    }

    /// Sets the default literal used for columns of `data_type`.
    fn set_default_value(&self, data_type: &str, literal: &str) {
        self.default_values().set(data_type, literal);
    }

    /// The configured default literal for `data_type`.
    fn default_value_for(&self, data_type: &str) -> Option<String> {
        self.default_values().get(data_type)
    }

    /// Renders the column's type, widening integers to their legacy display
    /// width and sizing character/binary types.
    fn column_type(&self, column: &Column) -> String {
        widened_type(column)
    }

    /// The DEFAULT expression for a column, if it gets one.
    fn default_clause(&self, column: &Column) -> Option<String> {
        if column.auto_increment {
            return None;
        }
        let explicit = column.default_value.trim();
        if explicit.eq_ignore_ascii_case("NULL") {
            return None;
        }
        if !explicit.is_empty() {
            return Some(default_literal(explicit));
        }
        self.default_values().get(&column.data_type)
    }

    /// Keyword appended to auto-increment columns.
    fn auto_increment_keyword(&self) -> &'static str {
        " AUTO_INCREMENT"
    }

    /// Whether the auto-increment keyword already declares the primary key,
    /// replacing the table-level PRIMARY KEY clause.
    fn identity_is_inline_key(&self) -> bool {
        false
    }

    /// Trailing comment clause for a column.
    fn comment_clause(&self, _column: &Column) -> String {
        String::new()
    }

    /// Column definition used by CREATE TABLE and ALTER TABLE.
    fn column_definition(&self, column: &Column) -> String {
        let mut sql = format!(
            "{} {}",
            self.quote_identifier(&column.name),
            self.column_type(column)
        );
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if column.auto_increment {
            sql.push_str(self.auto_increment_keyword());
        }
        if let Some(default) = self.default_clause(column) {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default);
        }
        sql.push_str(&self.comment_clause(column));
        sql
    }

    /// Generates CREATE TABLE.
    fn create_table_sql(&self, table: &TableSchema) -> String {
        let mut parts: Vec<String> = table
            .ordered_columns()
            .into_iter()
            .map(|c| format!("  {}", self.column_definition(c)))
            .collect();
        let keys: Vec<String> = table
            .key_names()
            .map(|k| self.quote_identifier(k))
            .collect();
        let inline_key = self.identity_is_inline_key()
            && table.identity_column().is_some_and(|c| c.is_key);
        if !keys.is_empty() && !inline_key {
            parts.push(format!("  PRIMARY KEY ({})", keys.join(", ")));
        }
        format!(
            "CREATE TABLE {} (\n{}\n)",
            self.quote_identifier(&table.name),
            parts.join(",\n")
        )
    }

    /// Renders one ALTER clause (without the `ALTER TABLE` head).
    fn alter_clause(&self, change: &ColumnChange<'_>) -> String {
        let verb = match change.kind {
            ChangeKind::Add => "ADD COLUMN",
            ChangeKind::Change => "MODIFY COLUMN",
        };
        let placement = match &change.placement {
            Placement::First => " FIRST".to_string(),
            Placement::After(name) => format!(" AFTER {}", self.quote_identifier(name)),
        };
        format!("{verb} {}{placement}", self.column_definition(change.column))
    }

    /// Joins rendered clauses into the final statement text.
    fn alter_statement(&self, table: &TableSchema, clauses: Vec<String>) -> String {
        format!(
            "ALTER TABLE {}\n{}",
            self.quote_identifier(&table.name),
            clauses.join(",\n")
        )
    }

    /// Generates the ALTER needed to turn `old` into `new`; empty when nothing
    /// differs, in which case callers must not execute anything.
    fn alter_table_sql(&self, new: &TableSchema, old: &TableSchema) -> String {
        let changes = diff_columns(new, old, self.supports_column_change());
        if changes.is_empty() {
            return String::new();
        }
        let clauses = changes.iter().map(|c| self.alter_clause(c)).collect();
        self.alter_statement(new, clauses)
    }

    /// Generates INSERT over every non-auto-increment column, with the
    /// identity strategy when the table has an auto-increment column.
    fn create_insert(&self, table: &TableSchema) -> InsertSql {
        let columns: Vec<&Column> = table
            .ordered_columns()
            .into_iter()
            .filter(|c| !c.auto_increment)
            .collect();
        let names: Vec<String> = columns
            .iter()
            .map(|c| self.quote_identifier(&c.name))
            .collect();
        let values: Vec<String> = columns
            .iter()
            .map(|c| self.parameter_placeholder(&c.name))
            .collect();
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote_identifier(&table.name),
            names.join(", "),
            values.join(", ")
        );
        let identity = table.identity_column().map(|c| self.last_identity(table, c));
        if identity == Some(IdentityFetch::Returning) {
            if let Some(column) = table.identity_column() {
                sql.push_str(&format!(" RETURNING {}", self.quote_identifier(&column.name)));
            }
        }
        InsertSql { sql, identity }
    }

    /// Generates UPDATE of every non-key column, matched on the keys.
    fn create_update(&self, table: &TableSchema) -> Result<String> {
        let keys = self.key_predicate(table)?;
        let assignments: Vec<String> = table
            .ordered_columns()
            .into_iter()
            .filter(|c| !c.auto_increment && !is_key(table, c))
            .map(|c| {
                format!(
                    "{} = {}",
                    self.quote_identifier(&c.name),
                    self.parameter_placeholder(&c.name)
                )
            })
            .collect();
        Ok(format!(
            "UPDATE {} SET {} WHERE {keys}",
            self.quote_identifier(&table.name),
            assignments.join(", ")
        ))
    }

    /// Generates DELETE matched on the keys.
    fn create_delete(&self, table: &TableSchema) -> Result<String> {
        let keys = self.key_predicate(table)?;
        Ok(format!(
            "DELETE FROM {} WHERE {keys}",
            self.quote_identifier(&table.name)
        ))
    }

    /// Generates SELECT of every column.
    fn create_select(&self, table: &TableSchema) -> String {
        let names: Vec<String> = table
            .ordered_columns()
            .into_iter()
            .map(|c| self.quote_identifier(&c.name))
            .collect();
        format!(
            "SELECT {} FROM {}",
            names.join(", "),
            self.quote_identifier(&table.name)
        )
    }

    /// Generates SELECT COUNT(*).
    fn create_count(&self, table: &TableSchema) -> String {
        format!("SELECT COUNT(*) FROM {}", self.quote_identifier(&table.name))
    }

    /// `k1 = @k1 AND k2 = @k2` over the key columns.
    fn key_predicate(&self, table: &TableSchema) -> Result<String> {
        let keys: Vec<String> = table
            .key_names()
            .map(|k| {
                format!(
                    "{} = {}",
                    self.quote_identifier(k),
                    self.parameter_placeholder(k)
                )
            })
            .collect();
        if keys.is_empty() {
            return Err(DalError::InvalidSchema(format!(
                "table '{}' has no key columns",
                table.name
            )));
        }
        Ok(keys.join(" AND "))
    }

    /// Compiles a filter into a WHERE fragment, filling `params`.
    fn compile_filter(
        &self,
        filter: &Filter,
        counter: &mut usize,
        prefix: &str,
        params: &mut Record,
    ) -> Result<String> {
        compile::compile(self, filter, counter, prefix, params)
    }

    /// Lists the base tables of the connection's database.
    async fn get_tables(&self, conn: &mut dyn Connection) -> Result<Vec<String>> {
        let params = Record::new().with("database", conn.database());
        let rows = conn.query(self.tables_sql(), &params).await?;
        Ok(rows.iter().filter_map(|r| r.text("name")).collect())
    }

    /// Reads a table's columns from the catalog; `None` when the table does
    /// not exist.
    async fn get_table_schema(
        &self,
        conn: &mut dyn Connection,
        name: &str,
    ) -> Result<Option<TableSchema>> {
        let database = conn.database().to_string();
        let params = Record::new()
            .with("database", database.as_str())
            .with("table", name);
        let rows = conn.query(self.table_schema_sql(), &params).await?;
        Ok(table_from_rows(name, &database, &rows))
    }
}

/// The legacy display-width rendering: `INT(11)`, `BIGINT(20)`, sized
/// character and binary types, everything else upper-cased.
#[must_use]
pub fn widened_type(column: &Column) -> String {
    let data_type = if column.data_type.is_empty() {
        column.column_type.to_ascii_lowercase()
    } else {
        column.data_type.to_ascii_lowercase()
    };
    match data_type.as_str() {
        "int" | "integer" => "INT(11)".to_string(),
        "bigint" => "BIGINT(20)".to_string(),
        "smallint" => "SMALLINT(6)".to_string(),
        "tinyint" => "TINYINT(4)".to_string(),
        "mediumint" => "MEDIUMINT(9)".to_string(),
        _ if column.is_sized() && column.length > 0 => {
            format!("{}({})", data_type.to_ascii_uppercase(), column.length)
        }
        _ => data_type.to_ascii_uppercase(),
    }
}

/// Builds a table from catalog rows, one per column. Rows repeated by the
/// key joins are folded by column name.
#[must_use]
pub fn table_from_rows(name: &str, schema: &str, rows: &[Record]) -> Option<TableSchema> {
    if rows.is_empty() {
        return None;
    }
    let mut table = TableSchema::new(name).schema(schema);
    for row in rows {
        let column = column_from_row(row);
        if table.get_column(&column.name).is_some() {
            continue;
        }
        table.columns.push(column);
    }
    table.columns.sort_by_key(|c| c.ordinal);
    table.keys = table
        .columns
        .iter()
        .filter(|c| c.is_key)
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(",");
    Some(table)
}

/// Maps one catalog row onto a column. Every dialect's catalog query uses
/// the same column aliases.
#[must_use]
pub fn column_from_row(row: &Record) -> Column {
    let foreign_key = row.flag("is_foreign").then(|| ForeignKeyRef {
        name: row.text("foreign_name").unwrap_or_default(),
        table: row.text("referenced_table").unwrap_or_default(),
        column: row.text("referenced_column").unwrap_or_default(),
    });
    Column {
        name: row.text("name").unwrap_or_default(),
        ordinal: clamp_u32(row.int("ordinal")),
        column_type: row.text("column_type").unwrap_or_default(),
        data_type: row.text("data_type").unwrap_or_default().to_lowercase(),
        length: clamp_u32(row.int("length")),
        nullable: row.flag("is_nullable"),
        is_key: row.flag("is_primary"),
        auto_increment: row.flag("is_identity"),
        default_value: row.text("default_value").unwrap_or_default(),
        comment: row.text("comment").unwrap_or_default(),
        foreign_key,
    }
}

fn clamp_u32(value: Option<i64>) -> u32 {
    value.map_or(0, |v| u32::try_from(v.max(0)).unwrap_or(u32::MAX))
}

fn is_key(table: &TableSchema, column: &Column) -> bool {
    table
        .key_names()
        .any(|k| k.eq_ignore_ascii_case(&column.name))
}

/// Renders an explicit default: quoted literals, numbers, function calls and
/// the CURRENT_* keywords pass through, anything else is quoted.
fn default_literal(text: &str) -> String {
    let upper = text.to_ascii_uppercase();
    let passthrough = text.starts_with('\'')
        || text.parse::<f64>().is_ok()
        || text.contains('(')
        || matches!(
            upper.as_str(),
            "CURRENT_TIMESTAMP" | "CURRENT_DATE" | "CURRENT_TIME" | "TRUE" | "FALSE"
        );
    if passthrough {
        text.to_string()
    } else {
        format!("'{}'", text.replace('\'', "''"))
    }
}
