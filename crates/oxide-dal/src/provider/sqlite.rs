//! SQLite provider.

use super::{widened_type, ColumnChange, DefaultValues, IdentityFetch, Provider};
use crate::schema::{Column, TableSchema};

const TABLES_SQL: &str = "SELECT name FROM sqlite_master \
WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

const EXISTS_TABLE_SQL: &str = "SELECT COUNT(*) FROM sqlite_master \
WHERE type = 'table' AND name = @table";

const TABLE_SCHEMA_SQL: &str = "SELECT p.name AS name, \
p.cid + 1 AS ordinal, \
lower(p.type) AS column_type, \
lower(CASE WHEN instr(p.type, '(') > 0 \
THEN substr(p.type, 1, instr(p.type, '(') - 1) ELSE p.type END) AS data_type, \
CASE WHEN instr(p.type, '(') > 0 \
THEN CAST(substr(p.type, instr(p.type, '(') + 1) AS INTEGER) ELSE 0 END AS length, \
p.dflt_value AS default_value, \
'' AS comment, \
(p.pk > 0 AND lower(p.type) = 'integer' AND EXISTS (SELECT 1 FROM sqlite_master m \
WHERE m.type = 'table' AND m.name = @table \
AND upper(m.sql) LIKE '%AUTOINCREMENT%')) AS is_identity, \
(p.\"notnull\" = 0 AND p.pk = 0) AS is_nullable, \
(p.pk > 0) AS is_primary, \
(f.\"table\" IS NOT NULL) AS is_foreign, \
CASE WHEN f.id IS NULL THEN NULL ELSE 'fk_' || @table || '_' || f.id END AS foreign_name, \
f.\"table\" AS referenced_table, \
f.\"to\" AS referenced_column \
FROM pragma_table_info(@table) p \
LEFT JOIN pragma_foreign_key_list(@table) f ON f.\"from\" = p.name \
ORDER BY p.cid";

/// SQLite: add-only alteration, `||` concatenation and a follow-up
/// `last_insert_rowid()`.
///
/// ALTER TABLE here can only append columns, so type changes found by the
/// diff are left as they are and every added column gets its own statement.
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    defaults: DefaultValues,
}

impl SqliteProvider {
    /// Creates a provider with the stock default-value map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            defaults: DefaultValues::new(&[
                ("int", "'0'"),
                ("integer", "'0'"),
                ("bigint", "'0'"),
                ("smallint", "'0'"),
                ("tinyint", "'0'"),
                ("real", "'0'"),
                ("numeric", "'0'"),
                ("char", "''"),
                ("varchar", "''"),
                ("text", "''"),
                ("date", "'1900-01-01'"),
                ("datetime", "'1900-01-01'"),
            ]),
        }
    }
}

impl Default for SqliteProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for SqliteProvider {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn default_values(&self) -> &DefaultValues {
        &self.defaults
    }

    fn tables_sql(&self) -> &'static str {
        TABLES_SQL
    }

    fn table_schema_sql(&self) -> &'static str {
        TABLE_SCHEMA_SQL
    }

    fn exists_table_sql(&self) -> &'static str {
        EXISTS_TABLE_SQL
    }

    fn last_identity(&self, _table: &TableSchema, _column: &Column) -> IdentityFetch {
        IdentityFetch::FollowUp("SELECT last_insert_rowid()".to_string())
    }

    fn contains_pattern(&self, placeholder: &str) -> String {
        format!("'%' || {placeholder} || '%'")
    }

    fn supports_column_change(&self) -> bool {
        false
    }

    fn column_type(&self, column: &Column) -> String {
        // AUTOINCREMENT is only accepted on a column declared exactly INTEGER.
        if column.auto_increment {
            return "INTEGER".to_string();
        }
        widened_type(column)
    }

    fn auto_increment_keyword(&self) -> &'static str {
        " PRIMARY KEY AUTOINCREMENT"
    }

    fn identity_is_inline_key(&self) -> bool {
        true
    }

    fn alter_clause(&self, change: &ColumnChange<'_>) -> String {
        format!("ADD COLUMN {}", self.column_definition(change.column))
    }

    fn alter_statement(&self, table: &TableSchema, clauses: Vec<String>) -> String {
        let head = format!("ALTER TABLE {}", self.quote_identifier(&table.name));
        clauses
            .iter()
            .map(|clause| format!("{head} {clause}"))
            .collect::<Vec<_>>()
            .join(";\n")
    }
}
