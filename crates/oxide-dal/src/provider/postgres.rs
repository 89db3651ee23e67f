//! PostgreSQL provider.

use super::{ChangeKind, ColumnChange, DefaultValues, IdentityFetch, Provider};
use crate::schema::{Column, TableSchema};

const TABLES_SQL: &str = "SELECT table_name::text AS name FROM information_schema.tables \
WHERE table_catalog = @database AND table_schema = current_schema() \
AND table_type = 'BASE TABLE' ORDER BY table_name";

const EXISTS_TABLE_SQL: &str = "SELECT COUNT(*) FROM information_schema.tables \
WHERE table_catalog = @database AND table_schema = current_schema() AND table_name = @table";

const TABLE_SCHEMA_SQL: &str = "SELECT c.column_name::text AS name, \
c.ordinal_position::int AS ordinal, \
c.udt_name::text AS column_type, \
c.data_type::text AS data_type, \
COALESCE(c.character_maximum_length, 0)::int AS length, \
c.column_default::text AS default_value, \
COALESCE(d.description, '')::text AS comment, \
(c.is_identity = 'YES' OR COALESCE(c.column_default, '') LIKE 'nextval(%') AS is_identity, \
(c.is_nullable = 'YES') AS is_nullable, \
(pk.constraint_name IS NOT NULL) AS is_primary, \
(fk.constraint_name IS NOT NULL) AS is_foreign, \
fk.constraint_name::text AS foreign_name, \
fk.referenced_table::text AS referenced_table, \
fk.referenced_column::text AS referenced_column \
FROM information_schema.columns c \
LEFT JOIN (SELECT kcu.table_schema, kcu.table_name, kcu.column_name, tc.constraint_name \
FROM information_schema.table_constraints tc \
JOIN information_schema.key_column_usage kcu \
ON kcu.constraint_name = tc.constraint_name AND kcu.table_schema = tc.table_schema \
WHERE tc.constraint_type = 'PRIMARY KEY') pk \
ON pk.table_schema = c.table_schema AND pk.table_name = c.table_name \
AND pk.column_name = c.column_name \
LEFT JOIN (SELECT kcu.table_schema, kcu.table_name, kcu.column_name, tc.constraint_name, \
ccu.table_name AS referenced_table, ccu.column_name AS referenced_column \
FROM information_schema.table_constraints tc \
JOIN information_schema.key_column_usage kcu \
ON kcu.constraint_name = tc.constraint_name AND kcu.table_schema = tc.table_schema \
JOIN information_schema.constraint_column_usage ccu \
ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema \
WHERE tc.constraint_type = 'FOREIGN KEY') fk \
ON fk.table_schema = c.table_schema AND fk.table_name = c.table_name \
AND fk.column_name = c.column_name \
LEFT JOIN pg_catalog.pg_statio_all_tables st \
ON st.schemaname = c.table_schema AND st.relname = c.table_name \
LEFT JOIN pg_catalog.pg_description d \
ON d.objoid = st.relid AND d.objsubid = c.ordinal_position \
WHERE c.table_catalog = @database AND c.table_schema = current_schema() \
AND c.table_name = @table \
ORDER BY c.ordinal_position";

/// PostgreSQL: bare identifiers, native type names, `RETURNING` identity.
///
/// Columns cannot be repositioned, so ALTER ignores the diff's placement.
#[derive(Debug, Clone)]
pub struct PostgresProvider {
    defaults: DefaultValues,
}

impl PostgresProvider {
    /// Creates a provider with the stock default-value map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            defaults: DefaultValues::new(&[
                ("int", "'0'"),
                ("integer", "'0'"),
                ("int2", "'0'"),
                ("int4", "'0'"),
                ("int8", "'0'"),
                ("smallint", "'0'"),
                ("bigint", "'0'"),
                ("numeric", "'0'"),
                ("decimal", "'0'"),
                ("real", "'0'"),
                ("double precision", "'0'"),
                ("char", "''"),
                ("character", "''"),
                ("bpchar", "''"),
                ("varchar", "''"),
                ("character varying", "''"),
                ("text", "''"),
                ("date", "'1900-01-01'"),
                ("timestamp", "'1900-01-01'"),
                ("timestamp without time zone", "'1900-01-01'"),
            ]),
        }
    }
}

impl Default for PostgresProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for PostgresProvider {
    fn name(&self) -> &'static str {
        "postgres"
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
        IdentityFetch::Returning
    }

    fn quote_identifier(&self, name: &str) -> String {
        name.to_string()
    }

    fn positional_placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn auto_increment_keyword(&self) -> &'static str {
        ""
    }

    fn column_type(&self, column: &Column) -> String {
        let data_type = if column.data_type.is_empty() {
            column.column_type.to_ascii_lowercase()
        } else {
            column.data_type.to_ascii_lowercase()
        };
        let sized = |name: &str| {
            if column.length > 0 {
                format!("{name}({})", column.length)
            } else {
                name.to_string()
            }
        };
        match data_type.as_str() {
            "int" | "integer" | "int4" | "mediumint" | "serial" => {
                if column.auto_increment { "SERIAL" } else { "INTEGER" }.to_string()
            }
            "bigint" | "int8" | "bigserial" => {
                if column.auto_increment { "BIGSERIAL" } else { "BIGINT" }.to_string()
            }
            "smallint" | "int2" | "tinyint" => "SMALLINT".to_string(),
            "varchar" | "character varying" => sized("VARCHAR"),
            "char" | "character" | "bpchar" => sized("CHAR"),
            "bool" | "boolean" | "bit" => "BOOLEAN".to_string(),
            "float8" | "double" | "double precision" => "DOUBLE PRECISION".to_string(),
            "float4" | "float" | "real" => "REAL".to_string(),
            "datetime" | "timestamp" | "timestamp without time zone" => "TIMESTAMP".to_string(),
            "timestamptz" | "timestamp with time zone" => "TIMESTAMPTZ".to_string(),
            "binary" | "varbinary" | "blob" | "bytea" => "BYTEA".to_string(),
            other => other.to_ascii_uppercase(),
        }
    }

    fn alter_clause(&self, change: &ColumnChange<'_>) -> String {
        match change.kind {
            ChangeKind::Add => format!("ADD COLUMN {}", self.column_definition(change.column)),
            ChangeKind::Change => format!(
                "ALTER COLUMN {} TYPE {}",
                self.quote_identifier(&change.column.name),
                self.column_type(change.column)
            ),
        }
    }
}
