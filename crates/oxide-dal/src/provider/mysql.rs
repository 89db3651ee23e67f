//! MySQL provider.

use super::{DefaultValues, IdentityFetch, Provider};
use crate::schema::{Column, TableSchema};

const TABLES_SQL: &str = "SELECT TABLE_NAME AS name FROM information_schema.TABLES \
WHERE TABLE_SCHEMA = @database AND TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME";

const EXISTS_TABLE_SQL: &str = "SELECT COUNT(*) FROM information_schema.TABLES \
WHERE TABLE_SCHEMA = @database AND TABLE_NAME = @table";

const TABLE_SCHEMA_SQL: &str = "SELECT c.COLUMN_NAME AS name, \
c.ORDINAL_POSITION AS ordinal, \
c.COLUMN_TYPE AS column_type, \
c.DATA_TYPE AS data_type, \
IFNULL(c.CHARACTER_MAXIMUM_LENGTH, 0) AS length, \
c.COLUMN_DEFAULT AS default_value, \
c.COLUMN_COMMENT AS comment, \
(c.EXTRA LIKE '%auto_increment%') AS is_identity, \
(c.IS_NULLABLE = 'YES') AS is_nullable, \
(pk.CONSTRAINT_NAME IS NOT NULL) AS is_primary, \
(fk.CONSTRAINT_NAME IS NOT NULL) AS is_foreign, \
fk.CONSTRAINT_NAME AS foreign_name, \
fk.REFERENCED_TABLE_NAME AS referenced_table, \
fk.REFERENCED_COLUMN_NAME AS referenced_column \
FROM information_schema.COLUMNS c \
LEFT JOIN information_schema.KEY_COLUMN_USAGE pk \
ON pk.TABLE_SCHEMA = c.TABLE_SCHEMA AND pk.TABLE_NAME = c.TABLE_NAME \
AND pk.COLUMN_NAME = c.COLUMN_NAME AND pk.CONSTRAINT_NAME = 'PRIMARY' \
LEFT JOIN information_schema.KEY_COLUMN_USAGE fk \
ON fk.TABLE_SCHEMA = c.TABLE_SCHEMA AND fk.TABLE_NAME = c.TABLE_NAME \
AND fk.COLUMN_NAME = c.COLUMN_NAME AND fk.REFERENCED_TABLE_NAME IS NOT NULL \
WHERE c.TABLE_SCHEMA = @database AND c.TABLE_NAME = @table \
ORDER BY c.ORDINAL_POSITION";

/// MySQL: back-quoted identifiers, display-width integers, `FIRST`/`AFTER`
/// placement and a follow-up `LAST_INSERT_ID()`.
#[derive(Debug, Clone)]
pub struct MySqlProvider {
    defaults: DefaultValues,
}

impl MySqlProvider {
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
                ("mediumint", "'0'"),
                ("decimal", "'0'"),
                ("double", "'0'"),
                ("float", "'0'"),
                ("bit", "0"),
                ("char", "''"),
                ("varchar", "''"),
                ("date", "'1900-01-01'"),
                ("datetime", "'1900-01-01'"),
            ]),
        }
    }
}

impl Default for MySqlProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for MySqlProvider {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn default_values(&self) -> &DefaultValues {
        &self.defaults
    }

    fn backslash_escapes(&self) -> bool {
        true
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
        IdentityFetch::FollowUp("SELECT LAST_INSERT_ID()".to_string())
    }

    fn page_sql(&self, sql: &str, offset: u64, limit: u64) -> String {
        format!("{sql}\nLIMIT {offset},{limit}")
    }

    fn comment_clause(&self, column: &Column) -> String {
        if column.comment.is_empty() {
            String::new()
        } else {
            format!(" COMMENT '{}'", column.comment.replace('\'', "''"))
        }
    }
}
