//! Table and column metadata.
//!
//! These are plain values: built by hand to describe a desired table, or read
//! back from a database catalog by a provider. Both sides meet in
//! [`Provider::alter_table_sql`](crate::provider::Provider::alter_table_sql).

use serde::{Deserialize, Serialize};

use crate::error::{DalError, Result};

/// A foreign key reference carried by a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    /// Constraint name.
    pub name: String,
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub column: String,
}

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// 1-based physical position.
    pub ordinal: u32,
    /// Type exactly as the catalog reports it (`varchar(50)`, `int4`, ...).
    pub column_type: String,
    /// Normalized type name (`varchar`, `int`, ...).
    pub data_type: String,
    /// Character/binary length, 0 when unspecified.
    pub length: u32,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Whether the column is part of the primary key.
    pub is_key: bool,
    /// Whether the column is filled by the database.
    pub auto_increment: bool,
    /// Default literal; empty means "use the provider default".
    pub default_value: String,
    /// Column comment.
    pub comment: String,
    /// Foreign key, if the catalog reported one.
    pub foreign_key: Option<ForeignKeyRef>,
}

impl Default for Column {
    fn default() -> Self {
        Self {
            name: String::new(),
            ordinal: 0,
            column_type: String::new(),
            data_type: String::new(),
            length: 0,
            nullable: true,
            is_key: false,
            auto_increment: false,
            default_value: String::new(),
            comment: String::new(),
            foreign_key: None,
        }
    }
}

impl Column {
    /// Creates a nullable column; the raw type starts out equal to the data type.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into().to_lowercase();
        Self {
            name: name.into(),
            column_type: data_type.clone(),
            data_type,
            ..Self::default()
        }
    }

    /// Sets the length.
    #[must_use]
    pub fn length(mut self, length: u32) -> Self {
        self.length = length;
        self
    }

    /// Overrides the raw catalog type.
    #[must_use]
    pub fn column_type(mut self, column_type: impl Into<String>) -> Self {
        self.column_type = column_type.into();
        self
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Marks the column as primary key (and NOT NULL).
    #[must_use]
    pub fn key(mut self) -> Self {
        self.is_key = true;
        self.nullable = false;
        self
    }

    /// Marks the column auto-increment.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Sets the default literal.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = value.into();
        self
    }

    /// Sets the comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Returns whether the column is textual or binary and thus carries a length.
    #[must_use]
    pub fn is_sized(&self) -> bool {
        matches!(
            self.data_type.as_str(),
            "char" | "varchar" | "binary" | "varbinary" | "bpchar" | "character" | "character varying"
        )
    }
}

/// A table: name, owning schema and ordered columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Owning schema/catalog name.
    pub schema: String,
    /// Comma-joined key column names.
    pub keys: String,
    /// Columns in physical order.
    pub columns: Vec<Column>,
}

impl TableSchema {
    /// Creates an empty table schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the owning schema.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Appends a column, assigning the next ordinal and recording it as a key
    /// when flagged.
    #[must_use]
    pub fn column(mut self, mut column: Column) -> Self {
        column.ordinal = u32::try_from(self.columns.len() + 1).unwrap_or(u32::MAX);
        if column.is_key && !self.key_names().any(|k| k.eq_ignore_ascii_case(&column.name)) {
            if self.keys.is_empty() {
                self.keys = column.name.clone();
            } else {
                self.keys = format!("{},{}", self.keys, column.name);
            }
        }
        self.columns.push(column);
        self
    }

    /// Key column names, in declaration order.
    pub fn key_names(&self) -> impl Iterator<Item = &str> {
        self.keys.split(',').map(str::trim).filter(|k| !k.is_empty())
    }

    /// Columns listed in the key list.
    #[must_use]
    pub fn key_columns(&self) -> Vec<&Column> {
        self.key_names().filter_map(|k| self.get_column(k)).collect()
    }

    /// Gets a column by case-insensitive name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// The auto-increment column, if there is one.
    #[must_use]
    pub fn identity_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.auto_increment)
    }

    /// Columns sorted by ordinal position.
    #[must_use]
    pub fn ordered_columns(&self) -> Vec<&Column> {
        let mut columns: Vec<&Column> = self.columns.iter().collect();
        columns.sort_by_key(|c| c.ordinal);
        columns
    }

    /// Checks that every key name matches a column.
    pub fn validate(&self) -> Result<()> {
        for key in self.key_names() {
            if self.get_column(key).is_none() {
                return Err(DalError::InvalidSchema(format!(
                    "key '{key}' of table '{}' matches no column",
                    self.name
                )));
            }
        }
        Ok(())
    }
}
