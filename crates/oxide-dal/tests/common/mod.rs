#![allow(dead_code)]

use oxide_dal::{
    Column, Connection, ConnectionSettings, Connector, ProviderRegistry, Record, SqlxConnector,
    TableSchema,
};

/// Opens a fresh in-memory SQLite database.
pub async fn sqlite() -> Box<dyn Connection> {
    SqlxConnector::new(ProviderRegistry::with_defaults())
        .connect(&ConnectionSettings::new("sqlite::memory:", "sqlite"))
        .await
        .unwrap_or_else(|e| panic!("Failed to open in-memory SQLite: {e}"))
}

pub fn notes_v1() -> TableSchema {
    TableSchema::new("notes")
        .column(Column::new("id", "integer").key().auto_increment())
        .column(Column::new("title", "varchar").length(60).not_null())
}

pub fn notes_v2() -> TableSchema {
    notes_v1()
        .column(Column::new("body", "text"))
        .column(Column::new("priority", "integer"))
}

pub async fn count(conn: &mut dyn Connection, sql: &str) -> i64 {
    let value = conn
        .scalar(sql, &Record::new())
        .await
        .unwrap_or_else(|e| panic!("Count failed: {sql}\nError: {e}"));
    value
        .as_i64()
        .unwrap_or_else(|| panic!("Expected an integer, got {value:?}"))
}
