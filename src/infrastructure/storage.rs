use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = Connection::open(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

pub(crate) fn open_connection(path: &Path) -> Result<Connection, InfraError> {
    Connection::open(path).map_err(InfraError::from)
}

pub(crate) fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| InfraError::Storage(format!("invalid {column} '{raw}': {error}")))
}
