use crate::domain::models::IntervalSettings;
use crate::infrastructure::error::{lock_poisoned, InfraError};
use crate::infrastructure::storage::open_connection;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait IntervalSettingsRepository: Send + Sync {
    fn get(&self, user_id: &str) -> Result<Option<IntervalSettings>, InfraError>;
    fn upsert(
        &self,
        user_id: &str,
        settings: &IntervalSettings,
        updated_at: DateTime<Utc>,
    ) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteIntervalSettingsRepository {
    db_path: PathBuf,
}

impl SqliteIntervalSettingsRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }
}

impl IntervalSettingsRepository for SqliteIntervalSettingsRepository {
    fn get(&self, user_id: &str) -> Result<Option<IntervalSettings>, InfraError> {
        let connection = self.connect()?;
        let settings = connection
            .query_row(
                "SELECT short_break_minutes, long_break_minutes, cycles_until_long_break
                 FROM pomodoro_settings WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(IntervalSettings {
                        short_break_minutes: row.get(0)?,
                        long_break_minutes: row.get(1)?,
                        cycles_until_long_break: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(settings)
    }

    fn upsert(
        &self,
        user_id: &str,
        settings: &IntervalSettings,
        updated_at: DateTime<Utc>,
    ) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO pomodoro_settings
               (user_id, short_break_minutes, long_break_minutes, cycles_until_long_break, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
               short_break_minutes = excluded.short_break_minutes,
               long_break_minutes = excluded.long_break_minutes,
               cycles_until_long_break = excluded.cycles_until_long_break,
               updated_at = excluded.updated_at",
            params![
                user_id,
                settings.short_break_minutes,
                settings.long_break_minutes,
                settings.cycles_until_long_break,
                updated_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryIntervalSettingsRepository {
    settings: Mutex<HashMap<String, IntervalSettings>>,
}

impl IntervalSettingsRepository for InMemoryIntervalSettingsRepository {
    fn get(&self, user_id: &str) -> Result<Option<IntervalSettings>, InfraError> {
        let settings = self
            .settings
            .lock()
            .map_err(|error| lock_poisoned("interval settings", error))?;
        Ok(settings.get(user_id).copied())
    }

    fn upsert(
        &self,
        user_id: &str,
        settings: &IntervalSettings,
        _updated_at: DateTime<Utc>,
    ) -> Result<(), InfraError> {
        let mut stored = self
            .settings
            .lock()
            .map_err(|error| lock_poisoned("interval settings", error))?;
        stored.insert(user_id.to_string(), *settings);
        Ok(())
    }
}
