use crate::domain::models::PomodoroSession;
use crate::infrastructure::error::{lock_poisoned, InfraError};
use crate::infrastructure::storage::{open_connection, parse_timestamp};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait PomodoroSessionRepository: Send + Sync {
    fn insert(&self, session: &PomodoroSession) -> Result<(), InfraError>;
    /// Sessions owned by `user_id`, most recently completed first.
    fn list_by_user(&self, user_id: &str) -> Result<Vec<PomodoroSession>, InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqlitePomodoroSessionRepository {
    db_path: PathBuf,
}

impl SqlitePomodoroSessionRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }
}

impl PomodoroSessionRepository for SqlitePomodoroSessionRepository {
    fn insert(&self, session: &PomodoroSession) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO pomodoro_sessions
               (id, user_id, category_id, category_name, duration_minutes, completed_at, session_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.id,
                session.user_id,
                session.category_id,
                session.category_name,
                session.duration_minutes,
                session.completed_at.to_rfc3339(),
                session.session_date
            ],
        )?;
        Ok(())
    }

    fn list_by_user(&self, user_id: &str) -> Result<Vec<PomodoroSession>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, user_id, category_id, category_name, duration_minutes, completed_at, session_date
             FROM pomodoro_sessions
             WHERE user_id = ?1
             ORDER BY completed_at DESC, rowid DESC",
        )?;
        let rows = statement.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, u32>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (id, user_id, category_id, category_name, duration_minutes, completed_at, session_date) =
                row?;
            sessions.push(PomodoroSession {
                id,
                user_id,
                category_id,
                category_name,
                duration_minutes,
                completed_at: parse_timestamp(&completed_at, "pomodoro_sessions.completed_at")?,
                session_date,
            });
        }
        Ok(sessions)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPomodoroSessionRepository {
    sessions: Mutex<Vec<PomodoroSession>>,
}

impl PomodoroSessionRepository for InMemoryPomodoroSessionRepository {
    fn insert(&self, session: &PomodoroSession) -> Result<(), InfraError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|error| lock_poisoned("session repository", error))?;
        if sessions.iter().any(|existing| existing.id == session.id) {
            return Err(InfraError::Storage(format!(
                "duplicate key: session {} already exists",
                session.id
            )));
        }
        sessions.push(session.clone());
        Ok(())
    }

    fn list_by_user(&self, user_id: &str) -> Result<Vec<PomodoroSession>, InfraError> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|error| lock_poisoned("session repository", error))?;
        let mut owned = sessions
            .iter()
            .filter(|session| session.user_id == user_id)
            .cloned()
            .collect::<Vec<_>>();
        owned.sort_by(|left, right| right.completed_at.cmp(&left.completed_at));
        Ok(owned)
    }
}
