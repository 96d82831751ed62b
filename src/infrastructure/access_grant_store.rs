use crate::domain::models::AccessGrant;
use crate::infrastructure::error::{lock_poisoned, InfraError};
use crate::infrastructure::storage::{open_connection, parse_timestamp};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait AccessGrantStore: Send + Sync {
    fn save(&self, grant: &AccessGrant) -> Result<(), InfraError>;
    fn find_by_token(&self, token: &str) -> Result<Option<AccessGrant>, InfraError>;
    fn revoke(&self, token: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteAccessGrantStore {
    db_path: PathBuf,
}

impl SqliteAccessGrantStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }
}

impl AccessGrantStore for SqliteAccessGrantStore {
    fn save(&self, grant: &AccessGrant) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO access_grants (token, user_id, issued_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(token) DO UPDATE SET
               user_id = excluded.user_id,
               issued_at = excluded.issued_at,
               expires_at = excluded.expires_at",
            params![
                grant.token,
                grant.user_id,
                grant.issued_at.to_rfc3339(),
                grant.expires_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn find_by_token(&self, token: &str) -> Result<Option<AccessGrant>, InfraError> {
        let connection = self.connect()?;
        let row: Option<(String, String, String, String)> = connection
            .query_row(
                "SELECT token, user_id, issued_at, expires_at FROM access_grants WHERE token = ?1",
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((token, user_id, issued_at, expires_at)) = row else {
            return Ok(None);
        };

        Ok(Some(AccessGrant {
            token,
            user_id,
            issued_at: parse_timestamp(&issued_at, "access_grants.issued_at")?,
            expires_at: parse_timestamp(&expires_at, "access_grants.expires_at")?,
        }))
    }

    fn revoke(&self, token: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute("DELETE FROM access_grants WHERE token = ?1", params![token])?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAccessGrantStore {
    grants: Mutex<HashMap<String, AccessGrant>>,
}

impl AccessGrantStore for InMemoryAccessGrantStore {
    fn save(&self, grant: &AccessGrant) -> Result<(), InfraError> {
        let mut grants = self
            .grants
            .lock()
            .map_err(|error| lock_poisoned("access grants", error))?;
        grants.insert(grant.token.clone(), grant.clone());
        Ok(())
    }

    fn find_by_token(&self, token: &str) -> Result<Option<AccessGrant>, InfraError> {
        let grants = self
            .grants
            .lock()
            .map_err(|error| lock_poisoned("access grants", error))?;
        Ok(grants.get(token).cloned())
    }

    fn revoke(&self, token: &str) -> Result<(), InfraError> {
        let mut grants = self
            .grants
            .lock()
            .map_err(|error| lock_poisoned("access grants", error))?;
        grants.remove(token);
        Ok(())
    }
}
