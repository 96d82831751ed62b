use crate::domain::models::AccessGrant;
use crate::infrastructure::access_grant_store::AccessGrantStore;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

const VALIDITY_LEEWAY_SECONDS: i64 = 60;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

/// Resolves callers from access tokens. Every authenticated command goes
/// through [`AuthGate::authenticate`] before its body runs.
pub struct AuthGate<S>
where
    S: AccessGrantStore,
{
    grant_store: Arc<S>,
    token_ttl: Duration,
    now_provider: NowProvider,
}

impl<S> AuthGate<S>
where
    S: AccessGrantStore,
{
    pub fn new(grant_store: Arc<S>, token_ttl_minutes: i64) -> Self {
        Self {
            grant_store,
            token_ttl: Duration::minutes(token_ttl_minutes.max(1)),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn issue(&self, user_id: &str) -> Result<AccessGrant, InfraError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(InfraError::Validation("user id must not be empty".to_string()));
        }

        let issued_at = (self.now_provider)();
        let grant = AccessGrant {
            token: format!("pbt_{}", uuid::Uuid::new_v4().simple()),
            user_id: user_id.to_string(),
            issued_at,
            expires_at: issued_at + self.token_ttl,
        };
        self.grant_store.save(&grant)?;
        Ok(grant)
    }

    pub fn authenticate(&self, token: Option<&str>) -> Result<AuthenticatedUser, InfraError> {
        let Some(token) = token.map(str::trim).filter(|value| !value.is_empty()) else {
            return Err(InfraError::Unauthorized("access token is required".to_string()));
        };

        let Some(grant) = self.grant_store.find_by_token(token)? else {
            return Err(InfraError::Unauthorized("unknown access token".to_string()));
        };

        if !grant.is_valid_at((self.now_provider)(), VALIDITY_LEEWAY_SECONDS) {
            self.grant_store.revoke(token)?;
            return Err(InfraError::Unauthorized("access token expired".to_string()));
        }

        Ok(AuthenticatedUser {
            user_id: grant.user_id,
        })
    }

    pub fn revoke(&self, token: &str) -> Result<(), InfraError> {
        self.grant_store.revoke(token.trim())
    }
}

pub fn ensure_owner(owner_user_id: &str, user: &AuthenticatedUser) -> Result<(), InfraError> {
    if owner_user_id != user.user_id {
        return Err(InfraError::Forbidden(
            "resource belongs to another user".to_string(),
        ));
    }
    Ok(())
}
