use crate::application::auth::{ensure_owner, AuthenticatedUser};
use crate::application::category_reconciler::{
    CategorySetReconciler, ReconcileError, ReconcileReport,
};
use crate::domain::models::{DesiredState, NewPomodoroSession, PomodoroSession, PomodoroSettings};
use crate::infrastructure::category_repository::CategoryRepository;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::interval_settings_repository::IntervalSettingsRepository;
use crate::infrastructure::session_repository::PomodoroSessionRepository;
use chrono::{DateTime, Utc};
use std::sync::Arc;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct PomodoroService<C, S, P>
where
    C: CategoryRepository,
    S: IntervalSettingsRepository,
    P: PomodoroSessionRepository,
{
    category_repository: Arc<C>,
    interval_repository: Arc<S>,
    session_repository: Arc<P>,
    reconciler: CategorySetReconciler<C, S>,
    defaults: PomodoroSettings,
    now_provider: NowProvider,
}

impl<C, S, P> PomodoroService<C, S, P>
where
    C: CategoryRepository,
    S: IntervalSettingsRepository,
    P: PomodoroSessionRepository,
{
    pub fn new(
        category_repository: Arc<C>,
        interval_repository: Arc<S>,
        session_repository: Arc<P>,
    ) -> Self {
        let reconciler =
            CategorySetReconciler::new(Arc::clone(&category_repository), Arc::clone(&interval_repository));
        Self {
            category_repository,
            interval_repository,
            session_repository,
            reconciler,
            defaults: PomodoroSettings::default(),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_defaults(mut self, defaults: PomodoroSettings) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.reconciler = CategorySetReconciler::new(
            Arc::clone(&self.category_repository),
            Arc::clone(&self.interval_repository),
        )
        .with_now_provider(Arc::clone(&now_provider));
        self.now_provider = now_provider;
        self
    }

    /// Stored settings, with configured defaults standing in for a user who
    /// has no categories or no interval row yet.
    pub fn load_settings(&self, user_id: &str) -> Result<PomodoroSettings, InfraError> {
        let categories = self.category_repository.list_by_user(user_id)?;
        let intervals = self.interval_repository.get(user_id)?;

        Ok(PomodoroSettings {
            categories: if categories.is_empty() {
                self.defaults.categories.clone()
            } else {
                categories
            },
            intervals: intervals.unwrap_or(self.defaults.intervals),
        })
    }

    pub fn update_settings(
        &self,
        user_id: &str,
        desired: &DesiredState,
    ) -> Result<ReconcileReport, ReconcileError> {
        self.reconciler.reconcile(user_id, desired)
    }

    pub fn add_session(
        &self,
        user: &AuthenticatedUser,
        request: NewPomodoroSession,
    ) -> Result<PomodoroSession, InfraError> {
        let category_id = request.category_id.trim();
        if category_id.is_empty() || request.duration_minutes == 0 {
            return Err(InfraError::Validation(
                "categoryId and durationMinutes are required".to_string(),
            ));
        }

        let owned = self.category_repository.find(category_id)?;
        if let Some(owned) = &owned {
            ensure_owner(&owned.user_id, user)?;
        }

        let now = (self.now_provider)();
        let category_name = request
            .category_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .or_else(|| owned.map(|owned| owned.category.name))
            .unwrap_or_default();

        let session = PomodoroSession {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.user_id.clone(),
            category_id: category_id.to_string(),
            category_name,
            duration_minutes: request.duration_minutes,
            completed_at: request.completed_at.unwrap_or(now),
            session_date: request
                .session_date
                .map(|date| date.trim().to_string())
                .filter(|date| !date.is_empty())
                .unwrap_or_else(|| now.date_naive().format("%Y-%m-%d").to_string()),
        };
        session.validate().map_err(InfraError::Validation)?;

        self.session_repository.insert(&session)?;
        Ok(session)
    }

    pub fn list_sessions(&self, user_id: &str) -> Result<Vec<PomodoroSession>, InfraError> {
        self.session_repository.list_by_user(user_id)
    }
}
