use crate::domain::models::{Category, CategoryInput, DesiredState};
use crate::infrastructure::category_repository::CategoryRepository;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::interval_settings_repository::IntervalSettingsRepository;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CategoryOperation {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryFailure {
    pub category_id: String,
    pub operation: CategoryOperation,
    pub message: String,
}

/// What a reconciliation pass changed, per category id.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub inserted: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    pub skipped: usize,
    pub failures: Vec<CategoryFailure>,
}

impl ReconcileReport {
    pub fn failed_category_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.failures
            .iter()
            .filter(|failure| seen.insert(failure.category_id.as_str()))
            .map(|failure| failure.category_id.clone())
            .collect()
    }

    fn record_failure(&mut self, category_id: &str, operation: CategoryOperation, error: &InfraError) {
        tracing::warn!(
            category_id,
            operation = ?operation,
            error = %error,
            "category change failed"
        );
        self.failures.push(CategoryFailure {
            category_id: category_id.to_string(),
            operation,
            message: error.to_string(),
        });
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("invalid settings: {0}")]
    Validation(String),
    #[error("failed to save settings: {0}")]
    Storage(#[source] InfraError),
    /// Some category changes were applied and some were not; persisted state
    /// may differ from both the previous and the desired state.
    #[error("{} category change(s) failed; some changes may not have saved", .0.failures.len())]
    PartialFailure(ReconcileReport),
}

impl ReconcileError {
    pub fn report(&self) -> Option<&ReconcileReport> {
        match self {
            Self::PartialFailure(report) => Some(report),
            _ => None,
        }
    }
}

pub struct CategorySetReconciler<C, S>
where
    C: CategoryRepository,
    S: IntervalSettingsRepository,
{
    category_repository: Arc<C>,
    interval_repository: Arc<S>,
    now_provider: NowProvider,
}

impl<C, S> CategorySetReconciler<C, S>
where
    C: CategoryRepository,
    S: IntervalSettingsRepository,
{
    pub fn new(category_repository: Arc<C>, interval_repository: Arc<S>) -> Self {
        Self {
            category_repository,
            interval_repository,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    /// Converges the user's stored categories and interval settings to
    /// `desired`, which must be the complete set rather than a diff.
    ///
    /// The interval upsert runs first and is fatal on failure. Category
    /// deletes, updates and inserts run afterwards; their failures are
    /// collected and returned as [`ReconcileError::PartialFailure`].
    pub fn reconcile(
        &self,
        user_id: &str,
        desired: &DesiredState,
    ) -> Result<ReconcileReport, ReconcileError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(ReconcileError::Validation("user id must not be empty".to_string()));
        }
        desired
            .intervals
            .validate()
            .map_err(ReconcileError::Validation)?;

        self.interval_repository
            .upsert(user_id, &desired.intervals, (self.now_provider)())
            .map_err(ReconcileError::Storage)?;

        let persisted = self
            .category_repository
            .list_by_user(user_id)
            .map_err(ReconcileError::Storage)?;
        let mut known_ids = persisted
            .into_iter()
            .map(|category| category.id)
            .collect::<HashSet<_>>();

        let mut report = ReconcileReport::default();
        let wanted = desired
            .categories
            .iter()
            .filter_map(|input| {
                let normalized = CategoryInput::normalize(input);
                if normalized.is_none() {
                    report.skipped += 1;
                }
                normalized
            })
            .collect::<Vec<Category>>();

        let mut to_delete = {
            let wanted_ids = wanted
                .iter()
                .map(|category| category.id.as_str())
                .collect::<HashSet<_>>();
            known_ids
                .iter()
                .filter(|id| !wanted_ids.contains(id.as_str()))
                .cloned()
                .collect::<Vec<_>>()
        };
        to_delete.sort();

        if !to_delete.is_empty() {
            match self.category_repository.delete_many(user_id, &to_delete) {
                Ok(()) => {
                    for id in &to_delete {
                        known_ids.remove(id);
                    }
                    report.deleted = to_delete;
                }
                Err(error) => {
                    for id in &to_delete {
                        report.record_failure(id, CategoryOperation::Delete, &error);
                    }
                }
            }
        }

        for category in wanted {
            if known_ids.contains(&category.id) {
                match self
                    .category_repository
                    .update(&category.id, user_id, &category.fields())
                {
                    Ok(()) => report.updated.push(category.id),
                    Err(error) => {
                        report.record_failure(&category.id, CategoryOperation::Update, &error)
                    }
                }
            } else {
                match self.category_repository.insert(user_id, &category) {
                    Ok(()) => {
                        known_ids.insert(category.id.clone());
                        report.inserted.push(category.id);
                    }
                    Err(error) => {
                        report.record_failure(&category.id, CategoryOperation::Insert, &error)
                    }
                }
            }
        }

        tracing::info!(
            user_id,
            inserted = report.inserted.len(),
            updated = report.updated.len(),
            deleted = report.deleted.len(),
            skipped = report.skipped,
            failed = report.failures.len(),
            "reconciled pomodoro categories"
        );

        if report.failures.is_empty() {
            Ok(report)
        } else {
            Err(ReconcileError::PartialFailure(report))
        }
    }
}
