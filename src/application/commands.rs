use crate::application::auth::{AuthGate, AuthenticatedUser};
use crate::application::bootstrap::bootstrap_workspace;
use crate::application::category_reconciler::{ReconcileError, ReconcileReport};
use crate::application::kanban::KanbanService;
use crate::application::pomodoro::PomodoroService;
use crate::domain::models::{
    BoardColumn, DesiredState, KanbanCard, KanbanCardPatch, KanbanProject, NewKanbanCard,
    NewPomodoroSession, PomodoroSession, PomodoroSettings,
};
use crate::infrastructure::access_grant_store::SqliteAccessGrantStore;
use crate::infrastructure::category_repository::SqliteCategoryRepository;
use crate::infrastructure::config::{read_access_token_ttl_minutes, read_default_settings};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::interval_settings_repository::SqliteIntervalSettingsRepository;
use crate::infrastructure::kanban_repository::SqliteKanbanRepository;
use crate::infrastructure::session_repository::SqlitePomodoroSessionRepository;
use chrono::Utc;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

type SqlitePomodoroService = PomodoroService<
    SqliteCategoryRepository,
    SqliteIntervalSettingsRepository,
    SqlitePomodoroSessionRepository,
>;

pub struct AppState {
    logs_dir: PathBuf,
    pomodoro: SqlitePomodoroService,
    kanban: KanbanService<SqliteKanbanRepository>,
    auth: AuthGate<SqliteAccessGrantStore>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let defaults = read_default_settings(&bootstrap.config_dir)?;
        let token_ttl_minutes = read_access_token_ttl_minutes(&bootstrap.config_dir)?;

        let pomodoro = PomodoroService::new(
            Arc::new(SqliteCategoryRepository::new(&bootstrap.database_path)),
            Arc::new(SqliteIntervalSettingsRepository::new(&bootstrap.database_path)),
            Arc::new(SqlitePomodoroSessionRepository::new(&bootstrap.database_path)),
        )
        .with_defaults(defaults);
        let kanban = KanbanService::new(Arc::new(SqliteKanbanRepository::new(
            &bootstrap.database_path,
        )));
        let auth = AuthGate::new(
            Arc::new(SqliteAccessGrantStore::new(&bootstrap.database_path)),
            token_ttl_minutes,
        );

        Ok(Self {
            logs_dir: bootstrap.logs_dir,
            pomodoro,
            kanban,
            auth,
            log_guard: Mutex::new(()),
        })
    }

    pub fn authenticate(&self, token: Option<&str>) -> Result<AuthenticatedUser, InfraError> {
        self.auth.authenticate(token)
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> CommandErrorResponse {
        self.log_error(command, &error.to_string());
        CommandErrorResponse {
            success: false,
            error: error.to_string(),
            kind: error.kind().to_string(),
        }
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CommandErrorResponse {
    pub success: bool,
    pub error: String,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTokenResponse {
    pub token: String,
    pub user_id: String,
    pub expires_at: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GetSettingsResponse {
    pub success: bool,
    pub settings: PomodoroSettings,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsResponse {
    pub success: bool,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failed_category_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl UpdateSettingsResponse {
    fn from_report(report: &ReconcileReport, error: Option<String>) -> Self {
        let failed = !report.failures.is_empty();
        Self {
            success: !failed,
            inserted: report.inserted.len(),
            updated: report.updated.len(),
            deleted: report.deleted.len(),
            skipped: report.skipped,
            failed_category_ids: report.failed_category_ids(),
            error,
            kind: failed.then(|| "partial_failure".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: String,
    pub category_id: String,
    pub duration: u32,
    pub completed_at: String,
    pub date: String,
}

impl From<PomodoroSession> for SessionResponse {
    fn from(session: PomodoroSession) -> Self {
        Self {
            id: session.id,
            category_id: session.category_id,
            duration: session.duration_minutes,
            completed_at: session.completed_at.to_rfc3339(),
            date: session.session_date,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AddSessionResponse {
    pub success: bool,
    pub session: SessionResponse,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ListSessionsResponse {
    pub success: bool,
    pub sessions: Vec<SessionResponse>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ListProjectsResponse {
    pub success: bool,
    pub projects: Vec<KanbanProject>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProjectResponse {
    pub success: bool,
    pub project: KanbanProject,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BoardResponse {
    pub success: bool,
    pub columns: Vec<BoardColumn>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CardResponse {
    pub success: bool,
    pub card: KanbanCard,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DeletedResponse {
    pub success: bool,
}

pub fn issue_token_impl(
    state: &AppState,
    user_id: String,
) -> Result<IssueTokenResponse, InfraError> {
    let grant = state.auth.issue(&user_id)?;
    state.log_info("issue_token", &format!("issued token for user_id={}", grant.user_id));
    Ok(IssueTokenResponse {
        token: grant.token,
        user_id: grant.user_id,
        expires_at: grant.expires_at.to_rfc3339(),
    })
}

pub fn revoke_token_impl(state: &AppState, token: &str) -> Result<bool, InfraError> {
    state.auth.revoke(token)?;
    state.log_info("revoke_token", "revoked access token");
    Ok(true)
}

pub fn get_settings_impl(
    state: &AppState,
    user: &AuthenticatedUser,
) -> Result<GetSettingsResponse, InfraError> {
    let settings = state.pomodoro.load_settings(&user.user_id)?;
    state.log_info(
        "get_settings",
        &format!(
            "user_id={} categories={}",
            user.user_id,
            settings.categories.len()
        ),
    );
    Ok(GetSettingsResponse {
        success: true,
        settings,
    })
}

/// A partial failure is not an error here: the response lists the category
/// ids that did not save so the client can retry with the same payload.
pub fn update_settings_impl(
    state: &AppState,
    user: &AuthenticatedUser,
    desired: DesiredState,
) -> Result<UpdateSettingsResponse, InfraError> {
    match state.pomodoro.update_settings(&user.user_id, &desired) {
        Ok(report) => {
            state.log_info(
                "update_settings",
                &format!(
                    "user_id={} inserted={} updated={} deleted={} skipped={}",
                    user.user_id,
                    report.inserted.len(),
                    report.updated.len(),
                    report.deleted.len(),
                    report.skipped
                ),
            );
            Ok(UpdateSettingsResponse::from_report(&report, None))
        }
        Err(ReconcileError::PartialFailure(report)) => {
            let message = format!(
                "some changes may not have saved: {}",
                report.failed_category_ids().join(", ")
            );
            state.log_error("update_settings", &format!("user_id={} {message}", user.user_id));
            Ok(UpdateSettingsResponse::from_report(&report, Some(message)))
        }
        Err(ReconcileError::Validation(message)) => Err(InfraError::Validation(message)),
        Err(ReconcileError::Storage(error)) => Err(error),
    }
}

pub fn add_session_impl(
    state: &AppState,
    user: &AuthenticatedUser,
    request: NewPomodoroSession,
) -> Result<AddSessionResponse, InfraError> {
    let session = state.pomodoro.add_session(user, request)?;
    state.log_info(
        "add_session",
        &format!("user_id={} session_id={}", user.user_id, session.id),
    );
    Ok(AddSessionResponse {
        success: true,
        session: session.into(),
    })
}

pub fn list_sessions_impl(
    state: &AppState,
    user: &AuthenticatedUser,
) -> Result<ListSessionsResponse, InfraError> {
    let sessions = state.pomodoro.list_sessions(&user.user_id)?;
    Ok(ListSessionsResponse {
        success: true,
        sessions: sessions.into_iter().map(SessionResponse::from).collect(),
    })
}

pub fn list_projects_impl(
    state: &AppState,
    user: &AuthenticatedUser,
) -> Result<ListProjectsResponse, InfraError> {
    Ok(ListProjectsResponse {
        success: true,
        projects: state.kanban.list_projects(user)?,
    })
}

pub fn create_project_impl(
    state: &AppState,
    user: &AuthenticatedUser,
    name: &str,
    color: &str,
) -> Result<ProjectResponse, InfraError> {
    let project = state.kanban.create_project(user, name, color)?;
    state.log_info(
        "create_project",
        &format!("user_id={} project_id={}", user.user_id, project.id),
    );
    Ok(ProjectResponse {
        success: true,
        project,
    })
}

pub fn delete_project_impl(
    state: &AppState,
    user: &AuthenticatedUser,
    project_id: &str,
) -> Result<DeletedResponse, InfraError> {
    state.kanban.delete_project(user, project_id)?;
    state.log_info(
        "delete_project",
        &format!("user_id={} project_id={project_id}", user.user_id),
    );
    Ok(DeletedResponse { success: true })
}

pub fn get_board_impl(state: &AppState, user: &AuthenticatedUser) -> Result<BoardResponse, InfraError> {
    Ok(BoardResponse {
        success: true,
        columns: state.kanban.load_board(user)?,
    })
}

pub fn add_card_impl(
    state: &AppState,
    user: &AuthenticatedUser,
    request: NewKanbanCard,
) -> Result<CardResponse, InfraError> {
    let card = state.kanban.add_card(user, request)?;
    state.log_info(
        "add_card",
        &format!(
            "user_id={} card_id={} column_id={}",
            user.user_id, card.id, card.column_id
        ),
    );
    Ok(CardResponse {
        success: true,
        card,
    })
}

pub fn update_card_impl(
    state: &AppState,
    user: &AuthenticatedUser,
    patch: KanbanCardPatch,
) -> Result<CardResponse, InfraError> {
    let card = state.kanban.update_card(user, patch)?;
    state.log_info(
        "update_card",
        &format!("user_id={} card_id={}", user.user_id, card.id),
    );
    Ok(CardResponse {
        success: true,
        card,
    })
}

pub fn delete_card_impl(
    state: &AppState,
    user: &AuthenticatedUser,
    card_id: &str,
) -> Result<DeletedResponse, InfraError> {
    state.kanban.delete_card(user, card_id)?;
    state.log_info(
        "delete_card",
        &format!("user_id={} card_id={card_id}", user.user_id),
    );
    Ok(DeletedResponse { success: true })
}
