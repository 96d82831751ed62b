pub mod application;
pub mod domain;
pub mod infrastructure;

use application::bootstrap::bootstrap_workspace;
use application::commands::{
    add_card_impl, add_session_impl, create_project_impl, delete_card_impl, delete_project_impl,
    get_board_impl, get_settings_impl, issue_token_impl, list_projects_impl, list_sessions_impl,
    revoke_token_impl, update_card_impl, update_settings_impl, AppState,
};
use clap::{Parser, Subcommand};
use domain::models::{DesiredState, KanbanCardPatch, NewKanbanCard, NewPomodoroSession};
use infrastructure::error::InfraError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "pomoboard")]
#[command(about = "Pomodoro settings, sessions and kanban board over a local workspace")]
struct Cli {
    /// Workspace root holding config/, state/ and logs/ (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Access token returned by issue-token
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check that the workspace answers
    Ping,

    /// Create the workspace layout, default config files and database
    Bootstrap,

    /// Issue an access token for a user
    IssueToken {
        /// User the token resolves to
        user_id: String,
    },

    /// Revoke the token passed with --token
    RevokeToken,

    /// Show the pomodoro categories and intervals
    GetSettings,

    /// Replace the pomodoro settings with a full snapshot
    UpdateSettings {
        /// JSON document; read from stdin when omitted
        payload: Option<String>,
    },

    /// Record a completed pomodoro session
    AddSession {
        /// JSON document; read from stdin when omitted
        payload: Option<String>,
    },

    /// List completed sessions, newest first
    ListSessions,

    /// List kanban projects
    ListProjects,

    /// Create a kanban project
    CreateProject { name: String, color: String },

    /// Delete a kanban project
    DeleteProject { project_id: String },

    /// Show the kanban board with its cards
    GetBoard,

    /// Add a card to a column
    AddCard {
        /// JSON document; read from stdin when omitted
        payload: Option<String>,
    },

    /// Edit a card's title, description, priority, tags or subtasks
    UpdateCard {
        /// JSON document; read from stdin when omitted
        payload: Option<String>,
    },

    /// Delete a card
    DeleteCard { card_id: String },
}

/// Where a command's payload comes from once the CLI has been parsed.
#[derive(Debug, PartialEq)]
enum PayloadSource {
    Empty,
    Value(serde_json::Value),
    /// A JSON document given inline, or on stdin when absent.
    Document(Option<String>),
}

impl Commands {
    fn into_parts(self) -> (&'static str, PayloadSource) {
        use serde_json::json;
        match self {
            Self::Ping => ("ping", PayloadSource::Empty),
            Self::Bootstrap => ("bootstrap", PayloadSource::Empty),
            Self::IssueToken { user_id } => ("issue_token", PayloadSource::Value(json!(user_id))),
            Self::RevokeToken => ("revoke_token", PayloadSource::Empty),
            Self::GetSettings => ("get_settings", PayloadSource::Empty),
            Self::UpdateSettings { payload } => ("update_settings", PayloadSource::Document(payload)),
            Self::AddSession { payload } => ("add_session", PayloadSource::Document(payload)),
            Self::ListSessions => ("list_sessions", PayloadSource::Empty),
            Self::ListProjects => ("list_projects", PayloadSource::Empty),
            Self::CreateProject { name, color } => (
                "create_project",
                PayloadSource::Value(json!({ "name": name, "color": color })),
            ),
            Self::DeleteProject { project_id } => {
                ("delete_project", PayloadSource::Value(json!(project_id)))
            }
            Self::GetBoard => ("get_board", PayloadSource::Empty),
            Self::AddCard { payload } => ("add_card", PayloadSource::Document(payload)),
            Self::UpdateCard { payload } => ("update_card", PayloadSource::Document(payload)),
            Self::DeleteCard { card_id } => ("delete_card", PayloadSource::Value(json!(card_id))),
        }
    }
}

#[derive(Debug, Serialize)]
struct BootstrapResponse {
    workspace_root: String,
    database_path: String,
}

#[derive(Debug, Deserialize)]
struct NewProjectRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    color: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandRequest {
    pub command: String,
    pub token: Option<String>,
    pub payload: Option<serde_json::Value>,
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, InfraError> {
    serde_json::to_value(value).map_err(InfraError::from)
}

fn parse_payload<T: DeserializeOwned>(payload: Option<serde_json::Value>) -> Result<T, InfraError> {
    let payload =
        payload.ok_or_else(|| InfraError::Validation("a JSON payload is required".to_string()))?;
    serde_json::from_value(payload)
        .map_err(|error| InfraError::Validation(format!("invalid payload: {error}")))
}

fn payload_string(payload: Option<serde_json::Value>, field: &str) -> Result<String, InfraError> {
    match payload {
        Some(serde_json::Value::String(value)) => Ok(value),
        Some(serde_json::Value::Object(object)) => object
            .get(field)
            .and_then(serde_json::Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or_else(|| InfraError::Validation(format!("{field} is required"))),
        _ => Err(InfraError::Validation(format!("{field} is required"))),
    }
}

fn parse_document(raw: &str) -> Result<serde_json::Value, InfraError> {
    serde_json::from_str(raw.trim())
        .map_err(|error| InfraError::Validation(format!("payload is not valid JSON: {error}")))
}

/// Runs one command. Everything except `ping` and `issue_token` is
/// authenticated here, once, before the command body sees a user. Storage
/// is blocking, so the body runs on the blocking pool.
pub async fn dispatch(state: Arc<AppState>, request: CommandRequest) -> serde_json::Value {
    let command = request.command.clone();
    let worker_state = Arc::clone(&state);
    let outcome = tokio::task::spawn_blocking(move || execute(&worker_state, request))
        .await
        .unwrap_or_else(|error| Err(InfraError::Storage(format!("command task failed: {error}"))));

    match outcome {
        Ok(value) => value,
        Err(error) => {
            let response = state.command_error(&command, &error);
            serde_json::to_value(&response).unwrap_or_else(|_| serde_json::json!({
                "success": false,
                "error": error.to_string(),
            }))
        }
    }
}

fn execute(state: &AppState, request: CommandRequest) -> Result<serde_json::Value, InfraError> {
    let CommandRequest {
        command,
        token,
        payload,
    } = request;

    match command.as_str() {
        "ping" => return Ok(serde_json::json!("pong")),
        "issue_token" => {
            let user_id = payload_string(payload, "userId")?;
            return to_json(&issue_token_impl(state, user_id)?);
        }
        _ => {}
    }

    let user = state.authenticate(token.as_deref())?;
    match command.as_str() {
        "revoke_token" => {
            let revoked = revoke_token_impl(state, token.as_deref().unwrap_or_default())?;
            Ok(serde_json::json!({ "success": revoked }))
        }
        "get_settings" => to_json(&get_settings_impl(state, &user)?),
        "update_settings" => {
            let desired: DesiredState = parse_payload(payload)?;
            to_json(&update_settings_impl(state, &user, desired)?)
        }
        "add_session" => {
            let request: NewPomodoroSession = parse_payload(payload)?;
            to_json(&add_session_impl(state, &user, request)?)
        }
        "list_sessions" => to_json(&list_sessions_impl(state, &user)?),
        "list_projects" => to_json(&list_projects_impl(state, &user)?),
        "create_project" => {
            let request: NewProjectRequest = parse_payload(payload)?;
            to_json(&create_project_impl(state, &user, &request.name, &request.color)?)
        }
        "delete_project" => {
            let project_id = payload_string(payload, "projectId")?;
            to_json(&delete_project_impl(state, &user, &project_id)?)
        }
        "get_board" => to_json(&get_board_impl(state, &user)?),
        "add_card" => {
            let request: NewKanbanCard = parse_payload(payload)?;
            to_json(&add_card_impl(state, &user, request)?)
        }
        "update_card" => {
            let patch: KanbanCardPatch = parse_payload(payload)?;
            to_json(&update_card_impl(state, &user, patch)?)
        }
        "delete_card" => {
            let card_id = payload_string(payload, "cardId")?;
            to_json(&delete_card_impl(state, &user, &card_id)?)
        }
        other => Err(InfraError::NotFound(format!("unknown command '{other}'"))),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("POMOBOARD_LOG")
                .unwrap_or_else(|_| "pomoboard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn resolve_payload(source: PayloadSource) -> Result<Option<serde_json::Value>, InfraError> {
    match source {
        PayloadSource::Empty => Ok(None),
        PayloadSource::Value(value) => Ok(Some(value)),
        PayloadSource::Document(Some(raw)) => parse_document(&raw).map(Some),
        PayloadSource::Document(None) => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            parse_document(&buffer).map(Some)
        }
    }
}

/// CLI entry point; returns the process exit code.
pub fn run() -> i32 {
    let cli = Cli::parse();
    init_tracing();

    let workspace_root = match cli.root {
        Some(root) => root,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(error) => {
                eprintln!("failed to resolve current directory: {error}");
                return 1;
            }
        },
    };

    let (command, source) = cli.command.into_parts();
    if command == "bootstrap" {
        return match bootstrap_workspace(&workspace_root) {
            Ok(result) => {
                print_json(&BootstrapResponse {
                    workspace_root: result.workspace_root.display().to_string(),
                    database_path: result.database_path.display().to_string(),
                });
                0
            }
            Err(error) => {
                eprintln!("{error}");
                1
            }
        };
    }

    let payload = match resolve_payload(source) {
        Ok(payload) => payload,
        Err(error) => {
            eprintln!("{error}");
            return 2;
        }
    };

    let state = match AppState::new(workspace_root) {
        Ok(state) => Arc::new(state),
        Err(error) => {
            eprintln!("failed to initialize workspace: {error}");
            return 1;
        }
    };
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("failed to start runtime: {error}");
            return 1;
        }
    };

    let request = CommandRequest {
        command: command.to_string(),
        token: cli.token,
        payload,
    };
    let response = runtime.block_on(dispatch(state, request));
    let succeeded = response
        .get("success")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(true);
    print_json(&response);
    if succeeded { 0 } else { 1 }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(error) => eprintln!("failed to encode response: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use std::fs;

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new(label: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "pomoboard-dispatch-tests-{}-{label}",
                std::process::id()
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        fn app_state(&self) -> Arc<AppState> {
            Arc::new(AppState::new(self.path.clone()).expect("app state"))
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    fn request(command: &str, token: Option<&str>, payload: Option<serde_json::Value>) -> CommandRequest {
        CommandRequest {
            command: command.to_string(),
            token: token.map(ToOwned::to_owned),
            payload,
        }
    }

    #[test]
    fn cli_reads_global_flags_in_any_position() {
        let cli = Cli::try_parse_from([
            "pomoboard",
            "--root=/tmp/ws",
            "update-settings",
            "--token",
            "tok",
            "{}",
        ])
        .expect("parse");
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/ws")));
        assert_eq!(cli.token.as_deref(), Some("tok"));
        assert_eq!(
            cli.command.into_parts(),
            ("update_settings", PayloadSource::Document(Some("{}".to_string())))
        );

        let cli = Cli::try_parse_from(["pomoboard", "get-settings", "--root=/x"]).expect("parse");
        assert_eq!(cli.root, Some(PathBuf::from("/x")));
        assert_eq!(cli.command.into_parts(), ("get_settings", PayloadSource::Empty));
    }

    #[test]
    fn cli_help_and_unknown_commands_never_reach_dispatch() {
        let help = Cli::try_parse_from(["pomoboard", "--help"]).expect_err("help exits");
        assert_eq!(help.kind(), ErrorKind::DisplayHelp);

        let unknown = Cli::try_parse_from(["pomoboard", "move-card"]).expect_err("unknown");
        assert_eq!(unknown.kind(), ErrorKind::InvalidSubcommand);

        let missing = Cli::try_parse_from(["pomoboard", "issue-token"]).expect_err("missing user");
        assert_eq!(missing.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn cli_positional_arguments_become_payloads() {
        let cli = Cli::try_parse_from(["pomoboard", "issue-token", "user-1"]).expect("parse");
        assert_eq!(
            cli.command.into_parts(),
            ("issue_token", PayloadSource::Value(serde_json::json!("user-1")))
        );

        let cli = Cli::try_parse_from(["pomoboard", "create-project", "Thesis", "#22c55e"])
            .expect("parse");
        assert_eq!(
            cli.command.into_parts(),
            (
                "create_project",
                PayloadSource::Value(serde_json::json!({ "name": "Thesis", "color": "#22c55e" }))
            )
        );
    }

    #[test]
    fn inline_documents_must_be_json() {
        assert_eq!(
            resolve_payload(PayloadSource::Document(Some(r#" {"cardId": "c1"} "#.to_string())))
                .expect("valid document"),
            Some(serde_json::json!({ "cardId": "c1" }))
        );
        assert!(matches!(
            resolve_payload(PayloadSource::Document(Some("user-1".to_string()))),
            Err(InfraError::Validation(_))
        ));
        assert_eq!(resolve_payload(PayloadSource::Empty).expect("empty"), None);
    }

    #[tokio::test]
    async fn dispatch_requires_a_token_for_settings() {
        let workspace = TempWorkspace::new("auth");
        let state = workspace.app_state();

        let response = dispatch(state, request("get_settings", None, None)).await;
        assert_eq!(response["success"], false);
        assert_eq!(response["kind"], "unauthorized");
    }

    #[tokio::test]
    async fn dispatch_issues_tokens_without_a_token_but_scopes_them() {
        let workspace = TempWorkspace::new("issue");
        let state = workspace.app_state();

        let blank = dispatch(
            Arc::clone(&state),
            request("issue_token", None, Some(serde_json::json!({ "userId": "  " }))),
        )
        .await;
        assert_eq!(blank["kind"], "validation");

        let issued = dispatch(
            Arc::clone(&state),
            request("issue_token", None, Some(serde_json::json!("user-9"))),
        )
        .await;
        assert_eq!(issued["userId"], "user-9");
        let token = issued["token"].as_str().expect("token").to_string();

        let sessions = dispatch(
            Arc::clone(&state),
            request("list_sessions", Some(token.as_str()), None),
        )
        .await;
        assert_eq!(sessions["sessions"], serde_json::json!([]));

        let revoked = dispatch(
            Arc::clone(&state),
            request("revoke_token", Some(token.as_str()), None),
        )
        .await;
        assert_eq!(revoked["success"], true);
        let after = dispatch(state, request("list_sessions", Some(token.as_str()), None)).await;
        assert_eq!(after["kind"], "unauthorized");
    }

    #[tokio::test]
    async fn dispatch_full_settings_flow() {
        let workspace = TempWorkspace::new("flow");
        let state = workspace.app_state();

        let issued = dispatch(
            Arc::clone(&state),
            request("issue_token", None, Some(serde_json::json!("user-1"))),
        )
        .await;
        let token = issued["token"].as_str().expect("token").to_string();

        let updated = dispatch(
            Arc::clone(&state),
            request(
                "update_settings",
                Some(token.as_str()),
                Some(serde_json::json!({
                    "categories": [
                        { "id": "a", "name": "Work", "color": "#fff", "duration": 0 },
                        { "id": "z", "name": "Long", "color": "#000", "duration": 50.0 },
                        { "id": "", "name": "dropped", "color": "#000", "duration": 10 }
                    ],
                    "intervals": { "shortBreak": 5, "longBreak": 15, "cyclesUntilLongBreak": 4 }
                })),
            ),
        )
        .await;
        assert_eq!(updated["success"], true);
        assert_eq!(updated["inserted"], 2);
        assert_eq!(updated["skipped"], 1);
        assert!(updated.get("kind").is_none());

        let settings = dispatch(Arc::clone(&state), request("get_settings", Some(token.as_str()), None)).await;
        assert_eq!(
            settings["settings"]["categories"],
            serde_json::json!([
                { "id": "a", "name": "Work", "color": "#fff", "duration": 25 },
                { "id": "z", "name": "Long", "color": "#000", "duration": 50 }
            ])
        );

        let bad_payload = dispatch(
            Arc::clone(&state),
            request(
                "update_settings",
                Some(token.as_str()),
                Some(serde_json::json!({ "categories": [] })),
            ),
        )
        .await;
        assert_eq!(bad_payload["kind"], "validation");

        let unknown = dispatch(Arc::clone(&state), request("move_card", Some(token.as_str()), None)).await;
        assert_eq!(unknown["kind"], "not_found");
    }

    #[tokio::test]
    async fn dispatch_tags_partial_failures() {
        let workspace = TempWorkspace::new("partial");
        let state = workspace.app_state();
        let mut tokens = Vec::new();
        for user_id in ["owner", "other"] {
            let issued = dispatch(
                Arc::clone(&state),
                request("issue_token", None, Some(serde_json::json!({ "userId": user_id }))),
            )
            .await;
            tokens.push(issued["token"].as_str().expect("token").to_string());
        }
        let snapshot = serde_json::json!({
            "categories": [{ "id": "shared", "name": "Mine", "color": "#fff", "duration": 25 }],
            "intervals": { "shortBreak": 5, "longBreak": 15, "cyclesUntilLongBreak": 4 }
        });

        let first = dispatch(
            Arc::clone(&state),
            request("update_settings", Some(tokens[0].as_str()), Some(snapshot.clone())),
        )
        .await;
        assert_eq!(first["success"], true);

        let collided = dispatch(
            Arc::clone(&state),
            request("update_settings", Some(tokens[1].as_str()), Some(snapshot)),
        )
        .await;
        assert_eq!(collided["success"], false);
        assert_eq!(collided["kind"], "partial_failure");
        assert_eq!(collided["failedCategoryIds"], serde_json::json!(["shared"]));
    }

    #[tokio::test]
    async fn dispatch_kanban_card_flow() {
        let workspace = TempWorkspace::new("kanban");
        let state = workspace.app_state();
        let issued = dispatch(
            Arc::clone(&state),
            request("issue_token", None, Some(serde_json::json!("user-1"))),
        )
        .await;
        let token = issued["token"].as_str().expect("token").to_string();

        let board = dispatch(Arc::clone(&state), request("get_board", Some(token.as_str()), None)).await;
        let column_id = board["columns"][0]["id"].as_str().expect("column id").to_string();

        let added = dispatch(
            Arc::clone(&state),
            request(
                "add_card",
                Some(token.as_str()),
                Some(serde_json::json!({ "columnId": column_id, "title": "Outline", "tags": ["thesis"] })),
            ),
        )
        .await;
        assert_eq!(added["success"], true);
        assert_eq!(added["card"]["priority"], "media");
        let card_id = added["card"]["id"].as_str().expect("card id").to_string();

        let missing = dispatch(
            Arc::clone(&state),
            request("delete_card", Some(token.as_str()), Some(serde_json::json!("missing"))),
        )
        .await;
        assert_eq!(missing["kind"], "not_found");

        let deleted = dispatch(
            Arc::clone(&state),
            request("delete_card", Some(token.as_str()), Some(serde_json::json!({ "cardId": card_id }))),
        )
        .await;
        assert_eq!(deleted["success"], true);
    }
}
