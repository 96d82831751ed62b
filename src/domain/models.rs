use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CATEGORY_DURATION_MINUTES: u32 = 25;
pub const DEFAULT_CATEGORY_NAME: &str = "Sem nome";
pub const DEFAULT_CATEGORY_COLOR: &str = "#3b82f6";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(rename = "duration")]
    pub duration_minutes: u32,
}

impl Category {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        color: impl Into<String>,
        duration_minutes: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: color.into(),
            duration_minutes,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "category.id")?;
        validate_non_empty(&self.name, "category.name")?;
        validate_non_empty(&self.color, "category.color")?;
        if self.duration_minutes == 0 {
            return Err("category.duration must be > 0".to_string());
        }
        Ok(())
    }

    pub fn fields(&self) -> CategoryFields {
        CategoryFields {
            name: self.name.clone(),
            color: self.color.clone(),
            duration_minutes: self.duration_minutes,
        }
    }
}

/// Mutable columns of a category row; the id and owner never change in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryFields {
    pub name: String,
    pub color: String,
    pub duration_minutes: u32,
}

/// A category as submitted by the client. Every field is optional on the wire
/// and is normalized before it reaches storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CategoryInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub duration: Option<serde_json::Value>,
}

impl CategoryInput {
    /// Returns `None` for inputs without a usable id; those are dropped.
    pub fn normalize(&self) -> Option<Category> {
        let id = self
            .id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())?;

        Some(Category {
            id: id.to_string(),
            name: non_blank_or(self.name.as_deref(), DEFAULT_CATEGORY_NAME),
            color: non_blank_or(self.color.as_deref(), DEFAULT_CATEGORY_COLOR),
            duration_minutes: self.duration_minutes(),
        })
    }

    /// Any positive JSON number is kept, rounded to whole minutes (at least
    /// one); everything else falls back to the default.
    pub fn duration_minutes(&self) -> u32 {
        self.duration
            .as_ref()
            .and_then(serde_json::Value::as_f64)
            .filter(|minutes| *minutes > 0.0 && *minutes <= f64::from(u32::MAX))
            .map(|minutes| (minutes.round() as u32).max(1))
            .unwrap_or(DEFAULT_CATEGORY_DURATION_MINUTES)
    }
}

impl From<&Category> for CategoryInput {
    fn from(category: &Category) -> Self {
        Self {
            id: Some(category.id.clone()),
            name: Some(category.name.clone()),
            color: Some(category.color.clone()),
            duration: Some(serde_json::Value::from(category.duration_minutes)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IntervalSettings {
    #[serde(rename = "shortBreak")]
    pub short_break_minutes: u32,
    #[serde(rename = "longBreak")]
    pub long_break_minutes: u32,
    pub cycles_until_long_break: u32,
}

impl Default for IntervalSettings {
    fn default() -> Self {
        Self {
            short_break_minutes: 5,
            long_break_minutes: 15,
            cycles_until_long_break: 4,
        }
    }
}

impl IntervalSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.cycles_until_long_break == 0 {
            return Err("intervals.cyclesUntilLongBreak must be >= 1".to_string());
        }
        Ok(())
    }
}

/// The complete settings snapshot a client submits on every edit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesiredState {
    pub categories: Vec<CategoryInput>,
    pub intervals: IntervalSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PomodoroSettings {
    pub categories: Vec<Category>,
    pub intervals: IntervalSettings,
}

impl Default for PomodoroSettings {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            intervals: IntervalSettings::default(),
        }
    }
}

pub fn default_categories() -> Vec<Category> {
    vec![
        Category::new("produtividade", "Produtividade", "#ef4444", 25),
        Category::new("estudos", "Estudos", "#f59e0b", 50),
        Category::new("descanso", "Descanso", "#6b7280", 15),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PomodoroSession {
    pub id: String,
    pub user_id: String,
    pub category_id: String,
    pub category_name: String,
    pub duration_minutes: u32,
    pub completed_at: DateTime<Utc>,
    pub session_date: String,
}

impl PomodoroSession {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "session.id")?;
        validate_non_empty(&self.user_id, "session.user_id")?;
        validate_non_empty(&self.category_id, "session.categoryId")?;
        validate_date(&self.session_date, "session.sessionDate")?;
        if self.duration_minutes == 0 {
            return Err("session.durationMinutes must be > 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewPomodoroSession {
    #[serde(default)]
    pub category_id: String,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub duration_minutes: u32,
    #[serde(default)]
    pub session_date: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessGrant {
    pub token: String,
    pub user_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AccessGrant {
    pub fn is_valid_at(&self, now: DateTime<Utc>, leeway_seconds: i64) -> bool {
        self.expires_at > now + chrono::Duration::seconds(leeway_seconds)
            && !self.token.trim().is_empty()
            && !self.user_id.trim().is_empty()
    }
}

pub const DEFAULT_KANBAN_COLUMNS: [&str; 3] = ["A FAZER", "EM PROGRESSO", "CONCLUÍDO"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KanbanProject {
    pub id: String,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

impl KanbanProject {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "project.id")?;
        validate_non_empty(&self.name, "project.name")?;
        validate_non_empty(&self.color, "project.color")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KanbanColumn {
    pub id: String,
    pub title: String,
    pub position: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CardPriority {
    Alta,
    #[default]
    Media,
    Baixa,
}

impl CardPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alta => "alta",
            Self::Media => "media",
            Self::Baixa => "baixa",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "alta" => Ok(Self::Alta),
            "media" => Ok(Self::Media),
            "baixa" => Ok(Self::Baixa),
            other => Err(format!("unsupported card priority '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubTask {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KanbanCard {
    pub id: String,
    pub column_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub title: String,
    pub description: String,
    pub priority: CardPriority,
    pub tags: Vec<String>,
    pub subtasks: Vec<SubTask>,
    pub position: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KanbanCard {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "card.id")?;
        validate_non_empty(&self.column_id, "card.columnId")?;
        validate_non_empty(&self.title, "card.title")?;
        if let Some(due_date) = &self.due_date {
            validate_date(due_date, "card.dueDate")?;
        }
        if self.updated_at < self.created_at {
            return Err("card.updatedAt must be >= card.createdAt".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewKanbanCard {
    #[serde(default)]
    pub column_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<CardPriority>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub subtasks: Option<Vec<SubTask>>,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Partial card edit; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KanbanCardPatch {
    #[serde(default)]
    pub card_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<CardPriority>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub subtasks: Option<Vec<SubTask>>,
}

impl KanbanCardPatch {
    pub fn apply(&self, card: &mut KanbanCard, updated_at: DateTime<Utc>) {
        if let Some(title) = &self.title {
            card.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            card.description = description.trim().to_string();
        }
        if let Some(priority) = self.priority {
            card.priority = priority;
        }
        if let Some(tags) = &self.tags {
            card.tags = tags.clone();
        }
        if let Some(subtasks) = &self.subtasks {
            card.subtasks = subtasks.clone();
        }
        card.updated_at = updated_at;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardColumn {
    pub id: String,
    pub title: String,
    pub cards: Vec<KanbanCard>,
}

fn non_blank_or(value: Option<&str>, fallback: &str) -> String {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

pub(crate) fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

pub(crate) fn validate_date(value: &str, field_name: &str) -> Result<(), String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("{field_name} must be YYYY-MM-DD"))?;
    Ok(())
}
