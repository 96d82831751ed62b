use crate::domain::models::{CardPriority, KanbanCard, KanbanColumn, KanbanProject, SubTask};
use crate::infrastructure::error::{lock_poisoned, InfraError};
use crate::infrastructure::storage::{open_connection, parse_timestamp};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A stored row together with the user that owns it, for ownership checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owned<T> {
    pub user_id: String,
    pub item: T,
}

pub trait KanbanRepository: Send + Sync {
    /// Projects owned by `user_id`, oldest first.
    fn list_projects(&self, user_id: &str) -> Result<Vec<KanbanProject>, InfraError>;
    fn find_project(&self, project_id: &str) -> Result<Option<Owned<KanbanProject>>, InfraError>;
    fn insert_project(&self, user_id: &str, project: &KanbanProject) -> Result<(), InfraError>;
    /// Removes the project and detaches the owner's cards from it.
    fn delete_project(&self, project_id: &str, user_id: &str) -> Result<(), InfraError>;

    /// Columns owned by `user_id`, by position.
    fn list_columns(&self, user_id: &str) -> Result<Vec<KanbanColumn>, InfraError>;
    fn find_column(&self, column_id: &str) -> Result<Option<Owned<KanbanColumn>>, InfraError>;
    fn insert_column(&self, user_id: &str, column: &KanbanColumn) -> Result<(), InfraError>;

    /// Cards owned by `user_id`, by column then position.
    fn list_cards(&self, user_id: &str) -> Result<Vec<KanbanCard>, InfraError>;
    fn find_card(&self, card_id: &str) -> Result<Option<Owned<KanbanCard>>, InfraError>;
    fn insert_card(&self, user_id: &str, card: &KanbanCard) -> Result<(), InfraError>;
    fn update_card(&self, user_id: &str, card: &KanbanCard) -> Result<(), InfraError>;
    fn delete_card(&self, card_id: &str, user_id: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteKanbanRepository {
    db_path: PathBuf,
}

impl SqliteKanbanRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }
}

const CARD_COLUMNS: &str = "id, column_id, project_id, title, description, priority, tags_json,
     subtasks_json, position, due_date, completed_at, created_at, updated_at, user_id";

struct CardRow {
    id: String,
    column_id: String,
    project_id: Option<String>,
    title: String,
    description: String,
    priority: String,
    tags_json: String,
    subtasks_json: String,
    position: u32,
    due_date: Option<String>,
    completed_at: Option<String>,
    created_at: String,
    updated_at: String,
    user_id: String,
}

fn card_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CardRow> {
    Ok(CardRow {
        id: row.get(0)?,
        column_id: row.get(1)?,
        project_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        priority: row.get(5)?,
        tags_json: row.get(6)?,
        subtasks_json: row.get(7)?,
        position: row.get(8)?,
        due_date: row.get(9)?,
        completed_at: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
        user_id: row.get(13)?,
    })
}

impl CardRow {
    fn into_owned(self) -> Result<Owned<KanbanCard>, InfraError> {
        let tags: Vec<String> = serde_json::from_str(&self.tags_json)?;
        let subtasks: Vec<SubTask> = serde_json::from_str(&self.subtasks_json)?;
        let priority = CardPriority::parse(&self.priority).map_err(InfraError::Storage)?;
        let completed_at = self
            .completed_at
            .as_deref()
            .map(|raw| parse_timestamp(raw, "kanban_cards.completed_at"))
            .transpose()?;

        Ok(Owned {
            user_id: self.user_id,
            item: KanbanCard {
                id: self.id,
                column_id: self.column_id,
                project_id: self.project_id,
                title: self.title,
                description: self.description,
                priority,
                tags,
                subtasks,
                position: self.position,
                due_date: self.due_date,
                completed_at,
                created_at: parse_timestamp(&self.created_at, "kanban_cards.created_at")?,
                updated_at: parse_timestamp(&self.updated_at, "kanban_cards.updated_at")?,
            },
        })
    }
}

impl KanbanRepository for SqliteKanbanRepository {
    fn list_projects(&self, user_id: &str) -> Result<Vec<KanbanProject>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, name, color, created_at
             FROM kanban_projects
             WHERE user_id = ?1
             ORDER BY created_at, rowid",
        )?;
        let rows = statement.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut projects = Vec::new();
        for row in rows {
            let (id, name, color, created_at) = row?;
            projects.push(KanbanProject {
                id,
                name,
                color,
                created_at: parse_timestamp(&created_at, "kanban_projects.created_at")?,
            });
        }
        Ok(projects)
    }

    fn find_project(&self, project_id: &str) -> Result<Option<Owned<KanbanProject>>, InfraError> {
        let connection = self.connect()?;
        let row: Option<(String, String, String, String, String)> = connection
            .query_row(
                "SELECT id, name, color, created_at, user_id FROM kanban_projects WHERE id = ?1",
                params![project_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;

        let Some((id, name, color, created_at, user_id)) = row else {
            return Ok(None);
        };
        Ok(Some(Owned {
            user_id,
            item: KanbanProject {
                id,
                name,
                color,
                created_at: parse_timestamp(&created_at, "kanban_projects.created_at")?,
            },
        }))
    }

    fn insert_project(&self, user_id: &str, project: &KanbanProject) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO kanban_projects (id, user_id, name, color, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                project.id,
                user_id,
                project.name,
                project.color,
                project.created_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn delete_project(&self, project_id: &str, user_id: &str) -> Result<(), InfraError> {
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        transaction.execute(
            "UPDATE kanban_cards SET project_id = NULL WHERE project_id = ?1 AND user_id = ?2",
            params![project_id, user_id],
        )?;
        let changed = transaction.execute(
            "DELETE FROM kanban_projects WHERE id = ?1 AND user_id = ?2",
            params![project_id, user_id],
        )?;
        if changed == 0 {
            return Err(InfraError::NotFound(format!("project {project_id}")));
        }
        transaction.commit()?;
        Ok(())
    }

    fn list_columns(&self, user_id: &str) -> Result<Vec<KanbanColumn>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, title, position
             FROM kanban_columns
             WHERE user_id = ?1
             ORDER BY position, rowid",
        )?;
        let rows = statement.query_map(params![user_id], |row| {
            Ok(KanbanColumn {
                id: row.get(0)?,
                title: row.get(1)?,
                position: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(InfraError::from)
    }

    fn find_column(&self, column_id: &str) -> Result<Option<Owned<KanbanColumn>>, InfraError> {
        let connection = self.connect()?;
        let found = connection
            .query_row(
                "SELECT id, title, position, user_id FROM kanban_columns WHERE id = ?1",
                params![column_id],
                |row| {
                    Ok(Owned {
                        item: KanbanColumn {
                            id: row.get(0)?,
                            title: row.get(1)?,
                            position: row.get(2)?,
                        },
                        user_id: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(found)
    }

    fn insert_column(&self, user_id: &str, column: &KanbanColumn) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO kanban_columns (id, user_id, title, position) VALUES (?1, ?2, ?3, ?4)",
            params![column.id, user_id, column.title, column.position],
        )?;
        Ok(())
    }

    fn list_cards(&self, user_id: &str) -> Result<Vec<KanbanCard>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {CARD_COLUMNS}
             FROM kanban_cards
             WHERE user_id = ?1
             ORDER BY column_id, position, created_at"
        ))?;
        let rows = statement.query_map(params![user_id], card_row)?;

        let mut cards = Vec::new();
        for row in rows {
            cards.push(row?.into_owned()?.item);
        }
        Ok(cards)
    }

    fn find_card(&self, card_id: &str) -> Result<Option<Owned<KanbanCard>>, InfraError> {
        let connection = self.connect()?;
        let row = connection
            .query_row(
                &format!("SELECT {CARD_COLUMNS} FROM kanban_cards WHERE id = ?1"),
                params![card_id],
                card_row,
            )
            .optional()?;
        row.map(CardRow::into_owned).transpose()
    }

    fn insert_card(&self, user_id: &str, card: &KanbanCard) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO kanban_cards
               (id, user_id, column_id, project_id, title, description, priority, tags_json,
                subtasks_json, position, due_date, completed_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                card.id,
                user_id,
                card.column_id,
                card.project_id,
                card.title,
                card.description,
                card.priority.as_str(),
                serde_json::to_string(&card.tags)?,
                serde_json::to_string(&card.subtasks)?,
                card.position,
                card.due_date,
                card.completed_at.map(|value| value.to_rfc3339()),
                card.created_at.to_rfc3339(),
                card.updated_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn update_card(&self, user_id: &str, card: &KanbanCard) -> Result<(), InfraError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE kanban_cards
             SET title = ?1, description = ?2, priority = ?3, tags_json = ?4,
                 subtasks_json = ?5, updated_at = ?6
             WHERE id = ?7 AND user_id = ?8",
            params![
                card.title,
                card.description,
                card.priority.as_str(),
                serde_json::to_string(&card.tags)?,
                serde_json::to_string(&card.subtasks)?,
                card.updated_at.to_rfc3339(),
                card.id,
                user_id
            ],
        )?;
        if changed == 0 {
            return Err(InfraError::NotFound(format!("card {}", card.id)));
        }
        Ok(())
    }

    fn delete_card(&self, card_id: &str, user_id: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "DELETE FROM kanban_cards WHERE id = ?1 AND user_id = ?2",
            params![card_id, user_id],
        )?;
        if changed == 0 {
            return Err(InfraError::NotFound(format!("card {card_id}")));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct KanbanRows {
    projects: Vec<Owned<KanbanProject>>,
    columns: Vec<Owned<KanbanColumn>>,
    cards: Vec<Owned<KanbanCard>>,
}

#[derive(Debug, Default)]
pub struct InMemoryKanbanRepository {
    rows: Mutex<KanbanRows>,
}

impl InMemoryKanbanRepository {
    fn rows(&self) -> Result<std::sync::MutexGuard<'_, KanbanRows>, InfraError> {
        self.rows
            .lock()
            .map_err(|error| lock_poisoned("kanban repository", error))
    }
}

fn owned_by<T: Clone>(rows: &[Owned<T>], user_id: &str) -> Vec<T> {
    rows.iter()
        .filter(|row| row.user_id == user_id)
        .map(|row| row.item.clone())
        .collect()
}

impl KanbanRepository for InMemoryKanbanRepository {
    fn list_projects(&self, user_id: &str) -> Result<Vec<KanbanProject>, InfraError> {
        Ok(owned_by(&self.rows()?.projects, user_id))
    }

    fn find_project(&self, project_id: &str) -> Result<Option<Owned<KanbanProject>>, InfraError> {
        Ok(self
            .rows()?
            .projects
            .iter()
            .find(|row| row.item.id == project_id)
            .cloned())
    }

    fn insert_project(&self, user_id: &str, project: &KanbanProject) -> Result<(), InfraError> {
        let mut rows = self.rows()?;
        if rows.projects.iter().any(|row| row.item.id == project.id) {
            return Err(InfraError::Storage(format!(
                "duplicate key: project {} already exists",
                project.id
            )));
        }
        rows.projects.push(Owned {
            user_id: user_id.to_string(),
            item: project.clone(),
        });
        Ok(())
    }

    fn delete_project(&self, project_id: &str, user_id: &str) -> Result<(), InfraError> {
        let mut rows = self.rows()?;
        let before = rows.projects.len();
        rows.projects
            .retain(|row| row.item.id != project_id || row.user_id != user_id);
        if rows.projects.len() == before {
            return Err(InfraError::NotFound(format!("project {project_id}")));
        }
        for card in rows.cards.iter_mut().filter(|row| row.user_id == user_id) {
            if card.item.project_id.as_deref() == Some(project_id) {
                card.item.project_id = None;
            }
        }
        Ok(())
    }

    fn list_columns(&self, user_id: &str) -> Result<Vec<KanbanColumn>, InfraError> {
        let mut columns = owned_by(&self.rows()?.columns, user_id);
        columns.sort_by_key(|column| column.position);
        Ok(columns)
    }

    fn find_column(&self, column_id: &str) -> Result<Option<Owned<KanbanColumn>>, InfraError> {
        Ok(self
            .rows()?
            .columns
            .iter()
            .find(|row| row.item.id == column_id)
            .cloned())
    }

    fn insert_column(&self, user_id: &str, column: &KanbanColumn) -> Result<(), InfraError> {
        let mut rows = self.rows()?;
        if rows.columns.iter().any(|row| row.item.id == column.id) {
            return Err(InfraError::Storage(format!(
                "duplicate key: column {} already exists",
                column.id
            )));
        }
        rows.columns.push(Owned {
            user_id: user_id.to_string(),
            item: column.clone(),
        });
        Ok(())
    }

    fn list_cards(&self, user_id: &str) -> Result<Vec<KanbanCard>, InfraError> {
        let mut cards = owned_by(&self.rows()?.cards, user_id);
        cards.sort_by(|left, right| {
            left.column_id
                .cmp(&right.column_id)
                .then(left.position.cmp(&right.position))
                .then(left.created_at.cmp(&right.created_at))
        });
        Ok(cards)
    }

    fn find_card(&self, card_id: &str) -> Result<Option<Owned<KanbanCard>>, InfraError> {
        Ok(self
            .rows()?
            .cards
            .iter()
            .find(|row| row.item.id == card_id)
            .cloned())
    }

    fn insert_card(&self, user_id: &str, card: &KanbanCard) -> Result<(), InfraError> {
        let mut rows = self.rows()?;
        if rows.cards.iter().any(|row| row.item.id == card.id) {
            return Err(InfraError::Storage(format!(
                "duplicate key: card {} already exists",
                card.id
            )));
        }
        rows.cards.push(Owned {
            user_id: user_id.to_string(),
            item: card.clone(),
        });
        Ok(())
    }

    fn update_card(&self, user_id: &str, card: &KanbanCard) -> Result<(), InfraError> {
        let mut rows = self.rows()?;
        let row = rows
            .cards
            .iter_mut()
            .find(|row| row.item.id == card.id && row.user_id == user_id)
            .ok_or_else(|| InfraError::NotFound(format!("card {}", card.id)))?;
        row.item.title = card.title.clone();
        row.item.description = card.description.clone();
        row.item.priority = card.priority;
        row.item.tags = card.tags.clone();
        row.item.subtasks = card.subtasks.clone();
        row.item.updated_at = card.updated_at;
        Ok(())
    }

    fn delete_card(&self, card_id: &str, user_id: &str) -> Result<(), InfraError> {
        let mut rows = self.rows()?;
        let before = rows.cards.len();
        rows.cards
            .retain(|row| row.item.id != card_id || row.user_id != user_id);
        if rows.cards.len() == before {
            return Err(InfraError::NotFound(format!("card {card_id}")));
        }
        Ok(())
    }
}
