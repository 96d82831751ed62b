use crate::application::auth::{ensure_owner, AuthenticatedUser};
use crate::domain::models::{
    BoardColumn, KanbanCard, KanbanCardPatch, KanbanColumn, KanbanProject, NewKanbanCard,
    DEFAULT_KANBAN_COLUMNS,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::kanban_repository::KanbanRepository;
use chrono::{DateTime, Utc};
use std::sync::Arc;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Project and card operations. Every mutation of an existing row resolves
/// the row first, answers `NotFound` when it is missing and `Forbidden` when
/// another user owns it.
pub struct KanbanService<K>
where
    K: KanbanRepository,
{
    repository: Arc<K>,
    now_provider: NowProvider,
}

impl<K> KanbanService<K>
where
    K: KanbanRepository,
{
    pub fn new(repository: Arc<K>) -> Self {
        Self {
            repository,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn list_projects(&self, user: &AuthenticatedUser) -> Result<Vec<KanbanProject>, InfraError> {
        self.repository.list_projects(&user.user_id)
    }

    pub fn create_project(
        &self,
        user: &AuthenticatedUser,
        name: &str,
        color: &str,
    ) -> Result<KanbanProject, InfraError> {
        if name.trim().is_empty() || color.trim().is_empty() {
            return Err(InfraError::Validation("name and color are required".to_string()));
        }

        let project = KanbanProject {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            color: color.trim().to_string(),
            created_at: (self.now_provider)(),
        };
        project.validate().map_err(InfraError::Validation)?;
        self.repository.insert_project(&user.user_id, &project)?;
        Ok(project)
    }

    pub fn delete_project(&self, user: &AuthenticatedUser, project_id: &str) -> Result<(), InfraError> {
        let project_id = required_id(project_id, "projectId")?;
        let Some(owned) = self.repository.find_project(project_id)? else {
            return Err(InfraError::NotFound(format!("project {project_id}")));
        };
        ensure_owner(&owned.user_id, user)?;
        self.repository.delete_project(project_id, &user.user_id)
    }

    /// The user's columns with their cards, creating the default columns the
    /// first time a user opens the board.
    pub fn load_board(&self, user: &AuthenticatedUser) -> Result<Vec<BoardColumn>, InfraError> {
        let mut columns = self.repository.list_columns(&user.user_id)?;
        if columns.is_empty() {
            columns = self.create_default_columns(&user.user_id)?;
        }

        let mut cards = self.repository.list_cards(&user.user_id)?;
        Ok(columns
            .into_iter()
            .map(|column| {
                let (in_column, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut cards)
                    .into_iter()
                    .partition(|card| card.column_id == column.id);
                cards = rest;
                BoardColumn {
                    id: column.id,
                    title: column.title,
                    cards: in_column,
                }
            })
            .collect())
    }

    fn create_default_columns(&self, user_id: &str) -> Result<Vec<KanbanColumn>, InfraError> {
        let mut columns = Vec::with_capacity(DEFAULT_KANBAN_COLUMNS.len());
        for (position, title) in (0u32..).zip(DEFAULT_KANBAN_COLUMNS) {
            let column = KanbanColumn {
                id: uuid::Uuid::new_v4().to_string(),
                title: title.to_string(),
                position,
            };
            self.repository.insert_column(user_id, &column)?;
            columns.push(column);
        }
        Ok(columns)
    }

    /// A column owned by someone else answers `NotFound`, the same as a
    /// missing one.
    pub fn add_card(
        &self,
        user: &AuthenticatedUser,
        request: NewKanbanCard,
    ) -> Result<KanbanCard, InfraError> {
        let column_id = request.column_id.trim();
        if column_id.is_empty() || request.title.trim().is_empty() {
            return Err(InfraError::Validation("columnId and title are required".to_string()));
        }

        match self.repository.find_column(column_id)? {
            Some(owned) if owned.user_id == user.user_id => {}
            _ => {
                return Err(InfraError::NotFound(format!(
                    "column {column_id} not found or access denied"
                )));
            }
        }

        let project_id = request
            .project_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        if let Some(project_id) = &project_id {
            let Some(owned) = self.repository.find_project(project_id)? else {
                return Err(InfraError::NotFound(format!("project {project_id}")));
            };
            ensure_owner(&owned.user_id, user)?;
        }

        let now = (self.now_provider)();
        let card = KanbanCard {
            id: uuid::Uuid::new_v4().to_string(),
            column_id: column_id.to_string(),
            project_id,
            title: request.title.trim().to_string(),
            description: request
                .description
                .map(|description| description.trim().to_string())
                .unwrap_or_default(),
            priority: request.priority.unwrap_or_default(),
            tags: request.tags.unwrap_or_default(),
            subtasks: request.subtasks.unwrap_or_default(),
            position: request.position.unwrap_or(0),
            due_date: request
                .due_date
                .map(|date| date.trim().to_string())
                .filter(|date| !date.is_empty()),
            completed_at: request.completed_at,
            created_at: now,
            updated_at: now,
        };
        card.validate().map_err(InfraError::Validation)?;
        self.repository.insert_card(&user.user_id, &card)?;
        Ok(card)
    }

    pub fn update_card(
        &self,
        user: &AuthenticatedUser,
        patch: KanbanCardPatch,
    ) -> Result<KanbanCard, InfraError> {
        let card_id = required_id(&patch.card_id, "cardId")?;
        let Some(owned) = self.repository.find_card(card_id)? else {
            return Err(InfraError::NotFound(format!("card {card_id}")));
        };
        ensure_owner(&owned.user_id, user)?;

        let mut card = owned.item;
        patch.apply(&mut card, (self.now_provider)());
        card.validate().map_err(InfraError::Validation)?;
        self.repository.update_card(&user.user_id, &card)?;
        Ok(card)
    }

    pub fn delete_card(&self, user: &AuthenticatedUser, card_id: &str) -> Result<(), InfraError> {
        let card_id = required_id(card_id, "cardId")?;
        let Some(owned) = self.repository.find_card(card_id)? else {
            return Err(InfraError::NotFound(format!("card {card_id}")));
        };
        ensure_owner(&owned.user_id, user)?;
        self.repository.delete_card(card_id, &user.user_id)
    }
}

fn required_id<'a>(value: &'a str, field: &str) -> Result<&'a str, InfraError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InfraError::Validation(format!("{field} is required")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::CardPriority;
    use crate::infrastructure::kanban_repository::InMemoryKanbanRepository;

    fn fixed_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-16T10:30:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn service() -> KanbanService<InMemoryKanbanRepository> {
        KanbanService::new(Arc::new(InMemoryKanbanRepository::default()))
            .with_now_provider(Arc::new(fixed_time))
    }

    fn user(user_id: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: user_id.to_string(),
        }
    }

    fn first_column(service: &KanbanService<InMemoryKanbanRepository>, user_id: &str) -> String {
        service.load_board(&user(user_id)).expect("load board")[0].id.clone()
    }

    fn new_card(column_id: &str, title: &str) -> NewKanbanCard {
        NewKanbanCard {
            column_id: column_id.to_string(),
            title: title.to_string(),
            ..NewKanbanCard::default()
        }
    }

    #[test]
    fn first_board_load_creates_default_columns_once() {
        let service = service();

        let board = service.load_board(&user("user-1")).expect("load board");
        assert_eq!(
            board.iter().map(|column| column.title.as_str()).collect::<Vec<_>>(),
            DEFAULT_KANBAN_COLUMNS.to_vec()
        );

        let again = service.load_board(&user("user-1")).expect("reload board");
        assert_eq!(again, board);
    }

    #[test]
    fn add_card_applies_defaults_and_lands_in_its_column() {
        let service = service();
        let column_id = first_column(&service, "user-1");

        let card = service
            .add_card(&user("user-1"), new_card(&column_id, "  Write report "))
            .expect("add card");
        assert_eq!(card.title, "Write report");
        assert_eq!(card.priority, CardPriority::Media);
        assert_eq!(card.created_at, fixed_time());
        assert!(card.tags.is_empty());

        let board = service.load_board(&user("user-1")).expect("load board");
        assert_eq!(board[0].cards, vec![card]);
        assert!(board[1].cards.is_empty());
    }

    #[test]
    fn add_card_requires_an_owned_column() {
        let service = service();
        let theirs = first_column(&service, "user-2");

        let missing_fields = service.add_card(&user("user-1"), new_card("", "x"));
        assert!(matches!(missing_fields, Err(InfraError::Validation(_))));

        let foreign = service.add_card(&user("user-1"), new_card(&theirs, "sneaky"));
        assert!(matches!(foreign, Err(InfraError::NotFound(_))));

        let unknown = service.add_card(&user("user-1"), new_card("nope", "x"));
        assert!(matches!(unknown, Err(InfraError::NotFound(_))));
    }

    #[test]
    fn add_card_rejects_another_users_project() {
        let service = service();
        let column_id = first_column(&service, "user-1");
        let project = service
            .create_project(&user("user-2"), "Theirs", "#000")
            .expect("create project");

        let result = service.add_card(
            &user("user-1"),
            NewKanbanCard {
                project_id: Some(project.id),
                ..new_card(&column_id, "x")
            },
        );
        assert!(matches!(result, Err(InfraError::Forbidden(_))));
    }

    #[test]
    fn update_and_delete_card_check_existence_then_owner() {
        let service = service();
        let column_id = first_column(&service, "user-1");
        let card = service
            .add_card(&user("user-1"), new_card(&column_id, "Mine"))
            .expect("add card");

        let patch = KanbanCardPatch {
            card_id: card.id.clone(),
            priority: Some(CardPriority::Alta),
            ..KanbanCardPatch::default()
        };
        assert!(matches!(
            service.update_card(&user("user-2"), patch.clone()),
            Err(InfraError::Forbidden(_))
        ));
        assert!(matches!(
            service.update_card(
                &user("user-1"),
                KanbanCardPatch {
                    card_id: "missing".to_string(),
                    ..KanbanCardPatch::default()
                }
            ),
            Err(InfraError::NotFound(_))
        ));

        let updated = service.update_card(&user("user-1"), patch).expect("update card");
        assert_eq!(updated.priority, CardPriority::Alta);
        assert_eq!(updated.title, "Mine");

        assert!(matches!(
            service.delete_card(&user("user-2"), &card.id),
            Err(InfraError::Forbidden(_))
        ));
        service.delete_card(&user("user-1"), &card.id).expect("delete card");
        assert!(matches!(
            service.delete_card(&user("user-1"), &card.id),
            Err(InfraError::NotFound(_))
        ));
    }

    #[test]
    fn project_lifecycle_is_scoped_to_owner() {
        let service = service();

        assert!(matches!(
            service.create_project(&user("user-1"), " ", "#fff"),
            Err(InfraError::Validation(_))
        ));

        let project = service
            .create_project(&user("user-1"), "Thesis", "#22c55e")
            .expect("create project");
        assert_eq!(
            service.list_projects(&user("user-1")).expect("list"),
            vec![project.clone()]
        );
        assert!(service.list_projects(&user("user-2")).expect("list").is_empty());

        assert!(matches!(
            service.delete_project(&user("user-2"), &project.id),
            Err(InfraError::Forbidden(_))
        ));
        assert!(matches!(
            service.delete_project(&user("user-1"), "missing"),
            Err(InfraError::NotFound(_))
        ));
        service
            .delete_project(&user("user-1"), &project.id)
            .expect("delete project");
        assert!(service.list_projects(&user("user-1")).expect("list").is_empty());
    }
}
