use crate::domain::models::{Category, CategoryFields};
use crate::infrastructure::error::{lock_poisoned, InfraError};
use crate::infrastructure::storage::open_connection;
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedCategory {
    pub user_id: String,
    pub category: Category,
}

pub trait CategoryRepository: Send + Sync {
    /// Categories owned by `user_id`, oldest first.
    fn list_by_user(&self, user_id: &str) -> Result<Vec<Category>, InfraError>;
    fn find(&self, category_id: &str) -> Result<Option<OwnedCategory>, InfraError>;
    fn delete_many(&self, user_id: &str, category_ids: &[String]) -> Result<(), InfraError>;
    fn update(
        &self,
        category_id: &str,
        user_id: &str,
        fields: &CategoryFields,
    ) -> Result<(), InfraError>;
    fn insert(&self, user_id: &str, category: &Category) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteCategoryRepository {
    db_path: PathBuf,
}

impl SqliteCategoryRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }
}

fn category_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        color: row.get(2)?,
        duration_minutes: row.get(3)?,
    })
}

impl CategoryRepository for SqliteCategoryRepository {
    fn list_by_user(&self, user_id: &str) -> Result<Vec<Category>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, name, color, duration_minutes
             FROM pomodoro_categories
             WHERE user_id = ?1
             ORDER BY created_at, rowid",
        )?;
        let rows = statement.query_map(params![user_id], category_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(InfraError::from)
    }

    fn find(&self, category_id: &str) -> Result<Option<OwnedCategory>, InfraError> {
        let connection = self.connect()?;
        let found = connection
            .query_row(
                "SELECT id, name, color, duration_minutes, user_id
                 FROM pomodoro_categories
                 WHERE id = ?1",
                params![category_id],
                |row| {
                    Ok(OwnedCategory {
                        category: category_from_row(row)?,
                        user_id: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(found)
    }

    fn delete_many(&self, user_id: &str, category_ids: &[String]) -> Result<(), InfraError> {
        if category_ids.is_empty() {
            return Ok(());
        }
        let placeholders = (0..category_ids.len())
            .map(|index| format!("?{}", index + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "DELETE FROM pomodoro_categories WHERE user_id = ?1 AND id IN ({placeholders})"
        );

        let mut values = Vec::with_capacity(category_ids.len() + 1);
        values.push(user_id);
        values.extend(category_ids.iter().map(String::as_str));

        let connection = self.connect()?;
        connection.execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    fn update(
        &self,
        category_id: &str,
        user_id: &str,
        fields: &CategoryFields,
    ) -> Result<(), InfraError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE pomodoro_categories
             SET name = ?1, color = ?2, duration_minutes = ?3
             WHERE id = ?4 AND user_id = ?5",
            params![
                fields.name,
                fields.color,
                fields.duration_minutes,
                category_id,
                user_id
            ],
        )?;
        if changed == 0 {
            return Err(InfraError::NotFound(format!("category {category_id}")));
        }
        Ok(())
    }

    fn insert(&self, user_id: &str, category: &Category) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO pomodoro_categories (id, user_id, name, color, duration_minutes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                category.id,
                user_id,
                category.name,
                category.color,
                category.duration_minutes,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCategoryRepository {
    rows: Mutex<Vec<OwnedCategory>>,
}

impl InMemoryCategoryRepository {
    fn rows(&self) -> Result<std::sync::MutexGuard<'_, Vec<OwnedCategory>>, InfraError> {
        self.rows
            .lock()
            .map_err(|error| lock_poisoned("category repository", error))
    }
}

impl CategoryRepository for InMemoryCategoryRepository {
    fn list_by_user(&self, user_id: &str) -> Result<Vec<Category>, InfraError> {
        Ok(self
            .rows()?
            .iter()
            .filter(|row| row.user_id == user_id)
            .map(|row| row.category.clone())
            .collect())
    }

    fn find(&self, category_id: &str) -> Result<Option<OwnedCategory>, InfraError> {
        Ok(self
            .rows()?
            .iter()
            .find(|row| row.category.id == category_id)
            .cloned())
    }

    fn delete_many(&self, user_id: &str, category_ids: &[String]) -> Result<(), InfraError> {
        self.rows()?
            .retain(|row| row.user_id != user_id || !category_ids.contains(&row.category.id));
        Ok(())
    }

    fn update(
        &self,
        category_id: &str,
        user_id: &str,
        fields: &CategoryFields,
    ) -> Result<(), InfraError> {
        let mut rows = self.rows()?;
        let row = rows
            .iter_mut()
            .find(|row| row.category.id == category_id && row.user_id == user_id)
            .ok_or_else(|| InfraError::NotFound(format!("category {category_id}")))?;
        row.category.name = fields.name.clone();
        row.category.color = fields.color.clone();
        row.category.duration_minutes = fields.duration_minutes;
        Ok(())
    }

    fn insert(&self, user_id: &str, category: &Category) -> Result<(), InfraError> {
        let mut rows = self.rows()?;
        if rows.iter().any(|row| row.category.id == category.id) {
            return Err(InfraError::Storage(format!(
                "duplicate key: category {} already exists",
                category.id
            )));
        }
        rows.push(OwnedCategory {
            user_id: user_id.to_string(),
            category: category.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::initialize_database;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_DB: AtomicUsize = AtomicUsize::new(0);

    struct TempDatabase {
        path: PathBuf,
    }

    impl TempDatabase {
        fn new() -> Self {
            let sequence = NEXT_DB.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "pomoboard-category-tests-{}-{}.sqlite",
                std::process::id(),
                sequence
            ));
            initialize_database(&path).expect("initialize database");
            Self { path }
        }
    }

    impl Drop for TempDatabase {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    fn work() -> Category {
        Category::new("a", "Work", "#fff", 25)
    }

    #[test]
    fn sqlite_insert_list_update_delete() {
        let database = TempDatabase::new();
        let repository = SqliteCategoryRepository::new(&database.path);

        repository.insert("user-1", &work()).expect("insert a");
        repository
            .insert("user-1", &Category::new("b", "Study", "#000", 50))
            .expect("insert b");
        repository
            .insert("user-2", &Category::new("c", "Other", "#111", 10))
            .expect("insert c");

        let listed = repository.list_by_user("user-1").expect("list");
        assert_eq!(
            listed.iter().map(|category| category.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        repository
            .update(
                "a",
                "user-1",
                &CategoryFields {
                    name: "Deep Work".to_string(),
                    color: "#fff".to_string(),
                    duration_minutes: 50,
                },
            )
            .expect("update a");
        let found = repository.find("a").expect("find").expect("a exists");
        assert_eq!(found.user_id, "user-1");
        assert_eq!(found.category, Category::new("a", "Deep Work", "#fff", 50));

        repository
            .delete_many("user-1", &["b".to_string(), "c".to_string()])
            .expect("delete");
        assert_eq!(repository.list_by_user("user-1").expect("list").len(), 1);
        assert!(repository.find("c").expect("find c").is_some());
    }

    #[test]
    fn sqlite_update_is_scoped_to_owner() {
        let database = TempDatabase::new();
        let repository = SqliteCategoryRepository::new(&database.path);
        repository.insert("user-1", &work()).expect("insert");

        let result = repository.update("a", "user-2", &work().fields());
        assert!(matches!(result, Err(InfraError::NotFound(_))));
    }

    #[test]
    fn sqlite_insert_rejects_existing_id() {
        let database = TempDatabase::new();
        let repository = SqliteCategoryRepository::new(&database.path);
        repository.insert("user-1", &work()).expect("insert");

        let result = repository.insert("user-2", &work());
        assert!(matches!(result, Err(InfraError::Sqlite(_))));
    }

    #[test]
    fn in_memory_matches_sqlite_semantics() {
        let repository = InMemoryCategoryRepository::default();
        repository.insert("user-1", &work()).expect("insert");
        assert!(repository.insert("user-2", &work()).is_err());
        assert!(repository.update("a", "user-2", &work().fields()).is_err());

        repository
            .delete_many("user-2", &["a".to_string()])
            .expect("delete other user's id");
        assert_eq!(repository.list_by_user("user-1").expect("list").len(), 1);
    }
}
