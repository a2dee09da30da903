use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use thiserror::Error;
use ts_rs::TS;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("Repository not found")]
    NotFound,
}

/// A registered working tree.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize, TS)]
pub struct Repository {
    pub id: i64,
    pub name: String,
    /// Canonical absolute path of the working tree root.
    pub local_path: String,
    pub created_at: NaiveDateTime,
    pub last_opened_at: Option<NaiveDateTime>,
    pub last_fetched_at: Option<NaiveDateTime>,
    pub has_changes: bool,
}

const COLUMNS: &str =
    "id, name, local_path, created_at, last_opened_at, last_fetched_at, has_changes";

impl Repository {
    /// Insert `path`, or return the existing row registered for it.
    pub async fn find_or_create<'e, E>(executor: E, path: &Path) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let local_path = path.to_string_lossy().to_string();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| local_path.clone());

        // The no-op update makes RETURNING yield the existing row on conflict.
        sqlx::query_as::<_, Repository>(&format!(
            "INSERT INTO repositories (name, local_path) VALUES ($1, $2)
             ON CONFLICT(local_path) DO UPDATE SET name = name
             RETURNING {COLUMNS}"
        ))
        .bind(name)
        .bind(local_path)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Repository>(&format!(
            "SELECT {COLUMNS} FROM repositories WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Most recently opened first; never-opened repositories last, by name.
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Repository>(&format!(
            "SELECT {COLUMNS} FROM repositories
             ORDER BY last_opened_at DESC NULLS LAST, name ASC, id ASC"
        ))
        .fetch_all(pool)
        .await
    }

    pub async fn touch_opened(pool: &SqlitePool, id: i64) -> Result<Self, RepositoryError> {
        sqlx::query_as::<_, Repository>(&format!(
            "UPDATE repositories SET last_opened_at = datetime('now', 'subsec')
             WHERE id = $1
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    pub async fn mark_fetched(pool: &SqlitePool, id: i64) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE repositories SET last_fetched_at = datetime('now', 'subsec') WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    pub async fn set_has_changes(
        pool: &SqlitePool,
        id: i64,
        has_changes: bool,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE repositories SET has_changes = $1 WHERE id = $2")
            .bind(has_changes)
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::DBService;

    #[tokio::test]
    async fn registering_a_path_twice_returns_the_same_row() {
        let db = DBService::new_in_memory().await.unwrap();
        let path = PathBuf::from("/work/alpha");
        let first = Repository::find_or_create(&db.pool, &path).await.unwrap();
        let second = Repository::find_or_create(&db.pool, &path).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.name, "alpha");
        assert_eq!(first.local_path, "/work/alpha");
        assert!(!first.has_changes);
        assert_eq!(Repository::list_all(&db.pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn listing_puts_recently_opened_first() {
        let db = DBService::new_in_memory().await.unwrap();
        let zulu = Repository::find_or_create(&db.pool, Path::new("/w/zulu"))
            .await
            .unwrap();
        Repository::find_or_create(&db.pool, Path::new("/w/bravo"))
            .await
            .unwrap();
        Repository::find_or_create(&db.pool, Path::new("/w/alpha"))
            .await
            .unwrap();
        let opened = Repository::touch_opened(&db.pool, zulu.id).await.unwrap();
        assert!(opened.last_opened_at.is_some());

        let names: Vec<String> = Repository::list_all(&db.pool)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["zulu", "alpha", "bravo"]);
    }

    #[tokio::test]
    async fn bookkeeping_updates_report_missing_rows() {
        let db = DBService::new_in_memory().await.unwrap();
        let repo = Repository::find_or_create(&db.pool, Path::new("/w/repo"))
            .await
            .unwrap();

        Repository::mark_fetched(&db.pool, repo.id).await.unwrap();
        Repository::set_has_changes(&db.pool, repo.id, true)
            .await
            .unwrap();
        let reloaded = Repository::find_by_id(&db.pool, repo.id)
            .await
            .unwrap()
            .unwrap();
        assert!(reloaded.last_fetched_at.is_some());
        assert!(reloaded.has_changes);

        assert!(matches!(
            Repository::mark_fetched(&db.pool, 999).await,
            Err(RepositoryError::NotFound)
        ));
        assert!(matches!(
            Repository::touch_opened(&db.pool, 999).await,
            Err(RepositoryError::NotFound)
        ));
    }
}
