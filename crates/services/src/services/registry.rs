use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use db::{
    DBService,
    models::{
        app_state::AppState,
        repository::{Repository, RepositoryError},
    },
};
use git::{GitService, GitServiceError};
use thiserror::Error;
use tokio::sync::RwLock;
use utils::path::absolute_path;

use super::{
    cache::ResultCache,
    events::{EngineEvent, EventService},
};

const OPEN_REPOSITORY_KEY: &str = "open_repository_id";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Git(#[from] GitServiceError),
    #[error("Invalid repository: {0}")]
    InvalidRepository(String),
    #[error("Repository {0} not found")]
    NotFound(i64),
    #[error("no repository is open")]
    NoOpenRepository,
}

/// Known working trees and the one currently open.
#[derive(Clone)]
pub struct RegistryService {
    db: DBService,
    git: GitService,
    events: EventService,
    cache: ResultCache,
    open: Arc<RwLock<Option<i64>>>,
}

impl RegistryService {
    pub fn new(db: DBService, git: GitService, events: EventService, cache: ResultCache) -> Self {
        Self {
            db,
            git,
            events,
            cache,
            open: Arc::new(RwLock::new(None)),
        }
    }

    /// Load the persisted open repository id, if any.
    pub async fn restore(&self) -> Result<Option<Repository>, RegistryError> {
        let Some(raw) = AppState::get(&self.db.pool, OPEN_REPOSITORY_KEY).await? else {
            return Ok(None);
        };
        let Ok(id) = raw.parse::<i64>() else {
            tracing::warn!("Ignoring malformed open repository id {:?}", raw);
            AppState::clear(&self.db.pool, OPEN_REPOSITORY_KEY).await?;
            return Ok(None);
        };
        *self.open.write().await = Some(id);
        self.get_open().await
    }

    /// Register the working tree containing `path`. Adding a path that is
    /// already known, or any directory inside it, returns the existing entry.
    pub async fn add(&self, path: &str) -> Result<Repository, RegistryError> {
        let path = absolute_path(path)
            .map_err(|e| RegistryError::InvalidRepository(format!("{path}: {e}")))?;
        if !path.exists() {
            return Err(RegistryError::InvalidRepository(format!(
                "{} does not exist",
                path.display()
            )));
        }
        if !path.is_dir() {
            return Err(RegistryError::InvalidRepository(format!(
                "{} is not a directory",
                path.display()
            )));
        }

        let toplevel = self.git.resolve_worktree(&path).await?;
        let repository = Repository::find_or_create(&self.db.pool, &toplevel).await?;
        tracing::info!(
            "Registered repository {} at {}",
            repository.id,
            repository.local_path
        );
        Ok(repository)
    }

    /// Register the working tree containing `path` and make it the open one.
    pub async fn add_and_open(&self, path: &str) -> Result<Repository, RegistryError> {
        let repository = self.add(path).await?;
        self.set_open(repository.id).await
    }

    pub async fn list(&self) -> Result<Vec<Repository>, RegistryError> {
        Ok(Repository::list_all(&self.db.pool).await?)
    }

    pub async fn set_open(&self, id: i64) -> Result<Repository, RegistryError> {
        let mut open = self.open.write().await;
        let previous = match *open {
            Some(previous) if previous != id => {
                Repository::find_by_id(&self.db.pool, previous).await?
            }
            _ => None,
        };

        let repository = match Repository::touch_opened(&self.db.pool, id).await {
            Ok(repository) => repository,
            Err(RepositoryError::NotFound) => return Err(RegistryError::NotFound(id)),
            Err(e) => return Err(e.into()),
        };
        AppState::set(&self.db.pool, OPEN_REPOSITORY_KEY, &id.to_string()).await?;
        *open = Some(id);
        drop(open);

        if let Some(previous) = previous {
            self.cache.invalidate_repo(Path::new(&previous.local_path));
        }
        tracing::info!("Opened repository {} ({})", repository.id, repository.name);
        self.events
            .publish(EngineEvent::OpenRepositoryChanged(Some(repository.clone())));
        Ok(repository)
    }

    /// The open repository, or `None` when nothing is open or its row is gone.
    pub async fn get_open(&self) -> Result<Option<Repository>, RegistryError> {
        let Some(id) = *self.open.read().await else {
            return Ok(None);
        };
        Ok(Repository::find_by_id(&self.db.pool, id).await?)
    }

    /// Working tree of the open repository.
    pub async fn require_open(&self) -> Result<(Repository, PathBuf), RegistryError> {
        match self.get_open().await? {
            Some(repository) => {
                let path = PathBuf::from(&repository.local_path);
                Ok((repository, path))
            }
            None => Err(RegistryError::NoOpenRepository),
        }
    }

    pub async fn mark_fetched(&self, id: i64) -> Result<(), RegistryError> {
        Ok(Repository::mark_fetched(&self.db.pool, id).await?)
    }

    pub async fn set_has_changes(&self, id: i64, has_changes: bool) -> Result<(), RegistryError> {
        Ok(Repository::set_has_changes(&self.db.pool, id, has_changes).await?)
    }
}
