use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::cli::LockScope;

#[derive(Default)]
struct RepoLock {
    mutation: Arc<Mutex<()>>,
    worktree: Arc<RwLock<()>>,
}

/// Per-repository locks keyed by working-tree path.
///
/// Mutations of one repository are serialized on `mutation`; reads share
/// `worktree` and are only excluded by working-tree mutations. Paths are used
/// as given: the registry only hands out canonical working-tree roots. An
/// entry lives while some guard or waiter references it.
#[derive(Clone, Default)]
pub struct RepoLocks {
    repos: Arc<DashMap<PathBuf, Arc<RepoLock>>>,
}

/// Held for the duration of one git invocation.
pub struct ScopeGuard {
    _repo: Arc<RepoLock>,
    _mutation: Option<OwnedMutexGuard<()>>,
    _read: Option<OwnedRwLockReadGuard<()>>,
    _write: Option<OwnedRwLockWriteGuard<()>>,
}

impl RepoLocks {
    pub async fn acquire(&self, repo_path: &Path, scope: LockScope) -> ScopeGuard {
        let lock = self.lock_for(repo_path);
        let (mutation, read, write) = match scope {
            LockScope::Read => (None, Some(lock.worktree.clone().read_owned().await), None),
            LockScope::Refs => (Some(lock.mutation.clone().lock_owned().await), None, None),
            LockScope::Worktree => {
                let mutation = lock.mutation.clone().lock_owned().await;
                let write = lock.worktree.clone().write_owned().await;
                (Some(mutation), None, Some(write))
            }
        };
        ScopeGuard {
            _repo: lock,
            _mutation: mutation,
            _read: read,
            _write: write,
        }
    }

    fn lock_for(&self, repo_path: &Path) -> Arc<RepoLock> {
        // Only the map itself still points at idle entries.
        self.repos.retain(|_, lock| Arc::strong_count(lock) > 1);
        self.repos
            .entry(repo_path.to_path_buf())
            .or_default()
            .clone()
    }

    /// Repositories with a command running or waiting.
    pub fn active(&self) -> usize {
        self.repos
            .iter()
            .filter(|entry| Arc::strong_count(entry.value()) > 1)
            .count()
    }
}
