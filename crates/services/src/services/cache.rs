use std::{future::Future, path::Path, sync::Arc};

use git::{File, GitHash};
use moka::future::Cache;
use utils::{diff::FileDiff, path::path_key};

type FilesKey = (String, GitHash);
type DiffKey = (String, GitHash, String);

/// Results addressed by commit hash. A commit never changes, so entries only
/// leave through capacity eviction or [`ResultCache::invalidate_repo`].
#[derive(Clone)]
pub struct ResultCache {
    files: Cache<FilesKey, Arc<Vec<File>>>,
    diffs: Cache<DiffKey, Arc<FileDiff>>,
}

impl ResultCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            files: Cache::builder()
                .max_capacity(capacity)
                .support_invalidation_closures()
                .build(),
            diffs: Cache::builder()
                .max_capacity(capacity)
                .support_invalidation_closures()
                .build(),
        }
    }

    pub async fn commit_files<E, F>(
        &self,
        repo_path: &Path,
        hash: &GitHash,
        load: F,
    ) -> Result<Arc<Vec<File>>, E>
    where
        F: Future<Output = Result<Vec<File>, E>>,
    {
        let key = (repo_key(repo_path), hash.clone());
        if let Some(files) = self.files.get(&key).await {
            return Ok(files);
        }
        let files = Arc::new(load.await?);
        self.files.insert(key, files.clone()).await;
        Ok(files)
    }

    pub async fn file_diff<E, F>(
        &self,
        repo_path: &Path,
        hash: &GitHash,
        path: &str,
        load: F,
    ) -> Result<Arc<FileDiff>, E>
    where
        F: Future<Output = Result<FileDiff, E>>,
    {
        let key = (repo_key(repo_path), hash.clone(), path.to_string());
        if let Some(diff) = self.diffs.get(&key).await {
            return Ok(diff);
        }
        let diff = Arc::new(load.await?);
        self.diffs.insert(key, diff.clone()).await;
        Ok(diff)
    }

    /// Drop every entry belonging to `repo_path`.
    pub fn invalidate_repo(&self, repo_path: &Path) {
        let repo = repo_key(repo_path);
        let files_repo = repo.clone();
        if let Err(e) = self
            .files
            .invalidate_entries_if(move |(path, _), _| *path == files_repo)
        {
            tracing::warn!("Falling back to clearing the commit files cache: {}", e);
            self.files.invalidate_all();
        }
        if let Err(e) = self
            .diffs
            .invalidate_entries_if(move |(path, _, _), _| *path == repo)
        {
            tracing::warn!("Falling back to clearing the diff cache: {}", e);
            self.diffs.invalidate_all();
        }
    }
}

fn repo_key(repo_path: &Path) -> String {
    path_key(repo_path)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn hash(c: char) -> GitHash {
        GitHash::parse(&c.to_string().repeat(40)).unwrap()
    }

    #[tokio::test]
    async fn second_lookup_does_not_load() {
        let cache = ResultCache::new(16);
        let loads = AtomicUsize::new(0);
        let load = || {
            let loads = &loads;
            async move {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(FileDiff::default())
            }
        };

        let repo = Path::new("/r");
        cache.file_diff(repo, &hash('a'), "x", load()).await.unwrap();
        cache.file_diff(repo, &hash('a'), "x", load()).await.unwrap();
        cache.file_diff(repo, &hash('a'), "y", load()).await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache = ResultCache::new(16);
        let repo = Path::new("/r");
        let failed = cache
            .commit_files(repo, &hash('b'), async { Err::<Vec<File>, _>("boom") })
            .await;
        assert_eq!(failed, Err("boom"));
        let loaded = cache
            .commit_files(repo, &hash('b'), async { Ok::<_, &str>(Vec::new()) })
            .await
            .unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn invalidation_is_scoped_to_one_repository() {
        let cache = ResultCache::new(16);
        let loads = AtomicUsize::new(0);
        let load = || {
            let loads = &loads;
            async move {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(Vec::new())
            }
        };

        cache.commit_files(Path::new("/a"), &hash('c'), load()).await.unwrap();
        cache.commit_files(Path::new("/b"), &hash('c'), load()).await.unwrap();
        cache.invalidate_repo(Path::new("/a"));
        cache.commit_files(Path::new("/a"), &hash('c'), load()).await.unwrap();
        cache.commit_files(Path::new("/b"), &hash('c'), load()).await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 3);
    }
}
