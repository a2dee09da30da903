use std::path::{Path, PathBuf};

use thiserror::Error;
use utils::diff::{DiffOptions, FileDiff, diff_text, is_binary};

mod branches;
mod cli;
mod commits;
mod files;
mod hash;
mod locks;
mod status;
mod validation;

pub use branches::{
    BranchNode, BranchTree, Branches, LocalBranch, PathCollision, RemoteBranch, UpstreamTrack,
    parse_local_branches, parse_remote_branches,
};
pub use cli::{
    CommandOutcome, CommandRecord, CommandRecorder, CommandType, DEFAULT_MUTATION_TIMEOUT,
    DEFAULT_QUERY_TIMEOUT, GitCli, GitCliConfig, GitCliError, GitCommand, GitOutput, LockScope,
};
pub use commits::{Commit, CommitUser, email_hash, parse_log, split_message};
pub use files::{ChangedFiles, File, FileStatus, parse_raw_diff};
pub use hash::{EMPTY_TREE, GitHash, InvalidHash};
pub use locks::{RepoLocks, ScopeGuard};
pub use status::parse_porcelain_v2;
pub use validation::{is_repo_relative_path, normalize_repo_path};

const PARSE_ERROR_EXCERPT: usize = 200;

/// git printed something the parsers do not accept.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unexpected git output ({context}): {excerpt}")]
pub struct ParseError {
    pub context: &'static str,
    pub excerpt: String,
}

impl ParseError {
    pub fn new(context: &'static str, input: &str) -> Self {
        let excerpt = match input.char_indices().nth(PARSE_ERROR_EXCERPT) {
            Some((end, _)) => format!("{}...", &input[..end]),
            None => input.to_string(),
        };
        Self {
            context,
            excerpt: excerpt.replace('\0', "\\0"),
        }
    }
}

impl From<InvalidHash> for ParseError {
    fn from(err: InvalidHash) -> Self {
        ParseError::new("object name", &err.0)
    }
}

#[derive(Debug, Error)]
pub enum GitServiceError {
    #[error(transparent)]
    GitCLI(#[from] GitCliError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Invalid repository: {0}")]
    InvalidRepository(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Binary file: {0}")]
    BinaryFile(String),
    #[error("Cannot read {path} from the working tree: {source}")]
    WorkingTree {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Read-side git operations of the engine, plus fetch.
///
/// Everything that shells out goes through the shared [`GitCli`], so each
/// call is locked, time-limited and recorded.
#[derive(Clone)]
pub struct GitService {
    cli: GitCli,
    diff_options: DiffOptions,
}

impl GitService {
    pub fn new(cli: GitCli, diff_options: DiffOptions) -> Self {
        Self { cli, diff_options }
    }

    pub fn cli(&self) -> &GitCli {
        &self.cli
    }

    pub fn diff_options(&self) -> &DiffOptions {
        &self.diff_options
    }

    /// Resolve `path` (the top level or any directory inside a working tree)
    /// to the canonical top level of its repository.
    pub async fn resolve_worktree(&self, path: &Path) -> Result<PathBuf, GitServiceError> {
        if !path.is_dir() {
            return Err(GitServiceError::InvalidRepository(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        let output = self
            .cli
            .run(path, GitCommand::new("rev-parse").arg("--show-toplevel"))
            .await?;
        let toplevel = output.stdout_lossy();
        let toplevel = toplevel.trim_end_matches(['\n', '\r']);
        if !output.success() || toplevel.is_empty() {
            return Err(GitServiceError::InvalidRepository(format!(
                "{} is not inside a git working tree: {}",
                path.display(),
                output.stderr_lossy().trim()
            )));
        }
        let toplevel = PathBuf::from(toplevel);
        tokio::task::spawn_blocking(move || dunce::canonicalize(toplevel))
            .await
            .map_err(|e| GitServiceError::IoError(std::io::Error::other(e)))?
            .map_err(GitServiceError::from)
    }

    pub async fn get_branches(&self, repo_path: &Path) -> Result<Branches, GitServiceError> {
        let local = self
            .cli
            .run_checked(
                repo_path,
                GitCommand::new("for-each-ref")
                    .ref_format_arg(&branches::LOCAL_BRANCH_FIELDS, "%00")
                    .arg("refs/heads"),
            )
            .await?;
        let remote = self
            .cli
            .run_checked(
                repo_path,
                GitCommand::new("for-each-ref")
                    .ref_format_arg(&branches::REMOTE_BRANCH_FIELDS, "%00")
                    .arg("refs/remotes"),
            )
            .await?;
        Ok(Branches {
            local: parse_local_branches(&local.stdout_lossy())?,
            remote: parse_remote_branches(&remote.stdout_lossy())?,
        })
    }

    /// Commits reachable from any ref, newest first.
    pub async fn get_graph(
        &self,
        repo_path: &Path,
        limit: Option<usize>,
    ) -> Result<Vec<Commit>, GitServiceError> {
        let mut command = GitCommand::new("log")
            .args(["--all", "--date-order", "-z", commits::LOG_FORMAT]);
        if let Some(limit) = limit {
            command = command.arg(format!("--max-count={limit}"));
        }
        let output = self.cli.run(repo_path, command.clone()).await?;
        if !output.success() {
            let stderr = output.stderr_lossy();
            if stderr.contains("does not have any commits yet") {
                return Ok(Vec::new());
            }
            return Err(GitCliError::CommandFailed {
                command: command.display(),
                command_type: command.command_type(),
                exit_code: output.exit_code,
                stderr: stderr.trim().to_string(),
            }
            .into());
        }
        Ok(parse_log(&output.stdout_lossy())?)
    }

    /// Files changed by `hash` relative to its first parent, or to the empty
    /// tree for a root commit.
    pub async fn get_commit_files(
        &self,
        repo_path: &Path,
        hash: &GitHash,
    ) -> Result<Vec<File>, GitServiceError> {
        let parents = self
            .cli
            .run_checked(
                repo_path,
                GitCommand::new("rev-list")
                    .args(["--parents", "-n", "1"])
                    .arg(format!("{hash}^{{commit}}"))
                    .arg("--"),
            )
            .await
            .map_err(|e| not_found_as(e, format!("commit {hash}")))?;
        let parents = parents.stdout_lossy();
        let mut ids = parents.split_whitespace();
        if ids.next().is_none() {
            return Err(GitServiceError::NotFound(format!("commit {hash}")));
        }
        let base = match ids.next() {
            Some(parent) => GitHash::parse(parent).map_err(ParseError::from)?.to_string(),
            None => EMPTY_TREE.to_string(),
        };

        let output = self
            .cli
            .run_checked(
                repo_path,
                GitCommand::new("diff-tree")
                    .args(["-r", "-z", "-M", "-C", "--raw", "--abbrev=40"])
                    .arg(base)
                    .arg(hash),
            )
            .await?;
        Ok(parse_raw_diff(&output.stdout_lossy())?)
    }

    /// Line and word diff of one file as changed by `hash`. `path` may name
    /// either side of a rename.
    pub async fn get_file_diff(
        &self,
        repo_path: &Path,
        hash: &GitHash,
        path: &str,
    ) -> Result<FileDiff, GitServiceError> {
        let files = self.get_commit_files(repo_path, hash).await?;
        let file = files
            .iter()
            .find(|f| f.dst_path.as_deref() == Some(path))
            .or_else(|| files.iter().find(|f| f.src_path.as_deref() == Some(path)))
            .ok_or_else(|| GitServiceError::NotFound(format!("{path} in commit {hash}")))?;

        let old = self.read_blob(repo_path, file.src_hash.as_ref()).await?;
        let new = self.read_blob(repo_path, file.dst_hash.as_ref()).await?;
        self.diff_contents(path, old, new).await
    }

    /// Staged and unstaged changes of the working tree.
    pub async fn get_changed_files(
        &self,
        repo_path: &Path,
    ) -> Result<ChangedFiles, GitServiceError> {
        let output = self
            .cli
            .run_checked(
                repo_path,
                GitCommand::new("status").args(["--porcelain=v2", "-z", "--untracked-files=all"]),
            )
            .await?;
        Ok(parse_porcelain_v2(&output.stdout_lossy())?)
    }

    /// Diff of a changed file in the working tree: HEAD against the index
    /// when `staged`, otherwise the index against the file on disk.
    pub async fn get_working_file_diff(
        &self,
        repo_path: &Path,
        path: &str,
        staged: bool,
    ) -> Result<FileDiff, GitServiceError> {
        let path = normalize_repo_path(path)
            .ok_or_else(|| GitServiceError::InvalidPath(path.to_string()))?;
        let path = path.as_str();
        let changes = self.get_changed_files(repo_path).await?;
        let side = if staged {
            &changes.staged
        } else {
            &changes.unstaged
        };
        let file = side
            .iter()
            .find(|f| f.matches_path(path))
            .ok_or_else(|| GitServiceError::NotFound(format!("{path} has no changes")))?;

        let old = match (&file.src_hash, file.status) {
            (Some(hash), _) => self.read_blob(repo_path, Some(hash)).await?,
            (None, FileStatus::Unmerged) => self.read_head_blob(repo_path, path).await?,
            (None, _) => Vec::new(),
        };
        let new = if staged {
            self.read_blob(repo_path, file.dst_hash.as_ref()).await?
        } else {
            match &file.dst_path {
                Some(dst) => read_worktree_file(repo_path, dst).await?,
                None => Vec::new(),
            }
        };
        self.diff_contents(path, old, new).await
    }

    /// `git fetch --all --prune`; updates remote-tracking refs only.
    pub async fn fetch(&self, repo_path: &Path) -> Result<(), GitServiceError> {
        self.cli
            .run_checked(
                repo_path,
                GitCommand::new("fetch")
                    .args(["--all", "--prune"])
                    .scope(LockScope::Refs),
            )
            .await?;
        Ok(())
    }

    async fn read_blob(
        &self,
        repo_path: &Path,
        hash: Option<&GitHash>,
    ) -> Result<Vec<u8>, GitServiceError> {
        let Some(hash) = hash else {
            return Ok(Vec::new());
        };
        let output = self
            .cli
            .run_checked(repo_path, GitCommand::new("cat-file").arg("blob").arg(hash))
            .await
            .map_err(|e| not_found_as(e, format!("blob {hash}")))?;
        Ok(output.stdout)
    }

    async fn read_head_blob(&self, repo_path: &Path, path: &str) -> Result<Vec<u8>, GitServiceError> {
        let output = self
            .cli
            .run(
                repo_path,
                GitCommand::new("cat-file")
                    .arg("blob")
                    .arg(format!("HEAD:{path}")),
            )
            .await?;
        Ok(if output.success() {
            output.stdout
        } else {
            Vec::new()
        })
    }

    async fn diff_contents(
        &self,
        path: &str,
        old: Vec<u8>,
        new: Vec<u8>,
    ) -> Result<FileDiff, GitServiceError> {
        if is_binary(&old) || is_binary(&new) {
            return Err(GitServiceError::BinaryFile(path.to_string()));
        }
        // Text that is not UTF-8 cannot be shown line by line either.
        let (Ok(old), Ok(new)) = (String::from_utf8(old), String::from_utf8(new)) else {
            return Err(GitServiceError::BinaryFile(path.to_string()));
        };
        let options = self.diff_options.clone();
        tokio::task::spawn_blocking(move || diff_text(&old, &new, &options))
        .await
        .map_err(|e| GitServiceError::IoError(std::io::Error::other(e)))
    }
}

/// Working-tree content of `rel` as git would hash it: a symlink yields its
/// target text, never the file it points to.
async fn read_worktree_file(repo_path: &Path, rel: &str) -> Result<Vec<u8>, GitServiceError> {
    let full = repo_path.join(rel);
    let worktree_error = |source| GitServiceError::WorkingTree {
        path: rel.to_string(),
        source,
    };
    let metadata = tokio::fs::symlink_metadata(&full)
        .await
        .map_err(worktree_error)?;
    if metadata.file_type().is_symlink() {
        let target = tokio::fs::read_link(&full).await.map_err(worktree_error)?;
        return Ok(target.into_os_string().into_encoded_bytes());
    }
    tokio::fs::read(&full).await.map_err(worktree_error)
}

fn not_found_as(err: GitCliError, what: String) -> GitServiceError {
    match &err {
        GitCliError::CommandFailed { stderr, .. }
            if ["bad object", "unknown revision", "bad revision", "Not a valid object"]
                .iter()
                .any(|needle| stderr.contains(needle)) =>
        {
            GitServiceError::NotFound(what)
        }
        _ => GitServiceError::GitCLI(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_excerpt_is_bounded_and_printable() {
        let long = "x\0".repeat(500);
        let err = ParseError::new("status entry", &long);
        assert!(err.excerpt.ends_with("..."));
        assert!(!err.excerpt.contains('\0'));
        assert!(err.to_string().starts_with("unexpected git output (status entry)"));
    }

    #[test]
    fn unknown_revisions_map_to_not_found() {
        let err = GitCliError::CommandFailed {
            command: "git rev-list".into(),
            command_type: CommandType::Query,
            exit_code: Some(128),
            stderr: "fatal: bad object deadbeef".into(),
        };
        assert!(matches!(
            not_found_as(err, "commit".into()),
            GitServiceError::NotFound(_)
        ));
        let other = GitCliError::NotAvailable;
        assert!(matches!(
            not_found_as(other, "commit".into()),
            GitServiceError::GitCLI(_)
        ));
    }
}
