//! Git command executor.
//!
//! Every git invocation the engine performs goes through [`GitCli::run`]. A
//! call acquires the per-repository lock for its [`LockScope`], runs the git
//! binary with a timeout, and hands exactly one [`CommandRecord`] to the
//! configured [`CommandRecorder`] before returning. That holds for spawn
//! failures and timeouts too, and a call whose future is dropped mid-flight is
//! still recorded as [`CommandOutcome::Cancelled`].
use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use tokio::{process::Command, sync::OnceCell};
use ts_rs::TS;
use utils::shell::resolve_executable_path;

use crate::locks::RepoLocks;

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MUTATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Whether an invocation can change repository state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, Display)]
pub enum CommandType {
    Query,
    Mutation,
}

impl CommandType {
    pub fn as_i64(self) -> i64 {
        match self {
            CommandType::Query => 0,
            CommandType::Mutation => 1,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(CommandType::Query),
            1 => Some(CommandType::Mutation),
            _ => None,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum CommandOutcome {
    Success,
    /// git ran and exited non-zero.
    Failed,
    Timeout,
    /// The caller went away before git finished.
    Cancelled,
    /// git could not be started at all.
    SpawnFailed,
}

/// What an invocation may touch, which decides both its lock and its
/// [`CommandType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockScope {
    /// Read-only; runs concurrently with other reads and with ref mutations.
    Read,
    /// Changes refs only (fetch). Serialized with other mutations.
    Refs,
    /// Changes the index or working tree. Excludes everything else.
    Worktree,
}

impl LockScope {
    pub fn command_type(self) -> CommandType {
        match self {
            LockScope::Read => CommandType::Query,
            LockScope::Refs | LockScope::Worktree => CommandType::Mutation,
        }
    }
}

/// One finished (or abandoned) git invocation.
#[derive(Debug, Clone)]
pub struct CommandRecord {
    pub repo_path: PathBuf,
    pub command: String,
    pub command_type: CommandType,
    pub outcome: CommandOutcome,
    pub exit_code: Option<i32>,
    pub duration: Duration,
    pub finished_at: DateTime<Utc>,
}

/// Sink for the audit trail of git invocations.
#[async_trait]
pub trait CommandRecorder: Send + Sync + 'static {
    async fn record(&self, record: CommandRecord);
}

#[derive(Debug, Error)]
pub enum GitCliError {
    #[error("git executable not found or not runnable")]
    NotAvailable,
    #[error("failed to run `{command}`: {message}")]
    Spawn {
        command: String,
        command_type: CommandType,
        message: String,
    },
    #[error("`{command}` failed (exit code {exit_code:?}): {stderr}")]
    CommandFailed {
        command: String,
        command_type: CommandType,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("`{command}` timed out after {}s", timeout.as_secs())]
    Timeout {
        command: String,
        command_type: CommandType,
        timeout: Duration,
    },
}

impl GitCliError {
    pub fn command_type(&self) -> Option<CommandType> {
        match self {
            GitCliError::Spawn { command_type, .. }
            | GitCliError::CommandFailed { command_type, .. }
            | GitCliError::Timeout { command_type, .. } => Some(*command_type),
            GitCliError::NotAvailable => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when git was killed by a signal.
    pub exit_code: Option<i32>,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Builder for one git invocation.
#[derive(Debug, Clone)]
pub struct GitCommand {
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    scope: LockScope,
    timeout: Option<Duration>,
}

impl GitCommand {
    pub fn new(subcommand: &str) -> Self {
        Self {
            args: vec![OsString::from(subcommand)],
            envs: Vec::new(),
            scope: LockScope::Read,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn arg_if(self, condition: bool, arg: impl AsRef<OsStr>) -> Self {
        if condition { self.arg(arg) } else { self }
    }

    /// `--format=%(a)<sep>%(b)...` for `for-each-ref` style atoms.
    pub fn ref_format_arg(self, fields: &[&str], separator: &str) -> Self {
        let format = fields
            .iter()
            .map(|f| format!("%({f})"))
            .collect::<Vec<_>>()
            .join(separator);
        self.arg(format!("--format={format}"))
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn scope(mut self, scope: LockScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn command_type(&self) -> CommandType {
        self.scope.command_type()
    }

    /// The invocation as it is written to the command log.
    pub fn display(&self) -> String {
        std::iter::once("git".into())
            .chain(self.args.iter().map(|a| a.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone)]
pub struct GitCliConfig {
    /// Executable name or path of git.
    pub git_binary: String,
    pub query_timeout: Duration,
    pub mutation_timeout: Duration,
}

impl Default for GitCliConfig {
    fn default() -> Self {
        Self {
            git_binary: "git".to_string(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            mutation_timeout: DEFAULT_MUTATION_TIMEOUT,
        }
    }
}

impl GitCliConfig {
    fn timeout_for(&self, scope: LockScope) -> Duration {
        match scope {
            LockScope::Read => self.query_timeout,
            LockScope::Refs | LockScope::Worktree => self.mutation_timeout,
        }
    }
}

#[derive(Clone)]
pub struct GitCli {
    config: Arc<GitCliConfig>,
    binary: Arc<OnceCell<PathBuf>>,
    recorder: Arc<dyn CommandRecorder>,
    locks: RepoLocks,
}

impl GitCli {
    pub fn new(config: GitCliConfig, recorder: Arc<dyn CommandRecorder>) -> Self {
        Self {
            config: Arc::new(config),
            binary: Arc::new(OnceCell::new()),
            recorder,
            locks: RepoLocks::default(),
        }
    }

    pub fn locks(&self) -> &RepoLocks {
        &self.locks
    }

    async fn git_binary(&self) -> Option<PathBuf> {
        self.binary
            .get_or_try_init(|| async {
                resolve_executable_path(&self.config.git_binary)
                    .await
                    .ok_or(GitCliError::NotAvailable)
            })
            .await
            .ok()
            .cloned()
    }

    /// Run git in `repo_path`. A non-zero exit is returned as output, not as
    /// an error; see [`GitCli::run_checked`].
    pub async fn run(
        &self,
        repo_path: &Path,
        command: GitCommand,
    ) -> Result<GitOutput, GitCliError> {
        let command_line = command.display();
        let command_type = command.command_type();
        let timeout = command
            .timeout
            .unwrap_or_else(|| self.config.timeout_for(command.scope));

        let _guard = self.locks.acquire(repo_path, command.scope).await;
        let mut pending = PendingRecord::new(
            self.recorder.clone(),
            repo_path,
            command_line.clone(),
            command_type,
        );

        let Some(git) = self.git_binary().await else {
            pending.finish(CommandOutcome::SpawnFailed, None).await;
            return Err(GitCliError::NotAvailable);
        };

        let mut cmd = Command::new(&git);
        cmd.current_dir(repo_path)
            .args(&command.args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if command.scope == LockScope::Read {
            cmd.env("GIT_OPTIONAL_LOCKS", "0");
        }
        for (key, value) in &command.envs {
            cmd.env(key, value);
        }

        tracing::trace!(repo = ?repo_path, "Running git command: {}", command_line);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                pending.finish(CommandOutcome::SpawnFailed, None).await;
                return Err(GitCliError::Spawn {
                    command: command_line,
                    command_type,
                    message: e.to_string(),
                });
            }
        };

        // Dropping the wait future on timeout drops the child, which kills it.
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let exit_code = output.status.code();
                let outcome = if output.status.success() {
                    CommandOutcome::Success
                } else {
                    CommandOutcome::Failed
                };
                pending.finish(outcome, exit_code).await;
                Ok(GitOutput {
                    stdout: output.stdout,
                    stderr: output.stderr,
                    exit_code,
                })
            }
            Ok(Err(e)) => {
                pending.finish(CommandOutcome::Failed, None).await;
                Err(GitCliError::Spawn {
                    command: command_line,
                    command_type,
                    message: e.to_string(),
                })
            }
            Err(_) => {
                pending.finish(CommandOutcome::Timeout, None).await;
                tracing::warn!(
                    repo = ?repo_path,
                    timeout_secs = timeout.as_secs(),
                    "git command timed out: {}",
                    command_line
                );
                Err(GitCliError::Timeout {
                    command: command_line,
                    command_type,
                    timeout,
                })
            }
        }
    }

    /// Like [`GitCli::run`], but a non-zero exit becomes
    /// [`GitCliError::CommandFailed`] carrying git's stderr.
    pub async fn run_checked(
        &self,
        repo_path: &Path,
        command: GitCommand,
    ) -> Result<GitOutput, GitCliError> {
        let command_line = command.display();
        let command_type = command.command_type();
        let output = self.run(repo_path, command).await?;
        if output.success() {
            return Ok(output);
        }

        let stderr = output.stderr_lossy().trim().to_string();
        let stdout = output.stdout_lossy().trim().to_string();
        let message = match (stderr.is_empty(), stdout.is_empty()) {
            (true, true) => "command failed with no output".to_string(),
            (false, _) => stderr,
            (true, false) => stdout,
        };
        Err(GitCliError::CommandFailed {
            command: command_line,
            command_type,
            exit_code: output.exit_code,
            stderr: message,
        })
    }
}

/// Produces the log record of one invocation exactly once.
///
/// `finish` hands the record to a spawned task and waits for it, so the entry
/// is stored before `run` returns even if the caller is cancelled while
/// waiting. If `finish` is never reached, `Drop` records a cancellation.
struct PendingRecord {
    recorder: Arc<dyn CommandRecorder>,
    repo_path: PathBuf,
    command: String,
    command_type: CommandType,
    started: Instant,
    done: bool,
}

impl PendingRecord {
    fn new(
        recorder: Arc<dyn CommandRecorder>,
        repo_path: &Path,
        command: String,
        command_type: CommandType,
    ) -> Self {
        Self {
            recorder,
            repo_path: repo_path.to_path_buf(),
            command,
            command_type,
            started: Instant::now(),
            done: false,
        }
    }

    fn build(&mut self, outcome: CommandOutcome, exit_code: Option<i32>) -> Option<CommandRecord> {
        if self.done {
            return None;
        }
        self.done = true;
        Some(CommandRecord {
            repo_path: self.repo_path.clone(),
            command: self.command.clone(),
            command_type: self.command_type,
            outcome,
            exit_code,
            duration: self.started.elapsed(),
            finished_at: Utc::now(),
        })
    }

    async fn finish(&mut self, outcome: CommandOutcome, exit_code: Option<i32>) {
        let Some(record) = self.build(outcome, exit_code) else {
            return;
        };
        let recorder = self.recorder.clone();
        if let Err(e) = tokio::spawn(async move { recorder.record(record).await }).await {
            tracing::error!("Recording git command failed: {}", e);
        }
    }
}

impl Drop for PendingRecord {
    fn drop(&mut self) {
        let Some(record) = self.build(CommandOutcome::Cancelled, None) else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let recorder = self.recorder.clone();
                handle.spawn(async move { recorder.record(record).await });
            }
            Err(_) => tracing::warn!(
                "Dropped git command record outside a runtime: {}",
                record.command
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_arguments() {
        let cmd = GitCommand::new("log")
            .arg("--all")
            .arg_if(false, "--oneline")
            .arg_if(true, "-z");
        assert_eq!(cmd.display(), "git log --all -z");
        assert_eq!(cmd.command_type(), CommandType::Query);
    }

    #[test]
    fn ref_format_wraps_atoms() {
        let cmd = GitCommand::new("for-each-ref").ref_format_arg(&["HEAD", "refname"], "%00");
        assert_eq!(cmd.display(), "git for-each-ref --format=%(HEAD)%00%(refname)");
    }

    #[test]
    fn scopes_classify_commands() {
        assert_eq!(LockScope::Read.command_type(), CommandType::Query);
        assert_eq!(LockScope::Refs.command_type(), CommandType::Mutation);
        assert_eq!(LockScope::Worktree.command_type(), CommandType::Mutation);
        let fetch = GitCommand::new("fetch").scope(LockScope::Refs);
        assert_eq!(fetch.command_type(), CommandType::Mutation);
    }

    #[test]
    fn command_type_round_trips_storage_codes() {
        for ty in [CommandType::Query, CommandType::Mutation] {
            assert_eq!(CommandType::from_i64(ty.as_i64()), Some(ty));
        }
        assert_eq!(CommandType::from_i64(7), None);
    }

    #[test]
    fn outcome_uses_snake_case_text() {
        assert_eq!(CommandOutcome::SpawnFailed.to_string(), "spawn_failed");
        assert_eq!(
            "timeout".parse::<CommandOutcome>().unwrap(),
            CommandOutcome::Timeout
        );
    }
}
