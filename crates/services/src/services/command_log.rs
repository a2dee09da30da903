use async_trait::async_trait;
use db::{
    DBService,
    models::git_command_log::{CreateGitCommandLog, GitCommandLog, GitCommandLogFilter},
};
use futures::Stream;
use git::{CommandRecord, CommandRecorder};
use thiserror::Error;
use utils::path::path_key;

use super::events::{EngineEvent, EventService};

#[derive(Debug, Error)]
pub enum CommandLogError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Append-only audit trail of git invocations: stored, then published.
#[derive(Clone)]
pub struct CommandLogService {
    db: DBService,
    events: EventService,
}

impl CommandLogService {
    pub fn new(db: DBService, events: EventService) -> Self {
        Self { db, events }
    }

    /// Store `entry` and publish it. A storage failure is logged and the
    /// entry is still published, without an id.
    pub async fn append(&self, entry: CreateGitCommandLog) -> GitCommandLog {
        let log = match GitCommandLog::create(&self.db.pool, &entry).await {
            Ok(log) => log,
            Err(e) => {
                tracing::error!(
                    "Failed to store git command log entry `{}`: {}",
                    entry.command,
                    e
                );
                entry.unsaved()
            }
        };
        self.events.publish(EngineEvent::GitCommand(log.clone()));
        log
    }

    pub async fn query(
        &self,
        filter: &GitCommandLogFilter,
    ) -> Result<Vec<GitCommandLog>, CommandLogError> {
        Ok(GitCommandLog::find(&self.db.pool, filter).await?)
    }

    pub fn subscribe(&self) -> impl Stream<Item = GitCommandLog> + Send + 'static {
        self.events.git_command_stream()
    }
}

fn to_create(record: CommandRecord) -> CreateGitCommandLog {
    CreateGitCommandLog {
        repository_path: path_key(&record.repo_path),
        command: record.command,
        command_type: record.command_type,
        outcome: record.outcome,
        exit_code: record.exit_code,
        duration_ms: i64::try_from(record.duration.as_millis()).unwrap_or(i64::MAX),
        created_at: record.finished_at.naive_utc(),
    }
}

#[async_trait]
impl CommandRecorder for CommandLogService {
    async fn record(&self, record: CommandRecord) {
        tracing::debug!(
            outcome = %record.outcome,
            duration_ms = record.duration.as_millis() as u64,
            "git command finished: {}",
            record.command
        );
        self.append(to_create(record)).await;
    }
}
