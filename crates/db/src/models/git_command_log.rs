use chrono::NaiveDateTime;
use git::{CommandOutcome, CommandType};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Row, Sqlite, SqlitePool, sqlite::SqliteRow};
use ts_rs::TS;

/// One recorded git invocation. Rows are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct GitCommandLog {
    /// `None` only on a live event whose row could not be stored.
    pub id: Option<i64>,
    pub repository_path: String,
    pub command: String,
    pub command_type: CommandType,
    pub outcome: CommandOutcome,
    pub exit_code: Option<i32>,
    pub duration_ms: i64,
    pub created_at: NaiveDateTime,
}

impl<'r> FromRow<'r, SqliteRow> for GitCommandLog {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let command_type: i64 = row.try_get("command_type")?;
        let command_type =
            CommandType::from_i64(command_type).ok_or_else(|| sqlx::Error::ColumnDecode {
                index: "command_type".to_string(),
                source: format!("unknown command type {command_type}").into(),
            })?;
        let outcome: String = row.try_get("outcome")?;
        let outcome = outcome
            .parse::<CommandOutcome>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "outcome".to_string(),
                source: Box::new(e),
            })?;

        Ok(Self {
            id: Some(row.try_get("id")?),
            repository_path: row.try_get("repository_path")?,
            command: row.try_get("command")?,
            command_type,
            outcome,
            exit_code: row.try_get("exit_code")?,
            duration_ms: row.try_get("duration_ms")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CreateGitCommandLog {
    pub repository_path: String,
    pub command: String,
    pub command_type: CommandType,
    pub outcome: CommandOutcome,
    pub exit_code: Option<i32>,
    pub duration_ms: i64,
    pub created_at: NaiveDateTime,
}

impl CreateGitCommandLog {
    /// The entry as published when it could not be stored.
    pub fn unsaved(self) -> GitCommandLog {
        GitCommandLog {
            id: None,
            repository_path: self.repository_path,
            command: self.command,
            command_type: self.command_type,
            outcome: self.outcome,
            exit_code: self.exit_code,
            duration_ms: self.duration_ms,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct GitCommandLogFilter {
    pub command_type: Option<CommandType>,
    pub repository_path: Option<String>,
    /// Keep only the most recent `limit` entries.
    pub limit: Option<i64>,
}

const COLUMNS: &str =
    "id, repository_path, command, command_type, outcome, exit_code, duration_ms, created_at";

impl GitCommandLog {
    pub async fn create(
        pool: &SqlitePool,
        data: &CreateGitCommandLog,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, GitCommandLog>(&format!(
            "INSERT INTO git_command_logs
                 (repository_path, command, command_type, outcome, exit_code, duration_ms, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        ))
        .bind(&data.repository_path)
        .bind(&data.command)
        .bind(data.command_type.as_i64())
        .bind(data.outcome.to_string())
        .bind(data.exit_code)
        .bind(data.duration_ms)
        .bind(data.created_at)
        .fetch_one(pool)
        .await
    }

    /// Matching entries in ascending id order.
    pub async fn find(
        pool: &SqlitePool,
        filter: &GitCommandLogFilter,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {COLUMNS} FROM git_command_logs WHERE 1 = 1"
        ));
        if let Some(command_type) = filter.command_type {
            query
                .push(" AND command_type = ")
                .push_bind(command_type.as_i64());
        }
        if let Some(path) = &filter.repository_path {
            query.push(" AND repository_path = ").push_bind(path.clone());
        }
        query.push(" ORDER BY id DESC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit.max(0));
        }

        let mut logs = query
            .build_query_as::<GitCommandLog>()
            .fetch_all(pool)
            .await?;
        logs.reverse();
        Ok(logs)
    }
}
