use std::time::Duration;

use db::models::repository::RepositoryError;
use git::{CommandType, GitCliError, GitServiceError};
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use thiserror::Error;
use ts_rs::TS;

use super::{command_log::CommandLogError, config::ConfigError, registry::RegistryError};

/// Every failure an engine operation can report to a client.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid repository: {0}")]
    InvalidRepository(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("`{command}` failed (exit code {exit_code:?}): {stderr}")]
    GitFailure {
        command: String,
        command_type: Option<CommandType>,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("`{command}` timed out after {}s", timeout.as_secs())]
    Timeout {
        command: String,
        command_type: CommandType,
        timeout: Duration,
    },
    #[error("Parse failure: {0}")]
    ParseFailure(String),
    #[error("Binary file: {0}")]
    BinaryFile(String),
    #[error("Storage failure: {0}")]
    StorageFailure(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EngineErrorKind {
    InvalidRepository,
    NotFound,
    GitFailure,
    Timeout,
    ParseFailure,
    BinaryFile,
    StorageFailure,
}

/// Serializable form of [`EngineError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct EngineErrorPayload {
    pub kind: EngineErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub command_type: Option<CommandType>,
}

impl EngineError {
    pub fn kind(&self) -> EngineErrorKind {
        match self {
            EngineError::InvalidRepository(_) => EngineErrorKind::InvalidRepository,
            EngineError::NotFound(_) => EngineErrorKind::NotFound,
            EngineError::GitFailure { .. } => EngineErrorKind::GitFailure,
            EngineError::Timeout { .. } => EngineErrorKind::Timeout,
            EngineError::ParseFailure(_) => EngineErrorKind::ParseFailure,
            EngineError::BinaryFile(_) => EngineErrorKind::BinaryFile,
            EngineError::StorageFailure(_) => EngineErrorKind::StorageFailure,
        }
    }

    pub fn command_type(&self) -> Option<CommandType> {
        match self {
            EngineError::GitFailure { command_type, .. } => *command_type,
            EngineError::Timeout { command_type, .. } => Some(*command_type),
            _ => None,
        }
    }

    pub fn payload(&self) -> EngineErrorPayload {
        EngineErrorPayload {
            kind: self.kind(),
            message: self.to_string(),
            command_type: self.command_type(),
        }
    }

    pub fn no_open_repository() -> Self {
        EngineError::NotFound("no repository is open".to_string())
    }

    fn parse_failure(message: String) -> Self {
        tracing::error!("Git output could not be parsed: {}", message);
        EngineError::ParseFailure(message)
    }

    fn storage_failure(message: String) -> Self {
        tracing::error!("Storage failure: {}", message);
        EngineError::StorageFailure(message)
    }
}

impl From<GitCliError> for EngineError {
    fn from(err: GitCliError) -> Self {
        match err {
            GitCliError::NotAvailable => EngineError::GitFailure {
                command: "git".to_string(),
                command_type: None,
                exit_code: None,
                stderr: err.to_string(),
            },
            GitCliError::Spawn {
                command,
                command_type,
                message,
            } => EngineError::GitFailure {
                command,
                command_type: Some(command_type),
                exit_code: None,
                stderr: message,
            },
            GitCliError::CommandFailed {
                command,
                command_type,
                exit_code,
                stderr,
            } => EngineError::GitFailure {
                command,
                command_type: Some(command_type),
                exit_code,
                stderr,
            },
            GitCliError::Timeout {
                command,
                command_type,
                timeout,
            } => EngineError::Timeout {
                command,
                command_type,
                timeout,
            },
        }
    }
}

impl From<GitServiceError> for EngineError {
    fn from(err: GitServiceError) -> Self {
        match err {
            GitServiceError::GitCLI(e) => e.into(),
            GitServiceError::Parse(e) => EngineError::parse_failure(e.to_string()),
            GitServiceError::IoError(e) => EngineError::GitFailure {
                command: "git".to_string(),
                command_type: None,
                exit_code: None,
                stderr: e.to_string(),
            },
            GitServiceError::InvalidRepository(msg) => EngineError::InvalidRepository(msg),
            GitServiceError::InvalidPath(path) => {
                EngineError::NotFound(format!("{path} is not a path inside the repository"))
            }
            GitServiceError::NotFound(msg) => EngineError::NotFound(msg),
            GitServiceError::BinaryFile(path) => EngineError::BinaryFile(path),
            GitServiceError::WorkingTree { path, source }
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                EngineError::NotFound(format!("{path} is no longer in the working tree"))
            }
            GitServiceError::WorkingTree { path, source } => {
                EngineError::storage_failure(format!("reading {path}: {source}"))
            }
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::storage_failure(err.to_string())
    }
}

impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Database(e) => e.into(),
            RepositoryError::NotFound => EngineError::NotFound("repository".to_string()),
        }
    }
}

impl From<CommandLogError> for EngineError {
    fn from(err: CommandLogError) -> Self {
        match err {
            CommandLogError::Database(e) => e.into(),
        }
    }
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        EngineError::storage_failure(err.to_string())
    }
}

impl From<RegistryError> for EngineError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Repository(e) => e.into(),
            RegistryError::Database(e) => e.into(),
            RegistryError::Git(e) => e.into(),
            RegistryError::InvalidRepository(msg) => EngineError::InvalidRepository(msg),
            RegistryError::NotFound(id) => EngineError::NotFound(format!("repository {id}")),
            RegistryError::NoOpenRepository => EngineError::no_open_repository(),
        }
    }
}
