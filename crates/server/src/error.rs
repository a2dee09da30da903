use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::models::repository::RepositoryError;
use deployment::DeploymentError;
use git::{CommandType, GitServiceError};
use services::services::{
    command_log::CommandLogError,
    config::ConfigError,
    error::{EngineError, EngineErrorPayload},
    registry::RegistryError,
};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error, ts_rs::TS)]
#[ts(type = "string")]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Deployment(#[from] DeploymentError),
    #[error("Bad request: {0}")]
    BadRequest(String),
}

macro_rules! via_engine_error {
    ($($err:ty),* $(,)?) => {
        $(
            impl From<$err> for ApiError {
                fn from(err: $err) -> Self {
                    ApiError::Engine(EngineError::from(err))
                }
            }
        )*
    };
}

via_engine_error!(
    GitServiceError,
    RegistryError,
    RepositoryError,
    CommandLogError,
    ConfigError,
    sqlx::Error,
);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Engine(err) => match err {
                EngineError::InvalidRepository(_) => StatusCode::BAD_REQUEST,
                EngineError::NotFound(_) => StatusCode::NOT_FOUND,
                EngineError::GitFailure {
                    command_type: Some(CommandType::Mutation),
                    ..
                } => StatusCode::CONFLICT,
                EngineError::GitFailure { .. } => StatusCode::BAD_GATEWAY,
                EngineError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                EngineError::BinaryFile(_) => StatusCode::UNPROCESSABLE_ENTITY,
                EngineError::ParseFailure(_) | EngineError::StorageFailure(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Deployment(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let response = match &self {
            ApiError::Engine(err) => {
                ApiResponse::<(), EngineErrorPayload>::error_with_data(err.to_string(), err.payload())
            }
            ApiError::BadRequest(msg) => ApiResponse::<(), EngineErrorPayload>::error(msg),
            ApiError::Deployment(err) => {
                tracing::error!("Deployment error: {}", err);
                ApiResponse::<(), EngineErrorPayload>::error(&format!("DeploymentError: {err}"))
            }
        };
        (status_code, Json(response)).into_response()
    }
}
