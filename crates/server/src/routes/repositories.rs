use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::repository::Repository;
use deployment::Deployment;
use serde::Deserialize;
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError};

#[derive(Debug, Deserialize, TS)]
#[ts(export)]
pub struct AddRepositoryRequest {
    pub path: String,
    /// Open the repository once it is registered. Defaults to `true`.
    #[ts(optional)]
    pub open: Option<bool>,
}

pub async fn add_repository(
    State(deployment): State<DeploymentImpl>,
    ResponseJson(payload): ResponseJson<AddRepositoryRequest>,
) -> Result<ResponseJson<ApiResponse<Repository>>, ApiError> {
    if payload.path.trim().is_empty() {
        return Err(ApiError::BadRequest("path must not be empty".to_string()));
    }
    let registry = deployment.registry();
    let repository = if payload.open.unwrap_or(true) {
        registry.add_and_open(&payload.path).await?
    } else {
        registry.add(&payload.path).await?
    };
    Ok(ResponseJson(ApiResponse::success(repository)))
}

pub async fn get_repositories(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Vec<Repository>>>, ApiError> {
    let repositories = deployment.registry().list().await?;
    Ok(ResponseJson(ApiResponse::success(repositories)))
}

pub async fn set_open_repository(
    State(deployment): State<DeploymentImpl>,
    Path(id): Path<i64>,
) -> Result<ResponseJson<ApiResponse<Repository>>, ApiError> {
    let repository = deployment.registry().set_open(id).await?;
    Ok(ResponseJson(ApiResponse::success(repository)))
}

pub async fn get_open_repository(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Option<Repository>>>, ApiError> {
    let repository = deployment.registry().get_open().await?;
    Ok(ResponseJson(ApiResponse::success(repository)))
}

pub fn router() -> Router<DeploymentImpl> {
    let repositories_router = Router::new()
        .route("/", get(get_repositories).post(add_repository))
        .route("/open", get(get_open_repository))
        .route("/{id}/open", post(set_open_repository));

    Router::new().nest("/repositories", repositories_router)
}
