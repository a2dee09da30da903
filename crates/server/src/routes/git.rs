use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::git_command_log::{GitCommandLog, GitCommandLogFilter};
use deployment::Deployment;
use git::{Branches, ChangedFiles, Commit, CommandType, File, GitHash};
use serde::Deserialize;
use ts_rs::TS;
use utils::{diff::FileDiff, response::ApiResponse};

use crate::{DeploymentImpl, error::ApiError};

#[derive(Debug, Deserialize, TS)]
#[ts(export)]
pub struct GraphQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, TS)]
#[ts(export)]
pub struct FileDiffQuery {
    pub path: String,
}

#[derive(Debug, Deserialize, TS)]
#[ts(export)]
pub struct WorkingFileDiffQuery {
    pub path: String,
    #[serde(default)]
    pub staged: bool,
}

#[derive(Debug, Deserialize, TS)]
#[ts(export)]
pub struct CommandLogQuery {
    pub command_type: Option<CommandType>,
    pub limit: Option<i64>,
}

fn parse_hash(raw: &str) -> Result<GitHash, ApiError> {
    GitHash::parse(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

pub async fn get_branches(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Branches>>, ApiError> {
    let (_, repo_path) = deployment.registry().require_open().await?;
    let branches = deployment.git().get_branches(&repo_path).await?;
    Ok(ResponseJson(ApiResponse::success(branches)))
}

pub async fn get_graph(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<GraphQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<Commit>>>, ApiError> {
    let (_, repo_path) = deployment.registry().require_open().await?;
    let commits = deployment.git().get_graph(&repo_path, query.limit).await?;
    Ok(ResponseJson(ApiResponse::success(commits)))
}

pub async fn get_commit_files(
    State(deployment): State<DeploymentImpl>,
    Path(hash): Path<String>,
) -> Result<ResponseJson<ApiResponse<Vec<File>>>, ApiError> {
    let hash = parse_hash(&hash)?;
    let (_, repo_path) = deployment.registry().require_open().await?;
    let files = deployment
        .cache()
        .commit_files(
            &repo_path,
            &hash,
            deployment.git().get_commit_files(&repo_path, &hash),
        )
        .await?;
    Ok(ResponseJson(ApiResponse::success(files.as_ref().clone())))
}

pub async fn get_file_diff(
    State(deployment): State<DeploymentImpl>,
    Path(hash): Path<String>,
    Query(query): Query<FileDiffQuery>,
) -> Result<ResponseJson<ApiResponse<FileDiff>>, ApiError> {
    let hash = parse_hash(&hash)?;
    let (_, repo_path) = deployment.registry().require_open().await?;
    let diff = deployment
        .cache()
        .file_diff(
            &repo_path,
            &hash,
            &query.path,
            deployment.git().get_file_diff(&repo_path, &hash, &query.path),
        )
        .await?;
    Ok(ResponseJson(ApiResponse::success(diff.as_ref().clone())))
}

pub async fn get_changed_files(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<ChangedFiles>>, ApiError> {
    let (repository, repo_path) = deployment.registry().require_open().await?;
    let changes = deployment.git().get_changed_files(&repo_path).await?;

    let has_changes = !changes.is_empty();
    if has_changes != repository.has_changes
        && let Err(e) = deployment
            .registry()
            .set_has_changes(repository.id, has_changes)
            .await
    {
        tracing::warn!("Failed to record change state of {}: {}", repository.name, e);
    }
    Ok(ResponseJson(ApiResponse::success(changes)))
}

pub async fn get_working_file_diff(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<WorkingFileDiffQuery>,
) -> Result<ResponseJson<ApiResponse<FileDiff>>, ApiError> {
    let (_, repo_path) = deployment.registry().require_open().await?;
    let diff = deployment
        .git()
        .get_working_file_diff(&repo_path, &query.path, query.staged)
        .await?;
    Ok(ResponseJson(ApiResponse::success(diff)))
}

pub async fn fetch(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let (repository, repo_path) = deployment.registry().require_open().await?;
    deployment.git().fetch(&repo_path).await?;
    deployment.registry().mark_fetched(repository.id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn get_command_log(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<CommandLogQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<GitCommandLog>>>, ApiError> {
    let (repository, _) = deployment.registry().require_open().await?;
    let filter = GitCommandLogFilter {
        command_type: query.command_type,
        repository_path: Some(repository.local_path),
        limit: query.limit,
    };
    let entries = deployment.command_log().query(&filter).await?;
    Ok(ResponseJson(ApiResponse::success(entries)))
}

pub fn router() -> Router<DeploymentImpl> {
    let git_router = Router::new()
        .route("/branches", get(get_branches))
        .route("/graph", get(get_graph))
        .route("/commits/{hash}/files", get(get_commit_files))
        .route("/commits/{hash}/diff", get(get_file_diff))
        .route("/changes", get(get_changed_files))
        .route("/changes/diff", get(get_working_file_diff))
        .route("/fetch", post(fetch))
        .route("/command-log", get(get_command_log));

    Router::new().nest("/git", git_router)
}
