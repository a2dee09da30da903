use axum::{
    Router,
    routing::{IntoMakeService, get},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::DeploymentImpl;

pub mod events;
pub mod git;
pub mod health;
pub mod repositories;

pub fn api_router(deployment: DeploymentImpl) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .merge(repositories::router())
        .merge(git::router())
        .merge(events::router())
        .with_state(deployment)
}

pub fn router(deployment: DeploymentImpl) -> IntoMakeService<Router> {
    Router::new()
        .nest("/api", api_router(deployment))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .into_make_service()
}
