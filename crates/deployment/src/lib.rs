use std::sync::Arc;

use anyhow::Error as AnyhowError;
use async_trait::async_trait;
use axum::response::sse::Event;
use db::DBService;
use futures::StreamExt;
use git::{GitService, GitServiceError};
use services::services::{
    cache::ResultCache,
    command_log::CommandLogService,
    config::{Config, ConfigError},
    events::EventService,
    registry::{RegistryError, RegistryService},
};
use sqlx::Error as SqlxError;
use thiserror::Error;
use tokio::sync::RwLock;
use utils::log_msg::LogMsg;

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Sqlx(#[from] SqlxError),
    #[error(transparent)]
    GitServiceError(#[from] GitServiceError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Other(#[from] AnyhowError),
}

/// Everything a request handler can reach.
#[async_trait]
pub trait Deployment: Clone + Send + Sync + 'static {
    async fn new() -> Result<Self, DeploymentError>;

    fn config(&self) -> &Arc<RwLock<Config>>;

    fn db(&self) -> &DBService;

    fn git(&self) -> &GitService;

    fn registry(&self) -> &RegistryService;

    fn command_log(&self) -> &CommandLogService;

    fn events(&self) -> &EventService;

    fn cache(&self) -> &ResultCache;

    fn event_stream(&self) -> futures::stream::BoxStream<'static, LogMsg> {
        self.events().log_msg_stream().boxed()
    }

    async fn stream_events(
        &self,
    ) -> futures::stream::BoxStream<'static, Result<Event, std::io::Error>> {
        self.event_stream()
            .map(|msg| Ok::<_, std::io::Error>(msg.to_sse_event()))
            .boxed()
    }
}
