use std::sync::Arc;

use async_trait::async_trait;
use db::DBService;
use deployment::{Deployment, DeploymentError};
use git::{GitCli, GitService};
use services::services::{
    cache::ResultCache,
    command_log::CommandLogService,
    config::{Config, load_config_from_file, save_config_to_file},
    events::EventService,
    registry::RegistryService,
};
use tokio::sync::RwLock;
use utils::assets::config_path;

#[derive(Clone)]
pub struct LocalDeployment {
    config: Arc<RwLock<Config>>,
    db: DBService,
    git: GitService,
    registry: RegistryService,
    command_log: CommandLogService,
    events: EventService,
    cache: ResultCache,
}

impl LocalDeployment {
    /// Wire the engine around an already opened store.
    pub async fn from_parts(config: Config, db: DBService) -> Result<Self, DeploymentError> {
        let events = EventService::new(config.event_channel_capacity);
        let command_log = CommandLogService::new(db.clone(), events.clone());
        let cli = GitCli::new(config.git_cli_config(), Arc::new(command_log.clone()));
        let git = GitService::new(cli, config.diff_options());
        let cache = ResultCache::new(config.cache_capacity);
        let registry = RegistryService::new(db.clone(), git.clone(), events.clone(), cache.clone());

        match registry.restore().await {
            Ok(Some(open)) => tracing::info!("Restored open repository {}", open.local_path),
            Ok(None) => {}
            Err(e) => tracing::warn!("Could not restore the open repository: {}", e),
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            db,
            git,
            registry,
            command_log,
            events,
            cache,
        })
    }
}

#[async_trait]
impl Deployment for LocalDeployment {
    async fn new() -> Result<Self, DeploymentError> {
        let config = load_config_from_file(&config_path()).await;
        // Always save config so new fields show up with their defaults
        save_config_to_file(&config, &config_path()).await?;

        let db = DBService::new().await?;
        Self::from_parts(config, db).await
    }

    fn config(&self) -> &Arc<RwLock<Config>> {
        &self.config
    }

    fn db(&self) -> &DBService {
        &self.db
    }

    fn git(&self) -> &GitService {
        &self.git
    }

    fn registry(&self) -> &RegistryService {
        &self.registry
    }

    fn command_log(&self) -> &CommandLogService {
        &self.command_log
    }

    fn events(&self) -> &EventService {
        &self.events
    }

    fn cache(&self) -> &ResultCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use git::{CommandType, GitCommand};
    use utils::log_msg::LogMsg;

    use super::*;

    #[tokio::test]
    async fn git_invocations_reach_the_log_and_the_event_stream() {
        let dir = tempfile::tempdir().unwrap();
        let db = DBService::new_at(&dir.path().join("db.sqlite")).await.unwrap();
        let deployment = LocalDeployment::from_parts(Config::default(), db)
            .await
            .unwrap();
        let mut frames = deployment.event_stream();
        assert!(matches!(frames.next().await, Some(LogMsg::Ready)));

        deployment
            .git()
            .cli()
            .run(dir.path(), GitCommand::new("--version"))
            .await
            .unwrap();

        match frames.next().await {
            Some(LogMsg::GitCommand(value)) => assert_eq!(value["command"], "git --version"),
            other => panic!("unexpected frame {other:?}"),
        }
        let logged = deployment
            .command_log()
            .query(&Default::default())
            .await
            .unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].command_type, CommandType::Query);
    }
}
