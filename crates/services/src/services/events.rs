use db::models::{git_command_log::GitCommandLog, repository::Repository};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use ts_rs::TS;
use utils::log_msg::LogMsg;

#[derive(Debug, Clone, Serialize, TS)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineEvent {
    GitCommand(GitCommandLog),
    OpenRepositoryChanged(Option<Repository>),
}

impl EngineEvent {
    pub fn to_log_msg(&self) -> Result<LogMsg, serde_json::Error> {
        Ok(match self {
            EngineEvent::GitCommand(entry) => LogMsg::GitCommand(serde_json::to_value(entry)?),
            EngineEvent::OpenRepositoryChanged(repo) => {
                LogMsg::OpenRepository(serde_json::to_value(repo)?)
            }
        })
    }
}

/// In-process publisher for engine events. Subscribers that fall behind the
/// channel capacity lose the oldest events and are told how many.
#[derive(Clone)]
pub struct EventService {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventService {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: EngineEvent) {
        // An error only means nobody is listening.
        if self.sender.send(event).is_err() {
            tracing::trace!("No event subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Push-channel frames, starting with [`LogMsg::Ready`].
    pub fn log_msg_stream(&self) -> impl Stream<Item = LogMsg> + Send + 'static {
        let events = BroadcastStream::new(self.subscribe()).filter_map(|item| async move {
            match item {
                Ok(event) => match event.to_log_msg() {
                    Ok(msg) => Some(msg),
                    Err(e) => {
                        tracing::error!("Failed to serialize engine event: {}", e);
                        None
                    }
                },
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!("Event subscriber lagged, skipped {} events", skipped);
                    Some(LogMsg::Lagged(skipped))
                }
            }
        });
        futures::stream::once(async { LogMsg::Ready }).chain(events)
    }

    /// Completed git invocations only; lagged gaps are skipped.
    pub fn git_command_stream(&self) -> impl Stream<Item = GitCommandLog> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(|item| async move {
            match item {
                Ok(EngineEvent::GitCommand(entry)) => Some(entry),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!("Command log subscriber lagged, skipped {} entries", skipped);
                    None
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use git::{CommandOutcome, CommandType};

    use super::*;

    fn entry(command: &str) -> GitCommandLog {
        GitCommandLog {
            id: Some(1),
            repository_path: "/r".to_string(),
            command: command.to_string(),
            command_type: CommandType::Query,
            outcome: CommandOutcome::Success,
            exit_code: Some(0),
            duration_ms: 3,
            created_at: Utc::now().naive_utc(),
        }
    }

    #[tokio::test]
    async fn stream_starts_ready_then_forwards_events() {
        let events = EventService::new(8);
        let mut stream = Box::pin(events.log_msg_stream());
        assert!(matches!(stream.next().await, Some(LogMsg::Ready)));

        events.publish(EngineEvent::GitCommand(entry("git log")));
        match stream.next().await {
            Some(LogMsg::GitCommand(value)) => assert_eq!(value["command"], "git log"),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn lagging_subscribers_are_told_and_continue() {
        let events = EventService::new(2);
        let mut stream = Box::pin(events.log_msg_stream());
        assert!(matches!(stream.next().await, Some(LogMsg::Ready)));
        for i in 0..5 {
            events.publish(EngineEvent::GitCommand(entry(&format!("git {i}"))));
        }
        assert!(matches!(stream.next().await, Some(LogMsg::Lagged(3))));
        match stream.next().await {
            Some(LogMsg::GitCommand(value)) => assert_eq!(value["command"], "git 3"),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn command_stream_ignores_other_events() {
        let events = EventService::new(8);
        let mut commands = Box::pin(events.git_command_stream());
        events.publish(EngineEvent::OpenRepositoryChanged(None));
        events.publish(EngineEvent::GitCommand(entry("git status")));
        assert_eq!(commands.next().await.unwrap().command, "git status");
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        EventService::new(1).publish(EngineEvent::OpenRepositoryChanged(None));
    }
}
