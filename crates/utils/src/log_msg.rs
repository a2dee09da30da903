use axum::{extract::ws::Message, response::sse::Event};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const EV_GIT_COMMAND: &str = "git_command";
pub const EV_OPEN_REPOSITORY: &str = "open_repository";
pub const EV_LAGGED: &str = "lagged";
pub const EV_READY: &str = "ready";

/// Frame sent over the push channel.
///
/// Payloads are pre-serialized JSON so this type stays independent of the
/// crates that define the records.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum LogMsg {
    GitCommand(Value),
    OpenRepository(Value),
    /// The subscriber fell behind and this many events were dropped for it.
    Lagged(u64),
    Ready,
}

impl LogMsg {
    pub fn name(&self) -> &'static str {
        match self {
            LogMsg::GitCommand(_) => EV_GIT_COMMAND,
            LogMsg::OpenRepository(_) => EV_OPEN_REPOSITORY,
            LogMsg::Lagged(_) => EV_LAGGED,
            LogMsg::Ready => EV_READY,
        }
    }

    pub fn to_sse_event(&self) -> Event {
        let data = match self {
            LogMsg::GitCommand(value) | LogMsg::OpenRepository(value) => value.to_string(),
            LogMsg::Lagged(skipped) => skipped.to_string(),
            LogMsg::Ready => String::new(),
        };
        Event::default().event(self.name()).data(data)
    }

    pub fn to_ws_message(&self) -> Result<Message, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(Message::Text(json.into()))
    }

    /// Like [`LogMsg::to_ws_message`], degrading to a bare event name on
    /// serialization failure.
    pub fn to_ws_message_unchecked(&self) -> Message {
        let json = serde_json::to_string(self)
            .unwrap_or_else(|_| format!(r#"{{"{}":null}}"#, self.name()));
        Message::Text(json.into())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ws_frame_is_externally_tagged() {
        let msg = LogMsg::GitCommand(json!({"command": "git fetch --all"}));
        let Message::Text(text) = msg.to_ws_message().unwrap() else {
            panic!("expected a text frame");
        };
        let value: Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(value["GitCommand"]["command"], "git fetch --all");
    }

    #[test]
    fn unit_variants_have_stable_names() {
        assert_eq!(LogMsg::Ready.name(), "ready");
        assert_eq!(LogMsg::Lagged(3).name(), "lagged");
    }
}
