use axum::{
    BoxError, Router,
    extract::{
        State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use deployment::Deployment;
use futures_util::{SinkExt, Stream, StreamExt};

use crate::DeploymentImpl;

pub async fn events(
    State(deployment): State<DeploymentImpl>,
) -> Sse<impl Stream<Item = Result<Event, BoxError>>> {
    let stream = deployment
        .stream_events()
        .await
        .map(|item| item.map_err(BoxError::from));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn events_ws(
    ws: WebSocketUpgrade,
    State(deployment): State<DeploymentImpl>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = handle_events_ws(socket, deployment).await {
            tracing::warn!("events WS closed: {}", e);
        }
    })
}

async fn handle_events_ws(socket: WebSocket, deployment: DeploymentImpl) -> anyhow::Result<()> {
    let mut stream = deployment
        .event_stream()
        .map(|msg| msg.to_ws_message_unchecked());

    let (mut sender, mut receiver) = socket.split();

    // Drain client frames so pings and pongs keep flowing
    tokio::spawn(async move { while let Some(Ok(_)) = receiver.next().await {} });

    while let Some(msg) = stream.next().await {
        if sender.send(msg).await.is_err() {
            break; // client disconnected
        }
    }
    Ok(())
}

pub fn router() -> Router<DeploymentImpl> {
    let events_router = Router::new()
        .route("/", get(events))
        .route("/ws", get(events_ws));

    Router::new().nest("/events", events_router)
}
