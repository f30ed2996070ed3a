use std::time::{Duration, SystemTime};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        format_system_time,
        sse::PlaybackEnvelope,
        validation::validate_identifier,
        ws::{ClientInboundMessage, CommandPayload, ServerOutboundMessage},
    },
    services::playback_service,
    state::{
        ClientConnection, SharedState,
        broadcaster::Subscription,
        coordinator::PLAYBACK_TOPIC,
        player_view::{ApplyOutcome, PlayerView},
        state_machine::CommandOrigin,
    },
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);
/// Frames queued for the socket writer before producers wait.
const OUTBOUND_CAPACITY: usize = 32;

#[derive(Debug, Error)]
enum IdentificationError {
    #[error("client closed the connection")]
    Closed,
    #[error("identification timed out")]
    Timeout,
    #[error("websocket receive error: {0}")]
    Transport(#[from] axum::Error),
    #[error("first frame must be a text identification message")]
    NotText,
    #[error("malformed identification: {0}")]
    Malformed(String),
}

/// Handle the full lifecycle of a playback WebSocket connection.
///
/// The first frame must identify the device. Afterwards the socket carries command
/// frames inbound and committed states outbound.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let origin = match identify(&mut receiver).await {
        Ok(origin) => origin,
        Err(err) => {
            warn!(error = %err, "websocket identification failed");
            let _ = outbound_tx
                .send(error_frame(None, err.to_string()))
                .await;
            let _ = outbound_tx.send(Message::Close(None)).await;
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let connection_id = Uuid::new_v4();
    let connected_at = SystemTime::now();
    state.connections().insert(
        connection_id,
        ClientConnection {
            device_id: origin.device_id.clone(),
            mode: origin.mode,
            connected_at,
        },
    );
    info!(
        connection = %connection_id,
        device = %origin.device_id,
        mode = %origin.mode,
        "websocket client identified"
    );

    // Subscribe before the snapshot so no commit falls between the two.
    let subscription = state.broadcaster().subscribe(PLAYBACK_TOPIC);
    let snapshot = state.playback().snapshot().await;
    let mut view = PlayerView::new(origin.device_id.clone());
    let initial = PlaybackEnvelope::state(
        PLAYBACK_TOPIC,
        &snapshot,
        format_system_time(connected_at),
    );
    view.apply(&initial);
    let welcome = ServerOutboundMessage::Welcome {
        device_id: origin.device_id.to_string(),
        mode: origin.mode,
        render: view.should_render(),
        state: initial,
    };
    if !send_message(&outbound_tx, &welcome).await {
        state.connections().remove(&connection_id);
        finalize(writer_task, outbound_tx).await;
        return;
    }

    let forwarder = tokio::spawn(forward_playback(
        subscription,
        view,
        outbound_tx.clone(),
    ));

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientInboundMessage>(&text) {
                Ok(ClientInboundMessage::Command {
                    request_id,
                    command,
                }) => {
                    let reply = handle_command(&state, &origin, request_id, command).await;
                    if !send_message(&outbound_tx, &reply).await {
                        break;
                    }
                }
                Ok(ClientInboundMessage::Identification { .. }) => {
                    warn!(device = %origin.device_id, "ignoring duplicate identification message");
                }
                Ok(ClientInboundMessage::Unknown) => {
                    debug!(device = %origin.device_id, "ignoring unknown websocket frame");
                }
                Err(err) => {
                    warn!(device = %origin.device_id, error = %err, "failed to parse websocket frame");
                    if outbound_tx
                        .send(error_frame(None, format!("malformed frame: {err}")))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload)).await;
            }
            Ok(Message::Close(frame)) => {
                info!(device = %origin.device_id, "websocket client closed");
                let _ = outbound_tx.send(Message::Close(frame)).await;
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(device = %origin.device_id, error = %err, "websocket error");
                break;
            }
        }
    }

    forwarder.abort();
    let _ = forwarder.await;
    state.connections().remove(&connection_id);
    info!(connection = %connection_id, device = %origin.device_id, "websocket client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Wait for the identification frame and turn it into the connection's origin.
async fn identify(
    receiver: &mut futures::stream::SplitStream<WebSocket>,
) -> Result<CommandOrigin, IdentificationError> {
    let text = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) | Ok(None) => return Err(IdentificationError::Closed),
        Ok(Some(Ok(_))) => return Err(IdentificationError::NotText),
        Ok(Some(Err(err))) => return Err(err.into()),
        Err(_) => return Err(IdentificationError::Timeout),
    };

    match serde_json::from_str::<ClientInboundMessage>(&text) {
        Ok(ClientInboundMessage::Identification { device_id, mode }) => {
            validate_identifier(&device_id)
                .map_err(|err| IdentificationError::Malformed(err.to_string()))?;
            Ok(CommandOrigin::new(device_id, mode))
        }
        Ok(_) => Err(IdentificationError::Malformed(
            "expected an identification frame".into(),
        )),
        Err(err) => Err(IdentificationError::Malformed(err.to_string())),
    }
}

async fn handle_command(
    state: &SharedState,
    origin: &CommandOrigin,
    request_id: Option<String>,
    payload: CommandPayload,
) -> ServerOutboundMessage {
    if let Err(err) = payload.validate() {
        debug!(device = %origin.device_id, error = %err, "websocket command failed validation");
        return ServerOutboundMessage::Error {
            request_id,
            message: format!("validation failed: {err}"),
        };
    }
    let command = payload.into_command(origin);
    match playback_service::execute(state, origin, command).await {
        Ok(next) => ServerOutboundMessage::Ack {
            request_id,
            revision: next.revision,
        },
        Err(err) => {
            debug!(device = %origin.device_id, error = %err, "websocket command rejected");
            ServerOutboundMessage::Error {
                request_id,
                message: err.to_string(),
            }
        }
    }
}

/// Per-connection worker relaying committed states that are newer than what the client
/// already holds.
async fn forward_playback(
    mut subscription: Subscription<PlaybackEnvelope>,
    mut view: PlayerView,
    outbound_tx: mpsc::Sender<Message>,
) {
    while let Some(envelope) = subscription.recv().await {
        if view.apply(&envelope) == ApplyOutcome::Stale {
            continue;
        }
        let frame = ServerOutboundMessage::State {
            render: view.should_render(),
            event: envelope,
        };
        if !send_message(&outbound_tx, &frame).await {
            break;
        }
    }
    debug!(device = %view.device_id(), "playback forwarder stopped");
}

fn error_frame(request_id: Option<String>, message: String) -> Message {
    let frame = ServerOutboundMessage::Error {
        request_id,
        message,
    };
    match serde_json::to_string(&frame) {
        Ok(payload) => Message::Text(payload.into()),
        Err(_) => Message::Close(None),
    }
}

/// Serialize and queue a frame; returns `false` once the writer is gone.
async fn send_message(tx: &mpsc::Sender<Message>, value: &ServerOutboundMessage) -> bool {
    let payload = match serde_json::to_string(value) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize websocket frame");
            return true;
        }
    };
    tx.send(Message::Text(payload.into())).await.is_ok()
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::Sender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, sync::Arc};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            catalog::{CatalogEntry, StaticCatalog, Track},
            playback_store::memory::MemoryPlaybackStore,
        },
        state::AppState,
    };

    async fn ready_state() -> SharedState {
        let catalog = StaticCatalog::new([CatalogEntry {
            track: Track {
                id: "t1".into(),
                title: "One".into(),
                artist: None,
                album: None,
                duration_seconds: None,
                mime_type: "audio/mpeg".into(),
            },
            path: PathBuf::from("/nonexistent/t1.mp3"),
        }]);
        let state = AppState::new(&AppConfig::default(), Arc::new(catalog));
        state
            .install_store(Arc::new(MemoryPlaybackStore::new()))
            .await
            .unwrap();
        state
    }

    #[tokio::test]
    async fn invalid_claim_is_answered_with_an_error_frame() {
        let state = ready_state().await;
        let origin = CommandOrigin::remote("phone");
        let payload: CommandPayload = serde_json::from_str(
            r#"{"action":"claim_active_player","device_id":"living room\n"}"#,
        )
        .unwrap();

        let reply = handle_command(&state, &origin, Some("r1".into()), payload).await;

        match reply {
            ServerOutboundMessage::Error {
                request_id,
                message,
            } => {
                assert_eq!(request_id.as_deref(), Some("r1"));
                assert!(message.contains("device_id"), "{message}");
            }
            other => panic!("unexpected reply: {other:?}"),
        }
        let snapshot = state.playback().snapshot().await;
        assert_eq!(snapshot.revision, 0);
        assert!(snapshot.active_player_id.is_none());
    }

    #[tokio::test]
    async fn valid_command_is_acknowledged_with_its_revision() {
        let state = ready_state().await;
        let origin = CommandOrigin::player("kitchen");
        let payload = CommandPayload::Play {
            track_id: "t1".into(),
        };

        let reply = handle_command(&state, &origin, None, payload).await;

        assert!(matches!(
            reply,
            ServerOutboundMessage::Ack {
                request_id: None,
                revision: 1
            }
        ));
    }
}
