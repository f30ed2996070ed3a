use std::{
    convert::Infallible,
    time::{Duration, SystemTime},
};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::{
    dto::{
        format_system_time,
        sse::{
            HANDSHAKE_EVENT, Handshake, PLAYBACK_STATE_EVENT, PlaybackEnvelope,
            SYSTEM_STATUS_EVENT,
            ServerEvent, SystemStatus,
        },
    },
    state::{
        SharedState, broadcaster::Subscription, coordinator::PLAYBACK_TOPIC,
        player_view::RevisionGate,
    },
};

/// Capacity of the channel between the forwarder task and the HTTP response.
const RESPONSE_BUFFER: usize = 8;

/// Open an SSE stream on the playback topic.
///
/// The stream starts with a handshake and the current state, then carries every newer
/// committed state. Degraded mode changes are interleaved as `system.status` events.
pub async fn playback_stream(
    state: &SharedState,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
    // Subscribe before taking the snapshot so no commit can slip between the two.
    let subscription = state.broadcaster().subscribe(PLAYBACK_TOPIC);
    let snapshot = state.playback().snapshot().await;
    let initial = PlaybackEnvelope::state(
        PLAYBACK_TOPIC,
        &snapshot,
        format_system_time(SystemTime::now()),
    );
    let handshake = Handshake {
        topic: PLAYBACK_TOPIC.to_string(),
        message: "playback stream connected".to_string(),
        degraded: state.is_degraded(),
    };

    info!(subscription = subscription.id(), "new playback SSE connection");
    to_sse_stream(
        subscription,
        state.storage().degraded_watcher(),
        handshake,
        initial,
    )
}

/// Forward broadcast envelopes into an SSE response through a dedicated task, dropping
/// anything not newer than what the client already received.
fn to_sse_stream(
    mut subscription: Subscription<PlaybackEnvelope>,
    mut degraded: watch::Receiver<bool>,
    handshake: Handshake,
    initial: PlaybackEnvelope,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(RESPONSE_BUFFER);

    tokio::spawn(async move {
        let mut gate = RevisionGate::after(initial.revision);
        let opening = [
            ServerEvent::json(Some(HANDSHAKE_EVENT.to_string()), &handshake),
            ServerEvent::json(Some(PLAYBACK_STATE_EVENT.to_string()), &initial),
        ];
        for event in opening {
            if !forward(&tx, event).await {
                return;
            }
        }
        degraded.mark_unchanged();

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                changed = degraded.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = SystemStatus { degraded: *degraded.borrow_and_update() };
                    if !forward(&tx, ServerEvent::json(Some(SYSTEM_STATUS_EVENT.to_string()), &status)).await {
                        break;
                    }
                }
                received = subscription.recv() => {
                    let Some(envelope) = received else { break };
                    if !gate.admit(envelope.revision) {
                        debug!(revision = envelope.revision, "dropping stale playback event");
                        continue;
                    }
                    let event = ServerEvent::json(Some(envelope.kind.clone()), &envelope);
                    if !forward(&tx, event).await {
                        break;
                    }
                }
            }
        }

        info!(subscription = subscription.id(), "playback SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Push one event to the response; returns `false` once the client is gone.
async fn forward(
    tx: &mpsc::Sender<Result<Event, Infallible>>,
    payload: serde_json::Result<ServerEvent>,
) -> bool {
    let payload = match payload {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize SSE payload");
            return true;
        }
    };
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    tx.send(Ok(event)).await.is_ok()
}
