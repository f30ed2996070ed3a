use std::{path::PathBuf, sync::Arc};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use now_playing_back::{
    config::AppConfig,
    dao::{
        catalog::{CatalogEntry, StaticCatalog, Track},
        playback_store::memory::MemoryPlaybackStore,
    },
    routes,
    state::{AppState, SharedState},
};

fn entry(id: &str, title: &str) -> CatalogEntry {
    CatalogEntry {
        track: Track {
            id: id.into(),
            title: title.to_string(),
            artist: Some("Test Artist".to_string()),
            album: None,
            duration_seconds: Some(180.0),
            mime_type: "audio/mpeg".to_string(),
        },
        path: PathBuf::from(format!("/nonexistent/{id}.mp3")),
    }
}

fn degraded_state() -> SharedState {
    let catalog = StaticCatalog::new([entry("a", "Alpha"), entry("b", "Bravo"), entry("c", "Charlie")]);
    AppState::new(&AppConfig::default(), Arc::new(catalog))
}

async fn ready_state() -> SharedState {
    let state = degraded_state();
    state
        .install_store(Arc::new(MemoryPlaybackStore::new()))
        .await
        .unwrap();
    state
}

fn app(state: &SharedState) -> Router {
    routes::router(state.clone())
}

fn command(path: &str, device: &str, mode: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::post(path).header("x-device-id", device);
    if let Some(mode) = mode {
        builder = builder.header("x-client-mode", mode);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(state: &SharedState, request: Request<Body>) -> (StatusCode, Value) {
    let response = app(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

async fn get(state: &SharedState, path: &str) -> (StatusCode, Value) {
    send(state, Request::get(path).body(Body::empty()).unwrap()).await
}

#[tokio::test]
async fn play_elects_the_calling_player() {
    let state = ready_state().await;

    let (status, body) = send(
        &state,
        command("/playback/play", "living-room", None, Some(json!({"track_id": "a"}))),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_track_id"], "a");
    assert_eq!(body["playing"], true);
    assert_eq!(body["position_seconds"], 0.0);
    assert_eq!(body["active_player_id"], "living-room");
    assert_eq!(body["revision"], 1);

    let (_, current) = get(&state, "/playback/state").await;
    assert_eq!(current, body);
}

#[tokio::test]
async fn remote_control_seek_keeps_the_active_player() {
    let state = ready_state().await;
    send(
        &state,
        command("/playback/play", "speaker", None, Some(json!({"track_id": "a"}))),
    )
    .await;

    let (status, body) = send(
        &state,
        command(
            "/playback/seek",
            "phone",
            Some("remote_control"),
            Some(json!({"position_seconds": 42.5})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["position_seconds"], 42.5);
    assert_eq!(body["active_player_id"], "speaker");
    assert_eq!(body["revision"], 2);
}

#[tokio::test]
async fn unknown_track_is_not_found_and_state_is_untouched() {
    let state = ready_state().await;

    let (status, body) = send(
        &state,
        command("/playback/play", "speaker", None, Some(json!({"track_id": "zzz"}))),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].as_str().unwrap().contains("zzz"));
    let (_, current) = get(&state, "/playback/state").await;
    assert_eq!(current["revision"], 0);
}

#[tokio::test]
async fn commands_require_a_device_header() {
    let state = ready_state().await;
    let request = Request::post("/playback/pause").body(Body::empty()).unwrap();

    let (status, body) = send(&state, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("X-Device-Id"));
}

#[tokio::test]
async fn unknown_client_mode_is_rejected() {
    let state = ready_state().await;

    let (status, _) = send(
        &state,
        command("/playback/pause", "speaker", Some("dj-booth"), None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn resume_without_a_track_conflicts() {
    let state = ready_state().await;

    let (status, _) = send(&state, command("/playback/resume", "speaker", None, None)).await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn negative_seek_is_a_bad_request() {
    let state = ready_state().await;
    send(
        &state,
        command("/playback/play", "speaker", None, Some(json!({"track_id": "a"}))),
    )
    .await;

    let (status, _) = send(
        &state,
        command(
            "/playback/seek",
            "speaker",
            None,
            Some(json!({"position_seconds": -3.0})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn queue_edits_and_next_walk_the_queue() {
    let state = ready_state().await;
    send(
        &state,
        command("/playback/play", "speaker", None, Some(json!({"track_id": "a"}))),
    )
    .await;

    let (status, body) = send(
        &state,
        command(
            "/playback/queue",
            "phone",
            Some("remote"),
            Some(json!({"op": "append", "track_ids": ["b", "c"]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queue"], json!(["b", "c"]));

    let (status, body) = send(
        &state,
        command(
            "/playback/queue",
            "phone",
            Some("remote"),
            Some(json!({"op": "move", "from": 1, "to": 0})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queue"], json!(["c", "b"]));

    let (status, _) = send(
        &state,
        command(
            "/playback/queue",
            "phone",
            Some("remote"),
            Some(json!({"op": "remove", "index": 5})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, queue) = get(&state, "/playback/queue").await;
    assert_eq!(queue["current"]["title"], "Alpha");
    assert_eq!(queue["tracks"][0]["id"], "c");
    assert_eq!(queue["tracks"][1]["id"], "b");

    let (status, body) = send(&state, command("/playback/next", "speaker", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_track_id"], "c");
    assert_eq!(body["queue"], json!(["b"]));
    assert_eq!(body["playing"], true);
}

#[tokio::test]
async fn queue_rejects_unknown_tracks() {
    let state = ready_state().await;

    let (status, _) = send(
        &state,
        command(
            "/playback/queue",
            "speaker",
            None,
            Some(json!({"op": "append", "track_ids": ["a", "ghost"]})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn claim_active_player_defaults_to_the_caller() {
    let state = ready_state().await;
    send(
        &state,
        command("/playback/play", "speaker", None, Some(json!({"track_id": "a"}))),
    )
    .await;

    let (status, body) = send(
        &state,
        command("/playback/active-player", "headphones", None, None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active_player_id"], "headphones");
}

#[tokio::test]
async fn stale_track_ended_leaves_the_state_alone() {
    let state = ready_state().await;
    send(
        &state,
        command("/playback/play", "speaker", None, Some(json!({"track_id": "a"}))),
    )
    .await;

    let (status, body) = send(
        &state,
        command(
            "/playback/track-ended",
            "speaker",
            None,
            Some(json!({"track_id": "b"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_track_id"], "a");
    assert_eq!(body["revision"], 1);
}

#[tokio::test]
async fn history_lists_sessions_per_device() {
    let state = ready_state().await;
    send(
        &state,
        command("/playback/play", "speaker", None, Some(json!({"track_id": "a"}))),
    )
    .await;
    send(
        &state,
        command("/playback/play", "speaker", None, Some(json!({"track_id": "b"}))),
    )
    .await;

    let (status, body) = get(&state, "/history?device_id=speaker&limit=10").await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    let open: Vec<_> = entries
        .iter()
        .filter(|entry| entry.get("completed_at").is_none())
        .collect();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0]["track_id"], "b");

    let (_, other) = get(&state, "/history?device_id=phone").await;
    assert!(other.as_array().unwrap().is_empty());

    let (status, _) = get(&state, "/history?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn degraded_mode_rejects_commands_but_serves_reads() {
    let state = degraded_state();

    let (status, health) = get(&state, "/healthcheck").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");

    let (status, _) = send(
        &state,
        command("/playback/play", "speaker", None, Some(json!({"track_id": "a"}))),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, current) = get(&state, "/playback/state").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current["revision"], 0);

    let (status, _) = get(&state, "/history").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn healthcheck_reports_ok_once_storage_is_installed() {
    let state = ready_state().await;

    let (status, health) = get(&state, "/healthcheck").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["subscribers"], 0);
}
