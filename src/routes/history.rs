use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use validator::Validate;

use crate::{
    dto::history::{HistoryEntryView, HistoryQuery},
    error::{AppError, ErrorBody},
    services::history_service,
    state::SharedState,
};

/// Routes exposing the listening history.
pub fn router() -> Router<SharedState> {
    Router::new().route("/history", get(list_history))
}

/// Most recent listening sessions, newest first.
#[utoipa::path(
    get,
    path = "/history",
    tag = "history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Listening sessions", body = [HistoryEntryView]),
        (status = 400, description = "Invalid filter", body = ErrorBody),
        (status = 503, description = "Storage unavailable", body = ErrorBody)
    )
)]
pub async fn list_history(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntryView>>, AppError> {
    query.validate()?;
    Ok(Json(history_service::recent(&state, query).await?))
}
