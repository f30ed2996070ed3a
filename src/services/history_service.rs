use crate::{
    dto::history::{HistoryEntryView, HistoryQuery},
    error::ServiceError,
    state::{SharedState, history::HistoryTracker, ids::DeviceId},
};

/// Most recent listening sessions, newest first.
pub async fn recent(
    state: &SharedState,
    query: HistoryQuery,
) -> Result<Vec<HistoryEntryView>, ServiceError> {
    let store = state.storage().require().await?;
    let device = query.device_id.map(DeviceId::from);
    let entries = HistoryTracker::new(store.as_ref())
        .recent(device.as_ref(), query.limit)
        .await?;
    Ok(entries.into_iter().map(HistoryEntryView::from).collect())
}
