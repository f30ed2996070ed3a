use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::{models::HistoryEntryEntity, playback_store::MAX_HISTORY_LIMIT},
    dto::{format_system_time, validation::validate_identifier},
};

/// Filters accepted by `GET /history`.
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Only return sessions rendered by this device.
    pub device_id: Option<String>,
    /// Maximum number of entries (1 to 500, default 50).
    pub limit: Option<usize>,
}

impl Validate for HistoryQuery {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(ref id) = self.device_id {
            if let Err(e) = validate_identifier(id) {
                errors.add("device_id", e);
            }
        }
        if let Some(limit) = self.limit {
            if limit == 0 || limit > MAX_HISTORY_LIMIT {
                let mut err = validator::ValidationError::new("range");
                err.message =
                    Some(format!("limit must be between 1 and {MAX_HISTORY_LIMIT}").into());
                errors.add("limit", err);
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// One listening session.
#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryEntryView {
    pub id: Uuid,
    pub track_id: String,
    pub device_id: String,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    pub duration_listened_seconds: u64,
}

impl From<HistoryEntryEntity> for HistoryEntryView {
    fn from(entry: HistoryEntryEntity) -> Self {
        Self {
            id: entry.id,
            track_id: entry.track_id,
            device_id: entry.device_id,
            started_at: format_system_time(entry.started_at),
            completed_at: entry.completed_at.map(format_system_time),
            duration_listened_seconds: entry.duration_listened_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_must_stay_within_bounds() {
        let query = HistoryQuery {
            device_id: None,
            limit: Some(MAX_HISTORY_LIMIT + 1),
        };
        assert!(query.validate().is_err());

        let query = HistoryQuery {
            device_id: Some("kitchen".into()),
            limit: Some(10),
        };
        assert!(query.validate().is_ok());
    }
}
