use crate::{dto::sse::PlaybackEnvelope, state::ids::DeviceId};

/// Drops events whose revision is not newer than the last one let through.
#[derive(Debug, Default, Clone, Copy)]
pub struct RevisionGate {
    last: Option<u64>,
}

impl RevisionGate {
    /// Gate that admits any first revision.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start after `revision`, so that only later revisions are admitted.
    pub fn after(revision: u64) -> Self {
        Self {
            last: Some(revision),
        }
    }

    /// Record `revision` and return whether it is newer than anything seen so far.
    pub fn admit(&mut self, revision: u64) -> bool {
        match self.last {
            Some(last) if revision <= last => false,
            _ => {
                self.last = Some(revision);
                true
            }
        }
    }

    /// Newest revision admitted so far.
    pub fn last(&self) -> Option<u64> {
        self.last
    }
}

/// Result of handing an envelope to a [`PlayerView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The envelope was newer and replaced the local copy.
    Applied,
    /// Already seen or older; nothing changed.
    Stale,
}

/// A connected device's local copy of the shared state.
///
/// Applying the same or an older revision is a no-op, so echoes of a device's own
/// commands never cause it to re-render or re-publish.
#[derive(Debug, Clone)]
pub struct PlayerView {
    device_id: DeviceId,
    gate: RevisionGate,
    current: Option<PlaybackEnvelope>,
}

impl PlayerView {
    /// Empty view for `device_id`.
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            gate: RevisionGate::new(),
            current: None,
        }
    }

    /// Device this view belongs to.
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Adopt `envelope` if it is newer than the current copy.
    pub fn apply(&mut self, envelope: &PlaybackEnvelope) -> ApplyOutcome {
        if !self.gate.admit(envelope.revision) {
            return ApplyOutcome::Stale;
        }
        self.current = Some(envelope.clone());
        ApplyOutcome::Applied
    }

    /// Latest adopted envelope.
    pub fn current(&self) -> Option<&PlaybackEnvelope> {
        self.current.as_ref()
    }

    /// Whether this device should be producing audio for the state it holds.
    pub fn should_render(&self) -> bool {
        self.current.as_ref().is_some_and(|envelope| {
            envelope.data.playing
                && envelope.data.current_track_id.is_some()
                && envelope.data.active_player_id.as_ref() == Some(&self.device_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{coordinator::PLAYBACK_TOPIC, playback::PlaybackState};

    fn envelope(revision: u64, active: &str, playing: bool) -> PlaybackEnvelope {
        let state = PlaybackState {
            current_track_id: Some("t1".into()),
            playing,
            active_player_id: Some(active.into()),
            revision,
            ..PlaybackState::default()
        };
        PlaybackEnvelope::state(PLAYBACK_TOPIC, &state, "2024-01-01T00:00:00Z".into())
    }

    #[test]
    fn gate_admits_only_newer_revisions() {
        let mut gate = RevisionGate::new();
        assert!(gate.admit(3));
        assert!(!gate.admit(3));
        assert!(!gate.admit(2));
        assert!(gate.admit(5));
        assert_eq!(gate.last(), Some(5));

        let mut resumed = RevisionGate::after(5);
        assert!(!resumed.admit(5));
        assert!(resumed.admit(6));
    }

    #[test]
    fn applying_the_same_event_twice_is_a_noop() {
        let mut view = PlayerView::new("a".into());
        let event = envelope(4, "a", true);

        assert_eq!(view.apply(&event), ApplyOutcome::Applied);
        let before = view.current().cloned();
        assert_eq!(view.apply(&event), ApplyOutcome::Stale);
        assert_eq!(view.current().cloned(), before);
    }

    #[test]
    fn stale_event_does_not_override_newer_state() {
        let mut view = PlayerView::new("a".into());
        view.apply(&envelope(6, "b", true));
        assert_eq!(view.apply(&envelope(5, "a", true)), ApplyOutcome::Stale);
        assert!(!view.should_render());
    }

    #[test]
    fn only_the_active_player_renders() {
        let mut a = PlayerView::new("a".into());
        let mut b = PlayerView::new("b".into());
        let event = envelope(1, "a", true);
        a.apply(&event);
        b.apply(&event);
        assert!(a.should_render());
        assert!(!b.should_render());

        a.apply(&envelope(2, "a", false));
        assert!(!a.should_render());
    }
}
