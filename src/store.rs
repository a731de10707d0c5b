//! Published sync state with broadcast capabilities

use crate::types::{SyncEvent, SyncState};
use tokio::sync::{broadcast, watch};

/// Capacity of the event channel; slow subscribers see `Lagged` past this
const EVENT_CAPACITY: usize = 64;

/// Holder of the state the presentation layer reads
///
/// Uses a tokio watch channel so any number of consumers can observe the
/// latest `{data, loading, error}` and await changes, plus a broadcast
/// channel for discrete events.
pub struct SnapshotStore {
    state: watch::Sender<SyncState>,
    events: broadcast::Sender<SyncEvent>,
}

impl SnapshotStore {
    /// Creates a store holding `initial`
    pub fn new(initial: SyncState) -> Self {
        let (state, _) = watch::channel(initial);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { state, events }
    }

    /// Clone of the current state
    pub fn current(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Applies `f` to the state in one step and notifies watchers
    ///
    /// A phase transition is also announced on the event channel.
    pub fn update(&self, f: impl FnOnce(&mut SyncState)) {
        let mut transition = None;
        self.state.send_modify(|state| {
            let before = state.phase;
            f(state);
            if state.phase != before {
                transition = Some((before, state.phase));
            }
        });

        if let Some((from, to)) = transition {
            tracing::debug!(?from, ?to, "Sync phase changed");
            self.emit(SyncEvent::phase_changed(from, to));
        }
    }

    /// Publishes an event; having no subscribers is fine
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(SyncState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SyncPhase;

    #[tokio::test]
    async fn test_update_notifies_watchers() {
        let store = SnapshotStore::default();
        let mut rx = store.subscribe();

        store.update(|state| state.loading = true);

        rx.changed().await.unwrap();
        assert!(rx.borrow().loading);
        assert!(store.current().loading);
    }

    #[tokio::test]
    async fn test_phase_change_emits_event() {
        let store = SnapshotStore::default();
        let mut events = store.subscribe_events();

        store.update(|state| state.phase = SyncPhase::Loading);
        store.update(|state| state.loading = false);

        match events.recv().await.unwrap() {
            SyncEvent::PhaseChanged { from, to, .. } => {
                assert_eq!(from, SyncPhase::Bootstrapping);
                assert_eq!(to, SyncPhase::Loading);
            }
            other => panic!("unexpected event: {other}"),
        }
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_update_without_watchers_still_applies() {
        let store = SnapshotStore::default();
        store.update(|state| state.error = Some("boom".to_string()));
        assert_eq!(store.current().error.as_deref(), Some("boom"));
    }
}
