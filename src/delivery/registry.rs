//! Registry of client states and their outbound channels.
//!
//! Two independent maps: one owning the per-client delivery state, one
//! tracking the transmitter currently attached to each client. A state can
//! exist with no transmitter (between two long-poll requests), and a sweep
//! periodically evicts states that have gone quiet.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::core::time::Clock;

use super::state::{ClientId, ClientState};
use super::transmit::{SweepHooks, Transmitter};

/// Concurrent ClientId → state / ClientId → transmitter registry.
pub struct StateRegistry<C: Clock> {
    clock: C,
    inactivity_timeout: Duration,
    states: RwLock<HashMap<ClientId, Arc<ClientState>>>,
    transmitters: RwLock<HashMap<ClientId, Arc<dyn Transmitter>>>,
}

impl<C: Clock> StateRegistry<C> {
    pub fn new(clock: C, inactivity_timeout: Duration) -> Self {
        Self {
            clock,
            inactivity_timeout,
            states: RwLock::new(HashMap::new()),
            transmitters: RwLock::new(HashMap::new()),
        }
    }

    /// Get or atomically create the state for `id`, look up (without
    /// creating) the attached transmitter, and report whether this call
    /// created a brand-new state. Racing creators converge on one instance
    /// and exactly one of them observes `true`.
    pub fn retrieve_state(
        &self,
        id: &ClientId,
    ) -> (Arc<ClientState>, Option<Arc<dyn Transmitter>>, bool) {
        // The read guard must be released before the write lock below.
        let existing = self.states.read().get(id).cloned();
        let (state, created) = match existing {
            Some(state) => (state, false),
            // Not seen on the fast path; take the write lock and settle the
            // race, one creator winning.
            None => match self.states.write().entry(id.clone()) {
                Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
                Entry::Vacant(entry) => {
                    tracing::debug!(client = %id, "creating client state");
                    let state = Arc::new(ClientState::new(id.clone(), self.clock.now()));
                    entry.insert(Arc::clone(&state));
                    (state, true)
                }
            },
        };
        let transmitter = self.transmitters.read().get(id).cloned();
        (state, transmitter, created)
    }

    /// Attach `transmitter` as the client's current outbound channel,
    /// replacing any previous one.
    pub fn remember_transmitter(&self, id: &ClientId, transmitter: Arc<dyn Transmitter>) {
        self.transmitters.write().insert(id.clone(), transmitter);
    }

    /// Detach `transmitter`, but only if it is still the one on record; a
    /// newer channel attached in the meantime is left in place.
    pub fn forget_transmitter(&self, id: &ClientId, transmitter: &Arc<dyn Transmitter>) {
        let mut transmitters = self.transmitters.write();
        if let Some(current) = transmitters.get(id) {
            if Arc::ptr_eq(current, transmitter) {
                transmitters.remove(id);
            }
        }
    }

    /// Membership check only; no side effects.
    pub fn is_connected(&self, id: &ClientId) -> bool {
        self.states.read().contains_key(id)
    }

    /// Number of clients with live state.
    pub fn connected_count(&self) -> usize {
        self.states.read().len()
    }

    /// Remove both registry entries for `id`. Idempotent.
    pub fn cleanup_for_id(&self, id: &ClientId) {
        let mut states = self.states.write();
        let mut transmitters = self.transmitters.write();
        if states.remove(id).is_some() {
            tracing::info!(client = %id, "removed client state");
        }
        transmitters.remove(id);
    }

    /// Sweep a snapshot of all known states: report each client's
    /// inactivity to the presence collaborator, trigger cluster-wide
    /// cleanup for clients past the inactivity threshold, and a refresh
    /// signal for everyone else. O(connected clients).
    pub fn time_out_stale_states(&self, now: Instant, hooks: &SweepHooks) {
        let snapshot: Vec<(ClientId, Arc<ClientState>)> = self
            .states
            .read()
            .iter()
            .map(|(id, state)| (id.clone(), Arc::clone(state)))
            .collect();
        tracing::trace!(clients = snapshot.len(), "sweeping client states");

        for (id, state) in snapshot {
            let (inactive, timed_out) = {
                let guard = state.lock();
                (
                    guard.inactive_for(now),
                    guard.is_timed_out(now, self.inactivity_timeout),
                )
            };
            hooks.presence.set_inactivity(&id, inactive);
            if timed_out {
                tracing::info!(client = %id, ?inactive, "client state timed out");
                hooks.cleanup.clean_for_id(&id);
            } else {
                hooks.refresher.refresh(&id);
            }
        }
    }
}
