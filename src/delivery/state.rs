//! Per-client outbound delivery state.
//!
//! Each connected client owns one [`ClientState`]: a resend buffer of
//! sequenced stanzas awaiting acknowledgement, a best-effort queue with no
//! retry, a monotonic sequence counter, and a last-activity timestamp. All
//! mutators live on the lock guard so the caller provably holds the lock
//! for the whole logical operation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stanza::{EnqueuedStanza, Stanza};

/// Opaque, comparable identifier of a connected client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

fn current_thread_token() -> u64 {
    THREAD_TOKEN.with(|token| *token)
}

#[derive(Debug)]
struct StateInner {
    /// Next sequence to hand out; strictly increasing, never reused.
    sequence_counter: u64,
    /// Sequenced stanzas awaiting acknowledgement, keyed by their sequence.
    resend_buffer: BTreeMap<u64, EnqueuedStanza>,
    /// Best-effort stanzas, lost if the next flush does not deliver them.
    best_effort: Vec<Stanza>,
    last_seen: Instant,
}

/// Outbound buffers and bookkeeping for one client.
///
/// The embedded lock is owner-aware: the holder's thread token is recorded
/// for diagnostics so contention from another actor can be told apart from
/// self-recursion. No logic may depend on reentrancy.
#[derive(Debug)]
pub struct ClientState {
    id: ClientId,
    inner: Mutex<StateInner>,
    holder: AtomicU64,
}

impl ClientState {
    pub fn new(id: ClientId, now: Instant) -> Self {
        Self {
            id,
            inner: Mutex::new(StateInner {
                sequence_counter: 0,
                resend_buffer: BTreeMap::new(),
                best_effort: Vec::new(),
                last_seen: now,
            }),
            holder: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// Acquire the state lock for one logical protocol operation.
    pub fn lock(&self) -> StateGuard<'_> {
        let inner = self.inner.lock();
        self.holder.store(current_thread_token(), Ordering::Relaxed);
        StateGuard { state: self, inner }
    }

    /// Thread token of the current lock holder, if any. Diagnostics only.
    pub fn holder(&self) -> Option<u64> {
        match self.holder.load(Ordering::Relaxed) {
            0 => None,
            token => Some(token),
        }
    }

    /// Whether the calling thread is the recorded lock holder.
    pub fn held_by_current_thread(&self) -> bool {
        self.holder() == Some(current_thread_token())
    }
}

/// Exclusive access to one client's buffers for the duration of a logical
/// operation.
pub struct StateGuard<'a> {
    state: &'a ClientState,
    inner: MutexGuard<'a, StateInner>,
}

impl StateGuard<'_> {
    pub fn id(&self) -> &ClientId {
        &self.state.id
    }

    /// Queue a stanza for delivery.
    ///
    /// Stanzas without an identifier get a random unique one. Reliable
    /// stanzas take the next value of the monotonic counter, have their
    /// sequence field updated to match, and land in the resend buffer;
    /// everything else is appended to the best-effort queue. Returns the
    /// assigned sequence for reliable stanzas.
    pub fn enqueue(&mut self, mut stanza: Stanza) -> Option<u64> {
        if stanza.id.is_none() {
            stanza.id = Some(Uuid::new_v4().to_string());
        }
        if stanza.reliable {
            let sequence = self.inner.sequence_counter;
            self.inner.sequence_counter += 1;
            stanza.seq = sequence as i64;
            self.inner
                .resend_buffer
                .insert(sequence, EnqueuedStanza::new(stanza, sequence));
            Some(sequence)
        } else {
            self.inner.best_effort.push(stanza);
            None
        }
    }

    /// Drop the resend-buffer entry for `seq`. Idempotent: an unknown
    /// sequence (already acknowledged, already abandoned, or never issued)
    /// is not an error.
    pub fn acknowledgement_received(&mut self, seq: u64) {
        if self.inner.resend_buffer.remove(&seq).is_some() {
            tracing::trace!(client = %self.state.id, seq, "acknowledged");
        }
    }

    /// The batch to hand to the transmitter: best-effort stanzas first
    /// (sentinel sequence sorts below any assigned number), then resend
    /// entries in strictly ascending sequence order.
    pub fn stanzas_to_send(&self) -> Vec<Stanza> {
        let mut batch: Vec<Stanza> = self.inner.best_effort.iter().cloned().collect();
        batch.extend(
            self.inner
                .resend_buffer
                .values()
                .map(|entry| entry.stanza.clone()),
        );
        batch
    }

    /// Age the buffers after a flush attempt.
    ///
    /// Best-effort stanzas are cleared unconditionally; they get no retry.
    /// Each resend entry is charged one retry, and entries that spend their
    /// budget are abandoned silently.
    pub fn purge(&mut self, retry_budget: u32) {
        self.inner.best_effort.clear();
        let client = self.state.id.clone();
        self.inner.resend_buffer.retain(|seq, entry| {
            if entry.bump_retries(retry_budget) {
                tracing::debug!(client = %client, seq, "retry budget spent, abandoning stanza");
                false
            } else {
                true
            }
        });
    }

    /// Record client activity.
    pub fn touch(&mut self, now: Instant) {
        self.inner.last_seen = now;
    }

    pub fn is_timed_out(&self, now: Instant, threshold: Duration) -> bool {
        self.inactive_for(now) > threshold
    }

    /// Time since the last recorded activity.
    pub fn inactive_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.inner.last_seen)
    }

    /// Sequence number the next reliable stanza will be assigned.
    pub fn next_sequence(&self) -> u64 {
        self.inner.sequence_counter
    }

    /// Stanzas currently awaiting delivery, both classes combined.
    pub fn pending(&self) -> usize {
        self.inner.best_effort.len() + self.inner.resend_buffer.len()
    }

    /// Drop both buffers; the sequence counter keeps running so numbers are
    /// never reused within a session.
    pub fn reset(&mut self) {
        self.inner.best_effort.clear();
        self.inner.resend_buffer.clear();
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.state.holder.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> ClientState {
        ClientState::new(ClientId::from("alice"), Instant::now())
    }

    #[test]
    fn test_sequences_assigned_in_order() {
        let state = state();
        let mut guard = state.lock();
        assert_eq!(guard.enqueue(Stanza::reliable(json!({ "n": 1 }))), Some(0));
        assert_eq!(guard.enqueue(Stanza::reliable(json!({ "n": 2 }))), Some(1));
        assert_eq!(guard.next_sequence(), 2);
    }

    #[test]
    fn test_batch_orders_best_effort_before_sequenced() {
        let state = state();
        let mut guard = state.lock();
        guard.enqueue(Stanza::reliable(json!({ "n": 1 })));
        guard.enqueue(Stanza::best_effort(json!({ "n": 2 })));
        guard.enqueue(Stanza::reliable(json!({ "n": 3 })));

        let batch = guard.stanzas_to_send();
        let seqs: Vec<i64> = batch.iter().map(|s| s.seq).collect();
        assert_eq!(seqs, vec![-1, 0, 1]);
    }

    #[test]
    fn test_every_stanza_gets_an_identifier() {
        let state = state();
        let mut guard = state.lock();
        guard.enqueue(Stanza::best_effort(json!({})));
        assert!(guard.stanzas_to_send()[0].id.is_some());
    }

    #[test]
    fn test_acknowledgement_is_idempotent() {
        let state = state();
        let mut guard = state.lock();
        guard.enqueue(Stanza::reliable(json!({})));
        guard.acknowledgement_received(0);
        assert_eq!(guard.pending(), 0);
        // Unknown and repeated sequences are silently ignored.
        guard.acknowledgement_received(0);
        guard.acknowledgement_received(99);
    }

    #[test]
    fn test_purge_drops_best_effort_and_ages_sequenced() {
        let state = state();
        let mut guard = state.lock();
        guard.enqueue(Stanza::best_effort(json!({})));
        guard.enqueue(Stanza::reliable(json!({})));

        guard.purge(2);
        assert_eq!(guard.pending(), 1);
        guard.purge(2);
        assert_eq!(guard.pending(), 0);
    }

    #[test]
    fn test_later_entries_keep_their_headroom() {
        let state = state();
        let mut guard = state.lock();
        guard.enqueue(Stanza::reliable(json!({ "n": 1 })));
        guard.purge(2);
        guard.enqueue(Stanza::reliable(json!({ "n": 2 })));
        guard.purge(2);

        let batch = guard.stanzas_to_send();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].seq, 1);
    }

    #[test]
    fn test_timeout_follows_touch() {
        let state = state();
        let threshold = Duration::from_secs(30 * 60);
        let base = Instant::now();

        let mut guard = state.lock();
        guard.touch(base);
        assert!(!guard.is_timed_out(base, threshold));
        assert!(!guard.is_timed_out(base + threshold, threshold));
        assert!(guard.is_timed_out(base + threshold + Duration::from_secs(1), threshold));
    }

    #[test]
    fn test_reset_clears_buffers_but_not_the_counter() {
        let state = state();
        let mut guard = state.lock();
        guard.enqueue(Stanza::reliable(json!({})));
        guard.enqueue(Stanza::best_effort(json!({})));
        guard.reset();
        assert_eq!(guard.pending(), 0);
        assert_eq!(guard.enqueue(Stanza::reliable(json!({}))), Some(1));
    }

    #[test]
    fn test_lock_holder_is_observable() {
        let state = state();
        assert!(state.holder().is_none());
        let guard = state.lock();
        assert!(state.held_by_current_thread());
        drop(guard);
        assert!(state.holder().is_none());
    }
}
