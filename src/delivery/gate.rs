//! Inbound ordering and deduplication gate.
//!
//! The gate decides, per sender, whether an inbound stanza is accepted or
//! discarded as a duplicate/out-of-order replay. The delivery core only
//! consumes the contract; [`ThresholdGate`] is a reference implementation
//! kept deliberately small.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::stanza::Stanza;
use super::state::ClientId;

/// Per-sender acceptance contract for inbound stanzas.
pub trait SequenceGate: Send + Sync {
    /// Whether `stanza` from `from` is accepted for dispatch.
    fn accept(&self, stanza: &Stanza, from: &ClientId) -> bool;
    /// Reset the sender's threshold so inbound counting resumes at `next`.
    fn reset_threshold(&self, from: &ClientId, next: i64);
}

/// Expected-next-sequence gate.
///
/// Unsequenced stanzas always pass. A sequenced stanza passes when its
/// sequence is at or above the sender's threshold, and acceptance advances
/// the threshold past it, so replays and stale duplicates are rejected.
#[derive(Default)]
pub struct ThresholdGate {
    thresholds: Mutex<HashMap<ClientId, i64>>,
}

impl ThresholdGate {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SequenceGate for ThresholdGate {
    fn accept(&self, stanza: &Stanza, from: &ClientId) -> bool {
        if !stanza.is_sequenced() {
            return true;
        }
        let mut thresholds = self.thresholds.lock();
        let threshold = thresholds.entry(from.clone()).or_insert(0);
        if stanza.seq >= *threshold {
            *threshold = stanza.seq + 1;
            true
        } else {
            tracing::debug!(
                client = %from,
                seq = stanza.seq,
                threshold = *threshold,
                "stanza below threshold, discarding"
            );
            false
        }
    }

    fn reset_threshold(&self, from: &ClientId, next: i64) {
        self.thresholds.lock().insert(from.clone(), next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sequenced(seq: i64) -> Stanza {
        let mut stanza = Stanza::best_effort(json!({ "body": "x" }));
        stanza.seq = seq;
        stanza
    }

    #[test]
    fn test_unsequenced_always_accepted() {
        let gate = ThresholdGate::new();
        let from = ClientId::from("alice");
        assert!(gate.accept(&Stanza::best_effort(json!({})), &from));
        assert!(gate.accept(&Stanza::best_effort(json!({})), &from));
    }

    #[test]
    fn test_duplicates_rejected() {
        let gate = ThresholdGate::new();
        let from = ClientId::from("alice");
        assert!(gate.accept(&sequenced(0), &from));
        assert!(!gate.accept(&sequenced(0), &from));
        assert!(gate.accept(&sequenced(1), &from));
    }

    #[test]
    fn test_gaps_are_tolerated_but_not_replays() {
        let gate = ThresholdGate::new();
        let from = ClientId::from("alice");
        assert!(gate.accept(&sequenced(5), &from));
        assert!(!gate.accept(&sequenced(3), &from));
        assert!(gate.accept(&sequenced(6), &from));
    }

    #[test]
    fn test_reset_reopens_the_window() {
        let gate = ThresholdGate::new();
        let from = ClientId::from("alice");
        assert!(gate.accept(&sequenced(5), &from));
        assert!(!gate.accept(&sequenced(5), &from));
        gate.reset_threshold(&from, 5);
        assert!(gate.accept(&sequenced(5), &from));
    }

    #[test]
    fn test_thresholds_are_per_sender() {
        let gate = ThresholdGate::new();
        assert!(gate.accept(&sequenced(0), &ClientId::from("alice")));
        assert!(gate.accept(&sequenced(0), &ClientId::from("bob")));
    }
}
