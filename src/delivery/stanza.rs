//! Stanza payload types and the resend-buffer entry.
//!
//! A stanza is the atomic unit of payload exchanged with a client. The
//! payload itself is opaque to the delivery core; only the identifier, the
//! sequence field, and the reliability mark are interpreted here.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Sentinel sequence value for stanzas that have not been assigned a number.
pub const UNSEQUENCED: i64 = -1;

fn default_sequence() -> i64 {
    UNSEQUENCED
}

fn sequence_is_unset(seq: &i64) -> bool {
    *seq == UNSEQUENCED
}

/// One unit of message payload bound for a client.
///
/// The sequence field stays at [`UNSEQUENCED`] until the owning client
/// state assigns a number at enqueue time; best-effort stanzas keep the
/// sentinel for their whole life and are omitted from the wire form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stanza {
    /// Stanza identifier; assigned randomly at enqueue time when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Delivery sequence number, [`UNSEQUENCED`] until assigned.
    #[serde(
        default = "default_sequence",
        skip_serializing_if = "sequence_is_unset"
    )]
    pub seq: i64,
    /// Marked for sequenced (acknowledgable, retried) delivery.
    #[serde(skip)]
    pub reliable: bool,
    /// Opaque payload fields; encoding is owned by the transport layer.
    #[serde(flatten)]
    pub payload: Value,
}

impl Stanza {
    /// A stanza marked for sequenced, acknowledgable delivery.
    pub fn reliable(payload: Value) -> Self {
        Self {
            id: None,
            seq: UNSEQUENCED,
            reliable: true,
            payload,
        }
    }

    /// A best-effort stanza: delivered on the next flush or dropped.
    pub fn best_effort(payload: Value) -> Self {
        Self {
            id: None,
            seq: UNSEQUENCED,
            reliable: false,
            payload,
        }
    }

    /// Keepalive reply to a committed ping.
    pub fn pong() -> Self {
        Self::best_effort(json!({ "type": "pong" }))
    }

    /// Delivery receipt for an accepted inbound stanza.
    pub fn receipt(seq: i64) -> Self {
        Self::best_effort(json!({ "type": "ack", "seq": seq }))
    }

    /// Re-synchronization handshake telling the client where the server's
    /// outbound numbering resumes.
    pub fn next_sequence(next: u64) -> Self {
        Self::best_effort(json!({ "type": "nextSequence", "seq": next }))
    }

    /// Whether a sequence number has been assigned.
    pub fn is_sequenced(&self) -> bool {
        self.seq >= 0
    }
}

/// A sequenced stanza parked in the resend buffer until acknowledged.
#[derive(Debug, Clone)]
pub struct EnqueuedStanza {
    pub stanza: Stanza,
    /// Sequence assigned at enqueue time, duplicated out of the stanza so
    /// the entry stays addressable even if the payload is handed away.
    pub sequence: u64,
    /// Flush cycles this entry has survived without an acknowledgement.
    pub retries: u32,
}

impl EnqueuedStanza {
    pub fn new(stanza: Stanza, sequence: u64) -> Self {
        Self {
            stanza,
            sequence,
            retries: 0,
        }
    }

    /// Age the entry by one failed-to-deliver sweep. Returns `true` once
    /// the retry budget is spent and the entry must be abandoned.
    pub fn bump_retries(&mut self, budget: u32) -> bool {
        self.retries = self.retries.saturating_add(1);
        self.retries >= budget
    }
}
