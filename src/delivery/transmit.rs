//! Outbound channel and sweep collaborator contracts.
//!
//! The delivery core never talks to a socket. It hands batches to a
//! [`Transmitter`], and the periodic sweep reports into the presence,
//! refresh, and cluster-cleanup collaborators. All four are traits so the
//! transport and cluster layers stay out of this crate.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::stanza::Stanza;
use super::state::ClientId;

/// Why a batch could not be handed to the client's channel.
#[derive(Debug, Error)]
pub enum TransmitError {
    /// The channel went away between the flush decision and the write.
    #[error("outbound channel closed")]
    ChannelClosed,
    /// The transport rejected or failed to write the batch.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// The current outbound channel for one client.
///
/// A transmitter may be told to suspend when there is nothing to deliver,
/// holding the long-poll open and idle. Send failures are transient from
/// the core's point of view: the resend buffer is the recovery path.
pub trait Transmitter: Send + Sync {
    fn send(&self, batch: Vec<Stanza>) -> Result<(), TransmitError>;
    fn suspend(&self);
}

/// Cluster-wide cleanup trigger for a timed-out client. Expected to call
/// back into the local registry's `cleanup_for_id` eventually.
pub trait ClusterCleanup: Send + Sync {
    fn clean_for_id(&self, id: &ClientId);
}

/// Presence collaborator fed with each client's inactivity duration on
/// every sweep.
pub trait PresenceReporter: Send + Sync {
    fn set_inactivity(&self, id: &ClientId, inactive: Duration);
}

/// Refresh signal for clients that survived a sweep.
pub trait IdRefresher: Send + Sync {
    fn refresh(&self, id: &ClientId);
}

/// Backend consumer of inbound stanzas the ordering gate accepted.
pub trait StanzaSink: Send + Sync {
    fn dispatch(&self, from: &ClientId, stanza: Stanza);
}

/// The collaborators a stale-state sweep reports into.
#[derive(Clone)]
pub struct SweepHooks {
    pub cleanup: Arc<dyn ClusterCleanup>,
    pub presence: Arc<dyn PresenceReporter>,
    pub refresher: Arc<dyn IdRefresher>,
}
