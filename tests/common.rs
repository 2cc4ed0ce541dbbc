//! Common test harness utilities for integration tests.
//!
//! Recording doubles for the external collaborators (transmitter, sweep
//! hooks, backend sink) plus a hand-driven clock.

// Not all test files use all helpers; silence dead_code warnings for unused exports.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use comet::delivery::stanza::Stanza;
use comet::delivery::state::ClientId;
use comet::delivery::transmit::{
    ClusterCleanup, IdRefresher, PresenceReporter, StanzaSink, SweepHooks, Transmitter,
    TransmitError,
};
use comet::time::Clock;

/// Clock advanced by hand so inactivity thresholds are testable.
#[derive(Clone)]
pub struct ManualClock {
    start: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock()
    }

    fn sleep(&self, duration: Duration) -> tokio::time::Sleep {
        tokio::time::sleep(duration)
    }
}

/// Transmitter double recording every batch and suspend call.
#[derive(Default)]
pub struct RecordingTransmitter {
    sent: Mutex<Vec<Vec<Stanza>>>,
    suspended: AtomicUsize,
    fail_sends: AtomicBool,
}

impl RecordingTransmitter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every subsequent send fail.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<Vec<Stanza>> {
        self.sent.lock().clone()
    }

    pub fn suspend_count(&self) -> usize {
        self.suspended.load(Ordering::SeqCst)
    }
}

impl Transmitter for RecordingTransmitter {
    fn send(&self, batch: Vec<Stanza>) -> Result<(), TransmitError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransmitError::Transport("wire down".into()));
        }
        self.sent.lock().push(batch);
        Ok(())
    }

    fn suspend(&self) {
        self.suspended.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sweep collaborators recording every signal they receive.
#[derive(Default)]
pub struct RecordingSweepHooks {
    pub cleaned: Mutex<Vec<ClientId>>,
    pub refreshed: Mutex<Vec<ClientId>>,
    pub inactivity: Mutex<Vec<(ClientId, Duration)>>,
}

impl RecordingSweepHooks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn hooks(self: &Arc<Self>) -> SweepHooks {
        SweepHooks {
            cleanup: Arc::clone(self) as Arc<dyn ClusterCleanup>,
            presence: Arc::clone(self) as Arc<dyn PresenceReporter>,
            refresher: Arc::clone(self) as Arc<dyn IdRefresher>,
        }
    }
}

impl ClusterCleanup for RecordingSweepHooks {
    fn clean_for_id(&self, id: &ClientId) {
        self.cleaned.lock().push(id.clone());
    }
}

impl PresenceReporter for RecordingSweepHooks {
    fn set_inactivity(&self, id: &ClientId, inactive: Duration) {
        self.inactivity.lock().push((id.clone(), inactive));
    }
}

impl IdRefresher for RecordingSweepHooks {
    fn refresh(&self, id: &ClientId) {
        self.refreshed.lock().push(id.clone());
    }
}

/// Backend sink recording accepted stanzas.
#[derive(Default)]
pub struct RecordingSink {
    pub dispatched: Mutex<Vec<(ClientId, Stanza)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl StanzaSink for RecordingSink {
    fn dispatch(&self, from: &ClientId, stanza: Stanza) {
        self.dispatched.lock().push((from.clone(), stanza));
    }
}

/// The payload's control type, if any. Convenience for asserting batch
/// contents.
pub fn control_type(stanza: &Stanza) -> Option<&str> {
    stanza.payload.get("type").and_then(|v| v.as_str())
}
