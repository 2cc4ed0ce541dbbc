//! Stateless protocol logic over a `(state, transmitter)` pair.
//!
//! The engine owns no per-client data; callers retrieve a state from the
//! registry, take its lock, and pass the guard in. The lock scope
//! deliberately spans the transmit attempt so queue mutation and delivery
//! stay atomic per client; a slow transmitter stalls only its own client.

use std::sync::Arc;

use crate::core::config::DeliveryConfig;
use crate::core::time::Clock;

use super::gate::SequenceGate;
use super::stanza::Stanza;
use super::state::{ClientId, StateGuard};
use super::transmit::Transmitter;

/// How the delivery receipt for an accepted inbound stanza is returned.
pub enum AckDelivery<'a> {
    /// Queue the receipt as a future outbound stanza.
    Enqueue,
    /// Collect the receipt's sequence inline for the current response
    /// cycle.
    Inline(&'a mut Vec<i64>),
}

/// Stateless delivery protocol engine.
pub struct Engine<C: Clock> {
    clock: C,
    config: DeliveryConfig,
    gate: Arc<dyn SequenceGate>,
}

impl<C: Clock> Engine<C> {
    pub fn new(clock: C, config: DeliveryConfig, gate: Arc<dyn SequenceGate>) -> Self {
        Self {
            clock,
            config,
            gate,
        }
    }

    /// Keepalive. A committed ping gets a pong queued and flushed.
    pub fn ping(
        &self,
        guard: &mut StateGuard<'_>,
        transmitter: Option<&Arc<dyn Transmitter>>,
        commit: bool,
    ) {
        guard.touch(self.clock.now());
        if commit {
            guard.enqueue(Stanza::pong());
            self.empty_buffer(guard, transmitter);
        }
    }

    /// The client acknowledged `seq`; release the resend-buffer entry.
    pub fn acknowledgement_received(&self, guard: &mut StateGuard<'_>, seq: u64) {
        guard.acknowledgement_received(seq);
    }

    /// Server-initiated push: queue the stanza and flush.
    pub fn send(
        &self,
        guard: &mut StateGuard<'_>,
        transmitter: Option<&Arc<dyn Transmitter>>,
        stanza: Stanza,
    ) {
        guard.enqueue(stanza);
        self.empty_buffer(guard, transmitter);
    }

    /// The client told us where its inbound counting resumes.
    pub fn reset_threshold(&self, from: &ClientId, next: i64) {
        self.gate.reset_threshold(from, next);
    }

    /// Flush the client's pending batch.
    ///
    /// Nothing pending suspends the transmitter and returns. With no
    /// transmitter attached the batch simply stays buffered. A transport
    /// failure is logged and swallowed: the resend buffer is the sole
    /// recovery path, so the buffers are aged with `purge` after every
    /// actual flush attempt.
    pub fn empty_buffer(
        &self,
        guard: &mut StateGuard<'_>,
        transmitter: Option<&Arc<dyn Transmitter>>,
    ) {
        guard.touch(self.clock.now());
        let batch = guard.stanzas_to_send();
        if batch.is_empty() {
            if let Some(transmitter) = transmitter {
                transmitter.suspend();
            }
            return;
        }
        let Some(transmitter) = transmitter else {
            tracing::debug!(
                client = %guard.id(),
                pending = batch.len(),
                "no transmitter attached, batch stays buffered"
            );
            return;
        };
        if let Err(err) = transmitter.send(batch) {
            tracing::warn!(
                client = %guard.id(),
                error = %err,
                "transmit failed, sequenced stanzas stay buffered for retry"
            );
        }
        guard.purge(self.config.max_retries);
    }

    /// Bookkeeping for one inbound data stanza.
    ///
    /// The gate decides acceptance. For an accepted stanza on a state that
    /// was just created, the next-sequence handshake is queued before the
    /// receipt so the client learns where outbound numbering starts. The
    /// receipt itself is queued or collected inline per `ack`. Returns the
    /// gate's decision; the caller forwards accepted stanzas to the
    /// backend.
    pub fn received_stanza(
        &self,
        from: &ClientId,
        stanza: &Stanza,
        was_just_created: bool,
        guard: &mut StateGuard<'_>,
        ack: AckDelivery<'_>,
    ) -> bool {
        if !self.gate.accept(stanza, from) {
            tracing::debug!(client = %from, seq = stanza.seq, "gate rejected stanza");
            return false;
        }
        if was_just_created {
            let next = guard.next_sequence();
            guard.enqueue(Stanza::next_sequence(next));
        }
        match ack {
            AckDelivery::Enqueue => {
                guard.enqueue(Stanza::receipt(stanza.seq));
            }
            AckDelivery::Inline(receipts) => receipts.push(stanza.seq),
        }
        true
    }
}
