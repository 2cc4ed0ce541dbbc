//! Inbound protocol message decoding and batch handling.
//!
//! A request body is a single JSON object or an array of objects. Each
//! object is a control message (`ping`, `ack`, `nextSequence`) or, when no
//! recognized `type` is present, an opaque data stanza. The whole batch is
//! decoded before anything is applied: a malformed batch mutates nothing.

use std::ops::RangeInclusive;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::time::Clock;

use super::engine::{AckDelivery, Engine};
use super::registry::StateRegistry;
use super::stanza::Stanza;
use super::state::ClientId;
use super::transmit::StanzaSink;

/// Bad-request-class decode failure for an inbound batch.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("inbound batch must be an object or an array of objects")]
    NotAnObject,
    #[error("malformed {kind} message: {reason}")]
    Malformed { kind: &'static str, reason: String },
}

impl DispatchError {
    fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            kind,
            reason: reason.into(),
        }
    }
}

/// One acknowledgement target: a single sequence or an inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckTarget {
    One(i64),
    Range(i64, i64),
}

impl AckTarget {
    /// The sequences this target acknowledges.
    pub fn sequences(self) -> RangeInclusive<i64> {
        match self {
            Self::One(seq) => seq..=seq,
            Self::Range(start, end) => start..=end,
        }
    }
}

/// A decoded inbound protocol message.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    Ping { commit: bool },
    Ack { targets: Vec<AckTarget> },
    NextSequence { seq: i64 },
    Data(Stanza),
}

/// Decode a batch: one object, or an array of objects.
pub fn decode_batch(value: &Value) -> Result<Vec<InboundMessage>, DispatchError> {
    match value {
        Value::Object(object) => Ok(vec![decode_message(object)?]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_object()
                    .ok_or(DispatchError::NotAnObject)
                    .and_then(decode_message)
            })
            .collect(),
        _ => Err(DispatchError::NotAnObject),
    }
}

fn decode_message(object: &Map<String, Value>) -> Result<InboundMessage, DispatchError> {
    match object.get("type").and_then(Value::as_str) {
        Some("ping") => {
            let commit = match object.get("commit") {
                None => false,
                Some(value) => value
                    .as_bool()
                    .ok_or_else(|| DispatchError::malformed("ping", "commit must be a bool"))?,
            };
            Ok(InboundMessage::Ping { commit })
        }
        Some("ack") => {
            let seq = object
                .get("seq")
                .ok_or_else(|| DispatchError::malformed("ack", "missing seq"))?;
            Ok(InboundMessage::Ack {
                targets: decode_ack_targets(seq)?,
            })
        }
        Some("nextSequence") => {
            let seq = object
                .get("seq")
                .and_then(Value::as_i64)
                .ok_or_else(|| DispatchError::malformed("nextSequence", "seq must be an integer"))?;
            Ok(InboundMessage::NextSequence { seq })
        }
        // No recognized control type: an opaque data stanza.
        _ => {
            let stanza = serde_json::from_value(Value::Object(object.clone()))
                .map_err(|err| DispatchError::malformed("stanza", err.to_string()))?;
            Ok(InboundMessage::Data(stanza))
        }
    }
}

fn decode_ack_targets(seq: &Value) -> Result<Vec<AckTarget>, DispatchError> {
    match seq {
        Value::Number(_) => Ok(vec![AckTarget::One(require_i64(seq)?)]),
        Value::Array(items) => items.iter().map(decode_ack_target).collect(),
        _ => Err(DispatchError::malformed(
            "ack",
            "seq must be a number, a list, or a list of ranges",
        )),
    }
}

fn decode_ack_target(item: &Value) -> Result<AckTarget, DispatchError> {
    match item {
        Value::Number(_) => Ok(AckTarget::One(require_i64(item)?)),
        Value::Array(pair) if pair.len() == 2 => {
            let start = require_i64(&pair[0])?;
            let end = require_i64(&pair[1])?;
            if start > end {
                return Err(DispatchError::malformed("ack", "range start exceeds end"));
            }
            Ok(AckTarget::Range(start, end))
        }
        _ => Err(DispatchError::malformed(
            "ack",
            "each entry must be a number or a [start, end] pair",
        )),
    }
}

fn require_i64(value: &Value) -> Result<i64, DispatchError> {
    value
        .as_i64()
        .ok_or_else(|| DispatchError::malformed("ack", "sequence is not an integer"))
}

/// How acknowledgements for accepted data stanzas travel back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Receipts are returned inline with the triggering request.
    Synchronous,
    /// Receipts are queued as future outbound stanzas.
    Asynchronous,
}

/// Decodes inbound batches and drives the engine per message.
pub struct InboundHandler<C: Clock> {
    engine: Engine<C>,
    registry: Arc<StateRegistry<C>>,
    sink: Arc<dyn StanzaSink>,
}

impl<C: Clock> InboundHandler<C> {
    pub fn new(engine: Engine<C>, registry: Arc<StateRegistry<C>>, sink: Arc<dyn StanzaSink>) -> Self {
        Self {
            engine,
            registry,
            sink,
        }
    }

    /// Handle one inbound batch from `from` and flush whatever the cycle
    /// produced. Returns the receipts collected inline; the list is empty
    /// in [`AckMode::Asynchronous`].
    pub fn handle(
        &self,
        from: &ClientId,
        batch: &Value,
        mode: AckMode,
    ) -> Result<Vec<i64>, DispatchError> {
        let messages = decode_batch(batch)?;

        let (state, transmitter, was_created) = self.registry.retrieve_state(from);
        let mut guard = state.lock();
        let mut inline = Vec::new();
        let mut just_created = was_created;

        for message in messages {
            match message {
                InboundMessage::Ping { commit } => {
                    self.engine.ping(&mut guard, transmitter.as_ref(), commit);
                }
                InboundMessage::Ack { targets } => {
                    for target in targets {
                        for seq in target.sequences() {
                            // Negative sequences were never issued; the ack
                            // contract makes unknowns a no-op.
                            if let Ok(seq) = u64::try_from(seq) {
                                self.engine.acknowledgement_received(&mut guard, seq);
                            }
                        }
                    }
                }
                InboundMessage::NextSequence { seq } => {
                    self.engine.reset_threshold(from, seq);
                }
                InboundMessage::Data(stanza) => {
                    let ack = match mode {
                        AckMode::Synchronous => AckDelivery::Inline(&mut inline),
                        AckMode::Asynchronous => AckDelivery::Enqueue,
                    };
                    let accepted = self
                        .engine
                        .received_stanza(from, &stanza, just_created, &mut guard, ack);
                    if accepted {
                        just_created = false;
                        self.sink.dispatch(from, stanza);
                    }
                }
            }
        }

        self.engine.empty_buffer(&mut guard, transmitter.as_ref());
        Ok(inline)
    }
}
