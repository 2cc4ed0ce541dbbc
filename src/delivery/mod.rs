//! The stanza delivery protocol core.
//!
//! Reliable, ordered, at-least-once delivery of stanzas to long-poll
//! clients:
//! - `stanza` - Payload types and the resend-buffer entry
//! - `state` - Per-client buffers, sequence counter, owner-aware lock
//! - `registry` - ClientId → state / transmitter registry and sweep
//! - `engine` - Stateless protocol logic over a state/transmitter pair
//! - `dispatch` - Inbound protocol message decoding and batch handling
//! - `gate` - Inbound ordering/deduplication gate contract
//! - `transmit` - Outbound channel and collaborator contracts

pub mod dispatch;
pub mod engine;
pub mod gate;
pub mod registry;
pub mod stanza;
pub mod state;
pub mod transmit;

pub use dispatch::*;
pub use engine::*;
pub use gate::*;
pub use registry::*;
pub use stanza::*;
pub use state::*;
pub use transmit::*;
