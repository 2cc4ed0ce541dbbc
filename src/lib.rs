#![deny(unused, dead_code)]
#![deny(clippy::all, clippy::pedantic)]
// Module naming: common pattern in domain-driven code
#![allow(clippy::module_name_repetitions)]
// Variable naming: domain terms often similar
#![allow(clippy::similar_names)]
// Documentation style: many terms don't need backticks
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
// API ergonomics: prefer simplicity over must_use annotations
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
// Format strings: allow non-inlined for readability
#![allow(clippy::uninlined_format_args)]
// Import style
#![allow(clippy::wildcard_imports)]
// Numeric casts: intentional in protocol code
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
// Control flow style
#![allow(clippy::single_match_else)]
#![allow(clippy::match_same_arms)]
// Passing style
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::trivially_copy_pass_by_ref)]
// Self usage
#![allow(clippy::unused_self)]
// Option/Result patterns
#![allow(clippy::map_unwrap_or)]

//! Comet - reliable, ordered, at-least-once stanza delivery core.
//!
//! The server side of a long-poll stanza synchronization protocol:
//! explicit sequence numbers, per-client resend buffers, batched
//! acknowledgements, keepalive, and time-based eviction of idle client
//! state. Transport, payload encoding, and backend routing stay behind
//! traits.
//!
//! # Module Organization
//!
//! ## Core
//! - `core::config` - Configuration parsing and validation
//! - `core::sweeper` - Periodic stale-state sweep lifecycle
//! - `core::time` - Deterministic time utilities
//!
//! ## Delivery
//! - `delivery::stanza` - Payload types and the resend-buffer entry
//! - `delivery::state` - Per-client buffers and owner-aware locking
//! - `delivery::registry` - Client state / transmitter registry
//! - `delivery::engine` - Stateless protocol logic
//! - `delivery::dispatch` - Inbound message decoding and batch handling
//! - `delivery::gate` - Inbound ordering/deduplication gate
//! - `delivery::transmit` - Outbound channel and collaborator contracts
//!
//! ## Operations
//! - `telemetry` - Structured logging setup

// Core infrastructure
pub mod core;

// Delivery protocol
pub mod delivery;

// Operations
pub mod telemetry;

// Re-exports for convenience
pub use self::core::{config, sweeper, time};
pub use delivery::{dispatch, engine, gate, registry, stanza, state, transmit};

pub use self::core::config::Config;
pub use self::core::sweeper::SweepTask;
pub use delivery::dispatch::{AckMode, InboundHandler};
pub use delivery::engine::{AckDelivery, Engine};
pub use delivery::registry::StateRegistry;
pub use delivery::stanza::Stanza;
pub use delivery::state::{ClientId, ClientState};
