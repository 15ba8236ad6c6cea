//! Relay implementation
//!
//! This module provides the relay side of the chat:
//! - Fixed-capacity participant registry
//! - Readiness multiplexing over participants, console and listener
//! - Broadcast fan-out with per-recipient pending output
//! - The single-threaded relay loop

pub mod endpoint;
pub mod fanout;
pub mod multiplexer;
pub mod nonblock;
pub mod peer;
pub mod registry;
pub mod server;

pub use endpoint::{read_unit, Arrival, MAX_MESSAGE_SIZE};
pub use fanout::{Fanout, Origin, Recipient, Report};
pub use registry::{Registry, SlotId, MAX_PARTICIPANTS};
pub use server::{RelayServer, RelayStats};
