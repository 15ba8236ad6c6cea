//! Chatsock - Local Chat Relay
//!
//! A small chat relay that listens on a Unix domain socket.
//!
//! ## Features
//!
//! - Up to ten concurrent participants, first-free slot reuse
//! - Broadcast to everyone except the sender
//! - Operator console that sees every message and speaks to all participants
//! - Single-threaded relay loop driven by readiness notifications
//! - Terminal client for joining a running relay

pub mod client;
pub mod config;
pub mod console;
pub mod error;
pub mod relay;
pub mod terminal;

pub use client::Client;
pub use config::{AcceptMode, Config, RelayConfig};
pub use error::{ChatError, Result};
pub use relay::{RelayServer, RelayStats};
