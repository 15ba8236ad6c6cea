//! Relay/console process bridge
//!
//! Two unidirectional channels are created before the relay and console
//! diverge: console->relay and relay->console. Every end is switched to
//! non-blocking mode up front. After divergence each side holds only the
//! ends it uses, so end-of-stream is seen exactly once, by the reader, when
//! the single writer goes away.
//!
//! The console runs on a dedicated OS thread with its own current-thread
//! runtime. It shares no state with the relay; a panic on the console
//! thread closes its channel ends and the relay sees end-of-stream.

use std::os::fd::OwnedFd;
use std::thread::JoinHandle;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error};

use crate::error::{ChatError, Result};
use crate::relay::nonblock;
use crate::terminal::SessionEnd;

/// Channel ends owned by the relay
#[derive(Debug)]
pub struct RelayEnds {
    /// Read end of console->relay
    pub from_console: OwnedFd,
    /// Write end of relay->console
    pub to_console: OwnedFd,
}

/// Channel ends owned by the console
#[derive(Debug)]
pub struct ConsoleEnds {
    /// Read end of relay->console
    pub from_relay: OwnedFd,
    /// Write end of console->relay
    pub to_relay: OwnedFd,
}

/// Create both channels and put all four ends into non-blocking mode
pub fn channel_pair() -> Result<(RelayEnds, ConsoleEnds)> {
    let (from_relay, to_console) = std::io::pipe()?;
    let (from_console, to_relay) = std::io::pipe()?;

    let relay = RelayEnds {
        from_console: OwnedFd::from(from_console),
        to_console: OwnedFd::from(to_console),
    };
    let console = ConsoleEnds {
        from_relay: OwnedFd::from(from_relay),
        to_relay: OwnedFd::from(to_relay),
    };

    for fd in [
        &relay.from_console,
        &relay.to_console,
        &console.from_relay,
        &console.to_relay,
    ] {
        nonblock::set_nonblocking(fd)?;
    }

    Ok((relay, console))
}

/// Handle to the running console
pub struct ConsoleHandle {
    thread: JoinHandle<Result<SessionEnd>>,
}

impl ConsoleHandle {
    /// Block until the console has exited
    pub fn join(self) -> Result<SessionEnd> {
        self.thread
            .join()
            .map_err(|_| ChatError::Console("console thread panicked".to_string()))?
    }

    /// Wait for the console without blocking the calling runtime
    pub async fn wait(self) -> Result<SessionEnd> {
        tokio::task::spawn_blocking(move || self.join())
            .await
            .map_err(|e| ChatError::Console(e.to_string()))?
    }
}

/// Diverge: start the console on its own schedule.
///
/// `surface` builds the console's terminal input and output. It runs on the
/// console thread, inside the console runtime.
pub fn spawn_console<F, I, O>(ends: ConsoleEnds, surface: F) -> Result<ConsoleHandle>
where
    F: FnOnce() -> (I, O) + Send + 'static,
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let thread = std::thread::Builder::new()
        .name("chatsock-console".to_string())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;

            let result = runtime.block_on(async move {
                let from_relay = nonblock::receiver(ends.from_relay)?;
                let to_relay = nonblock::sender(ends.to_relay)?;
                let (input, output) = surface();
                super::run(input, output, from_relay, to_relay).await
            });

            if let Err(e) = &result {
                error!("Console exited with error: {}", e);
            }
            // Blocking stdin readers never return on their own
            runtime.shutdown_background();
            debug!("Console runtime stopped");
            result
        })?;

    Ok(ConsoleHandle { thread })
}
