//! Operator console
//!
//! The console is a privileged participant with no network identity. It
//! runs on its own schedule and talks to the relay only through the two
//! local channels set up by [`bridge`]; it never touches participant
//! connections.

pub mod bridge;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::unix::pipe;
use tracing::{info, instrument};

use crate::error::Result;
use crate::terminal::{self, SessionEnd};

pub use bridge::{channel_pair, spawn_console, ConsoleEnds, ConsoleHandle, RelayEnds};

/// Console loop: typed text goes to the relay, relayed text is displayed
#[instrument(skip_all)]
pub async fn run<I, O>(
    input: I,
    output: O,
    from_relay: pipe::Receiver,
    to_relay: pipe::Sender,
) -> Result<SessionEnd>
where
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    info!("Console attached");
    let end = terminal::shuttle(input, output, from_relay, to_relay).await?;
    info!(reason = ?end, "Console detached");
    Ok(end)
}
