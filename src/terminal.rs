//! Two-way shuttle between a local terminal and the relay
//!
//! Used by both the operator console and the remote participant client.
//! Waits indefinitely on {terminal input, relay output}; there is no second
//! source to poll for, so no cadence is needed.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{is_disconnect, Result};
use crate::relay::endpoint::MAX_MESSAGE_SIZE;

/// Why a shuttle session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Local input reached end-of-file
    InputClosed,
    /// The relay closed its side
    RelayClosed,
}

/// Forward input chunks upstream and display upstream chunks on output
pub async fn shuttle<I, O, R, W>(
    mut input: I,
    mut output: O,
    mut upstream_rx: R,
    mut upstream_tx: W,
) -> Result<SessionEnd>
where
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut input_buf = [0u8; MAX_MESSAGE_SIZE];
    let mut relay_buf = [0u8; MAX_MESSAGE_SIZE];

    loop {
        tokio::select! {
            read = input.read(&mut input_buf) => {
                let n = read?;
                if n == 0 {
                    debug!("Terminal input closed");
                    let _ = upstream_tx.shutdown().await;
                    return Ok(SessionEnd::InputClosed);
                }
                if let Err(e) = upstream_tx.write_all(&input_buf[..n]).await {
                    if is_disconnect(&e) {
                        return Ok(SessionEnd::RelayClosed);
                    }
                    return Err(e.into());
                }
            }
            read = upstream_rx.read(&mut relay_buf) => {
                let n = match read {
                    Ok(n) => n,
                    Err(e) if is_disconnect(&e) => 0,
                    Err(e) => return Err(e.into()),
                };
                if n == 0 {
                    debug!("Relay closed");
                    return Ok(SessionEnd::RelayClosed);
                }
                output.write_all(&relay_buf[..n]).await?;
                output.flush().await?;
            }
        }
    }
}
