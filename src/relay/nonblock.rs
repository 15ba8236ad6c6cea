//! Non-blocking mode control for raw descriptors
//!
//! Pipe ends are created as plain blocking descriptors before the relay and
//! console diverge. They must be switched to non-blocking mode before either
//! side registers them with its runtime.

use std::os::fd::{AsFd, AsRawFd, OwnedFd};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use tokio::net::unix::pipe;

use crate::error::Result;

/// Put a descriptor into non-blocking mode. Idempotent.
pub fn set_nonblocking<Fd: AsFd>(fd: Fd) -> Result<()> {
    let raw = fd.as_fd().as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL)?);
    if !flags.contains(OFlag::O_NONBLOCK) {
        fcntl(raw, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    }
    Ok(())
}

/// Check whether a descriptor is in non-blocking mode
pub fn is_nonblocking<Fd: AsFd>(fd: Fd) -> Result<bool> {
    let raw = fd.as_fd().as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL)?);
    Ok(flags.contains(OFlag::O_NONBLOCK))
}

/// Register the read end of a pipe with the current runtime.
///
/// Must be called from within a tokio runtime.
pub fn receiver(fd: OwnedFd) -> Result<pipe::Receiver> {
    set_nonblocking(&fd)?;
    Ok(pipe::Receiver::from_owned_fd_unchecked(fd)?)
}

/// Register the write end of a pipe with the current runtime.
///
/// Must be called from within a tokio runtime.
pub fn sender(fd: OwnedFd) -> Result<pipe::Sender> {
    set_nonblocking(&fd)?;
    Ok(pipe::Sender::from_owned_fd_unchecked(fd)?)
}
