//! Recipient with a pending-output queue
//!
//! A single non-blocking write may take only part of a message unit. The
//! untaken tail is queued and retried when the handle is next reported
//! writable, so nothing is silently dropped and per-recipient order holds.

use std::collections::VecDeque;
use std::io;

use bytes::Bytes;

use crate::error::{ChatError, Result};
use crate::relay::endpoint::Sink;

/// What happened to one message for one recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Fully handed to the kernel
    Written,
    /// Partly or wholly waiting for the next writable notification
    Queued,
}

#[derive(Debug)]
pub struct Peer<S> {
    sink: S,
    pending: VecDeque<Bytes>,
    pending_bytes: usize,
    limit: usize,
}

impl<S: Sink> Peer<S> {
    pub fn new(sink: S, limit: usize) -> Self {
        Self {
            sink,
            pending: VecDeque::new(),
            pending_bytes: 0,
            limit,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.sink
    }

    pub fn into_inner(self) -> S {
        self.sink
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    /// Deliver one message unit, queueing whatever the sink does not take now
    pub fn send(&mut self, msg: &Bytes) -> Result<Delivery> {
        if msg.is_empty() {
            return Ok(Delivery::Written);
        }
        if self.has_pending() {
            self.enqueue(msg.clone())?;
            return Ok(Delivery::Queued);
        }

        let written = self.write_some(msg)?;
        if written == msg.len() {
            Ok(Delivery::Written)
        } else {
            self.enqueue(msg.slice(written..))?;
            Ok(Delivery::Queued)
        }
    }

    /// Drain as much queued output as the sink accepts.
    ///
    /// Returns `true` once the queue is empty.
    pub fn flush(&mut self) -> Result<bool> {
        while let Some(front) = self.pending.pop_front() {
            let written = self.write_some(&front)?;
            self.pending_bytes -= written;
            if written < front.len() {
                self.pending.push_front(front.slice(written..));
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Write until the sink would block. Returns the number of bytes taken.
    fn write_some(&self, data: &[u8]) -> Result<usize> {
        let mut written = 0;
        while written < data.len() {
            match self.sink.try_write(&data[written..]) {
                Ok(0) => return Err(ChatError::WriteZero),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ChatError::Io(e)),
            }
        }
        Ok(written)
    }

    fn enqueue(&mut self, data: Bytes) -> Result<()> {
        let pending = self.pending_bytes + data.len();
        if pending > self.limit {
            return Err(ChatError::Backlog {
                pending,
                limit: self.limit,
            });
        }
        self.pending_bytes = pending;
        self.pending.push_back(data);
        Ok(())
    }
}
