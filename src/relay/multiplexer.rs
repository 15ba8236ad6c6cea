//! Readiness multiplexer
//!
//! One call blocks until at least one source is ready, a bounded wait
//! elapses, or a connection arrives on the listener. It then probes every
//! source once without blocking so the caller gets the whole ready subset
//! for this wake-up, not just the first source that fired.

use std::future::{pending, Future};
use std::io;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::net::unix::pipe;
use tokio::net::{UnixListener, UnixStream};

use crate::relay::registry::SlotId;

/// Sources to watch during one wait
#[derive(Default)]
pub struct Interest<'a> {
    /// Listener to accept from; `None` when accepts are polled by the caller
    pub listener: Option<&'a UnixListener>,
    /// Most connections to accept in one wake-up
    pub accept_limit: usize,
    pub console_in: Option<&'a pipe::Receiver>,
    /// Console outbound, only while it holds pending output
    pub console_out: Option<&'a pipe::Sender>,
    pub readable: Vec<(SlotId, &'a UnixStream)>,
    /// Participants holding pending output
    pub writable: Vec<(SlotId, &'a UnixStream)>,
    /// Upper bound on the wait; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

/// Ready subset reported by one wait
#[derive(Debug, Default)]
pub struct Readiness {
    pub accepted: Vec<io::Result<UnixStream>>,
    pub console_readable: bool,
    pub console_writable: bool,
    /// Ascending slot order
    pub readable: Vec<SlotId>,
    /// Ascending slot order
    pub writable: Vec<SlotId>,
    pub timed_out: bool,
}

impl Readiness {
    pub fn is_idle(&self) -> bool {
        self.accepted.is_empty()
            && !self.console_readable
            && !self.console_writable
            && self.readable.is_empty()
            && self.writable.is_empty()
    }

    pub fn accept_failed(&self) -> bool {
        self.accepted.iter().any(|r| r.is_err())
    }
}

/// Block until something is ready, then report everything that is
pub async fn wait(interest: &Interest<'_>) -> Readiness {
    let mut readiness = Readiness::default();

    {
        let mut sources: FuturesUnordered<BoxFuture<'_, ()>> = FuturesUnordered::new();
        if let Some(rx) = interest.console_in {
            sources.push(settle(rx.readable()).boxed());
        }
        if let Some(tx) = interest.console_out {
            sources.push(settle(tx.writable()).boxed());
        }
        for (_, stream) in &interest.readable {
            sources.push(settle(stream.readable()).boxed());
        }
        for (_, stream) in &interest.writable {
            sources.push(settle(stream.writable()).boxed());
        }

        let any_ready = async {
            if sources.is_empty() {
                pending::<()>().await;
            } else {
                sources.next().await;
            }
        };

        tokio::select! {
            biased;
            _ = any_ready => {}
            accepted = accept_one(interest.listener) => readiness.accepted.push(accepted),
            _ = sleep_for(interest.timeout) => readiness.timed_out = true,
        }
    }

    readiness.console_readable = interest
        .console_in
        .is_some_and(|rx| is_ready(rx.readable()));
    readiness.console_writable = interest
        .console_out
        .is_some_and(|tx| is_ready(tx.writable()));
    readiness.readable = interest
        .readable
        .iter()
        .filter(|(_, stream)| is_ready(stream.readable()))
        .map(|(id, _)| *id)
        .collect();
    readiness.writable = interest
        .writable
        .iter()
        .filter(|(_, stream)| is_ready(stream.writable()))
        .map(|(id, _)| *id)
        .collect();
    readiness.readable.sort();
    readiness.writable.sort();

    if let Some(listener) = interest.listener {
        while readiness.accepted.len() < interest.accept_limit && !readiness.accept_failed() {
            match try_accept(listener) {
                Some(result) => readiness.accepted.push(result),
                None => break,
            }
        }
    }

    readiness
}

/// One non-blocking accept. `None` means nothing is waiting.
pub fn try_accept(listener: &UnixListener) -> Option<io::Result<UnixStream>> {
    listener
        .accept()
        .now_or_never()
        .map(|result| result.map(|(stream, _)| stream))
}

/// A readiness error still counts as ready; the following read surfaces it.
async fn settle<F: Future<Output = io::Result<()>>>(fut: F) {
    let _ = fut.await;
}

fn is_ready<F: Future<Output = io::Result<()>>>(fut: F) -> bool {
    fut.now_or_never().is_some()
}

async fn accept_one(listener: Option<&UnixListener>) -> io::Result<UnixStream> {
    match listener {
        Some(listener) => listener.accept().await.map(|(stream, _)| stream),
        None => pending().await,
    }
}

async fn sleep_for(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => pending().await,
    }
}
