//! Broadcast fan-out engine
//!
//! Decides who receives each message unit:
//! - participant input goes to the console and every other participant
//! - console input goes to every participant
//!
//! Delivery is best-effort. Each recipient is attempted independently; a
//! failing recipient is recorded and dropped after the broadcast completes,
//! never before the remaining recipients were tried. There is no
//! acknowledgement and nothing is retried at the protocol level.

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::ChatError;
use crate::relay::endpoint::{Arrival, Sink};
use crate::relay::peer::{Delivery, Peer};
use crate::relay::registry::{Full, Registry, SlotId};

/// Where a message unit came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Participant(SlotId),
    Console,
}

/// Who a message unit was sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Participant(SlotId),
    Console,
}

/// Outcome of one dispatch or flush
#[derive(Debug, Default)]
pub struct Report {
    /// Recipients that took the whole message unit
    pub written: Vec<Recipient>,
    /// Recipients holding part of it in their pending queue
    pub queued: Vec<Recipient>,
    pub failures: Vec<(Recipient, ChatError)>,
    /// Recipients removed because of a failure
    pub dropped: Vec<Recipient>,
    /// The origin closed its end (or failed) and was removed
    pub departed: bool,
}

impl Report {
    pub fn reached(&self) -> usize {
        self.written.len() + self.queued.len()
    }
}

/// Owns the participant registry and the console's outbound channel
pub struct Fanout<S, C> {
    participants: Registry<Peer<S>>,
    console: Option<Peer<C>>,
    max_pending_bytes: usize,
}

impl<S: Sink, C: Sink> Fanout<S, C> {
    pub fn new(capacity: usize, console: Option<C>, max_pending_bytes: usize) -> Self {
        Self {
            participants: Registry::with_capacity(capacity),
            console: console.map(|c| Peer::new(c, max_pending_bytes)),
            max_pending_bytes,
        }
    }

    /// Register a newly accepted connection.
    ///
    /// When the registry is full the handle is handed back for the caller to close.
    pub fn admit(&mut self, handle: S) -> Result<SlotId, Full<S>> {
        self.participants
            .insert(Peer::new(handle, self.max_pending_bytes))
            .map_err(|Full(peer)| Full(peer.into_inner()))
    }

    pub fn participants(&self) -> &Registry<Peer<S>> {
        &self.participants
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn console(&self) -> Option<&Peer<C>> {
        self.console.as_ref()
    }

    pub fn has_console(&self) -> bool {
        self.console.is_some()
    }

    /// Stop writing to the console. Returns whether it was still open.
    pub fn close_console(&mut self) -> bool {
        self.console.take().is_some()
    }

    /// Remove a participant, closing its handle
    pub fn depart(&mut self, id: SlotId) -> bool {
        self.participants.remove(id).is_some()
    }

    /// Feed the result of one read into the engine
    pub fn dispatch(&mut self, origin: Origin, arrival: Arrival) -> Report {
        match (origin, arrival) {
            (origin, Arrival::Message(msg)) => self.broadcast(origin, &msg),
            (Origin::Participant(id), Arrival::Closed) => {
                debug!(slot = %id, "Participant closed connection");
                Report {
                    departed: self.depart(id),
                    ..Report::default()
                }
            }
            (Origin::Participant(id), Arrival::Failed(e)) => {
                warn!(slot = %id, "Participant read failed: {}", e);
                Report {
                    failures: vec![(Recipient::Participant(id), ChatError::Io(e))],
                    departed: self.depart(id),
                    ..Report::default()
                }
            }
            (Origin::Console, Arrival::Closed) => {
                debug!("Console channel closed");
                Report {
                    departed: self.close_console(),
                    ..Report::default()
                }
            }
            (Origin::Console, Arrival::Failed(e)) => {
                warn!("Console read failed: {}", e);
                let departed = self.close_console();
                Report {
                    failures: vec![(Recipient::Console, ChatError::Io(e))],
                    departed,
                    ..Report::default()
                }
            }
        }
    }

    fn broadcast(&mut self, origin: Origin, msg: &Bytes) -> Report {
        let mut report = Report::default();

        if let Origin::Participant(id) = origin {
            if !self.participants.contains(id) {
                debug!(slot = %id, "Dropping message from vacated slot");
                return report;
            }
            if let Some(console) = self.console.as_mut() {
                record(&mut report, Recipient::Console, console.send(msg));
            }
        }

        for (id, peer) in self.participants.iter_mut() {
            if origin == Origin::Participant(id) {
                continue;
            }
            record(&mut report, Recipient::Participant(id), peer.send(msg));
        }

        self.drop_failed(&mut report);
        report
    }

    /// Retry pending output for one recipient after a writable notification
    pub fn flush(&mut self, recipient: Recipient) -> Report {
        let mut report = Report::default();
        let result = match recipient {
            Recipient::Participant(id) => match self.participants.get_mut(id) {
                Some(peer) => peer.flush(),
                None => return report,
            },
            Recipient::Console => match self.console.as_mut() {
                Some(peer) => peer.flush(),
                None => return report,
            },
        };
        match result {
            Ok(true) => report.written.push(recipient),
            Ok(false) => report.queued.push(recipient),
            Err(e) => report.failures.push((recipient, e)),
        }
        self.drop_failed(&mut report);
        report
    }

    fn drop_failed(&mut self, report: &mut Report) {
        for (recipient, err) in &report.failures {
            let removed = match recipient {
                Recipient::Participant(id) => self.participants.remove(*id).is_some(),
                Recipient::Console => self.close_console(),
            };
            if removed {
                if err.is_peer_gone() {
                    debug!(recipient = ?recipient, "Recipient went away: {}", err);
                } else {
                    warn!(recipient = ?recipient, "Dropping recipient after delivery failure: {}", err);
                }
                report.dropped.push(*recipient);
            }
        }
    }
}

fn record(report: &mut Report, recipient: Recipient, result: crate::error::Result<Delivery>) {
    match result {
        Ok(Delivery::Written) => report.written.push(recipient),
        Ok(Delivery::Queued) => report.queued.push(recipient),
        Err(e) => report.failures.push((recipient, e)),
    }
}
