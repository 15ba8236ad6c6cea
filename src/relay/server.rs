//! Relay main loop
//!
//! Owns the listening endpoint, the fan-out engine (and through it the
//! participant registry) and the relay's ends of the console channels.
//! Single-threaded: the multiplexer wait is the only suspension point.

use std::path::{Path, PathBuf};

use tokio::net::unix::pipe;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::config::{AcceptMode, RelayConfig};
use crate::console::RelayEnds;
use crate::error::{ChatError, Result};
use crate::relay::endpoint::{read_unit, Arrival, MAX_MESSAGE_SIZE};
use crate::relay::fanout::{Fanout, Origin, Recipient, Report};
use crate::relay::multiplexer::{self, Interest, Readiness};
use crate::relay::nonblock;
use crate::relay::registry::Full;

/// Counters published after every loop turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Currently registered participants
    pub participants: usize,
    pub console_open: bool,
    pub accepted: u64,
    /// Connections closed immediately because the registry was full
    pub rejected: u64,
    /// Failed accepts, each followed by the error backoff
    pub accept_errors: u64,
    /// Participants that closed their end or failed a read
    pub departed: u64,
    /// Recipients removed after a delivery failure
    pub dropped: u64,
    /// Message units relayed
    pub messages: u64,
    pub bytes: u64,
}

/// Chat relay
pub struct RelayServer {
    config: RelayConfig,
    listener: UnixListener,
    console_in: Option<pipe::Receiver>,
    fanout: Fanout<UnixStream, pipe::Sender>,
    buf: Box<[u8]>,
    stats: RelayStats,
    stats_tx: watch::Sender<RelayStats>,
}

impl RelayServer {
    /// Bind the rendezvous path and take over the relay's console ends.
    ///
    /// A stale socket at the path is unlinked first. Must be called from
    /// within a tokio runtime.
    pub fn bind(config: RelayConfig, console: Option<RelayEnds>) -> Result<Self> {
        remove_stale_socket(&config.socket_path)?;
        let listener = UnixListener::bind(&config.socket_path).map_err(|source| ChatError::Bind {
            path: config.socket_path.clone(),
            source,
        })?;

        let (console_in, console_out) = match console {
            Some(ends) => (
                Some(nonblock::receiver(ends.from_console)?),
                Some(nonblock::sender(ends.to_console)?),
            ),
            None => (None, None),
        };

        let fanout = Fanout::new(
            config.max_participants,
            console_out,
            config.max_pending_bytes,
        );
        let stats = RelayStats {
            console_open: fanout.has_console(),
            ..RelayStats::default()
        };
        let (stats_tx, _) = watch::channel(stats);

        info!(
            path = %config.socket_path.display(),
            capacity = config.max_participants,
            accept_mode = config.accept_mode.as_str(),
            "Relay listening"
        );

        Ok(Self {
            config,
            listener,
            console_in,
            fanout,
            buf: vec![0u8; MAX_MESSAGE_SIZE].into_boxed_slice(),
            stats,
            stats_tx,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    /// Watch the relay's counters
    pub fn subscribe(&self) -> watch::Receiver<RelayStats> {
        self.stats_tx.subscribe()
    }

    /// Run the relay until shutdown is signalled
    #[instrument(skip(self, shutdown), fields(path = %self.config.socket_path.display()))]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<RelayStats> {
        while !*shutdown.borrow() {
            let mut backoff = false;
            if self.config.accept_mode == AcceptMode::Poll {
                backoff |= self.poll_accepts();
            }

            let readiness = {
                let interest = self.interest();
                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                    readiness = multiplexer::wait(&interest) => readiness,
                }
            };

            backoff |= self.turn(readiness);
            self.publish();

            if backoff {
                tokio::time::sleep(self.config.error_backoff).await;
            }
        }

        self.shutdown();
        Ok(self.stats)
    }

    fn interest(&self) -> Interest<'_> {
        let participants = self.fanout.participants();
        let event_driven = self.config.accept_mode == AcceptMode::Event;

        Interest {
            listener: event_driven.then_some(&self.listener),
            accept_limit: participants.capacity() + 1,
            console_in: self.console_in.as_ref(),
            console_out: self
                .fanout
                .console()
                .filter(|peer| peer.has_pending())
                .map(|peer| peer.get_ref()),
            readable: participants
                .iter()
                .map(|(id, peer)| (id, peer.get_ref()))
                .collect(),
            writable: participants
                .iter()
                .filter(|(_, peer)| peer.has_pending())
                .map(|(id, peer)| (id, peer.get_ref()))
                .collect(),
            timeout: (!event_driven).then_some(self.config.poll_interval),
        }
    }

    /// Process one wake-up: accepts, pending output, console, then participants.
    ///
    /// Returns `true` when an accept failed and the loop should back off.
    fn turn(&mut self, readiness: Readiness) -> bool {
        let mut accept_failed = false;
        for accepted in readiness.accepted {
            accept_failed |= !self.admit(accepted);
        }

        if readiness.console_writable {
            let report = self.fanout.flush(Recipient::Console);
            self.account(None, &report);
        }
        for id in readiness.writable {
            let report = self.fanout.flush(Recipient::Participant(id));
            self.account(None, &report);
        }

        if readiness.console_readable {
            let arrival = match self.console_in.as_ref() {
                Some(rx) => read_unit(rx, &mut self.buf),
                None => None,
            };
            if let Some(arrival) = arrival {
                if !matches!(arrival, Arrival::Message(_)) {
                    info!("Console left; relaying between participants only");
                    self.console_in = None;
                }
                self.deliver(Origin::Console, arrival);
            }
        }

        for id in readiness.readable {
            let arrival = match self.fanout.participants().get(id) {
                Some(peer) => read_unit(peer.get_ref(), &mut self.buf),
                // Dropped earlier in this turn
                None => continue,
            };
            if let Some(arrival) = arrival {
                self.deliver(Origin::Participant(id), arrival);
            }
        }

        accept_failed
    }

    fn deliver(&mut self, origin: Origin, arrival: Arrival) {
        let size = match &arrival {
            Arrival::Message(msg) => Some(msg.len()),
            _ => None,
        };
        let report = self.fanout.dispatch(origin, arrival);

        if let (Origin::Participant(id), true) = (origin, report.departed) {
            info!(slot = %id, "Participant left");
            self.stats.departed += 1;
        }
        self.account(size, &report);
    }

    fn account(&mut self, size: Option<usize>, report: &Report) {
        if let Some(size) = size {
            self.stats.messages += 1;
            self.stats.bytes += size as u64;
            debug!(bytes = size, recipients = report.reached(), "Relayed message");
        }
        self.stats.dropped += report.dropped.len() as u64;
    }

    /// Drain pending connections without blocking (poll mode)
    fn poll_accepts(&mut self) -> bool {
        let limit = self.fanout.participants().capacity() + 1;
        let mut failed = false;
        for _ in 0..limit {
            match multiplexer::try_accept(&self.listener) {
                Some(result) => {
                    if !self.admit(result) {
                        failed = true;
                        break;
                    }
                }
                None => break,
            }
        }
        failed
    }

    /// Register an accepted connection. Returns `false` if the accept itself failed.
    fn admit(&mut self, accepted: std::io::Result<UnixStream>) -> bool {
        let stream = match accepted {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Accept failed: {}", e);
                self.stats.accept_errors += 1;
                return false;
            }
        };

        match self.fanout.admit(stream) {
            Ok(id) => {
                self.stats.accepted += 1;
                info!(
                    slot = %id,
                    participants = self.fanout.participant_count(),
                    "Participant joined"
                );
            }
            Err(Full(stream)) => {
                self.stats.rejected += 1;
                warn!(
                    capacity = self.fanout.participants().capacity(),
                    "Registry full, closing new connection"
                );
                drop(stream);
            }
        }
        true
    }

    fn publish(&mut self) {
        self.stats.participants = self.fanout.participant_count();
        self.stats.console_open = self.fanout.has_console();
        let stats = self.stats;
        self.stats_tx.send_if_modified(|current| {
            if *current == stats {
                false
            } else {
                *current = stats;
                true
            }
        });
    }

    fn shutdown(&mut self) {
        info!("Relay shutting down");
        self.fanout.close_console();
        self.console_in = None;
        self.publish();

        match std::fs::remove_file(&self.config.socket_path) {
            Ok(()) => debug!("Removed socket path"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove socket path: {}", e),
        }

        info!(
            accepted = self.stats.accepted,
            rejected = self.stats.rejected,
            departed = self.stats.departed,
            messages = self.stats.messages,
            bytes = self.stats.bytes,
            "Relay stopped"
        );
    }
}

fn remove_stale_socket(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed stale socket");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ChatError::Unlink {
            path: PathBuf::from(path),
            source,
        }),
    }
}
