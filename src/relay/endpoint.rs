//! Byte endpoints the relay reads from and writes to
//!
//! The relay never blocks on a handle: every read and write is a single
//! non-blocking attempt made after the multiplexer reported readiness.

use std::io;

use bytes::Bytes;
use tokio::net::unix::pipe;
use tokio::net::UnixStream;

/// Largest chunk moved by one read or write call
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// Something the relay can write to without blocking
pub trait Sink {
    fn try_write(&self, buf: &[u8]) -> io::Result<usize>;
}

/// Something the relay can read from without blocking
pub trait Inbound {
    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize>;
}

impl Sink for UnixStream {
    fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        UnixStream::try_write(self, buf)
    }
}

impl Inbound for UnixStream {
    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        UnixStream::try_read(self, buf)
    }
}

impl Sink for pipe::Sender {
    fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        pipe::Sender::try_write(self, buf)
    }
}

impl Inbound for pipe::Receiver {
    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        pipe::Receiver::try_read(self, buf)
    }
}

/// Result of one read on a ready handle.
///
/// A message unit is whatever a single read returned. There is no framing,
/// so callers must not assume line or message boundaries.
#[derive(Debug)]
pub enum Arrival {
    Message(Bytes),
    /// Zero-length read: the producer closed its end
    Closed,
    Failed(io::Error),
}

/// Perform exactly one read of up to [`MAX_MESSAGE_SIZE`] bytes.
///
/// Returns `None` when the readiness report was spurious (would-block) or the
/// call was interrupted; the handle will be reported ready again.
pub fn read_unit<I: Inbound + ?Sized>(inbound: &I, buf: &mut [u8]) -> Option<Arrival> {
    let limit = buf.len().min(MAX_MESSAGE_SIZE);
    match inbound.try_read(&mut buf[..limit]) {
        Ok(0) => Some(Arrival::Closed),
        Ok(n) => Some(Arrival::Message(Bytes::copy_from_slice(&buf[..n]))),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => None,
        Err(e) if e.kind() == io::ErrorKind::Interrupted => None,
        Err(e) => Some(Arrival::Failed(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct ScriptedInbound {
        script: RefCell<VecDeque<io::Result<Vec<u8>>>>,
    }

    impl ScriptedInbound {
        fn new(script: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                script: RefCell::new(script.into()),
            }
        }
    }

    impl Inbound for ScriptedInbound {
        fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
            match self.script.borrow_mut().pop_front() {
                Some(Ok(data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }
    }

    #[test]
    fn test_read_unit_message() {
        let inbound = ScriptedInbound::new(vec![Ok(b"hi".to_vec())]);
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        match read_unit(&inbound, &mut buf) {
            Some(Arrival::Message(bytes)) => assert_eq!(&bytes[..], b"hi"),
            other => panic!("unexpected arrival: {:?}", other),
        }
    }

    #[test]
    fn test_read_unit_zero_length_is_closed() {
        let inbound = ScriptedInbound::new(vec![Ok(Vec::new())]);
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        assert!(matches!(read_unit(&inbound, &mut buf), Some(Arrival::Closed)));
    }

    #[test]
    fn test_read_unit_transient_conditions() {
        let inbound = ScriptedInbound::new(vec![
            Err(io::ErrorKind::WouldBlock.into()),
            Err(io::ErrorKind::Interrupted.into()),
        ]);
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        assert!(read_unit(&inbound, &mut buf).is_none());
        assert!(read_unit(&inbound, &mut buf).is_none());
    }

    #[test]
    fn test_read_unit_failure() {
        let inbound = ScriptedInbound::new(vec![Err(io::ErrorKind::ConnectionReset.into())]);
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        match read_unit(&inbound, &mut buf) {
            Some(Arrival::Failed(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("unexpected arrival: {:?}", other),
        }
    }

    #[test]
    fn test_read_unit_caps_at_transfer_unit() {
        let inbound = ScriptedInbound::new(vec![Ok(vec![7u8; 4096])]);
        let mut buf = [0u8; 4096];
        match read_unit(&inbound, &mut buf) {
            Some(Arrival::Message(bytes)) => assert_eq!(bytes.len(), MAX_MESSAGE_SIZE),
            other => panic!("unexpected arrival: {:?}", other),
        }
    }
}
