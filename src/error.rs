use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for the chat relay
#[derive(Error, Debug)]
pub enum ChatError {
    // Setup errors
    #[error("Failed to bind {}: {source}", path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to unlink stale socket {}: {source}", path.display())]
    Unlink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to set non-blocking mode: {0}")]
    NonBlocking(#[from] nix::errno::Errno),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Delivery errors
    #[error("Recipient backlog full ({pending} bytes pending, limit {limit})")]
    Backlog { pending: usize, limit: usize },

    #[error("Recipient accepted zero bytes")]
    WriteZero,

    // Console errors
    #[error("Console error: {0}")]
    Console(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// I/O error kinds that mean the other end of a connection went away
pub fn is_disconnect(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
    )
}

impl ChatError {
    /// Whether this error must abort startup.
    ///
    /// Only setup-time failures are fatal. Everything that happens on a live
    /// connection is contained at that connection and never reaches the
    /// process exit status.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChatError::Bind { .. }
                | ChatError::Unlink { .. }
                | ChatError::NonBlocking(_)
                | ChatError::InvalidConfig(_)
        )
    }

    /// Whether the peer went away (as opposed to a local fault)
    pub fn is_peer_gone(&self) -> bool {
        match self {
            ChatError::Io(e) => is_disconnect(e),
            _ => false,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ChatError::InvalidConfig(_) => 2,
            ChatError::Bind { .. } | ChatError::Unlink { .. } => 3,
            ChatError::NonBlocking(_) => 4,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_setup_errors_are_fatal() {
        assert!(ChatError::Bind {
            path: PathBuf::from(".chatsock"),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        }
        .is_fatal());
        assert!(ChatError::InvalidConfig("bad".to_string()).is_fatal());
        assert!(ChatError::NonBlocking(nix::errno::Errno::EBADF).is_fatal());
    }

    #[test]
    fn test_connection_errors_are_contained() {
        assert!(!ChatError::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_fatal());
        assert!(!ChatError::Backlog {
            pending: 10,
            limit: 5
        }
        .is_fatal());
        assert!(!ChatError::WriteZero.is_fatal());
        assert!(!ChatError::Console("gone".to_string()).is_fatal());
    }

    #[test]
    fn test_peer_gone_classification() {
        assert!(ChatError::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_peer_gone());
        assert!(ChatError::Io(io::Error::from(io::ErrorKind::ConnectionReset)).is_peer_gone());
        assert!(!ChatError::Io(io::Error::from(io::ErrorKind::PermissionDenied)).is_peer_gone());
        assert!(is_disconnect(&io::Error::from(io::ErrorKind::NotConnected)));
        assert!(!is_disconnect(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(!ChatError::WriteZero.is_peer_gone());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ChatError::InvalidConfig("x".to_string()).exit_code(), 2);
        assert_eq!(
            ChatError::Unlink {
                path: PathBuf::from("/tmp/x"),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            }
            .exit_code(),
            3
        );
        assert_eq!(ChatError::WriteZero.exit_code(), 1);
    }

    #[test]
    fn test_bind_error_mentions_path() {
        let err = ChatError::Bind {
            path: PathBuf::from("/run/chat.sock"),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().contains("/run/chat.sock"));
    }
}
