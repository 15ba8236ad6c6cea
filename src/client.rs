//! Participant client
//!
//! Connects a local terminal to a running relay. Everything typed is sent
//! as-is; everything the relay forwards is printed as-is.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;
use tracing::{info, instrument};

use crate::error::Result;
use crate::terminal::{self, SessionEnd};

pub struct Client {
    path: PathBuf,
    stream: UnixStream,
}

impl Client {
    /// Connect to the relay's rendezvous path
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let stream = UnixStream::connect(&path).await?;
        info!(path = %path.display(), "Connected to relay");
        Ok(Self { path, stream })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shuttle between the terminal and the relay until either side closes.
    ///
    /// A relay that is full accepts and immediately closes the connection,
    /// which shows up here as [`SessionEnd::RelayClosed`].
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub async fn run<I, O>(self, input: I, output: O) -> Result<SessionEnd>
    where
        I: AsyncRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let (reader, writer) = self.stream.into_split();
        let end = terminal::shuttle(input, output, reader, writer).await?;
        info!(reason = ?end, "Session ended");
        Ok(end)
    }
}
