//! Error types shared by the transport, the session and the bootstrap step.

use std::io;

use thiserror::Error;
use tokio::task::JoinError;

use crate::session::SessionState;

/// Outcome of a failed `send` / `receive` on a [`crate::transport::Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,

    /// The endpoint was closed while the call was in flight.
    #[error("connection closed locally")]
    Closed,

    #[error("socket I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("received bytes are not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session cannot be started from state {0:?}")]
    NotStartable(SessionState),

    #[error("session loop panicked: {0}")]
    LoopPanicked(#[from] JoinError),
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to accept a connection on {addr}: {source}")]
    Accept {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
}
