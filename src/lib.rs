//! Two-party, full-duplex text chat over one TCP connection.
//!
//! One side listens, the other connects; after that both sides are the same:
//! a [`Session`] reads local lines and writes them to the socket while it
//! prints whatever the peer sends, until either side types the sentinel word
//! (`disconnect` by default) or the connection goes away.

pub mod bootstrap;
pub mod error;
pub mod input;
pub mod line_log;
pub mod session;
pub mod transport;

pub use error::{BootstrapError, SessionError, TransportError};
pub use line_log::{Console, LineSink, Severity};
pub use session::{Session, SessionConfig, SessionState, StopReason};
pub use transport::{Incoming, Transport, RECV_BUFFER_SIZE};
