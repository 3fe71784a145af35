//! Getting a connected stream: accept one peer, or connect to one.
//!
//! This is the only place the two roles differ. Both hand back the same
//! [`Transport`], and the session never knows which side it is on.

use tokio::net::{TcpListener, TcpStream};

use crate::error::BootstrapError;
use crate::line_log::{LineSink, Severity};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Server => "SERVER",
            Role::Client => "CLIENT",
        }
    }

    pub fn peer(self) -> Role {
        match self {
            Role::Server => Role::Client,
            Role::Client => Role::Server,
        }
    }
}

/// Bind `addr` and wait for exactly one peer.
pub async fn listen(
    addr: &str,
    name: &str,
    sink: &dyn LineSink,
) -> Result<Transport<TcpStream>, BootstrapError> {
    let listener = bind(addr, name, sink).await?;
    accept(listener, name, sink).await
}

/// Bind a listener without accepting yet.
pub async fn bind(addr: &str, name: &str, sink: &dyn LineSink) -> Result<TcpListener, BootstrapError> {
    sink.log("Binding the socket...", name, Severity::Normal);
    TcpListener::bind(addr).await.map_err(|source| {
        sink.log(&format!("Failed to bind {addr}: {source}"), name, Severity::Error);
        BootstrapError::Bind {
            addr: addr.to_owned(),
            source,
        }
    })
}

/// Accept the first peer on an already bound listener. The listener is
/// dropped afterwards, nobody else gets in.
pub async fn accept(
    listener: TcpListener,
    name: &str,
    sink: &dyn LineSink,
) -> Result<Transport<TcpStream>, BootstrapError> {
    let local = listener
        .local_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "<unknown>".to_owned());
    sink.log(&format!("Listening on {local}..."), name, Severity::Normal);

    let (stream, peer) = listener
        .accept()
        .await
        .map_err(|source| BootstrapError::Accept { addr: local, source })?;
    sink.log(&format!("Accepted connection from {peer}."), name, Severity::Success);

    Ok(wrap(stream))
}

/// Connect to `addr`.
pub async fn connect(
    addr: &str,
    name: &str,
    sink: &dyn LineSink,
) -> Result<Transport<TcpStream>, BootstrapError> {
    sink.log(&format!("Connecting to {addr}..."), name, Severity::Normal);
    match TcpStream::connect(addr).await {
        Ok(stream) => {
            sink.log("Connection successful.", name, Severity::Success);
            Ok(wrap(stream))
        }
        Err(source) => {
            sink.log(&format!("Connection failed: {source}"), name, Severity::Error);
            Err(BootstrapError::Connect {
                addr: addr.to_owned(),
                source,
            })
        }
    }
}

fn wrap(stream: TcpStream) -> Transport<TcpStream> {
    // One line per write, don't let Nagle hold it back
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("could not set TCP_NODELAY: {e}");
    }
    Transport::new(stream)
}
