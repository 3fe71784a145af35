//! One connected byte stream, wrapped for the session.
//!
//! The stream is split into a read half and a write half so the receive loop
//! and the send loop never wait on each other. Closing cancels a shared token:
//! any `send`/`receive` still in flight returns straight away instead of
//! hanging on the socket.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::TransportError;

pub const RECV_BUFFER_SIZE: usize = 1024;

/// What a single `receive` produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Text(String),
    /// The peer hung up, the endpoint was closed, or it was never connected.
    Closed,
}

// Read half plus the tail of a character that a previous read cut in two
struct Inbound<S> {
    half: ReadHalf<S>,
    partial: Vec<u8>,
}

pub struct Transport<S> {
    reader: Mutex<Inbound<S>>,
    writer: Mutex<WriteHalf<S>>,
    buffer_size: usize,
    connected: AtomicBool,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite,
{
    pub fn new(stream: S) -> Self {
        Self::with_buffer_size(stream, RECV_BUFFER_SIZE)
    }

    /// `buffer_size` is raised to 4 so a split character always fits.
    pub fn with_buffer_size(stream: S, buffer_size: usize) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(Inbound {
                half: reader,
                partial: Vec::new(),
            }),
            writer: Mutex::new(writer),
            buffer_size: buffer_size.max(4),
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Resolves once `close` has been called.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.shutdown.cancelled()
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }

    /// Write all of `text` as UTF-8.
    pub async fn send(&self, text: &str) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let mut writer = self.writer.lock().await;
        let write = async {
            writer.write_all(text.as_bytes()).await?;
            writer.flush().await
        };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                self.disconnect();
                Err(TransportError::Closed)
            }
            result = write => result.map_err(|e| {
                self.disconnect();
                TransportError::Io(e)
            }),
        }
    }

    /// One read of at most `buffer_size` bytes.
    ///
    /// There is no framing: whatever is sitting in the socket (up to the
    /// buffer size) comes back as one piece of text. A longer line therefore
    /// shows up over several calls. When a read ends halfway through a
    /// character, those bytes are held back and lead the next piece.
    pub async fn receive(&self) -> Result<Incoming, TransportError> {
        if !self.is_connected() {
            return Ok(Incoming::Closed);
        }

        let mut inbound = self.reader.lock().await;
        loop {
            let carried = inbound.partial.len();
            let mut buf = vec![0u8; self.buffer_size];
            buf[..carried].copy_from_slice(&inbound.partial);

            let read = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    self.disconnect();
                    return Ok(Incoming::Closed);
                }
                read = inbound.half.read(&mut buf[carried..]) => read,
            };

            let num_bytes = match read {
                // Read zero bytes means the socket hung up on the other end.
                Ok(0) => {
                    if carried > 0 {
                        tracing::debug!("peer closed mid-character, dropping {carried} byte(s)");
                    }
                    self.disconnect();
                    return Ok(Incoming::Closed);
                }
                Ok(num_bytes) => num_bytes,
                Err(e) => {
                    self.disconnect();
                    return Err(TransportError::Io(e));
                }
            };

            inbound.partial.clear();
            buf.truncate(carried + num_bytes);

            match String::from_utf8(buf) {
                Ok(text) => return Ok(Incoming::Text(text)),
                // Only cut short at the end, the rest comes with the next read
                Err(e) if e.utf8_error().error_len().is_none() => {
                    let valid = e.utf8_error().valid_up_to();
                    let mut bytes = e.into_bytes();
                    inbound.partial = bytes.split_off(valid);
                    if valid > 0 {
                        let text = String::from_utf8_lossy(&bytes).into_owned();
                        return Ok(Incoming::Text(text));
                    }
                }
                Err(e) => {
                    self.disconnect();
                    return Err(TransportError::InvalidUtf8(e.utf8_error()));
                }
            }
        }
    }

    /// Close the endpoint. Only the first call does anything; it returns
    /// `true` for that call.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.disconnect();
        // Kick any in-flight send/receive off the socket first, otherwise
        // the writer lock below could be held by a blocked write.
        self.shutdown.cancel();

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::debug!("error while shutting down the socket: {e}");
        }
        true
    }
}
