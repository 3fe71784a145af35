//! The duplex session: a send loop and a receive loop over one transport.
//!
//! ```text
//!   local input ──▶ send loop ──▶ ┌───────────┐ ──▶ peer
//!                                 │ Transport │
//!   console    ◀── receive loop ◀─ └───────────┘ ◀── peer
//! ```
//!
//! Both loops run as their own task and check the session state at the top
//! of every iteration. Whoever decides the session is over calls [`Session::stop`],
//! which flips the state once and closes the transport. Closing the transport
//! is what gets the other loop out of a blocking read or write.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::error::SessionError;
use crate::line_log::{Console, LineSink, Severity};
use crate::transport::{Incoming, Transport};

pub const DEFAULT_SENTINEL: &str = "disconnect";

// -----------------------------------------------------------------------------
//   - Session state -
//   New -> Running -> Stopping -> Stopped, never backwards
// -----------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    New = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::New,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Why the session ended. Only the first reason is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    SentinelSent,
    SentinelReceived,
    SendFailed,
    ReceiveFailed,
    PeerClosed,
    InputClosed,
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Label for our own status lines.
    pub name: String,
    /// Label for lines received from the peer.
    pub peer_name: String,
    /// Sending or receiving this word (any case) ends the session.
    pub sentinel: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "LOCAL".into(),
            peer_name: "PEER".into(),
            sentinel: DEFAULT_SENTINEL.into(),
        }
    }
}

impl SessionConfig {
    fn is_sentinel(&self, text: &str) -> bool {
        text.trim().to_lowercase() == self.sentinel.trim().to_lowercase()
    }
}

struct Inner<S> {
    transport: Transport<S>,
    config: SessionConfig,
    state: AtomicU8,
    reason: OnceLock<StopReason>,
    sink: Arc<dyn LineSink>,
}

/// Handle to one duplex session. Clones share the same session.
pub struct Session<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for Session<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(transport: Transport<S>, config: SessionConfig) -> Self {
        Self::with_sink(transport, config, Arc::new(Console))
    }

    pub fn with_sink(transport: Transport<S>, config: SessionConfig, sink: Arc<dyn LineSink>) -> Self {
        let inner = Inner {
            transport,
            config,
            state: AtomicU8::new(SessionState::New as u8),
            reason: OnceLock::new(),
            sink,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// The running flag both loops poll.
    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.inner.reason.get().copied()
    }

    pub fn transport(&self) -> &Transport<S> {
        &self.inner.transport
    }

    /// Run both loops until the session is over.
    ///
    /// `input` delivers local lines; a closed channel counts as end of input.
    pub async fn start(&self, input: mpsc::Receiver<String>) -> Result<StopReason, SessionError> {
        let started = self.inner.state.compare_exchange(
            SessionState::New as u8,
            SessionState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if let Err(state) = started {
            return Err(SessionError::NotStartable(SessionState::from_u8(state)));
        }
        tracing::debug!(name = %self.inner.config.name, "session running");

        let receiver = tokio::spawn(self.clone().receive_loop());
        let sender = tokio::spawn(self.clone().send_loop(input));
        let (received, sent) = tokio::join!(receiver, sender);

        // A panicking loop never got to call stop, so make sure the other
        // loop and the socket are released before reporting it.
        if let Err(e) = received.and(sent) {
            self.stop(StopReason::Interrupted).await;
            self.inner.state.store(SessionState::Stopped as u8, Ordering::Release);
            return Err(SessionError::LoopPanicked(e));
        }

        self.inner.state.store(SessionState::Stopped as u8, Ordering::Release);
        // Every way out of either loop goes through stop, which records a reason
        let reason = self.stop_reason();
        debug_assert!(reason.is_some(), "loops exited without a stop reason");
        let reason = reason.unwrap_or_else(|| {
            tracing::warn!(name = %self.inner.config.name, "no stop reason recorded, reporting Interrupted");
            StopReason::Interrupted
        });
        tracing::debug!(name = %self.inner.config.name, ?reason, "session stopped");
        self.inner.sink.log("Session closed.", &self.inner.config.name, Severity::Normal);
        Ok(reason)
    }

    /// Move the session out of `Running` (or `New`) and close the transport.
    ///
    /// Safe to call from either loop or from outside at the same time as
    /// anything else; only one call wins and only that call returns `true`.
    pub async fn stop(&self, reason: StopReason) -> bool {
        let mut current = self.inner.state.load(Ordering::Acquire);
        loop {
            let next = match SessionState::from_u8(current) {
                SessionState::New => SessionState::Stopped,
                SessionState::Running => SessionState::Stopping,
                SessionState::Stopping | SessionState::Stopped => return false,
            };
            match self.inner.state.compare_exchange(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        let _ = self.inner.reason.set(reason);
        tracing::debug!(name = %self.inner.config.name, ?reason, "stopping session");
        self.inner.transport.close().await;
        true
    }

    fn log(&self, message: &str, sender: &str, severity: Severity) {
        self.inner.sink.log(message, sender, severity);
    }

    async fn send_loop(self, mut input: mpsc::Receiver<String>) {
        let config = &self.inner.config;
        let transport = &self.inner.transport;

        while self.is_running() {
            // Don't sit on the input channel once the other loop has
            // closed the transport.
            let line = tokio::select! {
                biased;
                _ = transport.closed() => break,
                line = input.recv() => line,
            };

            let Some(line) = line else {
                self.stop(StopReason::InputClosed).await;
                break;
            };

            let text = line.trim_end_matches(['\r', '\n']);
            if text.trim().is_empty() {
                continue;
            }

            if let Err(e) = transport.send(text).await {
                if self.is_running() {
                    self.log(&format!("Failed to send message: {e}"), &config.name, Severity::Error);
                }
                self.stop(StopReason::SendFailed).await;
                break;
            }

            if config.is_sentinel(text) {
                self.stop(StopReason::SentinelSent).await;
                break;
            }
        }
    }

    async fn receive_loop(self) {
        let config = &self.inner.config;
        let transport = &self.inner.transport;

        while self.is_running() {
            match transport.receive().await {
                Ok(Incoming::Text(text)) => {
                    self.log(&text, &config.peer_name, Severity::Normal);
                    if config.is_sentinel(&text) {
                        self.stop(StopReason::SentinelReceived).await;
                        break;
                    }
                }
                Ok(Incoming::Closed) => {
                    if self.is_running() {
                        self.log("Peer closed the connection.", &config.name, Severity::Warn);
                    }
                    self.stop(StopReason::PeerClosed).await;
                    break;
                }
                Err(e) => {
                    if self.is_running() {
                        self.log(&format!("Failed to receive message: {e}"), &config.name, Severity::Error);
                    }
                    self.stop(StopReason::ReceiveFailed).await;
                    break;
                }
            }
        }
    }
}
