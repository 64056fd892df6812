//! Streaming transport session.
//!
//! [`TransportSession`] wraps one WebSocket connection and is owned
//! exclusively by the meter driving it; sessions are never shared. It is
//! generic over the underlying byte stream so the same meter code runs
//! over TLS, plain TCP, a proxied tunnel, or an in-memory pipe in tests.

use std::pin::Pin;
use std::task::Poll;

use bytes::Bytes;
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message, Utf8Bytes};

use crate::error::{Result, SpeedTestError};
use crate::params;

/// Lifecycle of a transport session.
///
/// The WebSocket handshake runs before a session is constructed, so
/// [`TransportSession::from_websocket`] starts at [`SessionState::Open`];
/// `Connecting` names the handshake stage for callers tracking a connect
/// attempt of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake in flight.
    Connecting,
    /// Connected; frames may flow both ways.
    Open,
    /// A close was sent or received; the handshake is completing.
    Closing,
    /// Fully closed.
    Closed,
    /// The channel faulted after it was open.
    Failed,
}

/// A data frame delivered by the peer.
///
/// Binary frames carry throughput payload and count toward the byte
/// total; text frames carry server-side measurements (counterflow) and
/// are observed but never counted. Control frames are handled inside the
/// session and never surface here.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Raw throughput-test payload.
    Binary(Bytes),
    /// A JSON counterflow message.
    Text(Utf8Bytes),
}

/// One streaming connection, state-tracked.
#[derive(Debug)]
pub struct TransportSession<T> {
    ws: WebSocketStream<T>,
    state: SessionState,
}

impl<T: AsyncRead + AsyncWrite + Unpin> TransportSession<T> {
    /// Wrap an already-upgraded WebSocket stream.
    pub fn from_websocket(ws: WebSocketStream<T>) -> Self {
        TransportSession {
            ws,
            state: SessionState::Open,
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Enqueue and flush one binary frame.
    ///
    /// Completes when the transport has accepted the frame; under
    /// backpressure this suspends instead of spinning, which is also the
    /// meter's yield point. Accepted means buffered locally, not
    /// delivered.
    pub async fn send(&mut self, frame: Bytes) -> Result<()> {
        if self.state != SessionState::Open {
            return Err(SpeedTestError::NotOpen { state: self.state });
        }
        match self.ws.send(Message::Binary(frame)).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = match e {
                    WsError::ConnectionClosed | WsError::AlreadyClosed => SessionState::Closed,
                    _ => SessionState::Failed,
                };
                Err(SpeedTestError::send(e))
            }
        }
    }

    /// Wait for the next data frame.
    ///
    /// Returns `Ok(None)` once the peer has closed; ping/pong frames are
    /// skipped. A fault marks the session [`SessionState::Failed`] and
    /// surfaces as [`SpeedTestError::Channel`].
    pub async fn recv(&mut self) -> Result<Option<Frame>> {
        if matches!(self.state, SessionState::Closed | SessionState::Failed) {
            return Ok(None);
        }
        loop {
            match self.ws.next().await {
                None => {
                    self.state = SessionState::Closed;
                    return Ok(None);
                }
                Some(Ok(Message::Binary(data))) => return Ok(Some(Frame::Binary(data))),
                Some(Ok(Message::Text(text))) => return Ok(Some(Frame::Text(text))),
                Some(Ok(Message::Close(_))) => {
                    self.state = SessionState::Closing;
                    return Ok(None);
                }
                Some(Ok(_)) => {} // Ping/Pong handled by tungstenite
                Some(Err(e)) => {
                    self.state = SessionState::Failed;
                    return Err(SpeedTestError::channel(e));
                }
            }
        }
    }

    /// Collect whatever frames are already buffered, without waiting.
    ///
    /// Lets a send-heavy meter keep counterflow and control traffic
    /// flowing while retaining exclusive ownership of the session. A
    /// clean close from the peer shows up as a state change, not an
    /// error; a fault is surfaced like [`Self::recv`].
    pub async fn drain_incoming(&mut self) -> Result<Vec<Frame>> {
        if self.state != SessionState::Open {
            return Ok(Vec::new());
        }
        std::future::poll_fn(|cx| {
            let mut frames = Vec::new();
            loop {
                match Pin::new(&mut self.ws).poll_next(cx) {
                    Poll::Pending => return Poll::Ready(Ok(frames)),
                    Poll::Ready(None) => {
                        self.state = SessionState::Closed;
                        return Poll::Ready(Ok(frames));
                    }
                    Poll::Ready(Some(Ok(Message::Binary(data)))) => {
                        frames.push(Frame::Binary(data));
                    }
                    Poll::Ready(Some(Ok(Message::Text(text)))) => {
                        frames.push(Frame::Text(text));
                    }
                    Poll::Ready(Some(Ok(Message::Close(_)))) => {
                        self.state = SessionState::Closing;
                        return Poll::Ready(Ok(frames));
                    }
                    Poll::Ready(Some(Ok(_))) => {} // Ping/Pong
                    Poll::Ready(Some(Err(e))) => {
                        self.state = SessionState::Failed;
                        return Poll::Ready(Err(SpeedTestError::channel(e)));
                    }
                }
            }
        })
        .await
    }

    /// Close the session.
    ///
    /// Safe on every state and idempotent; the meter calls this on every
    /// exit path. Failures are logged and swallowed because the session
    /// is torn down either way. Bounded by [`params::CLOSE_TIMEOUT`] so a
    /// jammed transport cannot stall teardown.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closing;
        match timeout(params::CLOSE_TIMEOUT, self.ws.close(None)).await {
            Ok(Ok(())) => {}
            Ok(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "close handshake failed"),
            Err(_elapsed) => tracing::debug!("close handshake timed out"),
        }
        self.state = SessionState::Closed;
    }
}
