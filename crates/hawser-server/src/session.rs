//! One connected peer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use axum::extract::ws::Message;
use axum::http::HeaderMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::admission::ConnectRequest;

/// Outbound frames buffered per session before sends start failing.
pub(crate) const SEND_BUFFER: usize = 64;

/// A registered peer connection.
///
/// Liveness is two-phase: the sweep clears the flag when it probes, the
/// socket task sets it again on any pong. A session whose flag is still
/// clear at the next sweep is evicted.
#[derive(Debug)]
pub struct Session {
    id: u64,
    request: ConnectRequest,
    outbound: mpsc::Sender<Message>,
    is_alive: AtomicBool,
    cancel: CancellationToken,
    connected_at: Instant,
}

impl Session {
    pub(crate) fn new(
        id: u64,
        request: ConnectRequest,
        outbound: mpsc::Sender<Message>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            request,
            outbound,
            is_alive: AtomicBool::new(true),
            cancel,
            connected_at: Instant::now(),
        }
    }

    /// Registry-assigned session id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Request path the peer's upgrade arrived on.
    pub fn path(&self) -> &str {
        &self.request.path
    }

    /// Headers the peer's upgrade carried.
    pub fn headers(&self) -> &HeaderMap {
        &self.request.headers
    }

    /// When the peer was registered.
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Enqueue an outbound text frame.
    ///
    /// Returns `false` when the session is gone or its buffer is full;
    /// never panics.
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.outbound
            .try_send(Message::Text(text.into().into()))
            .is_ok()
    }

    /// Serialize a JSON value and enqueue it.
    pub fn send_json(&self, value: &serde_json::Value) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.send(json),
            Err(_) => false,
        }
    }

    /// Enqueue a liveness probe.
    pub(crate) fn probe(&self) -> bool {
        self.outbound
            .try_send(Message::Ping(axum::body::Bytes::new()))
            .is_ok()
    }

    /// The peer answered; arm the flag for the next sweep.
    pub(crate) fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Consume the liveness flag: returns whether the peer answered since
    /// the last call, clearing the flag either way.
    pub(crate) fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Tear the connection down.
    pub fn terminate(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn cancelled(&self) -> &CancellationToken {
        &self.cancel
    }
}
