//! Client-side connection errors.

use std::time::Duration;

/// Errors surfaced through connection events.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The transport did not report open within the handshake window.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),
    /// The heartbeat reply was missed; the connection is considered dead.
    #[error("liveness timeout: no pong within {0:?}")]
    LivenessTimeout(Duration),
    /// Underlying websocket transport error.
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
}
