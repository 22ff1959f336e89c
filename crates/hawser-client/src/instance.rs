//! One physical connection attempt.
//!
//! An instance owns a single websocket from dial to close: it enforces the
//! handshake timeout, runs the ping/pong heartbeat once open, parses inbound
//! frames opportunistically, and reports lifecycle events to its manager.
//! Close is idempotent — a closed instance never re-emits `Closed`.

use std::pin::Pin;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Sleep, sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use hawser_core::envelope::Inbound;

use crate::config::ManagerConfig;
use crate::error::ClientError;

/// Outbound frames buffered per instance before sends start failing.
const SEND_BUFFER: usize = 64;

/// Events an instance reports to its manager.
#[derive(Debug)]
pub enum InstanceEvent {
    /// The transport reported open within the handshake window.
    Open {
        /// Instance id.
        id: u64,
    },
    /// An inbound frame, opportunistically parsed.
    Message {
        /// Instance id.
        id: u64,
        /// Parsed or raw frame.
        frame: Inbound,
    },
    /// A transport error observed before close.
    Error {
        /// Instance id.
        id: u64,
        /// What went wrong.
        error: ClientError,
    },
    /// The instance closed. Emitted exactly once per instance.
    Closed {
        /// Instance id.
        id: u64,
    },
}

/// Handle to a spawned connection instance.
#[derive(Clone, Debug)]
pub struct InstanceHandle {
    id: u64,
    outbound: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl InstanceHandle {
    /// Monotonic id issued by the owning manager.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Enqueue an outbound text frame.
    ///
    /// Returns `false` when the instance is closed or its send buffer is
    /// full; never panics.
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.outbound.try_send(text.into()).is_ok()
    }

    /// Serialize a JSON value and enqueue it.
    pub fn send_json(&self, value: &serde_json::Value) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.send(json),
            Err(_) => false,
        }
    }

    /// Cancel all timers and force-close if still open.
    ///
    /// Safe to call multiple times; at most one `Closed` event results.
    pub fn destroy(&self) {
        self.cancel.cancel();
    }
}

/// Spawn an instance that starts connecting immediately.
pub(crate) fn spawn_instance(
    id: u64,
    config: ManagerConfig,
    events: mpsc::UnboundedSender<InstanceEvent>,
) -> InstanceHandle {
    let (outbound, outbound_rx) = mpsc::channel(SEND_BUFFER);
    let cancel = CancellationToken::new();
    let handle = InstanceHandle {
        id,
        outbound,
        cancel: cancel.clone(),
    };
    drop(tokio::spawn(run_instance(id, config, outbound_rx, cancel, events)));
    handle
}

/// Await the sleep if armed; pend forever otherwise.
async fn armed(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn run_instance(
    id: u64,
    config: ManagerConfig,
    mut outbound_rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<InstanceEvent>,
) {
    if config.log_actions {
        info!(instance = id, url = %config.url, "trying to connect");
    }

    let handshake = config.handshake_timeout();
    let ws = tokio::select! {
        () = cancel.cancelled() => {
            let _ = events.send(InstanceEvent::Closed { id });
            return;
        }
        dialed = timeout(handshake, connect_async(config.url.clone())) => match dialed {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(error)) => {
                let _ = events.send(InstanceEvent::Error {
                    id,
                    error: error.into(),
                });
                let _ = events.send(InstanceEvent::Closed { id });
                return;
            }
            Err(_elapsed) => {
                debug!(instance = id, ?handshake, "handshake timed out");
                let _ = events.send(InstanceEvent::Error {
                    id,
                    error: ClientError::HandshakeTimeout(handshake),
                });
                let _ = events.send(InstanceEvent::Closed { id });
                return;
            }
        },
    };

    if config.log_actions {
        info!(instance = id, "connected");
    }
    let _ = events.send(InstanceEvent::Open { id });

    let (mut ws_tx, mut ws_rx) = ws.split();
    let ping_interval = config.ping_interval();
    let ping_timeout = config.ping_timeout();

    // Heartbeat: exactly one of these is armed while open.
    let mut next_ping: Option<Pin<Box<Sleep>>> = Some(Box::pin(sleep(ping_interval)));
    let mut pong_deadline: Option<Pin<Box<Sleep>>> = None;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = armed(&mut next_ping) => {
                next_ping = None;
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                pong_deadline = Some(Box::pin(sleep(ping_timeout)));
            }
            () = armed(&mut pong_deadline) => {
                let _ = events.send(InstanceEvent::Error {
                    id,
                    error: ClientError::LivenessTimeout(ping_timeout),
                });
                break;
            }
            out = outbound_rx.recv() => match out {
                Some(text) => {
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(InstanceEvent::Message {
                        id,
                        frame: Inbound::parse(text.as_str()),
                    });
                }
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => {
                        let _ = events.send(InstanceEvent::Message {
                            id,
                            frame: Inbound::parse(text),
                        });
                    }
                    Err(_) => debug!(instance = id, len = data.len(), "non-UTF8 binary frame"),
                },
                Some(Ok(Message::Pong(_))) => {
                    pong_deadline = None;
                    next_ping = Some(Box::pin(sleep(ping_interval)));
                }
                Some(Ok(Message::Ping(payload))) => {
                    if ws_tx.send(Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(error)) => {
                    let _ = events.send(InstanceEvent::Error {
                        id,
                        error: error.into(),
                    });
                    break;
                }
            },
        }
    }

    // Single close path: best-effort close frame, then exactly one Closed.
    let _ = ws_tx.send(Message::Close(None)).await;
    if config.log_actions {
        info!(instance = id, "closed");
    }
    let _ = events.send(InstanceEvent::Closed { id });
}
