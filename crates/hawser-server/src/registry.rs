//! Session registry: admission, tracking, liveness sweep, replies.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, Uri};
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hawser_core::envelope::{Inbound, Response};

use crate::admission::{Admission, ConnectRequest};
use crate::config::RegistryConfig;
use crate::session::{SEND_BUFFER, Session};

/// Notifications surfaced to the owning application.
#[derive(Debug)]
pub enum RegistryEvent {
    /// A peer passed admission and was registered.
    Connected {
        /// The new session.
        session: Arc<Session>,
    },
    /// Inbound frame from a registered peer.
    Message {
        /// Originating session.
        session_id: u64,
        /// Parsed or raw frame.
        frame: Inbound,
    },
    /// A session was removed, by close, eviction, or teardown. Emitted
    /// exactly once per session.
    Closed {
        /// The removed session's id.
        session_id: u64,
    },
}

/// Tracks every connected peer and enforces liveness.
pub struct SessionRegistry {
    config: RegistryConfig,
    admission: Arc<dyn Admission>,
    sessions: RwLock<HashMap<u64, Arc<Session>>>,
    next_id: AtomicU64,
    events: mpsc::UnboundedSender<RegistryEvent>,
    cancel: CancellationToken,
}

impl SessionRegistry {
    /// Create a registry and start its liveness sweep.
    pub fn new(
        config: RegistryConfig,
        admission: Arc<dyn Admission>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<RegistryEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(Self {
            config,
            admission,
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            events,
            cancel: CancellationToken::new(),
        });
        drop(tokio::spawn(Arc::clone(&registry).run_sweep()));
        (registry, event_rx)
    }

    /// Number of currently registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Look up a session by id.
    pub fn session(&self, id: u64) -> Option<Arc<Session>> {
        self.sessions.read().get(&id).cloned()
    }

    /// Send a correlated reply envelope to a session.
    ///
    /// `outcome` becomes the `result` or `error` field; `correlation` echoes
    /// the request's id. Returns `false` when the session is gone.
    pub fn reply(
        &self,
        session_id: u64,
        outcome: Result<Value, String>,
        correlation: Option<Value>,
    ) -> bool {
        let Some(session) = self.session(session_id) else {
            return false;
        };
        let envelope = match outcome {
            Ok(result) => Response::result(result, correlation),
            Err(message) => Response::error(message, correlation),
        };
        match serde_json::to_value(&envelope) {
            Ok(value) => session.send_json(&value),
            Err(_) => false,
        }
    }

    /// Router exposing the websocket upgrade at `/ws`.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/ws", get(upgrade))
            .with_state(Arc::clone(self))
    }

    /// Serve [`Self::router`] until [`Self::destroy`] is called.
    pub async fn serve(self: Arc<Self>, listener: tokio::net::TcpListener) -> std::io::Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "listening");
        }
        let cancel = self.cancel.clone();
        let router = self.router();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
    }

    /// Stop the sweep and tear down every session.
    pub fn destroy(&self) {
        self.cancel.cancel();
    }

    /// Run admission for an upgraded socket, then pump it until close.
    pub async fn attach(self: &Arc<Self>, socket: WebSocket, request: ConnectRequest) {
        if let Err(message) = self.admission.check(&request).await {
            debug!(path = %request.path, %message, "connection rejected");
            let mut socket = socket;
            if let Ok(value) = serde_json::to_value(Response::error(message, None)) {
                let _ = socket.send(Message::Text(value.to_string().into())).await;
            }
            let _ = socket.close().await;
            return;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (outbound, outbound_rx) = mpsc::channel(SEND_BUFFER);
        let session = Arc::new(Session::new(id, request, outbound, self.cancel.child_token()));
        let _ = self.sessions.write().insert(id, Arc::clone(&session));
        if self.config.log_connections {
            info!(session = id, path = %session.path(), "peer connected");
        }
        let _ = self.events.send(RegistryEvent::Connected {
            session: Arc::clone(&session),
        });

        self.pump(socket, &session, outbound_rx).await;

        // Whoever removes the map entry emits Closed; the sweep may have
        // beaten us to it.
        let removed = self.sessions.write().remove(&id).is_some();
        if removed {
            if self.config.log_connections {
                info!(session = id, "peer disconnected");
            }
            let _ = self.events.send(RegistryEvent::Closed { session_id: id });
        }
    }

    async fn pump(
        &self,
        socket: WebSocket,
        session: &Arc<Session>,
        mut outbound_rx: mpsc::Receiver<Message>,
    ) {
        let (mut ws_tx, mut ws_rx) = socket.split();
        let id = session.id();
        loop {
            tokio::select! {
                () = session.cancelled().cancelled() => break,
                out = outbound_rx.recv() => match out {
                    Some(frame) => {
                        if ws_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                frame = ws_rx.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let _ = self.events.send(RegistryEvent::Message {
                            session_id: id,
                            frame: Inbound::parse(text.as_str()),
                        });
                    }
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => {
                            let _ = self.events.send(RegistryEvent::Message {
                                session_id: id,
                                frame: Inbound::parse(text),
                            });
                        }
                        Err(_) => debug!(session = id, len = data.len(), "non-UTF8 binary frame"),
                    },
                    // The transport answers pings itself; both directions of
                    // heartbeat traffic prove the peer is alive.
                    Some(Ok(Message::Pong(_) | Message::Ping(_))) => session.mark_alive(),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(error)) => {
                        debug!(session = id, %error, "socket error");
                        break;
                    }
                },
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    }

    async fn run_sweep(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.ping_interval());
        // The first tick completes immediately; skip it.
        let _ = ticker.tick().await;
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return,
                _ = ticker.tick() => self.sweep_once(),
            }
        }
    }

    /// Probe every live session; evict every session that never answered
    /// since the previous sweep.
    fn sweep_once(&self) {
        let snapshot: Vec<Arc<Session>> = self.sessions.read().values().cloned().collect();
        for session in snapshot {
            if session.check_alive() {
                let _ = session.probe();
            } else {
                let removed = self.sessions.write().remove(&session.id()).is_some();
                session.terminate();
                if removed {
                    warn!(session = session.id(), "evicting unresponsive peer");
                    let _ = self.events.send(RegistryEvent::Closed {
                        session_id: session.id(),
                    });
                }
            }
        }
    }
}

async fn upgrade(
    State(registry): State<Arc<SessionRegistry>>,
    headers: HeaderMap,
    uri: Uri,
    upgrade: WebSocketUpgrade,
) -> axum::response::Response {
    upgrade.on_upgrade(move |socket| async move {
        let request = ConnectRequest {
            path: uri.path().to_owned(),
            headers,
        };
        registry.attach(socket, request).await;
    })
}
