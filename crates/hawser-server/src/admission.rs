//! Connection admission policy.
//!
//! The registry consults an [`Admission`] before registering an upgraded
//! socket. A rejection is answered with a single error envelope and an
//! immediate close; the peer never becomes a session and no events fire.

use async_trait::async_trait;
use axum::http::HeaderMap;

/// What the registry knows about a peer at upgrade time.
#[derive(Debug)]
pub struct ConnectRequest {
    /// Request path the upgrade arrived on.
    pub path: String,
    /// Request headers.
    pub headers: HeaderMap,
}

/// Decides whether an upgraded peer may become a session.
#[async_trait]
pub trait Admission: Send + Sync {
    /// Accept (`Ok`) or reject with a message sent to the peer.
    async fn check(&self, request: &ConnectRequest) -> Result<(), String>;
}

/// Default policy: every peer is admitted.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAll;

#[async_trait]
impl Admission for AcceptAll {
    async fn check(&self, _request: &ConnectRequest) -> Result<(), String> {
        Ok(())
    }
}
