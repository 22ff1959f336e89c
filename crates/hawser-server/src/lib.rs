//! # hawser-server
//!
//! Server-side session tracking for websocket peers:
//!
//! - [`session::Session`]: one connected peer with a buffered outbound queue
//!   and a two-phase liveness flag
//! - [`registry::SessionRegistry`]: accepts upgrades through an
//!   [`admission::Admission`] policy, assigns session ids, runs the periodic
//!   liveness sweep, and correlates replies back to requests
//!
//! The registry exposes an [`axum`] router so it can be mounted inside a
//! larger application, or served standalone via
//! [`registry::SessionRegistry::serve`].

#![deny(unsafe_code)]

pub mod admission;
pub mod config;
pub mod registry;
pub mod session;
