//! # hawser-client
//!
//! Client-side connection resilience: keeps one logical session alive across
//! an unreliable network and server restarts.
//!
//! - [`instance::InstanceHandle`]: one physical connection attempt with a
//!   handshake timeout, ping/pong heartbeat, and idempotent close
//! - [`manager::ConnectionManager`]: owns a sequence of instances, drives the
//!   backoff schedule between attempts, and performs seamless hand-over from
//!   the old active instance to a newly-ready one
//! - Promotion is application-gated: a candidate's `open` surfaces as a
//!   [`manager::ManagerEvent::CandidateReady`] carrying a one-shot
//!   [`manager::Promotion`] grant, so the app can run its greeting handshake
//!   before the switch

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod instance;
pub mod manager;
