//! # hawser-core
//!
//! Shared vocabulary for the hawser connection-resilience toolkit:
//!
//! - **Backoff**: [`backoff::BackoffSchedule`], an ordered attempt-count →
//!   delay table with a catch-all tier
//! - **Envelope**: [`envelope::Request`] / [`envelope::Response`] wire types
//!   and opportunistic JSON frame parsing via [`envelope::Inbound`]
//! - **Queue**: [`queue::DelayedQueue`], a serialized task runner enforcing
//!   a minimum spacing between task starts with handler-driven retry
//! - **Logging**: [`logging::init_subscriber`], stderr tracing setup for
//!   binaries

#![deny(unsafe_code)]

pub mod backoff;
pub mod envelope;
pub mod logging;
pub mod queue;
