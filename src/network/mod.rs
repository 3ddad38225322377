//! Network layer for Reel
//!
//! The only place where requests leave the process. Recording sends through an
//! [`Upstream`]; replaying never touches this module's client.

mod body;
mod client;

pub use body::{header_pairs, read_body, validate_request};
pub use client::{BoxError, CaptureBody, HttpClient, Upstream, UpstreamBody};

/// Idle timeout for pooled upstream connections
pub const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// Maximum idle upstream connections kept per host
pub const POOL_MAX_IDLE_PER_HOST: usize = 10;
