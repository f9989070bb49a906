//! Bounded Frame Buffer
//!
//! Hands frames from a single producer (the capture thread) to a single
//! consumer without ever blocking the producer. The buffer retains at most
//! [`DEFAULT_DEPTH`] items; pushing into a full buffer silently evicts the
//! oldest one.
//!
//! Retrieval drains from the old end while pushes land on the new end, so
//! with two retained frames the consumer receives the older of the pair.
//! Under a steady one-producer/one-consumer cadence this means a frame is at
//! most one capture cycle stale when delivered.

mod buffer;

pub use buffer::{FrameBuffer, DEFAULT_DEPTH};

use thiserror::Error;

/// Reasons a receive can come back empty-handed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecvError {
    /// The producer closed the buffer; no further items will arrive
    #[error("frame buffer closed by producer")]
    Closed,

    /// Nothing arrived before the deadline
    #[error("timed out waiting for a frame")]
    Timeout,
}

/// Result of a non-blocking receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TryRecvError {
    /// Buffer is currently empty
    #[error("frame buffer is empty")]
    Empty,

    /// The producer closed the buffer
    #[error("frame buffer closed by producer")]
    Closed,
}
