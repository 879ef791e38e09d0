//! Scheduler Module
//!
//! Batched, single-threaded execution of queued operations.
//!
//! ## Model
//! - Callers enqueue a [`Request`] and get a [`Pending`] back immediately
//! - One scheduler thread per store drains the queue in ticks of at most
//!   `batch_size` requests
//! - The [`LockArbiter`] keeps conflicting requests on the same record out of
//!   a single tick; losers retry next tick in their original order
//!
//! ## Lifecycle
//! ```text
//! OPEN ──close()──▶ CLOSING ──CLOSE executed──▶ CLOSED
//! ```

mod arbiter;
mod request;
mod worker;

pub use arbiter::{LockArbiter, LockKind, LockTarget, Lockable, Partition};
pub use request::{pending, OpKind, Pending, Reply, Request};
pub use worker::Scheduler;

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Accepting operations
    Open,
    /// `close()` was called; CLOSE is queued
    Closing,
    /// Files released
    Closed,
}
