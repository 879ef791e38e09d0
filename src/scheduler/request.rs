//! Queued requests and their result handles
//!
//! Each façade call becomes one [`Request`] carrying a one-shot reply slot.
//! The caller keeps the matching [`Pending`] and waits on it.

use std::time::Duration;

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::engine::StoreStats;
use crate::error::{Result, StoreError};

/// Kind of a queued operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Get,
    Put,
    Set,
    Del,
    Stats,
    Close,
}

/// One queued operation
#[derive(Debug)]
pub enum Request {
    /// Read the record headed by `id`
    Get {
        id: u32,
        reply: Reply<Option<Bytes>>,
    },

    /// Store a new record
    Put { data: Bytes, reply: Reply<u64> },

    /// Overwrite the record headed by `id`
    Set {
        id: u32,
        data: Bytes,
        force_create: bool,
        reply: Reply<()>,
    },

    /// Delete the record headed by `id`
    Del { id: u32, reply: Reply<()> },

    /// Snapshot engine counters
    Stats { reply: Reply<StoreStats> },

    /// Flush and release both files
    Close { reply: Reply<()> },
}

impl Request {
    pub fn kind(&self) -> OpKind {
        match self {
            Request::Get { .. } => OpKind::Get,
            Request::Put { .. } => OpKind::Put,
            Request::Set { .. } => OpKind::Set,
            Request::Del { .. } => OpKind::Del,
            Request::Stats { .. } => OpKind::Stats,
            Request::Close { .. } => OpKind::Close,
        }
    }

    /// True for operations that may change blocks or metadata
    pub fn is_mutation(&self) -> bool {
        matches!(self.kind(), OpKind::Put | OpKind::Set | OpKind::Del)
    }
}

// =============================================================================
// Reply / Pending
// =============================================================================

/// Sending half of a result handle; resolves exactly once
#[derive(Debug)]
pub struct Reply<T> {
    tx: Sender<Result<T>>,
}

impl<T> Reply<T> {
    /// Deliver the outcome; a caller that dropped its handle is ignored
    pub fn resolve(self, result: Result<T>) {
        let _ = self.tx.send(result);
    }
}

/// Create a connected reply slot and result handle
pub fn pending<T>() -> (Reply<T>, Pending<T>) {
    let (tx, rx) = channel::bounded(1);
    (Reply { tx }, Pending { rx })
}

/// Handle to the result of a queued operation
///
/// Returned immediately by every [`Store`](crate::Store) call. If the
/// scheduler goes away without answering, waiting yields
/// [`StoreError::WorkerStopped`] instead of blocking forever.
#[derive(Debug)]
#[must_use = "a Pending does nothing unless waited on"]
pub struct Pending<T> {
    rx: Receiver<Result<T>>,
}

impl<T> Pending<T> {
    /// A handle that is already resolved
    pub(crate) fn ready(result: Result<T>) -> Self {
        let (reply, pending) = pending();
        reply.resolve(result);
        pending
    }

    /// Block until the operation completes
    pub fn wait(self) -> Result<T> {
        self.rx.recv().unwrap_or(Err(StoreError::WorkerStopped))
    }

    /// Block for at most `timeout`; `None` if the operation is still queued
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(StoreError::WorkerStopped)),
        }
    }

    /// Poll without blocking; `None` if the operation is still queued
    ///
    /// The result is handed out once; polling again afterwards reports
    /// [`StoreError::WorkerStopped`].
    pub fn try_wait(&self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(StoreError::WorkerStopped)),
        }
    }
}
