//! Error types for rastore
//!
//! Provides a unified error type for all operations.

use std::fmt;

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for rastore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// One or more block reads/writes of a multi-block operation failed
    #[error("{context}: {} block operation(s) failed", failures.len())]
    AggregateIo {
        context: String,
        failures: Vec<BlockFailure>,
    },

    // -------------------------------------------------------------------------
    // Addressing Errors
    // -------------------------------------------------------------------------
    #[error("Range error: {0}")]
    Range(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Storage has been closed")]
    Closed,

    #[error("Storage is closing now")]
    Closing,

    #[error("Scheduler stopped before resolving the operation")]
    WorkerStopped,

    // -------------------------------------------------------------------------
    // On-disk Format Errors
    // -------------------------------------------------------------------------
    #[error("Corrupted storage: {0}")]
    Corrupted(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Build a range error for a block id
    pub(crate) fn block_out_of_range(id: u64) -> Self {
        StoreError::Range(format!("Requested block #{} is out of range", id))
    }

    /// Build a range error for an id that is not the head of a chain
    pub(crate) fn not_leading(id: u32) -> Self {
        StoreError::Range(format!("Target block #{} is not a leading block", id))
    }

    /// Failed constituents of an aggregate error (empty for other variants)
    pub fn failures(&self) -> &[BlockFailure] {
        match self {
            StoreError::AggregateIo { failures, .. } => failures,
            _ => &[],
        }
    }
}

/// A single failed block I/O inside a batched operation
#[derive(Debug)]
pub struct BlockFailure {
    /// Block the failed I/O targeted (0 for file-level I/O such as sync)
    pub block: u32,

    /// Underlying error
    pub error: std::io::Error,
}

impl fmt::Display for BlockFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block #{}: {}", self.block, self.error)
    }
}
