//! Lock Arbiter
//!
//! Splits one tick's batch into operations that may run now and operations
//! that must wait, based on the record id each one touches.
//!
//! | op    | lock      | blocked when                                  |
//! |-------|-----------|-----------------------------------------------|
//! | GET   | READ      | id already holds WRITE or EXCLUSIVE           |
//! | SET   | WRITE     | id holds any lock (READ escalates to EXCLUSIVE)|
//! | DEL   | WRITE     | same as SET                                   |
//! | PUT   | none      | never                                         |
//! | CLOSE | engine    | anything else is queued or in the batch       |
//!
//! Escalating a READ to EXCLUSIVE also blocks every later GET on that id in
//! the same batch, so a writer cannot be starved by a stream of readers.

use std::collections::HashMap;

use super::request::Request;

/// Lock held on one record id during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockKind {
    None,
    Read,
    Write,
    Exclusive,
}

/// What an operation needs from the arbiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockTarget {
    /// Shared access to one record
    Read(u32),
    /// Sole access to one record
    Write(u32),
    /// No record lock (PUT, stats)
    Free,
    /// The whole engine (CLOSE)
    Engine,
}

/// Anything the arbiter can schedule
pub trait Lockable {
    fn lock_target(&self) -> LockTarget;
}

impl Lockable for Request {
    fn lock_target(&self) -> LockTarget {
        match self {
            Request::Get { id, .. } => LockTarget::Read(*id),
            Request::Set { id, .. } | Request::Del { id, .. } => LockTarget::Write(*id),
            Request::Put { .. } | Request::Stats { .. } => LockTarget::Free,
            Request::Close { .. } => LockTarget::Engine,
        }
    }
}

/// Result of arbitrating one batch
#[derive(Debug)]
pub struct Partition<T> {
    /// Run in this tick
    pub runnable: Vec<T>,

    /// Lost a lock conflict: go back to the head of the queue, in order
    pub deferred: Vec<T>,

    /// Engine-wide operations that must wait: go to the tail of the queue
    pub requeued: Vec<T>,
}

/// Per-tick lock table
#[derive(Debug, Default)]
pub struct LockArbiter {
    locks: HashMap<u32, LockKind>,
}

impl LockArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arbitrate `batch` (in queue order)
    ///
    /// `queue_drained` tells whether anything is left in the queue beyond
    /// this batch; CLOSE only runs when it is the single remaining operation.
    pub fn partition<T: Lockable>(batch: Vec<T>, queue_drained: bool) -> Partition<T> {
        let mut arbiter = Self::new();
        let alone = queue_drained && batch.len() == 1;

        let mut partition = Partition {
            runnable: Vec::with_capacity(batch.len()),
            deferred: Vec::new(),
            requeued: Vec::new(),
        };

        for op in batch {
            match op.lock_target() {
                LockTarget::Engine if alone => partition.runnable.push(op),
                LockTarget::Engine => partition.requeued.push(op),
                target => {
                    if arbiter.acquire(target) {
                        partition.runnable.push(op);
                    } else {
                        partition.deferred.push(op);
                    }
                }
            }
        }

        partition
    }

    /// Try to take the lock `target` needs, recording it on success
    pub fn acquire(&mut self, target: LockTarget) -> bool {
        match target {
            LockTarget::Free => true,
            LockTarget::Engine => self.locks.is_empty(),
            LockTarget::Read(id) => {
                let lock = self.locks.entry(id).or_insert(LockKind::None);
                if *lock > LockKind::Read {
                    return false;
                }
                *lock = LockKind::Read;
                true
            }
            LockTarget::Write(id) => {
                let lock = self.locks.entry(id).or_insert(LockKind::None);
                match *lock {
                    LockKind::None => {
                        *lock = LockKind::Write;
                        true
                    }
                    LockKind::Read => {
                        *lock = LockKind::Exclusive;
                        false
                    }
                    LockKind::Write | LockKind::Exclusive => false,
                }
            }
        }
    }

    /// Current lock on `id`
    pub fn lock_on(&self, id: u32) -> LockKind {
        self.locks.get(&id).copied().unwrap_or(LockKind::None)
    }
}
