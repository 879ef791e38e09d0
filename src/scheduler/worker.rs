//! Scheduler worker
//!
//! The single thread that owns the [`Engine`] and drives ticks.
//!
//! ## Tick
//! 1. Take up to `batch_size` requests from the head of the queue
//! 2. Partition them with the [`LockArbiter`]
//! 3. Put deferred requests back at the head (order kept), CLOSE at the tail
//! 4. Execute the runnable requests
//! 5. Flush dirty metadata once
//! 6. Resolve every runnable request
//!
//! Requests submitted while a tick runs wait in the channel and are seen by
//! the next tick.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use crossbeam::channel::Receiver;
use parking_lot::Mutex;

use crate::engine::{Engine, StoreStats};
use crate::error::{Result, StoreError};

use super::arbiter::{LockArbiter, Partition};
use super::request::{Reply, Request};
use super::Lifecycle;

/// Whether the loop keeps running after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Drives ticks until CLOSE runs or every submitter is gone
pub struct Scheduler {
    engine: Engine,
    rx: Receiver<Request>,
    queue: VecDeque<Request>,
    batch_size: usize,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl Scheduler {
    pub fn new(
        engine: Engine,
        rx: Receiver<Request>,
        batch_size: usize,
        lifecycle: Arc<Mutex<Lifecycle>>,
    ) -> Self {
        Self {
            engine,
            rx,
            queue: VecDeque::new(),
            batch_size,
            lifecycle,
        }
    }

    /// Run the loop on the current thread
    pub fn run(mut self) {
        tracing::debug!("scheduler started");

        loop {
            if self.queue.is_empty() {
                match self.rx.recv() {
                    Ok(request) => self.queue.push_back(request),
                    Err(_) => {
                        self.shutdown();
                        return;
                    }
                }
            }
            self.queue.extend(self.rx.try_iter());

            if self.tick() == Flow::Stop {
                tracing::debug!("scheduler stopped");
                return;
            }
        }
    }

    /// Every handle was dropped without `close()`: persist and exit
    fn shutdown(&mut self) {
        if let Err(e) = self.engine.close() {
            tracing::warn!("failed to flush storage on shutdown: {}", e);
        }
        *self.lifecycle.lock() = Lifecycle::Closed;
        tracing::debug!("scheduler stopped: all handles dropped");
    }

    /// Run one batch
    fn tick(&mut self) -> Flow {
        let take = self.batch_size.min(self.queue.len());
        let batch: Vec<Request> = self.queue.drain(..take).collect();
        let queue_drained = self.queue.is_empty();

        let Partition {
            runnable,
            deferred,
            requeued,
        } = LockArbiter::partition(batch, queue_drained);

        tracing::debug!(
            runnable = runnable.len(),
            deferred = deferred.len(),
            requeued = requeued.len(),
            queued = self.queue.len(),
            "tick"
        );

        for request in deferred.into_iter().rev() {
            self.queue.push_front(request);
        }
        self.queue.extend(requeued);

        let mut completed = Vec::with_capacity(runnable.len());
        let mut flow = Flow::Continue;
        for request in runnable {
            if matches!(request, Request::Close { .. }) {
                flow = Flow::Stop;
            }
            let mutated = request.is_mutation();
            completed.push((mutated, self.execute(request)));
        }

        if let Err(e) = self.engine.flush_metadata() {
            tracing::error!("metadata flush failed: {}", e);
            for (mutated, done) in completed.iter_mut() {
                if *mutated {
                    done.fail(&e);
                }
            }
        }

        for (_, done) in completed {
            done.deliver();
        }
        flow
    }

    /// Execute one runnable request against the engine
    fn execute(&mut self, request: Request) -> Completed {
        match request {
            Request::Get { id, reply } => {
                Completed::Value(Completion::new(reply, self.engine.get(id)))
            }
            Request::Put { data, reply } => {
                Completed::Id(Completion::new(reply, self.engine.put(&data)))
            }
            Request::Set {
                id,
                data,
                force_create,
                reply,
            } => Completed::Unit(Completion::new(
                reply,
                self.engine.set(id, &data, force_create),
            )),
            Request::Del { id, reply } => {
                Completed::Unit(Completion::new(reply, self.engine.del(id)))
            }
            Request::Stats { reply } => {
                Completed::Stats(Completion::new(reply, self.engine.stats()))
            }
            Request::Close { reply } => {
                let result = self.engine.close();
                *self.lifecycle.lock() = Lifecycle::Closed;
                tracing::info!("storage closed");
                Completed::Unit(Completion::new(reply, result))
            }
        }
    }
}

// =============================================================================
// Completions
// =============================================================================

/// An executed request waiting for the end of the tick
struct Completion<T> {
    reply: Reply<T>,
    result: Result<T>,
}

impl<T> Completion<T> {
    fn new(reply: Reply<T>, result: Result<T>) -> Self {
        if let Err(e) = &result {
            if !e.failures().is_empty() {
                tracing::warn!("{}", e);
            }
        }
        Self { reply, result }
    }

    /// Replace a success with a metadata flush failure
    fn fail(&mut self, cause: &std::io::Error) {
        if self.result.is_ok() {
            self.result = Err(StoreError::Io(std::io::Error::new(
                cause.kind(),
                format!("metadata flush failed: {}", cause),
            )));
        }
    }

    fn deliver(self) {
        self.reply.resolve(self.result);
    }
}

enum Completed {
    Value(Completion<Option<Bytes>>),
    Id(Completion<u64>),
    Unit(Completion<()>),
    Stats(Completion<StoreStats>),
}

impl Completed {
    fn fail(&mut self, cause: &std::io::Error) {
        match self {
            Completed::Value(c) => c.fail(cause),
            Completed::Id(c) => c.fail(cause),
            Completed::Unit(c) => c.fail(cause),
            Completed::Stats(c) => c.fail(cause),
        }
    }

    fn deliver(self) {
        match self {
            Completed::Value(c) => c.deliver(),
            Completed::Id(c) => c.deliver(),
            Completed::Unit(c) => c.deliver(),
            Completed::Stats(c) => c.deliver(),
        }
    }
}
