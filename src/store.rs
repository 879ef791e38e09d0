//! Store Module
//!
//! The public operation surface.
//!
//! Every call returns a [`Pending`] immediately; the scheduler thread resolves
//! it once the operation has run. Range and lifecycle errors are detected
//! here, before anything is queued.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use bytes::Bytes;
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;

use crate::config::Config;
use crate::engine::{Engine, StoreStats};
use crate::error::{Result, StoreError};
use crate::scheduler::{pending, Lifecycle, Pending, Reply, Request, Scheduler};

/// Handle to an open store
///
/// Cheap to clone; all clones submit to the same scheduler. When the last
/// clone is dropped without `close()`, the scheduler flushes metadata and exits.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    /// Directory holding both storage files
    data_dir: PathBuf,

    /// Highest addressable block id
    max_blocks: u32,

    /// OPEN / CLOSING / CLOSED, shared with the scheduler
    lifecycle: Arc<Mutex<Lifecycle>>,

    /// Submission queue (taken on drop to disconnect the scheduler)
    tx: Option<Sender<Request>>,

    /// Scheduler thread
    worker: Option<JoinHandle<()>>,
}

impl Store {
    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Validate config
    /// 2. Create the data directory and both files if missing
    /// 3. Load `total_blocks` and the free list
    /// 4. Start the scheduler thread
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let engine = Engine::open(&config)?;
        let lifecycle = Arc::new(Mutex::new(Lifecycle::Open));
        let (tx, rx) = channel::unbounded();

        let scheduler = Scheduler::new(engine, rx, config.batch_size, Arc::clone(&lifecycle));
        let worker = std::thread::Builder::new()
            .name("rastore-scheduler".to_string())
            .spawn(move || scheduler.run())?;

        tracing::info!(
            batch_size = config.batch_size,
            cache = config.cache_enabled,
            "opened storage at {}",
            config.data_dir.display()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                data_dir: config.data_dir,
                max_blocks: config.max_blocks,
                lifecycle,
                tx: Some(tx),
                worker: Some(worker),
            }),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Read the record headed by `id`; `None` if there is no such record
    pub fn get(&self, id: u64) -> Pending<Option<Bytes>> {
        match self.check_id(id) {
            Ok(id) => self.submit(|reply| Request::Get { id, reply }),
            Err(e) => Pending::ready(Err(e)),
        }
    }

    /// Store `data` as a new record; resolves to its id
    pub fn put(&self, data: impl Into<Bytes>) -> Pending<u64> {
        let data = data.into();
        self.submit(|reply| Request::Put { data, reply })
    }

    /// Overwrite the record headed by `id`
    ///
    /// Fails with a range error if `id` does not head a record.
    pub fn set(&self, id: u64, data: impl Into<Bytes>) -> Pending<()> {
        self.set_with(id, data, false)
    }

    /// Overwrite the record headed by `id`, optionally creating it
    ///
    /// With `force_create`, a free or never-allocated `id` becomes the head of
    /// a new record. A block that belongs to another record is never taken.
    pub fn set_with(&self, id: u64, data: impl Into<Bytes>, force_create: bool) -> Pending<()> {
        let data = data.into();
        match self.check_id(id) {
            Ok(id) => self.submit(|reply| Request::Set {
                id,
                data,
                force_create,
                reply,
            }),
            Err(e) => Pending::ready(Err(e)),
        }
    }

    /// Delete the record headed by `id`; deleting a free id is a no-op
    pub fn del(&self, id: u64) -> Pending<()> {
        match self.check_id(id) {
            Ok(id) => self.submit(|reply| Request::Del { id, reply }),
            Err(e) => Pending::ready(Err(e)),
        }
    }

    /// Snapshot engine counters
    pub fn stats(&self) -> Pending<StoreStats> {
        self.submit(|reply| Request::Stats { reply })
    }

    /// Close the store
    ///
    /// Runs after every operation queued before it. Closing an already closed
    /// store succeeds; closing while a close is in progress is an error.
    pub fn close(&self) -> Pending<()> {
        let mut state = self.inner.lifecycle.lock();
        match *state {
            Lifecycle::Closed => return Pending::ready(Ok(())),
            Lifecycle::Closing => return Pending::ready(Err(StoreError::Closing)),
            Lifecycle::Open => {}
        }

        let (reply, handle) = pending();
        if self.send(Request::Close { reply }).is_err() {
            *state = Lifecycle::Closed;
            return Pending::ready(Err(StoreError::WorkerStopped));
        }
        *state = Lifecycle::Closing;
        tracing::debug!("close requested");
        handle
    }

    /// Directory holding the storage files
    pub fn path(&self) -> &Path {
        &self.inner.data_dir
    }

    /// Current lifecycle state
    pub fn lifecycle(&self) -> Lifecycle {
        *self.inner.lifecycle.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle() == Lifecycle::Closed
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Validate an external record id against the addressable range
    fn check_id(&self, id: u64) -> Result<u32> {
        if id == 0 || id > self.inner.max_blocks as u64 {
            return Err(StoreError::block_out_of_range(id));
        }
        Ok(id as u32)
    }

    /// Queue a request while OPEN; otherwise reject with `Closed`
    fn submit<T>(&self, build: impl FnOnce(Reply<T>) -> Request) -> Pending<T> {
        // Held across the send so CLOSE cannot overtake this request.
        let state = self.inner.lifecycle.lock();
        if *state != Lifecycle::Open {
            return Pending::ready(Err(StoreError::Closed));
        }

        let (reply, handle) = pending();
        match self.send(build(reply)) {
            Ok(()) => handle,
            Err(()) => Pending::ready(Err(StoreError::WorkerStopped)),
        }
    }

    fn send(&self, request: Request) -> std::result::Result<(), ()> {
        match &self.inner.tx {
            Some(tx) => tx.send(request).map_err(|_| ()),
            None => Err(()),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Disconnect so the scheduler drains the queue and exits.
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("scheduler thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("data_dir", &self.inner.data_dir)
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}
