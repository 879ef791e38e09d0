//! # rastore
//!
//! An embedded, file-backed random-access record store with:
//! - Variable-length records stored as chains of fixed 261-byte blocks
//! - Free-block reuse and truncation of trailing free space
//! - Batched, single-threaded scheduling with per-record lock arbitration
//! - A bounded FIFO read cache
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Store                                │
//! │          (get / put / set / del / close → Pending)           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ channel
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 Scheduler (one thread)                       │
//! │        batch → LockArbiter → execute → flush → resolve       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Engine    │─────────▶│ RecordCache │
//!   │ (GET/PUT/…) │          │   (FIFO)    │
//!   └──────┬──────┘          └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────────────────────────────┐
//!   │ BlockManager                        │
//!   │  storage.blst  │  storage.segd      │
//!   │  (blocks)      │  (free list)       │
//!   └─────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use rastore::{Config, Store};
//!
//! let store = Store::open(Config::builder().data_dir("./data").build())?;
//! let id = store.put(vec![1u8, 2, 3]).wait()?;
//! assert_eq!(store.get(id).wait()?.as_deref(), Some(&[1u8, 2, 3][..]));
//! store.del(id).wait()?;
//! store.close().wait()?;
//! # Ok::<(), rastore::StoreError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod storage;
pub mod cache;
pub mod scheduler;
pub mod engine;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{BlockFailure, Result, StoreError};
pub use config::Config;
pub use engine::StoreStats;
pub use scheduler::{Lifecycle, Pending};
pub use store::Store;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of rastore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
