//! Storage Module
//!
//! File-backed block layer: a data container of fixed-size linked blocks and a
//! segment descriptor listing free block ids.
//!
//! ## Responsibilities
//! - Encode/decode blocks byte-exactly
//! - Track free ids and the block high-water mark
//! - Reuse freed blocks before growing the container
//! - Truncate the container when a long run of trailing blocks is free
//!
//! ## Files
//! ```text
//! {data_dir}/
//!   ├── storage.blst   [Version(1)][TotalBlocks(4)][Block 1][Block 2]...
//!   └── storage.segd   [Count(4)][Id(4)][Id(4)]...
//! ```

pub mod block;
mod allocator;
mod data_file;
mod manager;
mod segment;

pub use allocator::FreeList;
pub use block::{Block, BLOCK_CONTENT_SIZE, BLOCK_HEADER_SIZE, BLOCK_SIZE};
pub use data_file::{BlockDevice, DataFile, FORMAT_VERSION, HEADER_SIZE as DATA_HEADER_SIZE};
pub use manager::BlockManager;
pub use segment::SegmentFile;
