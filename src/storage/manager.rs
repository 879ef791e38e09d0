//! Block Manager
//!
//! Owns both storage files and the free list, and performs chain-level I/O.
//!
//! ## Responsibilities
//! - Open or create the data container and segment descriptor
//! - Read and write record chains block by block
//! - Allocate, free and claim block ids
//! - Flush dirty metadata, truncating a long trailing free run first

use std::path::Path;

use crate::config::Config;
use crate::error::{BlockFailure, Result, StoreError};

use super::block::{chunks, Block};
use super::{BlockDevice, DataFile, FreeList, SegmentFile};

/// Manages the on-disk block layer
///
/// ## Ownership:
/// - Only the scheduler thread holds a `BlockManager`, so all methods take
///   `&self`/`&mut self` without internal locking.
pub struct BlockManager {
    /// Data container (header + blocks)
    data: DataFile,

    /// Segment descriptor (free ids)
    segments: SegmentFile,

    /// Free ids and high-water mark
    free_list: FreeList,

    /// Trailing free-run length that triggers truncation
    truncate_boundary: usize,

    /// fsync after each metadata flush
    sync_on_flush: bool,
}

impl BlockManager {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    pub const DATA_FILENAME: &'static str = "storage.blst";
    pub const SEGMENT_FILENAME: &'static str = "storage.segd";

    /// Open or create storage in `config.data_dir`
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Open (or initialize) the segment descriptor and data container
    /// 3. Load `total_blocks` and the free list
    pub fn open(config: &Config) -> Result<Self> {
        let path = prepare_dir(&config.data_dir)?;
        let (data, total_blocks) = DataFile::open(&path.join(Self::DATA_FILENAME))?;
        Self::assemble(config, data, total_blocks)
    }

    /// Like [`open`](Self::open), but with the data container on `device`
    ///
    /// The segment descriptor still lives in `config.data_dir`.
    pub fn with_device(config: &Config, device: Box<dyn BlockDevice>) -> Result<Self> {
        prepare_dir(&config.data_dir)?;
        let (data, total_blocks) = DataFile::from_device(device)?;
        Self::assemble(config, data, total_blocks)
    }

    fn assemble(config: &Config, data: DataFile, total_blocks: u32) -> Result<Self> {
        let path = &config.data_dir;
        if total_blocks > config.max_blocks {
            return Err(StoreError::Config(format!(
                "data container holds {} blocks, above max_blocks ({})",
                total_blocks, config.max_blocks
            )));
        }

        let (segments, free_ids) = SegmentFile::open(&path.join(Self::SEGMENT_FILENAME))?;
        let free_list = FreeList::load(total_blocks, free_ids)?.with_limit(config.max_blocks);

        tracing::debug!(
            total_blocks,
            free_blocks = free_list.free_count(),
            "loaded block metadata from {}",
            path.display()
        );

        Ok(Self {
            data,
            segments,
            free_list,
            truncate_boundary: config.truncate_boundary,
            sync_on_flush: config.sync_on_flush,
        })
    }

    // =========================================================================
    // Block Access
    // =========================================================================

    /// Read a block; `None` means the id is unallocated or out of range
    pub fn read_block(&self, id: u32) -> Result<Option<Block>> {
        let block = self.data.read_block(id, self.free_list.total_blocks())?;
        Ok(block.filter(|b| b.is_allocated()))
    }

    /// Walk the chain that starts at `head`, returning every block id and block
    ///
    /// Fails with `Corrupted` if a link points at free space or the chain
    /// is longer than the container (a cycle).
    pub fn read_chain(&self, head: u32, first: Block) -> Result<Vec<(u32, Block)>> {
        let limit = self.free_list.total_blocks() as usize;
        let mut chain = Vec::new();
        let mut id = head;
        let mut block = first;

        loop {
            let next = block.next();
            chain.push((id, block));
            if next == 0 {
                return Ok(chain);
            }
            if chain.len() >= limit {
                return Err(StoreError::Corrupted(format!(
                    "chain starting at block #{} does not terminate",
                    head
                )));
            }

            block = self.read_block(next)?.ok_or_else(|| {
                StoreError::Corrupted(format!(
                    "block #{} links to unallocated block #{}",
                    id, next
                ))
            })?;
            id = next;
        }
    }

    /// Write `data` across the blocks `ids`, linking them in order
    ///
    /// Every block write is attempted; failures are collected rather than
    /// stopping at the first one.
    pub fn write_chain(&self, ids: &[u32], data: &[u8]) -> Vec<BlockFailure> {
        let parts = chunks(data);
        debug_assert_eq!(parts.len(), ids.len());

        let mut failures = Vec::new();
        for (index, (&id, part)) in ids.iter().zip(parts).enumerate() {
            let next = ids.get(index + 1).copied().unwrap_or(0);
            let block = Block::new(part, next, index == 0);
            if let Err(error) = self.data.write_block(id, &block) {
                failures.push(BlockFailure { block: id, error });
            }
        }
        failures
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Hand out `count` ids, reusing free ones first
    pub fn allocate(&mut self, count: usize) -> Result<Vec<u32>> {
        self.free_list.allocate(count)
    }

    /// Free every id in `ids`, collecting failures
    ///
    /// An id whose zeroing fails is still listed as free so it is not lost;
    /// the stale image cannot be read as a chain head because nothing links to
    /// it and allocation overwrites it.
    pub fn free_blocks(&mut self, ids: &[u32]) -> Vec<BlockFailure> {
        let mut failures = Vec::new();
        for &id in ids {
            if let Err(error) = self.data.zero_block(id) {
                failures.push(BlockFailure { block: id, error });
            }
            let released = self.free_list.release(id);
            debug_assert!(released.is_ok(), "freed block #{} outside the container", id);
        }
        failures
    }

    /// Reserve a specific unallocated id for a forced write
    ///
    /// Ids past the high-water mark grow the container (zero-filled) so every
    /// block up to `total_blocks` exists on disk.
    pub fn claim(&mut self, id: u32) -> Result<()> {
        let before = self.free_list.total_blocks();
        if !self.free_list.claim(id)? {
            return Err(StoreError::Range(format!(
                "block #{} is not free and cannot be claimed",
                id
            )));
        }

        let after = self.free_list.total_blocks();
        if after > before {
            if let Err(e) = self.data.set_block_count(after) {
                let released = self.free_list.release(id);
                debug_assert!(released.is_ok(), "claimed block #{} outside the container", id);
                return Err(e.into());
            }
            tracing::debug!(block = id, skipped = after - before - 1, "occupied block");
        }
        Ok(())
    }

    // =========================================================================
    // Metadata Persistence
    // =========================================================================

    /// Persist `total_blocks` and the free list if they changed
    ///
    /// A trailing free run of at least `truncate_boundary` blocks is cut from
    /// the data container first. Returns whether anything was written.
    pub fn flush_metadata(&mut self) -> std::io::Result<bool> {
        if !self.free_list.is_dirty() {
            return Ok(false);
        }

        let before = self.free_list.total_blocks();
        let run = self.free_list.trailing_free_run();
        if run > 0 && run >= self.truncate_boundary {
            let new_total = before - run as u32;
            // Shrink the file before forgetting the blocks.
            self.data.set_block_count(new_total)?;
            self.free_list.compact(self.truncate_boundary);
            tracing::debug!(
                from = before,
                to = new_total,
                "truncated trailing free blocks"
            );
        }

        self.data.write_header(self.free_list.total_blocks())?;
        self.segments.store(self.free_list.free_ids())?;

        if self.sync_on_flush {
            self.data.sync()?;
            self.segments.sync()?;
        }

        self.free_list.mark_clean();
        Ok(true)
    }

    /// Flush metadata and sync both files, collecting every failure
    pub fn close(&mut self) -> Vec<std::io::Error> {
        let mut errors = Vec::new();
        if let Err(e) = self.flush_metadata() {
            errors.push(e);
        }
        if let Err(e) = self.data.sync() {
            errors.push(e);
        }
        if let Err(e) = self.segments.sync() {
            errors.push(e);
        }
        errors
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn total_blocks(&self) -> u32 {
        self.free_list.total_blocks()
    }

    pub fn free_count(&self) -> usize {
        self.free_list.free_count()
    }

    pub fn free_list(&self) -> &FreeList {
        &self.free_list
    }

    pub fn is_dirty(&self) -> bool {
        self.free_list.is_dirty()
    }

    /// Current length of the data container in bytes
    pub fn data_file_len(&self) -> Result<u64> {
        Ok(self.data.file_len()?)
    }
}

/// Create `path` if needed, rejecting anything that is not a directory
fn prepare_dir(path: &Path) -> Result<&Path> {
    if path.exists() && !path.is_dir() {
        return Err(StoreError::Config(format!(
            "Target directory {} is not a directory",
            path.display()
        )));
    }
    std::fs::create_dir_all(path)?;
    Ok(path)
}
