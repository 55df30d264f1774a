// Allocation boundary bookkeeping and argument checks shared by every block store.
//
// Allocation takes ids from an atomic counter without the bookkeeping mutex.
// `valid` and the boundary bump in `note_overwrite` hold the mutex. A `valid`
// racing an `allocate_id` can therefore see either boundary; callers that
// need a consistent view hold their own write lock around both.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::core::block::{Block, BlockId, MAX_BLOCK_ID};
use crate::core::config::ByteOrder;
use crate::core::error::{closed, Error, ErrorKind};

pub(crate) struct BlockAccessBase {
    label: String,
    block_size: usize,
    order: ByteOrder,
    seq: AtomicU64,
    file_blocks: Mutex<u64>,
    closed: AtomicBool,
}

impl BlockAccessBase {
    pub(crate) fn new(
        label: impl Into<String>,
        block_size: usize,
        order: ByteOrder,
        initial_blocks: u64,
    ) -> Self {
        Self {
            label: label.into(),
            block_size,
            order,
            seq: AtomicU64::new(initial_blocks),
            file_blocks: Mutex::new(initial_blocks),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn block_size(&self) -> usize {
        self.block_size
    }

    pub(crate) fn order(&self) -> ByteOrder {
        self.order
    }

    pub(crate) fn boundary(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    /// Number of blocks that have actually been written (the physical extent).
    pub(crate) fn file_blocks(&self) -> u64 {
        *self.lock_file_blocks()
    }

    pub(crate) fn check_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(closed("block store").with_path(&self.label));
        }
        Ok(())
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Flags the store closed; returns false if it already was.
    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn allocate(&self, size: usize) -> Result<Block, Error> {
        self.check_open()?;
        if size != 0 && size != self.block_size {
            return Err(Error::new(ErrorKind::Usage).with_message(format!(
                "allocation of {size} bytes from a store with block size {}",
                self.block_size
            )));
        }
        let id = self.allocate_id()?;
        Ok(Block::zeroed(id, self.block_size, self.order))
    }

    pub(crate) fn allocate_id(&self) -> Result<BlockId, Error> {
        self.seq
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| {
                (id <= MAX_BLOCK_ID).then_some(id + 1)
            })
            .map_err(|id| {
                Error::new(ErrorKind::Bounds)
                    .with_message("block id limit reached")
                    .with_block(id)
            })
    }

    pub(crate) fn valid(&self, id: BlockId) -> bool {
        let _guard = self.lock_file_blocks();
        id < self.seq.load(Ordering::SeqCst)
    }

    pub(crate) fn check_id(&self, id: BlockId) -> Result<(), Error> {
        if id > MAX_BLOCK_ID {
            return Err(Error::new(ErrorKind::Bounds)
                .with_message("block id exceeds addressable range")
                .with_block(id));
        }
        if !self.valid(id) {
            return Err(Error::new(ErrorKind::Bounds)
                .with_message(format!(
                    "block id not allocated (boundary {})",
                    self.boundary()
                ))
                .with_block(id));
        }
        Ok(())
    }

    pub(crate) fn check_read(&self, id: BlockId) -> Result<(), Error> {
        self.check_open()?;
        self.check_id(id)
    }

    pub(crate) fn check_write(&self, block: &Block) -> Result<(), Error> {
        self.check_open()?;
        block.check_format(self.block_size, self.order)?;
        self.check_id(block.id())
    }

    pub(crate) fn check_overwrite(&self, block: &Block) -> Result<(), Error> {
        self.check_open()?;
        block.check_format(self.block_size, self.order)?;
        if block.id() > MAX_BLOCK_ID {
            return Err(Error::new(ErrorKind::Bounds)
                .with_message("block id exceeds addressable range")
                .with_block(block.id()));
        }
        Ok(())
    }

    pub(crate) fn note_write(&self, id: BlockId) {
        let mut file_blocks = self.lock_file_blocks();
        if id >= *file_blocks {
            *file_blocks = id + 1;
        }
    }

    pub(crate) fn note_overwrite(&self, id: BlockId) {
        let mut file_blocks = self.lock_file_blocks();
        self.seq.fetch_max(id + 1, Ordering::SeqCst);
        if id >= *file_blocks {
            *file_blocks = id + 1;
        }
    }

    /// Rewinds the boundary; returns the physical extent before the rewind.
    pub(crate) fn reset(&self, boundary: u64) -> Result<u64, Error> {
        self.check_open()?;
        let mut file_blocks = self.lock_file_blocks();
        let current = self.seq.load(Ordering::SeqCst);
        if boundary > current {
            return Err(Error::new(ErrorKind::Usage).with_message(format!(
                "cannot reset allocation boundary forward from {current} to {boundary}"
            )));
        }
        let previous = *file_blocks;
        self.seq.store(boundary, Ordering::SeqCst);
        *file_blocks = previous.min(boundary);
        Ok(previous)
    }

    fn lock_file_blocks(&self) -> MutexGuard<'_, u64> {
        self.file_blocks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
