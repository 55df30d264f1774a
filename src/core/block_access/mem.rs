// In-memory block store. Safe mode copies buffers on every read and write the way
// a disk store would; otherwise the store and its callers share copy-on-write buffers.
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::core::block::{Block, BlockId};
use crate::core::block_access::{BlockAccess, BlockAccessBase};
use crate::core::config::ByteOrder;
use crate::core::error::Error;

pub struct BlockAccessMem {
    base: BlockAccessBase,
    safe_mode: bool,
    blocks: Mutex<Vec<Option<Arc<Vec<u8>>>>>,
}

impl BlockAccessMem {
    pub fn new(label: impl Into<String>, block_size: usize, order: ByteOrder) -> Self {
        Self::with_safe_mode(label, block_size, order, true)
    }

    pub fn with_safe_mode(
        label: impl Into<String>,
        block_size: usize,
        order: ByteOrder,
        safe_mode: bool,
    ) -> Self {
        Self {
            base: BlockAccessBase::new(label, block_size, order, 0),
            safe_mode,
            blocks: Mutex::new(Vec::new()),
        }
    }

    pub fn safe_mode(&self) -> bool {
        self.safe_mode
    }

    fn blocks(&self) -> MutexGuard<'_, Vec<Option<Arc<Vec<u8>>>>> {
        self.blocks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn store(&self, block: &Block) {
        let bytes = if self.safe_mode {
            Arc::new(block.bytes().to_vec())
        } else {
            Arc::clone(block.shared_bytes())
        };
        let index = block.id() as usize;
        let mut blocks = self.blocks();
        if blocks.len() <= index {
            blocks.resize(index + 1, None);
        }
        blocks[index] = Some(bytes);
    }
}

impl BlockAccess for BlockAccessMem {
    fn block_size(&self) -> usize {
        self.base.block_size()
    }

    fn allocate(&self, size: usize) -> Result<Block, Error> {
        self.base.allocate(size)
    }

    fn read(&self, id: BlockId) -> Result<Block, Error> {
        self.base.check_read(id)?;
        let stored = self.blocks().get(id as usize).cloned().flatten();
        let bytes = match stored {
            Some(bytes) if self.safe_mode => Arc::new(bytes.to_vec()),
            Some(bytes) => bytes,
            None => Arc::new(vec![0u8; self.base.block_size()]),
        };
        Ok(Block::from_shared(id, bytes, self.base.order()))
    }

    fn write(&self, block: &Block) -> Result<(), Error> {
        self.base.check_write(block)?;
        self.store(block);
        self.base.note_write(block.id());
        Ok(())
    }

    fn overwrite(&self, block: &Block) -> Result<(), Error> {
        self.base.check_overwrite(block)?;
        self.store(block);
        self.base.note_overwrite(block.id());
        Ok(())
    }

    fn alloc_boundary(&self) -> u64 {
        self.base.boundary()
    }

    fn reset_alloc_boundary(&self, boundary: u64) -> Result<(), Error> {
        let mut blocks = self.blocks();
        self.base.reset(boundary)?;
        blocks.truncate(boundary as usize);
        Ok(())
    }

    fn valid(&self, id: BlockId) -> bool {
        self.base.valid(id)
    }

    fn sync(&self) -> Result<(), Error> {
        self.base.check_open()
    }

    fn close(&self) -> Result<(), Error> {
        if self.base.mark_closed() {
            debug!(label = self.base.label(), "closing memory block store");
            self.blocks().clear();
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.base.is_closed()
    }

    fn label(&self) -> &str {
        self.base.label()
    }
}

#[cfg(test)]
mod tests {
    use super::BlockAccessMem;
    use crate::core::block_access::BlockAccess;
    use crate::core::config::ByteOrder;
    use crate::core::error::ErrorKind;

    #[test]
    fn safe_mode_never_shares_buffers() {
        let store = BlockAccessMem::new("mem", 8, ByteOrder::BigEndian);
        let mut block = store.allocate(8).expect("allocate");
        block.bytes_mut().copy_from_slice(b"abcdefgh");
        store.write(&block).expect("write");
        let first = store.read(0).expect("read");
        let second = store.read(0).expect("read");
        assert!(!first.shares_buffer_with(&block));
        assert!(!first.shares_buffer_with(&second));
        assert_eq!(first.bytes(), b"abcdefgh");
    }

    #[test]
    fn fast_mode_shares_until_mutation() {
        let store = BlockAccessMem::with_safe_mode("mem", 4, ByteOrder::BigEndian, false);
        let mut block = store.allocate(0).expect("allocate");
        block.bytes_mut().copy_from_slice(b"wxyz");
        store.write(&block).expect("write");

        let mut view = store.read(0).expect("read");
        assert!(view.shares_buffer_with(&block));
        view.bytes_mut()[0] = b'!';
        assert_eq!(store.read(0).expect("read again").bytes(), b"wxyz");
    }

    #[test]
    fn wrong_allocation_size_is_usage_error() {
        let store = BlockAccessMem::new("mem", 8, ByteOrder::BigEndian);
        assert_eq!(store.allocate(16).expect_err("size").kind(), ErrorKind::Usage);
        assert!(store.is_empty());
    }

    #[test]
    fn reads_outside_boundary_are_bounds_errors() {
        let store = BlockAccessMem::new("mem", 8, ByteOrder::BigEndian);
        store.allocate(0).expect("allocate");
        store.read(0).expect("allocated block");
        assert_eq!(store.read(1).expect_err("unallocated").kind(), ErrorKind::Bounds);
    }

    #[test]
    fn byte_order_mismatch_is_rejected() {
        let store = BlockAccessMem::new("mem", 8, ByteOrder::LittleEndian);
        let block = crate::core::block::Block::new(0, vec![0; 8]);
        store.allocate(0).expect("allocate");
        assert_eq!(store.write(&block).expect_err("order").kind(), ErrorKind::Corrupt);
    }
}
