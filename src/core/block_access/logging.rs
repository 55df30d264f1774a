// Decorator that traces every block operation before delegating.
use tracing::trace;

use crate::core::block::{Block, BlockId};
use crate::core::block_access::BlockAccess;
use crate::core::error::Error;

pub struct BlockAccessLogging<B> {
    inner: B,
}

impl<B: BlockAccess> BlockAccessLogging<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> B {
        self.inner
    }
}

impl<B: BlockAccess> BlockAccess for BlockAccessLogging<B> {
    fn block_size(&self) -> usize {
        self.inner.block_size()
    }

    fn allocate(&self, size: usize) -> Result<Block, Error> {
        let block = self.inner.allocate(size)?;
        trace!(label = self.inner.label(), id = block.id(), "allocate");
        Ok(block)
    }

    fn read(&self, id: BlockId) -> Result<Block, Error> {
        trace!(label = self.inner.label(), id, "read");
        self.inner.read(id)
    }

    fn write(&self, block: &Block) -> Result<(), Error> {
        trace!(label = self.inner.label(), id = block.id(), "write");
        self.inner.write(block)
    }

    fn overwrite(&self, block: &Block) -> Result<(), Error> {
        trace!(label = self.inner.label(), id = block.id(), "overwrite");
        self.inner.overwrite(block)
    }

    fn alloc_boundary(&self) -> u64 {
        self.inner.alloc_boundary()
    }

    fn reset_alloc_boundary(&self, boundary: u64) -> Result<(), Error> {
        trace!(label = self.inner.label(), boundary, "reset_alloc_boundary");
        self.inner.reset_alloc_boundary(boundary)
    }

    fn valid(&self, id: BlockId) -> bool {
        self.inner.valid(id)
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn sync(&self) -> Result<(), Error> {
        trace!(label = self.inner.label(), "sync");
        self.inner.sync()
    }

    fn close(&self) -> Result<(), Error> {
        trace!(label = self.inner.label(), "close");
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn label(&self) -> &str {
        self.inner.label()
    }
}
