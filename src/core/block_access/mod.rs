//! Purpose: Fixed-size block storage addressed by integer id.
//! Exports: `BlockAccess`, `BlockAccessDirect`, `BlockAccessMapped`, `BlockAccessMem`, `BlockAccessLogging`.
//! Role: Substrate for index and node storage layered above this crate.
//! Invariants: Ids in `[0, alloc_boundary)` are valid; `allocate` returns the pre-call boundary.
//! Invariants: Blocks handed in or out always hold exactly `block_size` bytes in the store's byte order.
//! Invariants: Blocks returned by `read` never alias mutable store state.

mod base;
mod direct;
mod logging;
mod mapped;
mod mem;

use crate::core::block::{Block, BlockId};
use crate::core::error::Error;

pub(crate) use base::BlockAccessBase;
pub use direct::BlockAccessDirect;
pub use logging::BlockAccessLogging;
pub use mapped::BlockAccessMapped;
pub use mem::BlockAccessMem;

pub trait BlockAccess: Send + Sync {
    fn block_size(&self) -> usize;

    /// Hands out a fresh block. `size` must be the store's block size, or 0 for the default.
    fn allocate(&self, size: usize) -> Result<Block, Error>;

    fn read(&self, id: BlockId) -> Result<Block, Error>;

    /// Create-or-update for an id that has already been allocated.
    fn write(&self, block: &Block) -> Result<(), Error>;

    /// Writes at `block.id()` without an allocation check, extending the boundary if needed.
    fn overwrite(&self, block: &Block) -> Result<(), Error>;

    fn alloc_boundary(&self) -> u64;

    /// Rewinds the allocation boundary; `boundary` may not exceed the current one.
    fn reset_alloc_boundary(&self, boundary: u64) -> Result<(), Error>;

    fn valid(&self, id: BlockId) -> bool;

    fn is_empty(&self) -> bool {
        self.alloc_boundary() == 0
    }

    fn sync(&self) -> Result<(), Error>;

    fn close(&self) -> Result<(), Error>;

    fn is_closed(&self) -> bool;

    fn label(&self) -> &str;
}

impl<B: BlockAccess + ?Sized> BlockAccess for Box<B> {
    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn allocate(&self, size: usize) -> Result<Block, Error> {
        (**self).allocate(size)
    }

    fn read(&self, id: BlockId) -> Result<Block, Error> {
        (**self).read(id)
    }

    fn write(&self, block: &Block) -> Result<(), Error> {
        (**self).write(block)
    }

    fn overwrite(&self, block: &Block) -> Result<(), Error> {
        (**self).overwrite(block)
    }

    fn alloc_boundary(&self) -> u64 {
        (**self).alloc_boundary()
    }

    fn reset_alloc_boundary(&self, boundary: u64) -> Result<(), Error> {
        (**self).reset_alloc_boundary(boundary)
    }

    fn valid(&self, id: BlockId) -> bool {
        (**self).valid(id)
    }

    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }

    fn sync(&self) -> Result<(), Error> {
        (**self).sync()
    }

    fn close(&self) -> Result<(), Error> {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    fn label(&self) -> &str {
        (**self).label()
    }
}
