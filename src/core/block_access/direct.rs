// Disk block store issuing one positioned read or write per block through a channel.
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::core::block::{Block, BlockId};
use crate::core::block_access::{BlockAccess, BlockAccessBase};
use crate::core::channel::{BufferChannel, BufferChannelFile};
use crate::core::config::ByteOrder;
use crate::core::error::{Error, ErrorKind};

pub struct BlockAccessDirect {
    base: BlockAccessBase,
    channel: Mutex<Box<dyn BufferChannel>>,
}

impl BlockAccessDirect {
    pub fn open(path: impl AsRef<Path>, block_size: usize, order: ByteOrder) -> Result<Self, Error> {
        let channel = BufferChannelFile::open(path)?;
        Self::with_channel(Box::new(channel), block_size, order)
    }

    /// Wraps an existing channel. Its size must be a whole number of blocks;
    /// a trailing partial block means an interrupted write and is refused.
    pub fn with_channel(
        channel: Box<dyn BufferChannel>,
        block_size: usize,
        order: ByteOrder,
    ) -> Result<Self, Error> {
        if block_size == 0 {
            return Err(Error::new(ErrorKind::Usage).with_message("block size must be non-zero"));
        }
        let size = channel.size()?;
        if size % block_size as u64 != 0 {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!(
                    "file length {size} is not a multiple of block size {block_size}"
                ))
                .with_path(channel.label()));
        }
        let blocks = size / block_size as u64;
        debug!(label = channel.label(), blocks, block_size, "opened direct block store");
        let base = BlockAccessBase::new(channel.label(), block_size, order, blocks);
        Ok(Self {
            base,
            channel: Mutex::new(channel),
        })
    }

    fn channel(&self) -> MutexGuard<'_, Box<dyn BufferChannel>> {
        self.channel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn offset(&self, id: BlockId) -> u64 {
        id * self.base.block_size() as u64
    }

    fn write_raw(&self, block: &Block) -> Result<(), Error> {
        let offset = self.offset(block.id());
        self.channel()
            .write_at(block.bytes(), offset)
            .map_err(|err| err.with_block(block.id()))?;
        Ok(())
    }
}

impl BlockAccess for BlockAccessDirect {
    fn block_size(&self) -> usize {
        self.base.block_size()
    }

    fn allocate(&self, size: usize) -> Result<Block, Error> {
        self.base.allocate(size)
    }

    fn read(&self, id: BlockId) -> Result<Block, Error> {
        self.base.check_read(id)?;
        let mut bytes = vec![0u8; self.base.block_size()];
        // Allocated but never written blocks read as zeroes.
        if id < self.base.file_blocks() {
            let n = self
                .channel()
                .read_at(&mut bytes, self.offset(id))
                .map_err(|err| err.with_block(id))?;
            if n != bytes.len() {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message(format!("short block read: {n} of {} bytes", bytes.len()))
                    .with_block(id));
            }
        }
        Ok(Block::with_order(id, bytes, self.base.order()))
    }

    fn write(&self, block: &Block) -> Result<(), Error> {
        self.base.check_write(block)?;
        self.write_raw(block)?;
        self.base.note_write(block.id());
        Ok(())
    }

    fn overwrite(&self, block: &Block) -> Result<(), Error> {
        self.base.check_overwrite(block)?;
        self.write_raw(block)?;
        self.base.note_overwrite(block.id());
        Ok(())
    }

    fn alloc_boundary(&self) -> u64 {
        self.base.boundary()
    }

    fn reset_alloc_boundary(&self, boundary: u64) -> Result<(), Error> {
        let mut channel = self.channel();
        let previous = self.base.reset(boundary)?;
        if boundary < previous {
            debug!(label = self.base.label(), boundary, previous, "truncating block file");
            channel.truncate(self.offset(boundary))?;
        }
        Ok(())
    }

    fn valid(&self, id: BlockId) -> bool {
        self.base.valid(id)
    }

    fn sync(&self) -> Result<(), Error> {
        self.base.check_open()?;
        self.channel().sync()
    }

    fn close(&self) -> Result<(), Error> {
        if !self.base.mark_closed() {
            return Ok(());
        }
        debug!(label = self.base.label(), blocks = self.base.file_blocks(), "closing direct block store");
        self.channel().close()
    }

    fn is_closed(&self) -> bool {
        self.base.is_closed()
    }

    fn label(&self) -> &str {
        self.base.label()
    }
}
