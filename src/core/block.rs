// Fixed-size block value passed between callers and block stores.
use std::sync::Arc;

use crate::core::config::ByteOrder;
use crate::core::error::{Error, ErrorKind};

pub type BlockId = u64;

/// Highest id a disk block store will address. Ids are treated as 32-bit
/// signed offsets into the block file even though the boundary counter is
/// 64-bit, which caps a store at roughly 2^31 blocks.
pub const MAX_BLOCK_ID: BlockId = i32::MAX as BlockId;

/// Content is reference counted and copied on first mutation, so a caller
/// editing a block it read never edits the store's copy.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Block {
    id: BlockId,
    bytes: Arc<Vec<u8>>,
    order: ByteOrder,
    modified: bool,
}

impl Block {
    pub fn new(id: BlockId, bytes: Vec<u8>) -> Self {
        Self::with_order(id, bytes, ByteOrder::default())
    }

    pub fn with_order(id: BlockId, bytes: Vec<u8>, order: ByteOrder) -> Self {
        Self::from_shared(id, Arc::new(bytes), order)
    }

    pub(crate) fn from_shared(id: BlockId, bytes: Arc<Vec<u8>>, order: ByteOrder) -> Self {
        Self {
            id,
            bytes,
            order,
            modified: false,
        }
    }

    pub fn zeroed(id: BlockId, size: usize, order: ByteOrder) -> Self {
        Self::with_order(id, vec![0u8; size], order)
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable view of the content; marks the block modified.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.modified = true;
        Arc::make_mut(&mut self.bytes).as_mut_slice()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        Arc::try_unwrap(self.bytes).unwrap_or_else(|shared| shared.as_ref().clone())
    }

    pub(crate) fn shared_bytes(&self) -> &Arc<Vec<u8>> {
        &self.bytes
    }

    /// True when both blocks point at the same buffer allocation.
    pub fn shares_buffer_with(&self, other: &Block) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    /// Deep copy with an independently owned buffer.
    pub fn replicate(&self) -> Block {
        Block {
            id: self.id,
            bytes: Arc::new(self.bytes.to_vec()),
            order: self.order,
            modified: self.modified,
        }
    }

    /// Checks a block against the store it is about to be written to.
    pub(crate) fn check_format(&self, block_size: usize, order: ByteOrder) -> Result<(), Error> {
        if self.bytes.len() != block_size {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!(
                    "block size mismatch: got {}, store uses {block_size}",
                    self.bytes.len()
                ))
                .with_block(self.id));
        }
        if self.order != order {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!(
                    "byte order mismatch: got {:?}, store uses {order:?}",
                    self.order
                ))
                .with_block(self.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Block;
    use crate::core::config::ByteOrder;
    use crate::core::error::ErrorKind;

    #[test]
    fn replicate_does_not_alias() {
        let original = Block::new(3, vec![1, 2, 3, 4]);
        let mut copy = original.replicate();
        copy.bytes_mut()[0] = 9;
        assert_eq!(original.bytes(), &[1, 2, 3, 4]);
        assert_eq!(copy.bytes(), &[9, 2, 3, 4]);
        assert_eq!(copy.id(), 3);
        assert!(copy.is_modified());
        assert!(!original.is_modified());
        assert!(!copy.shares_buffer_with(&original));
    }

    #[test]
    fn clone_shares_until_mutated() {
        let original = Block::new(5, vec![0; 8]);
        let mut alias = original.clone();
        assert!(alias.shares_buffer_with(&original));
        alias.bytes_mut()[7] = 1;
        assert!(!alias.shares_buffer_with(&original));
        assert_eq!(original.bytes(), &[0; 8]);
        assert_eq!(alias.into_bytes()[7], 1);
    }

    #[test]
    fn format_check_rejects_wrong_size() {
        let block = Block::new(0, vec![0; 10]);
        let err = block.check_format(16, ByteOrder::BigEndian).expect_err("size");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert_eq!(err.block(), Some(0));
    }

    #[test]
    fn format_check_rejects_wrong_order() {
        let block = Block::zeroed(1, 16, ByteOrder::LittleEndian);
        let err = block.check_format(16, ByteOrder::BigEndian).expect_err("order");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        block.check_format(16, ByteOrder::LittleEndian).expect("matching order");
    }
}
