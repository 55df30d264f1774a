//! Purpose: Choose the memory or disk implementation for a file set and extension.
//! Exports: `create_binary_data_file`, `create_block_access`, `create_buffer_channel`.
//! Role: Single entry point storage engines use to materialize `base.<ext>` structures.
//! Invariants: Memory-mode file sets never touch the filesystem.
//! Invariants: Options are validated before anything is opened.

use tracing::debug;

use crate::core::binary_data::{
    BinaryDataFile, BinaryDataFileMem, BinaryDataFileRandomAccess, BinaryDataFileWriteBuffered,
};
use crate::core::block_access::{BlockAccess, BlockAccessDirect, BlockAccessMapped, BlockAccessMem};
use crate::core::channel::{BufferChannel, BufferChannelFile, BufferChannelMem};
use crate::core::config::StorageOptions;
use crate::core::error::Error;
use crate::core::file_set::FileSet;
use crate::core::segmented::SegmentedBuffer;

/// Returns an unopened binary data file; callers pair `open` with `close`.
pub fn create_binary_data_file(
    set: &FileSet,
    ext: &str,
    opts: &StorageOptions,
) -> Result<Box<dyn BinaryDataFile>, Error> {
    opts.validate()?;
    match set.filename(ext) {
        None => {
            debug!(label = %set.label(ext), "creating memory binary data file");
            let buffer = SegmentedBuffer::with_chunk_size(opts.segment_size);
            Ok(Box::new(BinaryDataFileMem::with_buffer(buffer)))
        }
        Some(path) => {
            debug!(path = %path.display(), "creating buffered binary data file");
            let file = BinaryDataFileRandomAccess::new(path);
            Ok(Box::new(BinaryDataFileWriteBuffered::with_capacity(
                file,
                opts.write_buffer_size,
            )))
        }
    }
}

pub fn create_block_access(
    set: &FileSet,
    ext: &str,
    opts: &StorageOptions,
) -> Result<Box<dyn BlockAccess>, Error> {
    opts.validate()?;
    match set.filename(ext) {
        None => Ok(Box::new(BlockAccessMem::with_safe_mode(
            set.label(ext),
            opts.block_size,
            opts.byte_order,
            opts.safe_mode,
        ))),
        Some(path) if opts.mapped => Ok(Box::new(BlockAccessMapped::open(
            path,
            opts.block_size,
            opts.mapped_segment_size,
            opts.byte_order,
        )?)),
        Some(path) => Ok(Box::new(BlockAccessDirect::open(
            path,
            opts.block_size,
            opts.byte_order,
        )?)),
    }
}

pub fn create_buffer_channel(
    set: &FileSet,
    ext: &str,
    opts: &StorageOptions,
) -> Result<Box<dyn BufferChannel>, Error> {
    opts.validate()?;
    match set.filename(ext) {
        None => Ok(Box::new(BufferChannelMem::with_buffer(
            set.label(ext),
            SegmentedBuffer::with_chunk_size(opts.segment_size),
        ))),
        Some(path) => Ok(Box::new(BufferChannelFile::open(path)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::{create_binary_data_file, create_block_access, create_buffer_channel};
    use crate::core::config::StorageOptions;
    use crate::core::file_set::FileSet;

    #[test]
    fn memory_sets_create_no_files() {
        let set = FileSet::mem("mem");
        let opts = StorageOptions::default().with_block_size(128);
        let blocks = create_block_access(&set, "idn", &opts).expect("blocks");
        assert_eq!(blocks.block_size(), 128);
        assert_eq!(blocks.label(), "mem:mem.idn");
        let data = create_binary_data_file(&set, "dat", &opts).expect("data");
        data.open().expect("open");
        assert_eq!(data.write(b"abc").expect("write"), 0);
        let chan = create_buffer_channel(&set, "bpt", &opts).expect("channel");
        assert!(chan.filename().is_none());
    }

    #[test]
    fn disk_sets_create_suffixed_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let set = FileSet::new(dir.path(), "SPO").expect("file set");
        let opts = StorageOptions::default().with_block_size(256);
        let blocks = create_block_access(&set, "idn", &opts).expect("blocks");
        assert!(set.exists("idn"));
        blocks.close().expect("close");

        let data = create_binary_data_file(&set, "dat", &opts).expect("data");
        assert!(!set.exists("dat"));
        data.open().expect("open");
        assert!(set.exists("dat"));
        data.close().expect("close");
    }

    #[test]
    fn invalid_options_are_refused() {
        let set = FileSet::mem("mem");
        let opts = StorageOptions::default().with_block_size(0);
        assert!(create_block_access(&set, "idn", &opts).is_err());
    }
}
