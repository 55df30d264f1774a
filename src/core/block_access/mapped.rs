// Memory-mapped disk block store; the file grows in whole segments and is
// trimmed back to the written extent on close.
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use memmap2::MmapMut;
use tracing::{debug, warn};

use crate::core::block::{Block, BlockId};
use crate::core::block_access::{BlockAccess, BlockAccessBase};
use crate::core::config::ByteOrder;
use crate::core::error::{closed, Error, ErrorKind};

pub struct BlockAccessMapped {
    base: BlockAccessBase,
    path: PathBuf,
    segment_size: u64,
    state: RwLock<MapState>,
}

struct MapState {
    file: Option<File>,
    map: Option<MmapMut>,
}

impl MapState {
    fn mapped_len(&self) -> u64 {
        self.map.as_ref().map_or(0, |map| map.len() as u64)
    }
}

impl BlockAccessMapped {
    pub fn open(
        path: impl AsRef<Path>,
        block_size: usize,
        segment_size: usize,
        order: ByteOrder,
    ) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        if block_size == 0 || segment_size == 0 || segment_size % block_size != 0 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("segment size must be a non-zero multiple of the block size"));
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| Error::io(err).with_path(&path))?;
        let len = file
            .metadata()
            .map(|meta| meta.len())
            .map_err(|err| Error::io(err).with_path(&path))?;
        if len % block_size as u64 != 0 {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!(
                    "file length {len} is not a multiple of block size {block_size}"
                ))
                .with_path(&path));
        }
        let map = if len == 0 { None } else { Some(map_file(&file, &path)?) };
        let blocks = len / block_size as u64;
        debug!(path = %path.display(), blocks, block_size, "opened mapped block store");
        Ok(Self {
            base: BlockAccessBase::new(path.display().to_string(), block_size, order, blocks),
            path,
            segment_size: segment_size as u64,
            state: RwLock::new(MapState {
                file: Some(file),
                map,
            }),
        })
    }

    fn read_state(&self) -> RwLockReadGuard<'_, MapState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, MapState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn offset(&self, id: BlockId) -> u64 {
        id * self.base.block_size() as u64
    }

    /// Grows the file to whole segments covering `end` and remaps it.
    fn ensure_mapped(&self, state: &mut MapState, end: u64) -> Result<(), Error> {
        if end <= state.mapped_len() {
            return Ok(());
        }
        let new_len = end.div_ceil(self.segment_size) * self.segment_size;
        let file = state
            .file
            .as_ref()
            .ok_or_else(|| closed("mapped block store").with_path(&self.path))?;
        if let Some(map) = state.map.take() {
            map.flush().map_err(|err| Error::io(err).with_path(&self.path))?;
        }
        file.set_len(new_len)
            .map_err(|err| Error::io(err).with_path(&self.path))?;
        debug!(path = %self.path.display(), new_len, "grew mapped block file");
        state.map = Some(map_file(file, &self.path)?);
        Ok(())
    }

    fn write_raw(&self, block: &Block) -> Result<(), Error> {
        let start = self.offset(block.id());
        let end = start + self.base.block_size() as u64;
        let mut state = self.write_state();
        self.ensure_mapped(&mut state, end)?;
        let map = state
            .map
            .as_mut()
            .ok_or_else(|| Error::new(ErrorKind::Internal).with_message("missing mapping"))?;
        map[start as usize..end as usize].copy_from_slice(block.bytes());
        Ok(())
    }
}

fn map_file(file: &File, path: &Path) -> Result<MmapMut, Error> {
    // SAFETY: the store owns the only handle it writes through, every access is
    // bounds-checked against the mapping length, and the mapping is dropped
    // before the file is resized.
    unsafe { MmapMut::map_mut(file).map_err(|err| Error::io(err).with_path(path)) }
}

impl BlockAccess for BlockAccessMapped {
    fn block_size(&self) -> usize {
        self.base.block_size()
    }

    fn allocate(&self, size: usize) -> Result<Block, Error> {
        self.base.allocate(size)
    }

    fn read(&self, id: BlockId) -> Result<Block, Error> {
        self.base.check_read(id)?;
        let block_size = self.base.block_size();
        let start = self.offset(id);
        let end = start + block_size as u64;
        let mut bytes = vec![0u8; block_size];
        let state = self.read_state();
        if let Some(map) = state.map.as_ref() {
            if end <= map.len() as u64 {
                bytes.copy_from_slice(&map[start as usize..end as usize]);
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
        let mut state = self.write_state();
        let previous = self.base.reset(boundary)?;
        if boundary < previous {
            if let Some(map) = state.map.as_mut() {
                let start = (self.offset(boundary) as usize).min(map.len());
                let end = (self.offset(previous) as usize).min(map.len());
                map[start..end].fill(0);
            }
        }
        Ok(())
    }

    fn valid(&self, id: BlockId) -> bool {
        self.base.valid(id)
    }

    fn sync(&self) -> Result<(), Error> {
        self.base.check_open()?;
        let state = self.read_state();
        if let Some(map) = state.map.as_ref() {
            map.flush().map_err(|err| Error::io(err).with_path(&self.path))?;
        }
        Ok(())
    }

    fn close(&self) -> Result<(), Error> {
        if !self.base.mark_closed() {
            return Ok(());
        }
        let mut state = self.write_state();
        if let Some(map) = state.map.take() {
            map.flush().map_err(|err| Error::io(err).with_path(&self.path))?;
        }
        if let Some(file) = state.file.take() {
            let len = self.offset(self.base.file_blocks());
            debug!(path = %self.path.display(), len, "closing mapped block store");
            file.set_len(len)
                .map_err(|err| Error::io(err).with_path(&self.path))?;
            file.sync_all()
                .map_err(|err| Error::io(err).with_path(&self.path))?;
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

impl Drop for BlockAccessMapped {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(path = %self.path.display(), error = %err, "failed to close mapped block store on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BlockAccessMapped;
    use crate::core::block_access::BlockAccess;
    use crate::core::config::ByteOrder;
    use crate::core::error::ErrorKind;

    const SIZE: usize = 32;
    const SEGMENT: usize = SIZE * 4;

    #[test]
    fn writes_span_segment_growth() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = BlockAccessMapped::open(dir.path().join("m.dat"), SIZE, SEGMENT, ByteOrder::BigEndian)
            .expect("open");
        for i in 0..10u8 {
            let mut block = store.allocate(0).expect("allocate");
            block.bytes_mut().fill(i);
            store.write(&block).expect("write");
        }
        for i in 0..10u8 {
            assert_eq!(store.read(i as u64).expect("read").bytes(), &[i; SIZE]);
        }
    }

    #[test]
    fn close_trims_file_to_written_blocks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("m.dat");
        {
            let store = BlockAccessMapped::open(&path, SIZE, SEGMENT, ByteOrder::BigEndian).expect("open");
            for _ in 0..5 {
                let block = store.allocate(0).expect("allocate");
                store.write(&block).expect("write");
            }
            assert_eq!(std::fs::metadata(&path).expect("meta").len(), (SEGMENT * 2) as u64);
            store.close().expect("close");
        }
        assert_eq!(std::fs::metadata(&path).expect("meta").len(), (SIZE * 5) as u64);
        let store = BlockAccessMapped::open(&path, SIZE, SEGMENT, ByteOrder::BigEndian).expect("reopen");
        assert_eq!(store.alloc_boundary(), 5);
    }

    #[test]
    fn drop_closes_and_trims() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("m.dat");
        {
            let store = BlockAccessMapped::open(&path, SIZE, SEGMENT, ByteOrder::BigEndian).expect("open");
            for _ in 0..3 {
                let block = store.allocate(0).expect("allocate");
                store.write(&block).expect("write");
            }
        }
        assert_eq!(std::fs::metadata(&path).expect("meta").len(), (SIZE * 3) as u64);
    }

    #[test]
    fn reset_zeroes_discarded_blocks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = BlockAccessMapped::open(dir.path().join("m.dat"), SIZE, SEGMENT, ByteOrder::BigEndian)
            .expect("open");
        for _ in 0..3 {
            let mut block = store.allocate(0).expect("allocate");
            block.bytes_mut().fill(0xEE);
            store.write(&block).expect("write");
        }
        store.reset_alloc_boundary(1).expect("reset");
        assert!(!store.valid(1));
        let again = store.allocate(0).expect("allocate");
        assert_eq!(again.id(), 1);
        assert_eq!(store.read(1).expect("read").bytes(), &[0u8; SIZE]);
    }

    #[test]
    fn misaligned_segment_is_usage_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = match BlockAccessMapped::open(dir.path().join("m.dat"), SIZE, SIZE + 1, ByteOrder::BigEndian) {
            Ok(_) => panic!("expected misaligned segment to be rejected"),
            Err(err) => err,
        };
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
