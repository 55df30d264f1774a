//! Purpose: Chunked, append-growable in-memory byte store backing memory-mode files.
//! Exports: `SegmentedBuffer`.
//! Role: Substrate for `BinaryDataFileMem` and `BufferChannelMem`.
//! Invariants: `len` is the highest offset ever written and never exceeds allocated capacity.
//! Invariants: Writes are contiguous (`pos <= len`); `truncate` only shrinks, never allocates.
//! Invariants: Growth allocates whole chunks lazily; existing bytes are never copied on growth.

use crate::core::config::DEFAULT_SEGMENT_SIZE;
use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Debug)]
pub struct SegmentedBuffer {
    chunk_size: usize,
    chunks: Vec<Box<[u8]>>,
    len: u64,
}

impl Default for SegmentedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentedBuffer {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_SEGMENT_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self {
            chunk_size,
            chunks: Vec::new(),
            len: 0,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copies bytes starting at `pos` into `buf`; returns how many were available.
    pub fn read(&self, pos: u64, buf: &mut [u8]) -> Result<usize, Error> {
        if pos > self.len {
            return Err(Error::new(ErrorKind::Bounds)
                .with_message("read past end of buffer")
                .with_offset(pos));
        }
        let available = (self.len - pos).min(buf.len() as u64) as usize;
        let mut done = 0;
        while done < available {
            let at = pos + done as u64;
            let (chunk, within) = self.locate(at);
            let n = (self.chunk_size - within).min(available - done);
            buf[done..done + n].copy_from_slice(&self.chunks[chunk][within..within + n]);
            done += n;
        }
        Ok(available)
    }

    /// Writes `data` at `pos`, which may not lie beyond the current length.
    pub fn write(&mut self, pos: u64, data: &[u8]) -> Result<(), Error> {
        if pos > self.len {
            return Err(Error::new(ErrorKind::Bounds)
                .with_message("write would leave a gap")
                .with_offset(pos));
        }
        let end = pos + data.len() as u64;
        self.ensure_capacity(end);
        let mut done = 0;
        while done < data.len() {
            let at = pos + done as u64;
            let (chunk, within) = self.locate(at);
            let n = (self.chunk_size - within).min(data.len() - done);
            self.chunks[chunk][within..within + n].copy_from_slice(&data[done..done + n]);
            done += n;
        }
        if end > self.len {
            self.len = end;
        }
        Ok(())
    }

    /// Appends at the end; returns the offset the bytes start at.
    pub fn append(&mut self, data: &[u8]) -> Result<u64, Error> {
        let pos = self.len;
        self.write(pos, data)?;
        Ok(pos)
    }

    pub fn truncate(&mut self, len: u64) {
        if len < self.len {
            self.len = len;
        }
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.len = 0;
    }

    fn locate(&self, pos: u64) -> (usize, usize) {
        let chunk_size = self.chunk_size as u64;
        ((pos / chunk_size) as usize, (pos % chunk_size) as usize)
    }

    fn ensure_capacity(&mut self, end: u64) {
        let chunk_size = self.chunk_size as u64;
        let needed = end.div_ceil(chunk_size) as usize;
        while self.chunks.len() < needed {
            self.chunks.push(vec![0u8; self.chunk_size].into_boxed_slice());
        }
    }
}
