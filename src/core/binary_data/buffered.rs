//! Purpose: Coalesce small appends into one larger write on the wrapped file.
//! Exports: `BinaryDataFileWriteBuffered`.
//! Role: Default disk `BinaryDataFile` handed out by the file factory.
//! Invariants: Logical length is `inner.length() + buffered bytes`.
//! Invariants: Every read, sync and close flushes first, so buffering is never observable.
//! Invariants: One mutex per instance serializes all callers.

use std::sync::{Mutex, MutexGuard};

use tracing::trace;

use crate::core::binary_data::BinaryDataFile;
use crate::core::config::DEFAULT_WRITE_BUFFER_SIZE;
use crate::core::error::{closed, Error};

pub struct BinaryDataFileWriteBuffered<F> {
    state: Mutex<Buffered<F>>,
    capacity: usize,
}

struct Buffered<F> {
    inner: F,
    buf: Vec<u8>,
}

impl<F: BinaryDataFile> Buffered<F> {
    fn check_open(&self) -> Result<(), Error> {
        if !self.inner.is_open() {
            return Err(closed("binary data file"));
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Error> {
        if self.buf.is_empty() {
            return Ok(());
        }
        trace!(bytes = self.buf.len(), "flushing write buffer");
        self.inner.write(&self.buf)?;
        self.buf.clear();
        Ok(())
    }
}

impl<F: BinaryDataFile> BinaryDataFileWriteBuffered<F> {
    pub fn new(inner: F) -> Self {
        Self::with_capacity(inner, DEFAULT_WRITE_BUFFER_SIZE)
    }

    pub fn with_capacity(inner: F, capacity: usize) -> Self {
        assert!(capacity > 0, "write buffer capacity must be non-zero");
        Self {
            state: Mutex::new(Buffered {
                inner,
                buf: Vec::with_capacity(capacity),
            }),
            capacity,
        }
    }

    /// Bytes accepted but not yet handed to the wrapped file.
    pub fn buffered_len(&self) -> usize {
        self.lock().buf.len()
    }

    fn lock(&self) -> MutexGuard<'_, Buffered<F>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<F: BinaryDataFile> BinaryDataFile for BinaryDataFileWriteBuffered<F> {
    fn open(&self) -> Result<(), Error> {
        self.lock().inner.open()
    }

    fn is_open(&self) -> bool {
        self.lock().inner.is_open()
    }

    fn read(&self, pos: u64, buf: &mut [u8]) -> Result<usize, Error> {
        let mut state = self.lock();
        state.check_open()?;
        state.flush()?;
        state.inner.read(pos, buf)
    }

    fn write(&self, data: &[u8]) -> Result<u64, Error> {
        let mut state = self.lock();
        state.check_open()?;
        let offset = state.inner.length()? + state.buf.len() as u64;
        if state.buf.len() + data.len() > self.capacity {
            state.flush()?;
        }
        if data.len() >= self.capacity {
            state.inner.write(data)?;
        } else {
            state.buf.extend_from_slice(data);
        }
        Ok(offset)
    }

    fn length(&self) -> Result<u64, Error> {
        let state = self.lock();
        state.check_open()?;
        Ok(state.inner.length()? + state.buf.len() as u64)
    }

    fn truncate(&self, len: u64) -> Result<(), Error> {
        let mut state = self.lock();
        state.check_open()?;
        let flushed = state.inner.length()?;
        let end = flushed + state.buf.len() as u64;
        if len <= flushed {
            state.buf.clear();
            state.inner.truncate(len)
        } else if len <= end {
            let keep = (len - flushed) as usize;
            state.buf.truncate(keep);
            Ok(())
        } else {
            state.flush()?;
            state.inner.truncate(len)
        }
    }

    fn sync(&self) -> Result<(), Error> {
        let mut state = self.lock();
        state.check_open()?;
        state.flush()?;
        state.inner.sync()
    }

    fn close(&self) -> Result<(), Error> {
        let mut state = self.lock();
        if !state.inner.is_open() {
            return Ok(());
        }
        state.flush()?;
        state.inner.close()
    }
}
