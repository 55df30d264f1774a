// Memory-backed binary data file over a segmented buffer; every call takes the
// instance mutex. Closing keeps the content so a reopen sees it again.
use std::sync::{Mutex, MutexGuard};

use crate::core::binary_data::BinaryDataFile;
use crate::core::error::{closed, Error};
use crate::core::segmented::SegmentedBuffer;

pub struct BinaryDataFileMem {
    state: Mutex<MemState>,
}

struct MemState {
    open: bool,
    buffer: SegmentedBuffer,
}

impl MemState {
    fn check_open(&self) -> Result<(), Error> {
        if !self.open {
            return Err(closed("memory binary data file"));
        }
        Ok(())
    }
}

impl Default for BinaryDataFileMem {
    fn default() -> Self {
        Self::new()
    }
}

impl BinaryDataFileMem {
    pub fn new() -> Self {
        Self::with_buffer(SegmentedBuffer::new())
    }

    pub fn with_buffer(buffer: SegmentedBuffer) -> Self {
        Self {
            state: Mutex::new(MemState {
                open: false,
                buffer,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BinaryDataFile for BinaryDataFileMem {
    fn open(&self) -> Result<(), Error> {
        self.lock().open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.lock().open
    }

    fn read(&self, pos: u64, buf: &mut [u8]) -> Result<usize, Error> {
        let state = self.lock();
        state.check_open()?;
        if pos >= state.buffer.len() {
            return Ok(0);
        }
        state.buffer.read(pos, buf)
    }

    fn write(&self, buf: &[u8]) -> Result<u64, Error> {
        let mut state = self.lock();
        state.check_open()?;
        state.buffer.append(buf)
    }

    fn length(&self) -> Result<u64, Error> {
        let state = self.lock();
        state.check_open()?;
        Ok(state.buffer.len())
    }

    fn truncate(&self, len: u64) -> Result<(), Error> {
        let mut state = self.lock();
        state.check_open()?;
        state.buffer.truncate(len);
        Ok(())
    }

    fn sync(&self) -> Result<(), Error> {
        self.lock().check_open()
    }

    fn close(&self) -> Result<(), Error> {
        self.lock().open = false;
        Ok(())
    }
}
