// Adds one mutex around every call so a non-thread-safe file can be shared.
use std::sync::{Mutex, MutexGuard};

use crate::core::binary_data::BinaryDataFile;
use crate::core::error::Error;

pub struct BinaryDataFileSync<F> {
    inner: Mutex<F>,
}

impl<F: BinaryDataFile> BinaryDataFileSync<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    pub fn into_inner(self) -> F {
        self.inner
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock(&self) -> MutexGuard<'_, F> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<F: BinaryDataFile> BinaryDataFile for BinaryDataFileSync<F> {
    fn open(&self) -> Result<(), Error> {
        self.lock().open()
    }

    fn is_open(&self) -> bool {
        self.lock().is_open()
    }

    fn read(&self, pos: u64, buf: &mut [u8]) -> Result<usize, Error> {
        self.lock().read(pos, buf)
    }

    fn write(&self, buf: &[u8]) -> Result<u64, Error> {
        self.lock().write(buf)
    }

    fn length(&self) -> Result<u64, Error> {
        self.lock().length()
    }

    fn truncate(&self, len: u64) -> Result<(), Error> {
        self.lock().truncate(len)
    }

    fn is_empty(&self) -> Result<bool, Error> {
        self.lock().is_empty()
    }

    fn sync(&self) -> Result<(), Error> {
        self.lock().sync()
    }

    fn close(&self) -> Result<(), Error> {
        self.lock().close()
    }
}
