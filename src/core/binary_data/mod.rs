//! Purpose: Append-only, randomly readable storage of caller-delimited byte records.
//! Exports: `BinaryDataFile`, the random-access, write-buffered, memory and synchronized variants, `close_silent`.
//! Role: Backing store for variable-length data (node tables, string pools) above this crate.
//! Invariants: `write` appends at the current length and returns the offset it wrote at.
//! Invariants: Reads never observe state older than the last completed write.
//! Invariants: Operations other than `open`/`is_open`/`close` fail with `Closed` on a closed file.

mod buffered;
mod mem;
mod random_access;
mod sync;

use tracing::warn;

use crate::core::error::Error;

pub use buffered::BinaryDataFileWriteBuffered;
pub use mem::BinaryDataFileMem;
pub use random_access::BinaryDataFileRandomAccess;
pub use sync::BinaryDataFileSync;

/// Implementations that are not `Sync` (the plain random-access file) rely on
/// the type system to forbid sharing; wrap them in [`BinaryDataFileSync`] or
/// [`BinaryDataFileWriteBuffered`] to share across threads.
pub trait BinaryDataFile: Send {
    fn open(&self) -> Result<(), Error>;

    fn is_open(&self) -> bool;

    /// Reads from absolute position `pos`; returns the number of bytes read,
    /// which is short only at the end of the data.
    fn read(&self, pos: u64, buf: &mut [u8]) -> Result<usize, Error>;

    /// Appends `buf`; returns the offset at which it starts.
    fn write(&self, buf: &[u8]) -> Result<u64, Error>;

    fn length(&self) -> Result<u64, Error>;

    /// Shrinks the file to `len` bytes. A `len` at or past the end leaves the data as is.
    fn truncate(&self, len: u64) -> Result<(), Error>;

    fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.length()? == 0)
    }

    fn sync(&self) -> Result<(), Error>;

    fn close(&self) -> Result<(), Error>;
}

impl<F: BinaryDataFile + ?Sized> BinaryDataFile for Box<F> {
    fn open(&self) -> Result<(), Error> {
        (**self).open()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn read(&self, pos: u64, buf: &mut [u8]) -> Result<usize, Error> {
        (**self).read(pos, buf)
    }

    fn write(&self, buf: &[u8]) -> Result<u64, Error> {
        (**self).write(buf)
    }

    fn length(&self) -> Result<u64, Error> {
        (**self).length()
    }

    fn truncate(&self, len: u64) -> Result<(), Error> {
        (**self).truncate(len)
    }

    fn is_empty(&self) -> Result<bool, Error> {
        (**self).is_empty()
    }

    fn sync(&self) -> Result<(), Error> {
        (**self).sync()
    }

    fn close(&self) -> Result<(), Error> {
        (**self).close()
    }
}

/// Best-effort close for cleanup paths; failures are logged, never returned,
/// so an error already being propagated is not replaced.
pub fn close_silent<F: BinaryDataFile + ?Sized>(file: &F) {
    if let Err(err) = file.close() {
        warn!(error = %err, "ignoring failure while closing binary data file");
    }
}
