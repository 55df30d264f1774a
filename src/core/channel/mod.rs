//! Purpose: Position-based random-access byte channel shared by disk and memory storage.
//! Exports: `BufferChannel`, `BufferChannelFile`, `BufferChannelMem`.
//! Role: Lowest storage seam; block stores read and write whole blocks through it.
//! Invariants: `read_at`/`write_at` never move the channel position; `read`/`write` advance it.
//! Invariants: `truncate` only shrinks and clamps the position to the new size.

mod file;
mod mem;

use std::path::Path;

use crate::core::error::Error;

pub use file::BufferChannelFile;
pub use mem::BufferChannelMem;

pub trait BufferChannel: Send {
    /// Independent channel over the same content (file: reopened; memory: deep copy).
    fn duplicate(&self) -> Result<Box<dyn BufferChannel>, Error>;

    fn position(&self) -> u64;

    fn set_position(&mut self, pos: u64);

    /// Reads at the current position and advances it; returns 0 at end of data.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error>;

    fn read_at(&mut self, buf: &mut [u8], pos: u64) -> Result<usize, Error>;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Error>;

    fn write_at(&mut self, buf: &[u8], pos: u64) -> Result<usize, Error>;

    fn truncate(&mut self, len: u64) -> Result<(), Error>;

    fn size(&self) -> Result<u64, Error>;

    fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.size()? == 0)
    }

    fn sync(&mut self) -> Result<(), Error>;

    fn close(&mut self) -> Result<(), Error>;

    fn label(&self) -> &str;

    fn filename(&self) -> Option<&Path>;
}
