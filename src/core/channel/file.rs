// Disk channel over a single file handle using positioned reads and writes.
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::channel::BufferChannel;
use crate::core::error::{closed, Error};

pub struct BufferChannelFile {
    path: PathBuf,
    label: String,
    file: Option<File>,
    position: u64,
}

impl BufferChannelFile {
    /// Opens (creating if needed) a read-write channel on `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| Error::io(err).with_path(&path))?;
        debug!(path = %path.display(), "opened file channel");
        Ok(Self {
            label: path.display().to_string(),
            path,
            file: Some(file),
            position: 0,
        })
    }

    fn file(&self) -> Result<&File, Error> {
        self.file
            .as_ref()
            .ok_or_else(|| closed("file channel").with_path(&self.path))
    }

    fn io_err(&self, err: io::Error) -> Error {
        Error::io(err).with_path(&self.path)
    }
}

impl BufferChannel for BufferChannelFile {
    fn duplicate(&self) -> Result<Box<dyn BufferChannel>, Error> {
        self.file()?;
        Ok(Box::new(BufferChannelFile::open(&self.path)?))
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn set_position(&mut self, pos: u64) {
        self.position = pos;
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let n = self.read_at(buf, self.position)?;
        self.position += n as u64;
        Ok(n)
    }

    fn read_at(&mut self, buf: &mut [u8], pos: u64) -> Result<usize, Error> {
        let file = self.file()?;
        read_fully_at(file, buf, pos).map_err(|err| self.io_err(err).with_offset(pos))
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        let n = self.write_at(buf, self.position)?;
        self.position += n as u64;
        Ok(n)
    }

    fn write_at(&mut self, buf: &[u8], pos: u64) -> Result<usize, Error> {
        let file = self.file()?;
        write_all_at(file, buf, pos).map_err(|err| self.io_err(err).with_offset(pos))?;
        Ok(buf.len())
    }

    fn truncate(&mut self, len: u64) -> Result<(), Error> {
        let size = self.size()?;
        if len < size {
            let file = self.file()?;
            file.set_len(len).map_err(|err| self.io_err(err))?;
        }
        if self.position > len {
            self.position = len;
        }
        Ok(())
    }

    fn size(&self) -> Result<u64, Error> {
        let file = self.file()?;
        file.metadata()
            .map(|meta| meta.len())
            .map_err(|err| self.io_err(err))
    }

    fn sync(&mut self) -> Result<(), Error> {
        let file = self.file()?;
        file.sync_data().map_err(|err| self.io_err(err))
    }

    fn close(&mut self) -> Result<(), Error> {
        if let Some(file) = self.file.take() {
            debug!(path = %self.path.display(), "closing file channel");
            file.sync_data().map_err(|err| self.io_err(err))?;
        }
        Ok(())
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn filename(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Fills `buf` from `pos` until it is full or the file ends.
pub(crate) fn read_fully_at(file: &File, buf: &mut [u8], pos: u64) -> io::Result<usize> {
    let mut done = 0;
    while done < buf.len() {
        match read_at(file, &mut buf[done..], pos + done as u64) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(done)
}

pub(crate) fn write_all_at(file: &File, buf: &[u8], pos: u64) -> io::Result<()> {
    let mut done = 0;
    while done < buf.len() {
        match write_at(file, &buf[done..], pos + done as u64) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => done += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], pos: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, pos)
}

#[cfg(unix)]
fn write_at(file: &File, buf: &[u8], pos: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.write_at(buf, pos)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], pos: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, pos)
}

#[cfg(windows)]
fn write_at(file: &File, buf: &[u8], pos: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_write(buf, pos)
}
