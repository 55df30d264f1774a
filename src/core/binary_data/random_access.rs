// Unbuffered disk file. One OS file cursor serves both appends and random reads,
// so the cursor is tracked as an explicit mode and re-seeked on every switch.
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::binary_data::BinaryDataFile;
use crate::core::error::{closed, Error};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum CursorMode {
    Reading,
    Writing,
    // OS cursor position unknown after a failed write; the next switch re-seeks.
    Detached,
}

struct OpenFile {
    file: File,
    mode: CursorMode,
    read_pos: u64,
    write_pos: u64,
}

impl OpenFile {
    /// Moves the OS cursor to the position owned by `mode`.
    fn switch_to(&mut self, mode: CursorMode) -> io::Result<()> {
        if self.mode == mode {
            return Ok(());
        }
        let target = match mode {
            CursorMode::Reading => self.read_pos,
            CursorMode::Writing => self.write_pos,
            CursorMode::Detached => return Ok(()),
        };
        self.file.seek(SeekFrom::Start(target))?;
        self.mode = mode;
        Ok(())
    }

    fn read(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.switch_to(CursorMode::Reading)?;
        if self.read_pos != pos {
            self.file.seek(SeekFrom::Start(pos))?;
            self.read_pos = pos;
        }
        let mut done = 0;
        while done < buf.len() {
            match self.file.read(&mut buf[done..]) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.read_pos += done as u64;
                    return Err(err);
                }
            }
        }
        self.read_pos += done as u64;
        Ok(done)
    }

    fn append(&mut self, buf: &[u8]) -> io::Result<u64> {
        self.switch_to(CursorMode::Writing)?;
        let offset = self.write_pos;
        if let Err(err) = self.file.write_all(buf) {
            self.abandon_partial_write();
            return Err(err);
        }
        self.write_pos += buf.len() as u64;
        Ok(offset)
    }

    /// Drops whatever part of a failed append reached the file so the next
    /// append lands at the offset it reports.
    fn abandon_partial_write(&mut self) {
        self.mode = CursorMode::Detached;
        if let Err(err) = self.file.set_len(self.write_pos) {
            warn!(error = %err, len = self.write_pos, "failed to drop partial append");
        }
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        if len >= self.write_pos {
            return Ok(());
        }
        self.file.set_len(len)?;
        self.write_pos = len;
        self.read_pos = self.read_pos.min(len);
        let target = match self.mode {
            CursorMode::Reading => self.read_pos,
            CursorMode::Writing => self.write_pos,
            CursorMode::Detached => return Ok(()),
        };
        self.file.seek(SeekFrom::Start(target))?;
        Ok(())
    }
}

pub struct BinaryDataFileRandomAccess {
    path: PathBuf,
    state: RefCell<Option<OpenFile>>,
}

impl BinaryDataFileRandomAccess {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: RefCell::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_file<T>(&self, op: impl FnOnce(&mut OpenFile) -> io::Result<T>) -> Result<T, Error> {
        let mut state = self.state.borrow_mut();
        let file = state
            .as_mut()
            .ok_or_else(|| closed("binary data file").with_path(&self.path))?;
        op(file).map_err(|err| Error::io(err).with_path(&self.path))
    }
}

impl BinaryDataFile for BinaryDataFileRandomAccess {
    fn open(&self) -> Result<(), Error> {
        let mut state = self.state.borrow_mut();
        if state.is_some() {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|err| Error::io(err).with_path(&self.path))?;
        let len = file
            .seek(SeekFrom::End(0))
            .map_err(|err| Error::io(err).with_path(&self.path))?;
        debug!(path = %self.path.display(), len, "opened binary data file");
        *state = Some(OpenFile {
            file,
            mode: CursorMode::Writing,
            read_pos: 0,
            write_pos: len,
        });
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.borrow().is_some()
    }

    fn read(&self, pos: u64, buf: &mut [u8]) -> Result<usize, Error> {
        self.with_file(|file| file.read(pos, buf))
            .map_err(|err| err.with_offset(pos))
    }

    fn write(&self, buf: &[u8]) -> Result<u64, Error> {
        self.with_file(|file| file.append(buf))
    }

    fn length(&self) -> Result<u64, Error> {
        self.with_file(|file| Ok(file.write_pos))
    }

    fn truncate(&self, len: u64) -> Result<(), Error> {
        debug!(path = %self.path.display(), len, "truncating binary data file");
        self.with_file(|file| file.truncate(len))
    }

    fn sync(&self) -> Result<(), Error> {
        self.with_file(|file| file.file.sync_data())
    }

    fn close(&self) -> Result<(), Error> {
        let Some(open) = self.state.borrow_mut().take() else {
            return Ok(());
        };
        debug!(path = %self.path.display(), len = open.write_pos, "closing binary data file");
        open.file
            .sync_data()
            .map_err(|err| Error::io(err).with_path(&self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::BinaryDataFileRandomAccess;
    use crate::core::binary_data::BinaryDataFile;
    use crate::core::error::ErrorKind;
    use std::io::Write;

    fn open_temp(dir: &tempfile::TempDir) -> BinaryDataFileRandomAccess {
        let file = BinaryDataFileRandomAccess::new(dir.path().join("data.dat"));
        file.open().expect("open");
        file
    }

    #[test]
    fn interleaved_reads_and_writes_hit_the_right_offsets() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = open_temp(&dir);
        assert_eq!(file.write(b"alpha").expect("write"), 0);
        let mut buf = [0u8; 3];
        file.read(1, &mut buf).expect("read");
        assert_eq!(&buf, b"lph");
        assert_eq!(file.write(b"beta").expect("write after read"), 5);
        file.read(0, &mut buf).expect("read after write");
        assert_eq!(&buf, b"alp");
        let mut tail = [0u8; 4];
        file.read(5, &mut tail).expect("read tail");
        assert_eq!(&tail, b"beta");
        assert_eq!(file.length().expect("length"), 9);
    }

    #[test]
    fn append_after_failed_write_lands_at_reported_offset() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = open_temp(&dir);
        file.write(b"alpha").expect("write");
        {
            let mut state = file.state.borrow_mut();
            let open = state.as_mut().expect("open state");
            // Bytes that reached the file before the write failed.
            open.file.write_all(b"partial").expect("stray bytes");
            open.abandon_partial_write();
        }
        assert_eq!(file.length().expect("length"), 5);
        assert_eq!(file.write(b"beta").expect("write after failure"), 5);
        let mut all = [0u8; 9];
        assert_eq!(file.read(0, &mut all).expect("read"), 9);
        assert_eq!(&all, b"alphabeta");
        let mut rest = [0u8; 4];
        assert_eq!(file.read(9, &mut rest).expect("read past end"), 0);
    }

    #[test]
    fn read_past_end_is_short() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = open_temp(&dir);
        file.write(b"12345").expect("write");
        let mut buf = [0u8; 10];
        assert_eq!(file.read(3, &mut buf).expect("read"), 2);
        assert_eq!(file.read(5, &mut buf).expect("read at end"), 0);
    }

    #[test]
    fn reopen_appends_after_existing_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = open_temp(&dir);
        file.write(b"first").expect("write");
        file.close().expect("close");
        assert!(!file.is_open());

        file.open().expect("reopen");
        assert_eq!(file.write(b"second").expect("write"), 5);
        assert_eq!(file.length().expect("length"), 11);
    }

    #[test]
    fn truncate_then_append_reuses_offsets() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = open_temp(&dir);
        file.write(b"0123456789").expect("write");
        let mut buf = [0u8; 2];
        file.read(8, &mut buf).expect("read");
        file.truncate(4).expect("truncate");
        assert_eq!(file.length().expect("length"), 4);
        assert_eq!(file.write(b"xy").expect("write"), 4);
        let mut all = [0u8; 6];
        file.read(0, &mut all).expect("read");
        assert_eq!(&all, b"0123xy");
        file.truncate(100).expect("truncate past end");
        assert_eq!(file.length().expect("length"), 6);
    }

    #[test]
    fn unopened_file_fails_fast() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = BinaryDataFileRandomAccess::new(dir.path().join("data.dat"));
        assert_eq!(file.write(b"x").expect_err("closed").kind(), ErrorKind::Closed);
        assert_eq!(file.length().expect_err("closed").kind(), ErrorKind::Closed);
        file.close().expect("closing an unopened file is a no-op");
    }
}
