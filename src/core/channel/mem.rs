// Memory channel on a segmented buffer; writes past the end zero-fill the gap.
use std::path::Path;

use crate::core::channel::BufferChannel;
use crate::core::error::{closed, Error};
use crate::core::segmented::SegmentedBuffer;

pub struct BufferChannelMem {
    label: String,
    buffer: Option<SegmentedBuffer>,
    position: u64,
}

impl BufferChannelMem {
    pub fn create(label: impl Into<String>) -> Self {
        Self::with_buffer(label, SegmentedBuffer::new())
    }

    pub fn with_buffer(label: impl Into<String>, buffer: SegmentedBuffer) -> Self {
        Self {
            label: label.into(),
            buffer: Some(buffer),
            position: 0,
        }
    }

    fn buffer(&self) -> Result<&SegmentedBuffer, Error> {
        self.buffer.as_ref().ok_or_else(|| closed("memory channel"))
    }

    fn buffer_mut(&mut self) -> Result<&mut SegmentedBuffer, Error> {
        self.buffer.as_mut().ok_or_else(|| closed("memory channel"))
    }
}

impl BufferChannel for BufferChannelMem {
    fn duplicate(&self) -> Result<Box<dyn BufferChannel>, Error> {
        let buffer = self.buffer()?.clone();
        Ok(Box::new(BufferChannelMem::with_buffer(self.label.clone(), buffer)))
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
        let buffer = self.buffer()?;
        if pos >= buffer.len() {
            return Ok(0);
        }
        buffer.read(pos, buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        let n = self.write_at(buf, self.position)?;
        self.position += n as u64;
        Ok(n)
    }

    fn write_at(&mut self, buf: &[u8], pos: u64) -> Result<usize, Error> {
        let buffer = self.buffer_mut()?;
        let len = buffer.len();
        if pos > len {
            let gap = vec![0u8; (pos - len) as usize];
            buffer.write(len, &gap)?;
        }
        buffer.write(pos, buf)?;
        Ok(buf.len())
    }

    fn truncate(&mut self, len: u64) -> Result<(), Error> {
        self.buffer_mut()?.truncate(len);
        if self.position > len {
            self.position = len;
        }
        Ok(())
    }

    fn size(&self) -> Result<u64, Error> {
        Ok(self.buffer()?.len())
    }

    fn sync(&mut self) -> Result<(), Error> {
        self.buffer()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        self.buffer = None;
        Ok(())
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn filename(&self) -> Option<&Path> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::BufferChannelMem;
    use crate::core::channel::BufferChannel;
    use crate::core::error::ErrorKind;
    use crate::core::segmented::SegmentedBuffer;

    #[test]
    fn write_past_end_zero_fills() {
        let mut chan = BufferChannelMem::with_buffer("mem", SegmentedBuffer::with_chunk_size(8));
        chan.write_at(b"xy", 10).expect("write_at");
        assert_eq!(chan.size().expect("size"), 12);
        let mut buf = [0xFFu8; 12];
        chan.read_at(&mut buf, 0).expect("read");
        assert_eq!(&buf[..10], &[0u8; 10]);
        assert_eq!(&buf[10..], b"xy");
    }

    #[test]
    fn duplicate_is_independent() {
        let mut chan = BufferChannelMem::create("mem");
        chan.write(b"before").expect("write");
        let mut dup = chan.duplicate().expect("duplicate");
        chan.write_at(b"AFTER!", 0).expect("overwrite");
        let mut buf = [0u8; 6];
        dup.read_at(&mut buf, 0).expect("read dup");
        assert_eq!(&buf, b"before");
    }

    #[test]
    fn read_beyond_end_returns_zero() {
        let mut chan = BufferChannelMem::create("mem");
        chan.write(b"abc").expect("write");
        let mut buf = [0u8; 4];
        assert_eq!(chan.read_at(&mut buf, 3).expect("at end"), 0);
        assert_eq!(chan.read_at(&mut buf, 99).expect("past end"), 0);
    }

    #[test]
    fn close_discards_content() {
        let mut chan = BufferChannelMem::create("mem");
        chan.write(b"abc").expect("write");
        chan.close().expect("close");
        assert_eq!(chan.size().expect_err("closed").kind(), ErrorKind::Closed);
        assert!(chan.filename().is_none());
    }
}
