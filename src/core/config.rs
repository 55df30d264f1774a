//! Purpose: Tunables shared by every storage variant (block size, buffer sizes, byte order).
//! Exports: `StorageOptions`, `ByteOrder`, default size constants.
//! Role: Passed to the file factory and to constructors that need sizing decisions.
//! Invariants: All sizes are non-zero after `validate`; defaults match the on-disk convention.
//! Invariants: JSON input may omit any field; omitted fields take the defaults below.

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_BLOCK_SIZE: usize = 8 * 1024;
pub const DEFAULT_SEGMENT_SIZE: usize = 1024 * 1024;
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 128 * 1024;
pub const DEFAULT_MAPPED_SEGMENT_SIZE: usize = 8 * 1024 * 1024;

/// Byte order tag carried by every block buffer. Content is never reinterpreted;
/// the tag only has to agree with the store it is written to.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    #[default]
    BigEndian,
    LittleEndian,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    pub block_size: usize,
    pub segment_size: usize,
    pub write_buffer_size: usize,
    pub byte_order: ByteOrder,
    pub safe_mode: bool,
    pub mapped: bool,
    pub mapped_segment_size: usize,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            segment_size: DEFAULT_SEGMENT_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            byte_order: ByteOrder::BigEndian,
            safe_mode: true,
            mapped: false,
            mapped_segment_size: DEFAULT_MAPPED_SEGMENT_SIZE,
        }
    }
}

impl StorageOptions {
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn from_json_str(input: &str) -> Result<Self, Error> {
        let options: StorageOptions = serde_json::from_str(input).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid storage options")
                .with_source(err)
        })?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let sizes = [
            ("block_size", self.block_size),
            ("segment_size", self.segment_size),
            ("write_buffer_size", self.write_buffer_size),
            ("mapped_segment_size", self.mapped_segment_size),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("{name} must be non-zero")));
            }
        }
        if self.mapped_segment_size % self.block_size != 0 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("mapped_segment_size must be a multiple of block_size"));
        }
        Ok(())
    }
}
