// Storage primitives: blocks, binary data files, channels, buffers and the process lock.
pub mod binary_data;
pub mod block;
pub mod block_access;
pub mod channel;
pub mod config;
pub mod error;
pub mod file_factory;
pub mod file_set;
pub mod lock;
pub mod segmented;
