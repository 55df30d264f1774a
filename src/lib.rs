//! Purpose: Block-addressed and append-only binary storage for a triple-store engine.
//! Exports: `core` (block stores, binary data files, channels, segmented buffers, process lock,
//! errors, options) and `logging`.
//! Role: Linked-in substrate; index structures and transactions live in the crates above it.
//! Invariants: No operation is asynchronous; every call runs to completion or returns an error.
//! Invariants: Errors propagate to the immediate caller; nothing here retries.
pub mod core;
pub mod logging;
