//! Warren Storage
//!
//! State and reminder persistence for Warren virtual actors.
//!
//! # Overview
//!
//! Two traits describe what the runtime needs from a backend:
//! - [`StateStore`]: keyed state with ETag optimistic concurrency
//! - [`ReminderStore`]: durable reminder records
//!
//! Backends:
//! - [`MemoryStore`]: in-memory, with fault injection for tests
//! - [`FileStore`]: JSON snapshot in a data directory, survives restarts

pub mod file;
pub mod kv;
pub mod memory;

pub use file::FileStore;
pub use kv::{validate_write, ReminderStore, StateKey, StateStore};
pub use memory::MemoryStore;
