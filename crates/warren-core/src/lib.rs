//! Warren Core
//!
//! Core types, errors, and constants for the Warren virtual actor runtime.
//!
//! # Overview
//!
//! Warren is a single-process virtual actor runtime. Callers address actors by
//! identity; the runtime activates an instance on first use, runs every call
//! for that identity as a serialized turn, deactivates idle instances, and
//! delivers durable reminders and ephemeral timers as turns.
//!
//! # TigerStyle
//!
//! - Explicit limits with big-endian naming (e.g., `ACTOR_ID_LENGTH_BYTES_MAX`)
//! - Validation at construction, assertions on internal preconditions
//! - Errors are values; nothing in the core retries on its own

pub mod actor;
pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod occ;
pub mod schedule;
pub mod telemetry;

pub use actor::{is_valid_name, ActorId};
pub use config::{ActorConfig, ServerConfig, StorageBackend, StorageConfig, WarrenConfig};
pub use constants::*;
pub use error::{Error, Result};
pub use io::{TimeProvider, WallClockTime};
pub use occ::{ETag, OccResult, Versioned};
pub use schedule::{Reminder, ReminderFired, Schedule};
pub use telemetry::{init_telemetry, TelemetryConfig};
