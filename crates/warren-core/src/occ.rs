//! Optimistic concurrency control primitives
//!
//! A state entry carries an [`ETag`]. Writers read the value together with its
//! ETag and hand the ETag back on write; the store applies the write only if
//! the ETag is still current.
//!
//! # Invariants
//! - A write carrying a stale ETag fails without being applied
//! - The ETag changes atomically with every successful write
//! - ETags issued by one store are strictly increasing, so a token is never
//!   reused for a key, even after the key is deleted and written again

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// ETag
// =============================================================================

/// Concurrency token for a state entry
///
/// Opaque to callers; internally a store-wide revision number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ETag(u64);

impl ETag {
    /// Revision before any write has happened
    pub const INITIAL: Self = ETag(0);

    /// Create an ETag from a raw revision
    pub const fn new(revision: u64) -> Self {
        ETag(revision)
    }

    /// Get the raw revision number
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// The revision that follows this one
    pub fn next(&self) -> Self {
        ETag(self.0.saturating_add(1))
    }

    /// Check if this token is older than `current`
    pub fn is_stale(&self, current: &ETag) -> bool {
        self.0 < current.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W/\"{}\"", self.0)
    }
}

impl From<u64> for ETag {
    fn from(revision: u64) -> Self {
        ETag(revision)
    }
}

// =============================================================================
// OCC Result
// =============================================================================

/// Result of a conditional write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OccResult<T> {
    /// Write applied
    Success(T),
    /// The stored ETag no longer matches the expected one; nothing was written
    ///
    /// `None` means "absent": either the caller expected no entry, or the
    /// entry no longer exists.
    VersionConflict {
        expected: Option<ETag>,
        current: Option<ETag>,
    },
}

impl<T> OccResult<T> {
    /// Check if the write was applied
    pub fn is_success(&self) -> bool {
        matches!(self, OccResult::Success(_))
    }

    /// Check if the write lost a race
    pub fn is_conflict(&self) -> bool {
        matches!(self, OccResult::VersionConflict { .. })
    }

    /// Convert to Option, returning Some on success
    pub fn ok(self) -> Option<T> {
        match self {
            OccResult::Success(v) => Some(v),
            OccResult::VersionConflict { .. } => None,
        }
    }

    /// Convert into a `Result`, mapping a conflict to `Error::ConcurrencyConflict`
    pub fn into_result(self, key: impl fmt::Display) -> crate::error::Result<T> {
        match self {
            OccResult::Success(v) => Ok(v),
            OccResult::VersionConflict { expected, current } => Err(Error::ConcurrencyConflict {
                key: key.to_string(),
                expected: describe(expected),
                current: describe(current),
            }),
        }
    }
}

fn describe(etag: Option<ETag>) -> String {
    etag.map(|e| e.to_string())
        .unwrap_or_else(|| "absent".to_string())
}

// =============================================================================
// Versioned Value
// =============================================================================

/// A value with the ETag it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    /// The value
    pub value: T,
    /// The ETag when this value was read
    pub etag: ETag,
}

impl<T> Versioned<T> {
    /// Create a new versioned value
    pub fn new(value: T, etag: ETag) -> Self {
        Versioned { value, etag }
    }

    /// Map the inner value
    pub fn map<U, F>(self, f: F) -> Versioned<U>
    where
        F: FnOnce(T) -> U,
    {
        Versioned {
            value: f(self.value),
            etag: self.etag,
        }
    }

    /// Map the inner value with a fallible function
    pub fn try_map<U, E, F>(self, f: F) -> std::result::Result<Versioned<U>, E>
    where
        F: FnOnce(T) -> std::result::Result<U, E>,
    {
        Ok(Versioned {
            value: f(self.value)?,
            etag: self.etag,
        })
    }
}
