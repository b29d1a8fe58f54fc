//! State and reminder store traits
//!
//! TigerStyle: Explicit operations, bounded sizes.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use warren_core::constants::{STATE_NAME_LENGTH_BYTES_MAX, STATE_VALUE_SIZE_BYTES_MAX};
use warren_core::{ActorId, ETag, Error, OccResult, Reminder, Result, Versioned};

// =============================================================================
// StateKey
// =============================================================================

/// Address of one state entry: (store, actor, name)
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct StateKey {
    /// Logical store name (e.g. "actorstore")
    pub store: String,
    /// Owning actor
    pub actor_id: ActorId,
    /// State name within the actor's partition
    pub name: String,
}

impl StateKey {
    /// Create a new state key
    pub fn new(store: impl Into<String>, actor_id: ActorId, name: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            actor_id,
            name: name.into(),
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.store, self.actor_id, self.name)
    }
}

/// Validate a write before it reaches a backend
pub fn validate_write(key: &StateKey, value: &[u8]) -> Result<()> {
    if key.name.is_empty() || key.name.len() > STATE_NAME_LENGTH_BYTES_MAX {
        return Err(Error::InvalidConfiguration {
            field: "state.name".into(),
            reason: format!(
                "state name length {} must be in 1..={}",
                key.name.len(),
                STATE_NAME_LENGTH_BYTES_MAX
            ),
        });
    }
    if value.len() > STATE_VALUE_SIZE_BYTES_MAX {
        return Err(Error::StateTooLarge {
            size: value.len(),
            limit: STATE_VALUE_SIZE_BYTES_MAX,
        });
    }
    Ok(())
}

// =============================================================================
// StateStore
// =============================================================================

/// Keyed state with ETag optimistic concurrency
///
/// Shared by all actors. The ETag protocol is the only mutation-safety
/// mechanism; backends lock only around the compare-and-write itself.
/// Backend failures surface as `Error::StoreUnavailable` and are never
/// retried here.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a value and its ETag; `None` if absent
    async fn get(&self, key: &StateKey) -> Result<Option<Versioned<Bytes>>>;

    /// Write only if the current ETag equals `expected`
    ///
    /// `expected = None` means the key must not exist yet. On mismatch nothing
    /// is written and `VersionConflict` is returned.
    async fn try_save(
        &self,
        key: &StateKey,
        value: Bytes,
        expected: Option<ETag>,
    ) -> Result<OccResult<ETag>>;

    /// Write unconditionally, returning the new ETag
    async fn set(&self, key: &StateKey, value: Bytes) -> Result<ETag>;

    /// Remove a key; no-op if absent
    async fn delete(&self, key: &StateKey) -> Result<()>;

    /// Check if a key exists
    async fn exists(&self, key: &StateKey) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

// =============================================================================
// ReminderStore
// =============================================================================

/// Durable reminder records, unique by (actor, name)
#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// Insert or replace a reminder
    async fn save_reminder(&self, reminder: &Reminder) -> Result<()>;

    /// Remove a reminder; no-op if absent
    async fn delete_reminder(&self, actor_id: &ActorId, name: &str) -> Result<()>;

    /// Read one reminder
    async fn get_reminder(&self, actor_id: &ActorId, name: &str) -> Result<Option<Reminder>>;

    /// Read every stored reminder
    async fn list_reminders(&self) -> Result<Vec<Reminder>>;
}
