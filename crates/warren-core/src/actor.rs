//! Actor identities for Warren
//!
//! TigerStyle: Explicit types, assertions, bounded operations.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

// =============================================================================
// ActorId
// =============================================================================

/// Unique identifier for an actor
///
/// An actor is addressed by its registered type name and an id unique within
/// that type. The runtime keeps at most one live instance per `ActorId`.
///
/// # TigerStyle
/// - Explicit validation on construction
/// - Immutable after creation
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ActorId {
    actor_type: String,
    id: String,
}

impl ActorId {
    /// Create a new ActorId with validation
    ///
    /// # Errors
    /// Returns error if either part is empty, exceeds its length limit, or
    /// contains characters other than alphanumerics, `-`, `_` and `.`.
    pub fn new(actor_type: impl Into<String>, id: impl Into<String>) -> Result<Self> {
        let actor_type = actor_type.into();
        let id = id.into();

        if actor_type.is_empty() || id.is_empty() {
            return Err(Error::InvalidActorId {
                id: format!("{}:{}", actor_type, id),
                reason: "actor type and id must not be empty".into(),
            });
        }

        if actor_type.len() > ACTOR_TYPE_LENGTH_BYTES_MAX {
            return Err(Error::InvalidActorId {
                id: format!("{}:{}", actor_type, id),
                reason: format!(
                    "actor type length {} exceeds limit {}",
                    actor_type.len(),
                    ACTOR_TYPE_LENGTH_BYTES_MAX
                ),
            });
        }

        if id.len() > ACTOR_ID_LENGTH_BYTES_MAX {
            return Err(Error::ActorIdTooLong {
                length: id.len(),
                limit: ACTOR_ID_LENGTH_BYTES_MAX,
            });
        }

        if !is_valid_name(&actor_type) {
            return Err(Error::InvalidActorId {
                id: format!("{}:{}", actor_type, id),
                reason: "actor type contains invalid characters".into(),
            });
        }

        if !is_valid_name(&id) {
            return Err(Error::InvalidActorId {
                id: format!("{}:{}", actor_type, id),
                reason: "id contains invalid characters".into(),
            });
        }

        Ok(Self { actor_type, id })
    }

    /// Get the actor type name
    pub fn actor_type(&self) -> &str {
        &self.actor_type
    }

    /// Get the id within the actor type
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the full qualified name (type:id)
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.actor_type, self.id)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.actor_type, self.id)
    }
}

/// Check a name for the allowed character set: alphanumerics, `-`, `_`, `.`
pub fn is_valid_name(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
}
