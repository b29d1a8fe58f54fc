//! Error types for Warren
//!
//! Explicit error variants with context, using thiserror.

use thiserror::Error;

/// Result type alias for Warren operations
pub type Result<T> = std::result::Result<T, Error>;

/// Warren error types
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Routing Errors
    // =========================================================================
    #[error("Unknown actor type: {actor_type}")]
    UnknownActorType { actor_type: String },

    #[error("No such method: {actor_type}.{method}")]
    NoSuchMethod { actor_type: String, method: String },

    // =========================================================================
    // Actor Errors
    // =========================================================================
    #[error("Actor activation failed: {id}, reason: {reason}")]
    ActorActivationFailed { id: String, reason: String },

    #[error("Actor not active: {id}")]
    ActorNotActive { id: String },

    #[error("Actor invocation failed: {id}, method: {method}, reason: {reason}")]
    ActorInvocationFailed {
        id: String,
        method: String,
        reason: String,
    },

    #[error("Actor mailbox full: {id}, depth: {depth}, max: {max}")]
    ActorMailboxFull {
        id: String,
        depth: usize,
        max: usize,
    },

    #[error("Actor capacity exceeded: {count} active actors, max: {max}")]
    ActorCapacityExceeded { count: usize, max: usize },

    #[error("Operation timed out: {operation} after {timeout_ms}ms")]
    OperationTimedOut { operation: String, timeout_ms: u64 },

    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Invalid actor ID: {id}, reason: {reason}")]
    InvalidActorId { id: String, reason: String },

    #[error("Actor ID too long: {length} bytes exceeds limit of {limit} bytes")]
    ActorIdTooLong { length: usize, limit: usize },

    #[error("Message too large: {size} bytes exceeds limit of {limit} bytes")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("Invalid schedule: {name}, reason: {reason}")]
    InvalidSchedule { name: String, reason: String },

    // =========================================================================
    // Storage Errors
    // =========================================================================
    #[error("Concurrency conflict: {key}, expected {expected}, current {current}")]
    ConcurrencyConflict {
        key: String,
        expected: String,
        current: String,
    },

    #[error("State store unavailable: {store}, reason: {reason}")]
    StoreUnavailable { store: String, reason: String },

    #[error("State value too large: {size} bytes exceeds limit of {limit} bytes")]
    StateTooLarge { size: usize, limit: usize },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Runtime is shut down")]
    RuntimeShutdown,

    #[error("Internal error: {reason}")]
    Internal { reason: String },

    #[error("Serialization failed: {reason}")]
    SerializationFailed { reason: String },

    #[error("Deserialization failed: {reason}")]
    DeserializationFailed { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an unknown actor type error
    pub fn unknown_actor_type(actor_type: impl Into<String>) -> Self {
        Self::UnknownActorType {
            actor_type: actor_type.into(),
        }
    }

    /// Create a no such method error
    pub fn no_such_method(actor_type: impl Into<String>, method: impl Into<String>) -> Self {
        Self::NoSuchMethod {
            actor_type: actor_type.into(),
            method: method.into(),
        }
    }

    /// Create an actor invocation failed error
    pub fn invocation_failed(
        id: impl Into<String>,
        method: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ActorInvocationFailed {
            id: id.into(),
            method: method.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid schedule error
    pub fn invalid_schedule(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSchedule {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a store unavailable error
    pub fn store_unavailable(store: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            store: store.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Check if this error is retriable by the caller
    ///
    /// The runtime itself never retries.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. }
                | Self::StoreUnavailable { .. }
                | Self::ActorMailboxFull { .. }
                | Self::OperationTimedOut { .. }
        )
    }

    /// Check if this error is caused by the caller's request
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownActorType { .. }
                | Self::NoSuchMethod { .. }
                | Self::InvalidActorId { .. }
                | Self::ActorIdTooLong { .. }
                | Self::MessageTooLarge { .. }
                | Self::InvalidSchedule { .. }
        )
    }
}
