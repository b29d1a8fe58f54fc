//! Per-activation actor context
//!
//! TigerStyle: Every side effect an actor can have goes through here.
//!
//! The context is handed to every hook and turn of one activation. It scopes
//! state access to the actor's identity, forwards reminder calls to the shared
//! scheduler, and owns the activation's timer table.

use crate::activation::ActivationState;
use crate::reminders::ReminderScheduler;
use crate::timers::TimerTable;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use warren_core::{
    ActorId, ETag, Error, OccResult, Reminder, Result, Schedule, TimeProvider, Versioned,
};
use warren_storage::{StateKey, StateStore};

/// Context for one actor activation
pub struct ActorContext {
    id: ActorId,
    lifecycle: ActivationState,
    store: Arc<dyn StateStore>,
    store_name: String,
    reminders: ReminderScheduler,
    timers: TimerTable,
    methods: Arc<HashSet<String>>,
    time: Arc<dyn TimeProvider>,
}

impl std::fmt::Debug for ActorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorContext")
            .field("id", &self.id)
            .field("lifecycle", &self.lifecycle)
            .field("store_name", &self.store_name)
            .field("timers", &self.timers.len())
            .finish()
    }
}

impl ActorContext {
    /// Create a context for `id`
    pub fn new(
        id: ActorId,
        store: Arc<dyn StateStore>,
        store_name: impl Into<String>,
        reminders: ReminderScheduler,
        methods: Arc<HashSet<String>>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            id,
            lifecycle: ActivationState::Inactive,
            store,
            store_name: store_name.into(),
            reminders,
            timers: TimerTable::new(),
            methods,
            time,
        }
    }

    /// The actor's identity
    pub fn id(&self) -> &ActorId {
        &self.id
    }

    /// Current lifecycle state of this activation
    pub fn lifecycle(&self) -> ActivationState {
        self.lifecycle
    }

    /// Current wall-clock time
    pub fn now_ms(&self) -> u64 {
        self.time.now_ms()
    }

    /// Name of the state store this actor writes to
    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Key of a named state entry owned by this actor
    pub fn state_key(&self, name: &str) -> StateKey {
        StateKey::new(self.store_name.clone(), self.id.clone(), name)
    }

    /// The underlying store, for reads outside this actor's scope
    pub fn state_store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Read a state entry with its ETag
    pub async fn get_state(&self, name: &str) -> Result<Option<Versioned<Bytes>>> {
        self.store.get(&self.state_key(name)).await
    }

    /// Read and decode a JSON state entry
    pub async fn get_state_json<T: DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<Option<Versioned<T>>> {
        match self.get_state(name).await? {
            Some(versioned) => {
                let decoded = versioned.try_map(|bytes| {
                    serde_json::from_slice(&bytes).map_err(|e| Error::DeserializationFailed {
                        reason: format!("state {}: {}", name, e),
                    })
                })?;
                Ok(Some(decoded))
            }
            None => Ok(None),
        }
    }

    /// Conditional write; `expected = None` requires the entry to be absent
    pub async fn try_save_state(
        &self,
        name: &str,
        value: Bytes,
        expected: Option<ETag>,
    ) -> Result<OccResult<ETag>> {
        let result = self
            .store
            .try_save(&self.state_key(name), value, expected)
            .await?;
        if let OccResult::VersionConflict { expected, current } = &result {
            debug!(
                actor_id = %self.id,
                state = name,
                expected = ?expected,
                current = ?current,
                "State write rejected on ETag mismatch"
            );
        }
        Ok(result)
    }

    /// Encode as JSON and write conditionally
    pub async fn try_save_state_json<T: Serialize>(
        &self,
        name: &str,
        value: &T,
        expected: Option<ETag>,
    ) -> Result<OccResult<ETag>> {
        let bytes = encode_json(name, value)?;
        self.try_save_state(name, bytes, expected).await
    }

    /// Unconditional write
    pub async fn set_state(&self, name: &str, value: Bytes) -> Result<ETag> {
        self.store.set(&self.state_key(name), value).await
    }

    /// Encode as JSON and write unconditionally
    pub async fn set_state_json<T: Serialize>(&self, name: &str, value: &T) -> Result<ETag> {
        let bytes = encode_json(name, value)?;
        self.set_state(name, bytes).await
    }

    /// Remove a state entry; no-op if absent
    pub async fn delete_state(&self, name: &str) -> Result<()> {
        self.store.delete(&self.state_key(name)).await
    }

    // =========================================================================
    // Reminders
    // =========================================================================

    /// Register or replace a durable reminder on this actor
    pub async fn register_reminder(
        &self,
        name: &str,
        schedule: Schedule,
        payload: Bytes,
    ) -> Result<Reminder> {
        self.reminders
            .register(&self.id, name, schedule, payload)
            .await
    }

    /// Remove a reminder; no-op if absent
    pub async fn unregister_reminder(&self, name: &str) -> Result<()> {
        self.reminders.unregister(&self.id, name).await
    }

    /// Read a reminder registration
    pub async fn get_reminder(&self, name: &str) -> Result<Option<Reminder>> {
        self.reminders.get(&self.id, name).await
    }

    // =========================================================================
    // Timers
    // =========================================================================

    /// Register or replace a timer that invokes `callback` on this activation
    ///
    /// Allowed while activating or active. `callback` must be one of the
    /// actor type's methods or timer callbacks.
    pub fn register_timer(
        &mut self,
        name: &str,
        schedule: Schedule,
        callback: &str,
        payload: Bytes,
    ) -> Result<()> {
        self.require_timer_access()?;
        if !self.methods.contains(callback) {
            return Err(Error::no_such_method(self.id.actor_type(), callback));
        }

        let now_ms = self.time.now_ms();
        self.timers
            .register(name, schedule, callback, payload, now_ms)?;
        debug!(actor_id = %self.id, timer = name, callback, "Timer registered");
        Ok(())
    }

    /// Remove a timer; no-op if absent
    pub fn unregister_timer(&mut self, name: &str) -> Result<()> {
        self.require_timer_access()?;
        if self.timers.unregister(name) {
            debug!(actor_id = %self.id, timer = name, "Timer unregistered");
        }
        Ok(())
    }

    /// Check if a timer is registered
    pub fn has_timer(&self, name: &str) -> bool {
        self.timers.get(name).is_some()
    }

    /// Number of registered timers
    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    fn require_timer_access(&self) -> Result<()> {
        match self.lifecycle {
            ActivationState::Activating | ActivationState::Active => Ok(()),
            ActivationState::Inactive | ActivationState::Deactivating => {
                Err(Error::ActorNotActive {
                    id: self.id.to_string(),
                })
            }
        }
    }

    pub(crate) fn set_lifecycle(&mut self, state: ActivationState) {
        debug_assert!(
            self.lifecycle.can_transition_to(state),
            "invalid transition {} -> {}",
            self.lifecycle,
            state
        );
        self.lifecycle = state;
    }

    pub(crate) fn timers_mut(&mut self) -> &mut TimerTable {
        &mut self.timers
    }

    pub(crate) fn timers(&self) -> &TimerTable {
        &self.timers
    }
}

fn encode_json<T: Serialize>(name: &str, value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| Error::SerializationFailed {
            reason: format!("state {}: {}", name, e),
        })
}
