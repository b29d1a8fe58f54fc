//! Main runtime coordinator
//!
//! TigerStyle: Single entry point, explicit configuration, clean shutdown.

use crate::actor::Actor;
use crate::activation::ActivationState;
use crate::dispatcher::{Dispatcher, DispatcherConfig, DispatcherHandle, RuntimeEvent};
use crate::handle::ActorHandle;
use crate::registry::ActorTypeRegistry;
use crate::reminders::ReminderScheduler;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use warren_core::{ActorConfig, ActorId, Error, Result, TimeProvider, WallClockTime};
use warren_storage::{ReminderStore, StateStore};

/// Builder for creating a runtime
pub struct RuntimeBuilder {
    registry: ActorTypeRegistry,
    state_store: Option<Arc<dyn StateStore>>,
    reminder_store: Option<Arc<dyn ReminderStore>>,
    time: Option<Arc<dyn TimeProvider>>,
    config: DispatcherConfig,
    /// First registration error, reported by `build`
    error: Option<Error>,
}

impl RuntimeBuilder {
    /// Create a new runtime builder
    pub fn new() -> Self {
        Self {
            registry: ActorTypeRegistry::new(),
            state_store: None,
            reminder_store: None,
            time: None,
            config: DispatcherConfig::default(),
            error: None,
        }
    }

    /// Register an actor type instantiated by cloning `prototype`
    pub fn register_actor<A: Actor + Clone + Sync>(
        mut self,
        actor_type: impl Into<String>,
        prototype: A,
    ) -> Self {
        if let Err(e) = self.registry.register_clone(actor_type, prototype) {
            self.error.get_or_insert(e);
        }
        self
    }

    /// Set the state store
    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    /// Set the reminder store
    pub fn with_reminder_store(mut self, store: Arc<dyn ReminderStore>) -> Self {
        self.reminder_store = Some(store);
        self
    }

    /// Use one backend for both state and reminders
    pub fn with_store<S>(self, store: Arc<S>) -> Self
    where
        S: StateStore + ReminderStore + 'static,
    {
        self.with_state_store(store.clone())
            .with_reminder_store(store)
    }

    /// Set the time provider (defaults to the wall clock)
    pub fn with_time(mut self, time: Arc<dyn TimeProvider>) -> Self {
        self.time = Some(time);
        self
    }

    /// Apply actor configuration
    pub fn with_config(mut self, config: &ActorConfig) -> Self {
        self.config = DispatcherConfig::from(config);
        self
    }

    /// Set the dispatcher configuration directly
    pub fn with_dispatcher_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the runtime
    pub fn build(self) -> Result<Runtime> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let state_store = self.state_store.ok_or_else(|| Error::InvalidConfiguration {
            field: "state_store".into(),
            reason: "a state store is required".into(),
        })?;
        let reminder_store = self
            .reminder_store
            .ok_or_else(|| Error::InvalidConfiguration {
                field: "reminder_store".into(),
                reason: "a reminder store is required".into(),
            })?;
        if self.registry.is_empty() {
            return Err(Error::InvalidConfiguration {
                field: "actor_types".into(),
                reason: "at least one actor type must be registered".into(),
            });
        }
        self.config.validate()?;

        let time = self.time.unwrap_or_else(WallClockTime::shared);
        let reminders = ReminderScheduler::new(reminder_store, time.clone());
        let dispatcher = Dispatcher::new(
            self.registry,
            state_store,
            reminders.clone(),
            time,
            self.config,
        );
        let handle = dispatcher.handle();

        Ok(Runtime {
            dispatcher,
            handle,
            reminders,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The main Warren runtime
///
/// Ties the dispatcher to the reminder scheduler. Calls work as soon as the
/// runtime is built; reminders are delivered once `start` has run.
///
/// A runtime is single-use: once stopped it cannot be started again. Build a
/// new one over the same stores to resume.
pub struct Runtime {
    dispatcher: Dispatcher,
    handle: DispatcherHandle,
    reminders: ReminderScheduler,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl Runtime {
    /// Load stored reminders and begin delivering them
    pub async fn start(&self) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::RuntimeShutdown);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::internal("runtime already started"));
        }

        info!(
            actor_types = self.handle.registry().len(),
            "Starting Warren runtime"
        );
        if let Err(e) = self
            .reminders
            .start(Arc::new(self.handle.clone()))
            .await
        {
            self.started.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    /// Stop delivering reminders, then deactivate every actor
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping Warren runtime");
        self.stopped.store(true, Ordering::SeqCst);
        self.reminders.shutdown().await;
        self.dispatcher.shutdown().await;
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Check if reminders are being delivered
    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && self.reminders.is_running()
    }

    /// Get a handle to the dispatcher
    pub fn dispatcher_handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }

    /// Get a handle to a specific actor
    pub fn actor(&self, actor_id: ActorId) -> ActorHandle {
        ActorHandle::new(actor_id, self.handle.clone())
    }

    /// Get a handle to a specific actor by type and id
    pub fn actor_by_parts(
        &self,
        actor_type: impl Into<String>,
        id: impl Into<String>,
    ) -> Result<ActorHandle> {
        let actor_id = ActorId::new(actor_type, id)?;
        Ok(self.actor(actor_id))
    }

    /// Invoke a method by type name and id
    pub async fn invoke(
        &self,
        actor_type: &str,
        id: &str,
        method: &str,
        payload: Bytes,
    ) -> Result<Bytes> {
        self.handle.invoke_parts(actor_type, id, method, payload).await
    }

    /// Subscribe to lifecycle and scheduling events
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.handle.subscribe()
    }

    /// Current lifecycle state of an actor
    pub fn activation_state(&self, actor_id: &ActorId) -> ActivationState {
        self.handle.activation_state(actor_id)
    }

    /// Number of actors currently `Active`
    pub fn active_actor_count(&self) -> usize {
        self.handle.active_actor_count()
    }

    /// The reminder scheduler
    pub fn reminders(&self) -> &ReminderScheduler {
        &self.reminders
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        // Can't await in drop, so the reminder loop is aborted
        self.reminders.abort();
    }
}
