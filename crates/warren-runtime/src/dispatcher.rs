//! Message dispatcher for actor runtime
//!
//! TigerStyle: Single-threaded per-actor execution, explicit message routing.
//!
//! Every live identity has exactly one worker task that owns its mailbox and,
//! while active, its instance. All turns for the identity (calls, reminder
//! deliveries, timer firings, deactivation) run on that task one at a time,
//! so an instance never sees two turns at once. Different identities run on
//! different tasks and proceed concurrently.
//!
//! A worker that is `Inactive` with an empty mailbox retires and removes its
//! slot. Retirement and enqueueing both happen under the slot lock, so a turn
//! is never pushed into a mailbox whose worker has already gone.

use crate::activation::{ActivationState, ActiveActor};
use crate::context::ActorContext;
use crate::mailbox::{self, Envelope, Mailbox, MailboxSender, PushError, Turn};
use crate::registry::{ActorType, ActorTypeRegistry};
use crate::reminders::{ReminderScheduler, ReminderTarget};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{debug, info, instrument, warn};
use warren_core::constants::{
    ACTOR_CONCURRENT_COUNT_MAX, ACTOR_IDLE_TIMEOUT_MS_DEFAULT, MAILBOX_DEPTH_DEFAULT,
    MAILBOX_DEPTH_MAX, MESSAGE_SIZE_BYTES_MAX, RUNTIME_EVENT_CHANNEL_CAPACITY,
    STATE_STORE_NAME_DEFAULT,
};
use warren_core::{ActorConfig, ActorId, Error, ReminderFired, Result, TimeProvider};
use warren_storage::StateStore;

// ============================================================================
// Dispatcher Config
// ============================================================================

/// Configuration for the dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum number of live actor workers
    pub max_actors: usize,
    /// Mailbox capacity per actor
    pub mailbox_depth: usize,
    /// Idle time after which an active actor is deactivated
    pub idle_timeout_ms: u64,
    /// State store name handed to actor contexts
    pub state_store_name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_actors: ACTOR_CONCURRENT_COUNT_MAX,
            mailbox_depth: MAILBOX_DEPTH_DEFAULT,
            idle_timeout_ms: ACTOR_IDLE_TIMEOUT_MS_DEFAULT,
            state_store_name: STATE_STORE_NAME_DEFAULT.to_string(),
        }
    }
}

impl From<&ActorConfig> for DispatcherConfig {
    fn from(config: &ActorConfig) -> Self {
        Self {
            max_actors: config.max_actors_count,
            mailbox_depth: config.mailbox_depth_max,
            idle_timeout_ms: config.idle_timeout_ms,
            state_store_name: config.state_store_name.clone(),
        }
    }
}

impl DispatcherConfig {
    /// Validate against the same ranges as [`ActorConfig`]
    pub fn validate(&self) -> Result<()> {
        ActorConfig {
            max_actors_count: self.max_actors,
            idle_timeout_ms: self.idle_timeout_ms,
            mailbox_depth_max: self.mailbox_depth,
            state_store_name: self.state_store_name.clone(),
        }
        .validate()
    }
}

// ============================================================================
// Runtime Events
// ============================================================================

/// Lifecycle and scheduling events, broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// An instance finished `on_activate`
    Activated { actor_id: ActorId },
    /// An instance finished deactivating
    Deactivated { actor_id: ActorId },
    /// `on_activate` failed
    ActivationFailed { actor_id: ActorId, reason: String },
    /// A reminder turn ran
    ReminderFired {
        actor_id: ActorId,
        name: String,
        due_at_ms: u64,
    },
    /// A timer turn is about to run
    TimerFired {
        actor_id: ActorId,
        name: String,
        due_at_ms: u64,
    },
}

impl RuntimeEvent {
    /// The actor the event is about
    pub fn actor_id(&self) -> &ActorId {
        match self {
            RuntimeEvent::Activated { actor_id }
            | RuntimeEvent::Deactivated { actor_id }
            | RuntimeEvent::ActivationFailed { actor_id, .. }
            | RuntimeEvent::ReminderFired { actor_id, .. }
            | RuntimeEvent::TimerFired { actor_id, .. } => actor_id,
        }
    }
}

// ============================================================================
// Shared State
// ============================================================================

/// A live worker, as seen by senders
struct Slot {
    tx: MailboxSender,
    state: watch::Receiver<ActivationState>,
    generation: u64,
}

struct Shared {
    registry: ActorTypeRegistry,
    store: Arc<dyn StateStore>,
    reminders: ReminderScheduler,
    time: Arc<dyn TimeProvider>,
    config: DispatcherConfig,
    slots: Mutex<HashMap<ActorId, Slot>>,
    events: broadcast::Sender<RuntimeEvent>,
    shutting_down: AtomicBool,
    next_generation: AtomicU64,
}

impl Shared {
    fn slots(&self) -> MutexGuard<'_, HashMap<ActorId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: RuntimeEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Remove the slot for `actor_id` if it still belongs to `generation`
    fn retire(slots: &mut HashMap<ActorId, Slot>, actor_id: &ActorId, generation: u64) {
        if slots
            .get(actor_id)
            .is_some_and(|slot| slot.generation == generation)
        {
            slots.remove(actor_id);
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Dispatcher for routing turns to actors
///
/// Owns the worker slots. Use [`Dispatcher::handle`] to get a cloneable
/// handle for invoking actors.
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// Create a new dispatcher
    pub fn new(
        registry: ActorTypeRegistry,
        store: Arc<dyn StateStore>,
        reminders: ReminderScheduler,
        time: Arc<dyn TimeProvider>,
        config: DispatcherConfig,
    ) -> Self {
        // Callers validate first; see `DispatcherConfig::validate`
        debug_assert!(config.max_actors > 0);
        debug_assert!(config.mailbox_depth > 0 && config.mailbox_depth <= MAILBOX_DEPTH_MAX);
        debug_assert!(config.idle_timeout_ms > 0);

        let (events, _) = broadcast::channel(RUNTIME_EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                registry,
                store,
                reminders,
                time,
                config,
                slots: Mutex::new(HashMap::new()),
                events,
                shutting_down: AtomicBool::new(false),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Get a handle to the dispatcher
    pub fn handle(&self) -> DispatcherHandle {
        DispatcherHandle {
            shared: self.shared.clone(),
        }
    }

    /// Deactivate every actor and stop all workers
    ///
    /// Turns queued before shutdown still run; later ones fail with
    /// `RuntimeShutdown`.
    #[instrument(skip(self), level = "info")]
    pub async fn shutdown(&self) {
        if self.shared.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let senders: Vec<(ActorId, MailboxSender)> = self
            .shared
            .slots()
            .iter()
            .map(|(id, slot)| (id.clone(), slot.tx.clone()))
            .collect();
        let actor_count = senders.len();

        let mut replies = Vec::with_capacity(actor_count);
        for (actor_id, tx) in senders {
            let (reply_tx, reply_rx) = oneshot::channel();
            let envelope = Envelope::new(Turn::Shutdown { reply_tx }, self.shared.time.now_ms());
            // Closed means the worker already retired
            if tx.push(envelope).await.is_ok() {
                replies.push((actor_id, reply_rx));
            }
        }

        for (actor_id, reply_rx) in replies {
            match reply_rx.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(actor_id = %actor_id, error = %e, "Actor shutdown failed"),
                Err(_) => warn!(actor_id = %actor_id, "Actor worker exited during shutdown"),
            }
        }

        info!(actors = actor_count, "Dispatcher stopped");
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.shared.config)
            .field("workers", &self.shared.slots().len())
            .finish()
    }
}

// ============================================================================
// Dispatcher Handle
// ============================================================================

/// Handle to route turns to actors
#[derive(Clone)]
pub struct DispatcherHandle {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for DispatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherHandle").finish_non_exhaustive()
    }
}

impl DispatcherHandle {
    /// Invoke a method on an actor, activating it if needed
    ///
    /// Fails with `UnknownActorType` or `NoSuchMethod` before anything is
    /// queued. Errors from the actor's method are returned unchanged.
    #[instrument(skip(self, payload), fields(actor_id = %actor_id), level = "debug")]
    pub async fn invoke(&self, actor_id: &ActorId, method: &str, payload: Bytes) -> Result<Bytes> {
        self.ensure_running()?;
        if payload.len() > MESSAGE_SIZE_BYTES_MAX {
            return Err(Error::MessageTooLarge {
                size: payload.len(),
                limit: MESSAGE_SIZE_BYTES_MAX,
            });
        }
        self.shared.registry.resolve(actor_id.actor_type(), method)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let turn = Turn::Invoke {
            method: method.to_string(),
            payload,
            reply_tx,
        };
        self.enqueue(actor_id, turn, true)?;

        reply_rx.await.map_err(|_| {
            Error::invocation_failed(actor_id.to_string(), method, "turn aborted before replying")
        })?
    }

    /// Invoke by type name and id
    ///
    /// Routing is checked before the id is validated, so an unregistered
    /// type is reported as `UnknownActorType`.
    pub async fn invoke_parts(
        &self,
        actor_type: &str,
        id: &str,
        method: &str,
        payload: Bytes,
    ) -> Result<Bytes> {
        self.shared.registry.resolve(actor_type, method)?;
        let actor_id = ActorId::new(actor_type, id)?;
        self.invoke(&actor_id, method, payload).await
    }

    /// Deactivate an actor; no-op if it is not live
    #[instrument(skip(self), fields(actor_id = %actor_id), level = "debug")]
    pub async fn deactivate(&self, actor_id: &ActorId) -> Result<()> {
        self.ensure_running()?;

        let (reply_tx, reply_rx) = oneshot::channel();
        if !self.enqueue(actor_id, Turn::Deactivate { reply_tx }, false)? {
            return Ok(());
        }
        reply_rx
            .await
            .map_err(|_| Error::internal(format!("{} worker exited during deactivation", actor_id)))?
    }

    /// Current lifecycle state of an actor
    pub fn activation_state(&self, actor_id: &ActorId) -> ActivationState {
        self.shared
            .slots()
            .get(actor_id)
            .map(|slot| *slot.state.borrow())
            .unwrap_or_default()
    }

    /// Number of actors currently `Active`
    pub fn active_actor_count(&self) -> usize {
        self.shared
            .slots()
            .values()
            .filter(|slot| *slot.state.borrow() == ActivationState::Active)
            .count()
    }

    /// Number of live worker tasks, active or not
    pub fn worker_count(&self) -> usize {
        self.shared.slots().len()
    }

    /// Subscribe to lifecycle and scheduling events
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.shared.events.subscribe()
    }

    /// The type registry this dispatcher routes with
    pub fn registry(&self) -> &ActorTypeRegistry {
        &self.shared.registry
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shared.shutting_down.load(Ordering::SeqCst) {
            return Err(Error::RuntimeShutdown);
        }
        Ok(())
    }

    /// Push a turn to the actor's mailbox, starting a worker if `spawn`
    ///
    /// Returns `false` if there is no worker and `spawn` is not set.
    fn enqueue(&self, actor_id: &ActorId, turn: Turn, spawn: bool) -> Result<bool> {
        let shared = &self.shared;
        let mut slots = shared.slots();

        if shared.shutting_down.load(Ordering::SeqCst) {
            return Err(Error::RuntimeShutdown);
        }

        let mut envelope = Envelope::new(turn, shared.time.now_ms());
        if let Some(slot) = slots.get(actor_id) {
            match slot.tx.try_push(envelope) {
                Ok(()) => return Ok(true),
                Err(PushError::Full(_)) => {
                    return Err(Error::ActorMailboxFull {
                        id: actor_id.to_string(),
                        depth: slot.tx.len(),
                        max: slot.tx.capacity(),
                    });
                }
                Err(PushError::Closed(returned)) => {
                    // Worker died without retiring
                    warn!(actor_id = %actor_id, "Replacing dead actor worker");
                    slots.remove(actor_id);
                    envelope = returned;
                }
            }
        }

        if !spawn {
            return Ok(false);
        }

        if slots.len() >= shared.config.max_actors {
            return Err(Error::ActorCapacityExceeded {
                count: slots.len(),
                max: shared.config.max_actors,
            });
        }

        let actor_type = shared
            .registry
            .get(actor_id.actor_type())
            .cloned()
            .ok_or_else(|| Error::unknown_actor_type(actor_id.actor_type()))?;

        let (tx, mailbox) = mailbox::channel(shared.config.mailbox_depth);
        let (state_tx, state_rx) = watch::channel(ActivationState::Inactive);
        let generation = shared.next_generation.fetch_add(1, Ordering::SeqCst);

        tx.try_push(envelope)
            .map_err(|_| Error::internal("fresh mailbox rejected its first turn"))?;
        slots.insert(
            actor_id.clone(),
            Slot {
                tx,
                state: state_rx,
                generation,
            },
        );

        let worker = Worker {
            shared: shared.clone(),
            actor_id: actor_id.clone(),
            actor_type,
            mailbox,
            state_tx,
            generation,
            active: None,
        };
        tokio::spawn(worker.run());
        debug!(actor_id = %actor_id, generation, "Actor worker started");

        Ok(true)
    }
}

#[async_trait]
impl ReminderTarget for DispatcherHandle {
    async fn deliver_reminder(&self, actor_id: &ActorId, fired: ReminderFired) -> Result<()> {
        self.ensure_running()?;
        if self.shared.registry.get(actor_id.actor_type()).is_none() {
            return Err(Error::unknown_actor_type(actor_id.actor_type()));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.enqueue(actor_id, Turn::Reminder { fired, reply_tx }, true)?;
        reply_rx
            .await
            .map_err(|_| Error::internal(format!("{} worker exited before reminder ran", actor_id)))?
    }
}

// ============================================================================
// Worker
// ============================================================================

enum Flow {
    Continue,
    Stop,
}

/// The task that owns one identity's mailbox and instance
struct Worker {
    shared: Arc<Shared>,
    actor_id: ActorId,
    actor_type: ActorType,
    mailbox: Mailbox,
    state_tx: watch::Sender<ActivationState>,
    generation: u64,
    active: Option<ActiveActor>,
}

impl Worker {
    #[instrument(skip(self), fields(actor_id = %self.actor_id), level = "debug")]
    async fn run(mut self) {
        loop {
            let flow = match self.wake_points() {
                None => match self.next_or_retire() {
                    Some(envelope) => self.handle(envelope).await,
                    None => {
                        debug!("Actor worker retired");
                        break;
                    }
                },
                Some((timer_due, idle_deadline)) => {
                    let time = self.shared.time.clone();
                    tokio::select! {
                        biased;
                        envelope = self.mailbox.recv() => match envelope {
                            Some(envelope) => self.handle(envelope).await,
                            None => {
                                self.deactivate().await;
                                Flow::Stop
                            }
                        },
                        _ = time.sleep_until_ms(timer_due.unwrap_or(0)), if timer_due.is_some() => {
                            self.fire_timer().await;
                            Flow::Continue
                        }
                        _ = time.sleep_until_ms(idle_deadline) => {
                            debug!(idle_timeout_ms = self.shared.config.idle_timeout_ms, "Actor idle");
                            self.deactivate().await;
                            Flow::Continue
                        }
                    }
                }
            };

            if let Flow::Stop = flow {
                break;
            }
        }
    }

    /// Next timer due time and idle deadline; `None` while inactive
    fn wake_points(&self) -> Option<(Option<u64>, u64)> {
        let instance = self.active.as_ref()?;
        let now_ms = self.shared.time.now_ms();
        let remaining_ms = self
            .shared
            .config
            .idle_timeout_ms
            .saturating_sub(instance.stats().idle_time_ms(now_ms));
        Some((instance.next_timer_due(), now_ms.saturating_add(remaining_ms)))
    }

    /// Take the next queued turn, or retire if there is none
    fn next_or_retire(&mut self) -> Option<Envelope> {
        let mut slots = self.shared.slots();
        let envelope = self.mailbox.try_recv();
        if envelope.is_none() {
            Shared::retire(&mut slots, &self.actor_id, self.generation);
        }
        envelope
    }

    async fn handle(&mut self, envelope: Envelope) -> Flow {
        let waited_ms = envelope.wait_time_ms(self.shared.time.now_ms());
        debug!(turn = envelope.turn.kind(), waited_ms, "Turn started");

        match envelope.turn {
            Turn::Invoke {
                method,
                payload,
                reply_tx,
            } => {
                let result = match self.ensure_active().await {
                    Ok(instance) => instance.process_invocation(&method, payload).await,
                    Err(e) => Err(e),
                };
                let _ = reply_tx.send(result);
            }
            Turn::Reminder { fired, reply_tx } => {
                let result = match self.ensure_active().await {
                    Ok(instance) => {
                        let name = fired.name.clone();
                        let due_at_ms = fired.due_at_ms;
                        instance.process_reminder(fired).await;
                        self.shared.emit(RuntimeEvent::ReminderFired {
                            actor_id: self.actor_id.clone(),
                            name,
                            due_at_ms,
                        });
                        Ok(())
                    }
                    Err(e) => Err(e),
                };
                let _ = reply_tx.send(result);
            }
            Turn::Deactivate { reply_tx } => {
                self.deactivate().await;
                let _ = reply_tx.send(Ok(()));
            }
            Turn::Shutdown { reply_tx } => {
                self.deactivate().await;
                let _ = reply_tx.send(Ok(()));

                let mut slots = self.shared.slots();
                for envelope in self.mailbox.close_and_drain() {
                    envelope.turn.reject(Error::RuntimeShutdown);
                }
                Shared::retire(&mut slots, &self.actor_id, self.generation);
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// Activate the instance if there is none
    async fn ensure_active(&mut self) -> Result<&mut ActiveActor> {
        if self.active.is_none() {
            self.state_tx.send_replace(ActivationState::Activating);

            let context = ActorContext::new(
                self.actor_id.clone(),
                self.shared.store.clone(),
                self.shared.config.state_store_name.clone(),
                self.shared.reminders.clone(),
                self.actor_type.timer_targets.clone(),
                self.shared.time.clone(),
            );
            let actor = self.actor_type.factory.create(&self.actor_id);

            match ActiveActor::activate(
                self.actor_id.clone(),
                actor,
                context,
                self.shared.time.clone(),
            )
            .await
            {
                Ok(instance) => {
                    self.state_tx.send_replace(ActivationState::Active);
                    self.shared.emit(RuntimeEvent::Activated {
                        actor_id: self.actor_id.clone(),
                    });
                    self.active = Some(instance);
                }
                Err(e) => {
                    self.state_tx.send_replace(ActivationState::Inactive);
                    self.shared.emit(RuntimeEvent::ActivationFailed {
                        actor_id: self.actor_id.clone(),
                        reason: e.to_string(),
                    });
                    return Err(e);
                }
            }
        }

        self.active
            .as_mut()
            .ok_or_else(|| Error::internal("actor missing after activation"))
    }

    async fn fire_timer(&mut self) {
        let now_ms = self.shared.time.now_ms();
        let Some(instance) = self.active.as_mut() else {
            return;
        };
        if let Some(firing) = instance.pop_due_timer(now_ms) {
            self.shared.emit(RuntimeEvent::TimerFired {
                actor_id: self.actor_id.clone(),
                name: firing.name.clone(),
                due_at_ms: firing.due_at_ms,
            });
            instance.process_timer(firing).await;
        }
    }

    async fn deactivate(&mut self) {
        if let Some(mut instance) = self.active.take() {
            self.state_tx.send_replace(ActivationState::Deactivating);
            instance.deactivate().await;
            self.state_tx.send_replace(ActivationState::Inactive);
            self.shared.emit(RuntimeEvent::Deactivated {
                actor_id: self.actor_id.clone(),
            });
        }
    }
}
