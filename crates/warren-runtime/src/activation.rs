//! Actor activation and lifecycle management
//!
//! TigerStyle: Explicit lifecycle states, single activation guarantee.
//!
//! ## Key Invariants
//! - Invocations only run while the state is `Active`
//! - A failed activation goes straight back to `Inactive` and the instance is
//!   dropped; the next turn starts over
//! - Deactivation runs `on_deactivate` with timer registration closed, then
//!   discards every timer of the activation

use crate::actor::Actor;
use crate::context::ActorContext;
use crate::timers::TimerFiring;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use warren_core::{ActorId, Error, ReminderFired, Result, TimeProvider};

/// Actor lifecycle state
///
/// - `Inactive`: no instance exists (initial state, or after deactivation)
/// - `Activating`: instance created, `on_activate` running
/// - `Active`: instance accepting turns
/// - `Deactivating`: `on_deactivate` running, timers about to be dropped
///
/// State transitions:
/// ```text
///                   +------------+
///                   |  Inactive  | <-----+
///                   +------------+       |
///                         |              |
///                         v              |
///                   +------------+       |
///                   | Activating | ------+  (activation failed)
///                   +------------+       |
///                         |              |
///                         v              |
///                   +------------+       |
///                   |   Active   |       |
///                   +------------+       |
///                         |              |
///                         v              |
///                   +-------------+      |
///                   | Deactivating| -----+
///                   +-------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationState {
    /// No instance exists
    #[default]
    Inactive,
    /// Instance created, `on_activate` running
    Activating,
    /// Instance running and accepting turns
    ///
    /// Invocations are ONLY allowed in this state.
    Active,
    /// `on_deactivate` running
    Deactivating,
}

impl ActivationState {
    /// Check if actor can accept new invocations
    pub fn can_invoke(&self) -> bool {
        matches!(self, ActivationState::Active)
    }

    /// Check if the lifecycle allows moving to `next`
    pub fn can_transition_to(&self, next: ActivationState) -> bool {
        match (self, next) {
            (ActivationState::Inactive, ActivationState::Activating) => true,
            // Activating: go to Active (success) or Inactive (failure)
            (ActivationState::Activating, ActivationState::Active) => true,
            (ActivationState::Activating, ActivationState::Inactive) => true,
            (ActivationState::Active, ActivationState::Deactivating) => true,
            (ActivationState::Deactivating, ActivationState::Inactive) => true,
            _ if *self == next => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ActivationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivationState::Inactive => write!(f, "inactive"),
            ActivationState::Activating => write!(f, "activating"),
            ActivationState::Active => write!(f, "active"),
            ActivationState::Deactivating => write!(f, "deactivating"),
        }
    }
}

/// Statistics for an active actor
#[derive(Debug, Clone, Default)]
pub struct ActivationStats {
    /// When the actor was activated (wall-clock ms)
    pub activated_at_ms: Option<u64>,
    /// Last time the actor processed a call or reminder (wall-clock ms)
    pub last_activity_at_ms: Option<u64>,
    /// Total invocations processed
    pub invocation_count: u64,
    /// Total invocation errors
    pub error_count: u64,
    /// Reminder turns processed
    pub reminder_count: u64,
    /// Timer turns processed
    pub timer_count: u64,
}

impl ActivationStats {
    /// Create new stats stamped with the activation time
    pub fn with_time(time: &dyn TimeProvider) -> Self {
        Self {
            activated_at_ms: Some(time.now_ms()),
            ..Self::default()
        }
    }

    /// Record an invocation
    pub fn record_invocation(&mut self, is_error: bool, now_ms: u64) {
        self.last_activity_at_ms = Some(now_ms);
        self.invocation_count = self.invocation_count.wrapping_add(1);
        if is_error {
            self.error_count = self.error_count.wrapping_add(1);
        }
    }

    /// Record a reminder turn
    pub fn record_reminder(&mut self, now_ms: u64) {
        self.last_activity_at_ms = Some(now_ms);
        self.reminder_count = self.reminder_count.wrapping_add(1);
    }

    /// Record a timer turn; timers do not count as activity
    pub fn record_timer(&mut self) {
        self.timer_count = self.timer_count.wrapping_add(1);
    }

    /// Time since the last call or reminder (or since activation)
    pub fn idle_time_ms(&self, now_ms: u64) -> u64 {
        self.last_activity_at_ms
            .or(self.activated_at_ms)
            .map(|t| now_ms.saturating_sub(t))
            .unwrap_or(0)
    }
}

/// An active actor instance
///
/// TigerStyle: Single activation guarantee. Only the worker task that owns
/// an identity's mailbox ever holds an `ActiveActor` for it.
pub struct ActiveActor {
    /// The actor's unique identifier
    pub id: ActorId,
    actor: Box<dyn Actor>,
    context: ActorContext,
    stats: ActivationStats,
    time: Arc<dyn TimeProvider>,
}

impl std::fmt::Debug for ActiveActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveActor")
            .field("id", &self.id)
            .field("state", &self.context.lifecycle())
            .field("stats", &self.stats)
            .finish()
    }
}

impl ActiveActor {
    /// Create the instance and run `on_activate`
    ///
    /// On failure the instance is dropped and `ActorActivationFailed` is
    /// returned.
    #[instrument(skip(actor, context, time), fields(actor_id = %id), level = "info")]
    pub async fn activate(
        id: ActorId,
        mut actor: Box<dyn Actor>,
        mut context: ActorContext,
        time: Arc<dyn TimeProvider>,
    ) -> Result<Self> {
        debug_assert_eq!(context.id(), &id);
        debug_assert_eq!(context.lifecycle(), ActivationState::Inactive);

        debug!("Activating actor");
        context.set_lifecycle(ActivationState::Activating);

        if let Err(e) = actor.on_activate(&mut context).await {
            error!(error = %e, "on_activate failed");
            context.set_lifecycle(ActivationState::Inactive);
            return Err(Error::ActorActivationFailed {
                id: id.to_string(),
                reason: e.to_string(),
            });
        }

        context.set_lifecycle(ActivationState::Active);
        info!(timers = context.timer_count(), "Actor activated");

        Ok(Self {
            id,
            actor,
            context,
            stats: ActivationStats::with_time(time.as_ref()),
            time,
        })
    }

    /// Run a method call
    ///
    /// Errors from the actor are returned unchanged; the actor stays active.
    #[instrument(skip(self, payload), fields(actor_id = %self.id), level = "debug")]
    pub async fn process_invocation(&mut self, method: &str, payload: Bytes) -> Result<Bytes> {
        assert!(
            self.context.lifecycle().can_invoke(),
            "cannot invoke when state = {}",
            self.context.lifecycle()
        );
        assert!(!method.is_empty(), "method cannot be empty");

        let result = self
            .actor
            .invoke(&mut self.context, method, payload)
            .await;
        let now_ms = self.time.now_ms();

        if let Err(e) = &result {
            debug!(error = %e, "Invocation returned an error");
        }
        self.stats.record_invocation(result.is_err(), now_ms);

        result
    }

    /// Run a reminder turn
    ///
    /// An error from `receive_reminder` is logged; the turn still counts as
    /// delivered.
    #[instrument(skip(self, fired), fields(actor_id = %self.id, reminder = %fired.name), level = "debug")]
    pub async fn process_reminder(&mut self, fired: ReminderFired) {
        debug_assert!(self.context.lifecycle().can_invoke());

        if let Err(e) = self.actor.receive_reminder(&mut self.context, fired).await {
            warn!(error = %e, "Reminder handler failed");
        }
        self.stats.record_reminder(self.time.now_ms());
    }

    /// Run a timer firing by invoking its callback method
    #[instrument(skip(self, firing), fields(actor_id = %self.id, timer = %firing.name), level = "debug")]
    pub async fn process_timer(&mut self, firing: TimerFiring) {
        debug_assert!(self.context.lifecycle().can_invoke());

        if let Err(e) = self
            .actor
            .invoke(&mut self.context, &firing.callback, firing.payload)
            .await
        {
            warn!(callback = %firing.callback, error = %e, "Timer callback failed");
        }
        self.stats.record_timer();
    }

    /// Earliest due time among this activation's timers
    pub fn next_timer_due(&self) -> Option<u64> {
        self.context.timers().next_due_at()
    }

    /// Pop the earliest timer firing due at or before `now_ms`
    pub fn pop_due_timer(&mut self, now_ms: u64) -> Option<TimerFiring> {
        self.context.timers_mut().pop_due(now_ms)
    }

    /// Deactivate the actor
    ///
    /// Runs `on_deactivate` (errors are logged) and drops all timers. The
    /// instance ends `Inactive` and must not be used for further turns.
    #[instrument(skip(self), fields(actor_id = %self.id), level = "info")]
    pub async fn deactivate(&mut self) {
        if self.context.lifecycle() == ActivationState::Inactive {
            return;
        }
        assert!(
            self.context
                .lifecycle()
                .can_transition_to(ActivationState::Deactivating),
            "invalid state transition: {} -> deactivating",
            self.context.lifecycle()
        );

        debug!("Deactivating actor");
        self.context.set_lifecycle(ActivationState::Deactivating);

        if let Err(e) = self.actor.on_deactivate(&mut self.context).await {
            error!(error = %e, "on_deactivate failed");
        }

        let dropped_timers = self.context.timers_mut().clear();
        self.context.set_lifecycle(ActivationState::Inactive);

        info!(
            invocations = self.stats.invocation_count,
            errors = self.stats.error_count,
            reminders = self.stats.reminder_count,
            timers_fired = self.stats.timer_count,
            dropped_timers,
            "Actor deactivated"
        );
    }

    /// Get the current activation state
    pub fn activation_state(&self) -> ActivationState {
        self.context.lifecycle()
    }

    /// Get the actor's statistics
    pub fn stats(&self) -> &ActivationStats {
        &self.stats
    }
}
