//! The actor trait
//!
//! TigerStyle: Single-threaded execution guarantee, explicit lifecycle hooks.

use crate::context::ActorContext;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;
use warren_core::{ReminderFired, Result};

/// Actor trait - implement to create actors
///
/// One instance exists per `ActorId` at a time, and the runtime never runs
/// two turns of the same instance concurrently, so implementations can keep
/// plain fields without locking.
///
/// # TigerStyle
/// - Explicit capability table (`methods`), checked before a turn is queued
/// - Explicit lifecycle hooks (on_activate, on_deactivate)
/// - State that must outlive the instance goes through `ActorContext`
#[async_trait]
pub trait Actor: Send + 'static {
    /// Methods callers (and timers) may invoke on this actor type
    fn methods() -> &'static [&'static str]
    where
        Self: Sized;

    /// Methods only timers may target; callers get `NoSuchMethod`
    fn callbacks() -> &'static [&'static str]
    where
        Self: Sized,
    {
        &[]
    }

    /// Handle a method call or timer callback
    ///
    /// An error is returned to the caller; the instance stays active.
    async fn invoke(&mut self, ctx: &mut ActorContext, method: &str, payload: Bytes)
        -> Result<Bytes>;

    /// Called when the instance is activated, before its first turn
    ///
    /// An error fails the pending turn with `ActorActivationFailed` and
    /// discards the instance.
    async fn on_activate(&mut self, _ctx: &mut ActorContext) -> Result<()> {
        Ok(())
    }

    /// Called before the instance is discarded
    ///
    /// Errors are logged; deactivation proceeds regardless. Timers can no
    /// longer be registered at this point.
    async fn on_deactivate(&mut self, _ctx: &mut ActorContext) -> Result<()> {
        Ok(())
    }

    /// Called for every reminder firing addressed to this actor
    async fn receive_reminder(
        &mut self,
        ctx: &mut ActorContext,
        reminder: ReminderFired,
    ) -> Result<()> {
        warn!(
            actor_id = %ctx.id(),
            reminder = %reminder.name,
            "Reminder fired on an actor that does not handle reminders"
        );
        Ok(())
    }
}
