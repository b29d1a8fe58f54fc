//! Sample worker actor
//!
//! TigerStyle: One typed record per actor, plus one reminder and one timer
//! with fixed names.
//!
//! `WorkerActor` keeps a [`MyData`] record under `my_data`, guards order
//! records with ETags, and registers `MyReminder` / `MyTimer` on request.

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::info;
use warren_core::{Error, Reminder, ReminderFired, Result, Schedule};
use warren_runtime::{Actor, ActorContext};

/// Registered type name
pub const WORKER_ACTOR_TYPE: &str = "WorkerActor";

/// State entry holding [`MyData`]
pub const MY_DATA_STATE: &str = "my_data";

/// Reminder registered by `register_reminder`
pub const MY_REMINDER: &str = "MyReminder";

/// Timer registered by `register_timer`
pub const MY_TIMER: &str = "MyTimer";

/// Method the timer calls back; not callable from outside
pub const TIMER_CALLBACK_METHOD: &str = "on_timer_callback";

/// First firing delay for the sample reminder and timer
const SAMPLE_DUE_MS: u64 = 1_000;

/// Period for the sample reminder and timer
const SAMPLE_PERIOD_MS: u64 = 30_000;

/// TTL for the sample reminder and timer
const SAMPLE_TTL_MS: u64 = 10_000;

// =============================================================================
// Models
// =============================================================================

/// The record `set_data` stores
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MyData {
    pub property_a: Option<String>,
    pub property_b: Option<String>,
}

impl fmt::Display for MyData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PropertyA: {}, PropertyB: {}",
            self.property_a.as_deref().unwrap_or("null"),
            self.property_b.as_deref().unwrap_or("null")
        )
    }
}

/// Outcome of a conditional order write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveOutcome {
    Success,
    Failed,
}

/// Reminder details returned by `get_reminder`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderInfo {
    pub name: String,
    pub due_ms: u64,
    pub period_ms: Option<u64>,
    pub ttl_ms: Option<u64>,
    pub next_due_at_ms: u64,
}

impl From<&Reminder> for ReminderInfo {
    fn from(reminder: &Reminder) -> Self {
        Self {
            name: reminder.name.clone(),
            due_ms: reminder.schedule.due_ms,
            period_ms: reminder.schedule.period_ms,
            ttl_ms: reminder.schedule.ttl_ms,
            next_due_at_ms: reminder.next_due_at_ms,
        }
    }
}

// =============================================================================
// Actor
// =============================================================================

/// Sample actor addressed by order id
#[derive(Debug, Clone, Default)]
pub struct WorkerActor;

impl WorkerActor {
    fn sample_schedule() -> Schedule {
        Schedule::periodic(
            Duration::from_millis(SAMPLE_DUE_MS),
            Duration::from_millis(SAMPLE_PERIOD_MS),
        )
        .with_ttl(Duration::from_millis(SAMPLE_TTL_MS))
    }

    /// Re-save an order record under the ETag it was read with
    ///
    /// A missing record is created empty and must still be absent at write
    /// time.
    async fn set_state_with_etag(ctx: &ActorContext, order_id: &str) -> Result<SaveOutcome> {
        let (value, etag) = match ctx.get_state(order_id).await? {
            Some(current) => (current.value, Some(current.etag)),
            None => (encode(&MyData::default())?, None),
        };

        let outcome = ctx.try_save_state(order_id, value, etag).await?;
        Ok(if outcome.is_success() {
            SaveOutcome::Success
        } else {
            SaveOutcome::Failed
        })
    }
}

#[async_trait]
impl Actor for WorkerActor {
    fn methods() -> &'static [&'static str] {
        &[
            "set_data",
            "get_data",
            "set_state_with_etag",
            "register_reminder",
            "unregister_reminder",
            "get_reminder",
            "register_timer",
            "unregister_timer",
        ]
    }

    fn callbacks() -> &'static [&'static str] {
        &[TIMER_CALLBACK_METHOD]
    }

    async fn invoke(
        &mut self,
        ctx: &mut ActorContext,
        method: &str,
        payload: Bytes,
    ) -> Result<Bytes> {
        match method {
            "set_data" => {
                let data: MyData = decode(method, &payload)?;
                ctx.set_state_json(MY_DATA_STATE, &data).await?;
                info!(actor_id = %ctx.id(), data = %data, "Data stored");
                encode(&SaveOutcome::Success)
            }
            "get_data" => {
                let data = ctx
                    .get_state_json::<MyData>(MY_DATA_STATE)
                    .await?
                    .map(|v| v.value);
                encode(&data)
            }
            "set_state_with_etag" => {
                let order_id: String = decode(method, &payload)?;
                let outcome = Self::set_state_with_etag(ctx, &order_id).await?;
                info!(actor_id = %ctx.id(), order_id = %order_id, outcome = ?outcome, "Order saved");
                encode(&outcome)
            }
            "register_reminder" => {
                ctx.register_reminder(MY_REMINDER, Self::sample_schedule(), Bytes::new())
                    .await?;
                Ok(Bytes::new())
            }
            "unregister_reminder" => {
                info!(actor_id = %ctx.id(), "Unregistering {}", MY_REMINDER);
                ctx.unregister_reminder(MY_REMINDER).await?;
                Ok(Bytes::new())
            }
            "get_reminder" => {
                let reminder = ctx.get_reminder(MY_REMINDER).await?;
                encode(&reminder.as_ref().map(ReminderInfo::from))
            }
            "register_timer" => {
                ctx.register_timer(
                    MY_TIMER,
                    Self::sample_schedule(),
                    TIMER_CALLBACK_METHOD,
                    Bytes::new(),
                )?;
                Ok(Bytes::new())
            }
            "unregister_timer" => {
                info!(actor_id = %ctx.id(), "Unregistering {}", MY_TIMER);
                ctx.unregister_timer(MY_TIMER)?;
                Ok(Bytes::new())
            }
            TIMER_CALLBACK_METHOD => {
                info!(actor_id = %ctx.id(), timer = MY_TIMER, "Timer callback");
                Ok(Bytes::new())
            }
            other => Err(Error::no_such_method(WORKER_ACTOR_TYPE, other)),
        }
    }

    async fn on_activate(&mut self, ctx: &mut ActorContext) -> Result<()> {
        info!(actor_id = %ctx.id(), "Activating actor");
        Ok(())
    }

    async fn on_deactivate(&mut self, ctx: &mut ActorContext) -> Result<()> {
        info!(actor_id = %ctx.id(), "Deactivating actor");
        Ok(())
    }

    async fn receive_reminder(
        &mut self,
        ctx: &mut ActorContext,
        reminder: ReminderFired,
    ) -> Result<()> {
        info!(
            actor_id = %ctx.id(),
            reminder = %reminder.name,
            due_at_ms = reminder.due_at_ms,
            "Reminder received"
        );
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(method: &str, payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload).map_err(|e| Error::DeserializationFailed {
        reason: format!("{} payload: {}", method, e),
    })
}

fn encode<T: Serialize>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| Error::SerializationFailed {
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use warren_core::ActorId;
    use warren_runtime::{ActorHandle, Runtime, RuntimeBuilder, RuntimeEvent};
    use warren_storage::MemoryStore;

    fn runtime() -> Runtime {
        RuntimeBuilder::new()
            .register_actor(WORKER_ACTOR_TYPE, WorkerActor)
            .with_store(Arc::new(MemoryStore::new()))
            .build()
            .unwrap()
    }

    fn worker(runtime: &Runtime, id: &str) -> ActorHandle {
        runtime.actor_by_parts(WORKER_ACTOR_TYPE, id).unwrap()
    }

    #[test]
    fn test_my_data_display() {
        let data = MyData {
            property_a: Some("x".into()),
            property_b: None,
        };
        assert_eq!(data.to_string(), "PropertyA: x, PropertyB: null");
    }

    #[test]
    fn test_my_data_wire_names() {
        let data = MyData {
            property_a: Some("x".into()),
            property_b: None,
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json, serde_json::json!({ "PropertyA": "x", "PropertyB": null }));

        let parsed: MyData = serde_json::from_str(r#"{"PropertyA":"y"}"#).unwrap();
        assert_eq!(parsed.property_a.as_deref(), Some("y"));
        assert!(parsed.property_b.is_none());
    }

    #[tokio::test]
    async fn test_set_and_get_data() {
        let runtime = runtime();
        let actor = worker(&runtime, "w-1");

        let empty: Option<MyData> = actor.request("get_data", &()).await.unwrap();
        assert!(empty.is_none());

        let data = MyData {
            property_a: Some("a".into()),
            property_b: Some("b".into()),
        };
        let outcome: SaveOutcome = actor.request("set_data", &data).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Success);

        // Survives deactivation
        actor.deactivate().await.unwrap();
        let stored: Option<MyData> = actor.request("get_data", &()).await.unwrap();
        assert_eq!(stored, Some(data));

        runtime.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_set_state_with_etag() {
        let runtime = runtime();
        let actor = worker(&runtime, "order-1");

        let first: SaveOutcome = actor.request("set_state_with_etag", &"order-1").await.unwrap();
        assert_eq!(first, SaveOutcome::Success);

        // Re-reads the current ETag, so a repeat succeeds too
        let second: SaveOutcome = actor.request("set_state_with_etag", &"order-1").await.unwrap();
        assert_eq!(second, SaveOutcome::Success);

        let result = actor.invoke("set_state_with_etag", Bytes::from("not json")).await;
        assert!(matches!(result, Err(Error::DeserializationFailed { .. })));

        runtime.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_reminder_registration() {
        let runtime = runtime();
        let actor = worker(&runtime, "w-2");

        actor.send("register_reminder", Bytes::new()).await.unwrap();
        let info: Option<ReminderInfo> = actor.request("get_reminder", &()).await.unwrap();
        let info = info.expect("reminder registered");
        assert_eq!(info.name, MY_REMINDER);
        assert_eq!(info.period_ms, Some(SAMPLE_PERIOD_MS));
        assert_eq!(info.ttl_ms, Some(SAMPLE_TTL_MS));

        actor.send("unregister_reminder", Bytes::new()).await.unwrap();
        let info: Option<ReminderInfo> = actor.request("get_reminder", &()).await.unwrap();
        assert!(info.is_none());

        // Unregistering twice is fine
        actor.send("unregister_reminder", Bytes::new()).await.unwrap();
        runtime.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reminder_fires_once_within_ttl() {
        let runtime = runtime();
        runtime.start().await.unwrap();
        let mut events = runtime.subscribe();
        let actor = worker(&runtime, "w-3");

        actor.send("register_reminder", Bytes::new()).await.unwrap();

        let mut fired = 0;
        let deadline = tokio::time::sleep(Duration::from_secs(60));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                event = events.recv() => {
                    if let Ok(RuntimeEvent::ReminderFired { name, .. }) = event {
                        assert_eq!(name, MY_REMINDER);
                        fired += 1;
                    }
                }
                _ = &mut deadline => break,
            }
        }
        assert_eq!(fired, 1);

        let info: Option<ReminderInfo> = actor.request("get_reminder", &()).await.unwrap();
        assert!(info.is_none());
        runtime.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_calls_back() {
        let runtime = runtime();
        let mut events = runtime.subscribe();
        let id = ActorId::new(WORKER_ACTOR_TYPE, "w-4").unwrap();
        let actor = runtime.actor(id.clone());

        actor.send("register_timer", Bytes::new()).await.unwrap();
        loop {
            match events.recv().await.unwrap() {
                RuntimeEvent::TimerFired { actor_id, name, .. } => {
                    assert_eq!(actor_id, id);
                    assert_eq!(name, MY_TIMER);
                    break;
                }
                _ => continue,
            }
        }

        actor.send("unregister_timer", Bytes::new()).await.unwrap();
        runtime.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_timer_callback_not_callable_directly() {
        let runtime = runtime();
        let actor = worker(&runtime, "w-5");

        let result = actor.invoke(TIMER_CALLBACK_METHOD, Bytes::new()).await;
        assert!(matches!(result, Err(Error::NoSuchMethod { .. })));

        // Still a valid timer target
        actor.send("register_timer", Bytes::new()).await.unwrap();
        runtime.stop().await.unwrap();
    }
}
