//! Shared test actor for runtime integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use warren_core::{Error, ReminderFired, Result, Schedule, TimeProvider, WallClockTime};
use warren_runtime::{
    Actor, ActorContext, DispatcherConfig, Runtime, RuntimeBuilder,
};
use warren_storage::MemoryStore;

pub const RECORDER: &str = "Recorder";

/// A timer or reminder turn observed by the recorder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired {
    pub kind: &'static str,
    pub name: String,
    pub at_ms: u64,
}

/// Reminder registration request
#[derive(Debug, Serialize, Deserialize)]
pub struct ReminderRequest {
    pub name: String,
    pub due_ms: i64,
    pub period_ms: Option<i64>,
    pub ttl_ms: Option<i64>,
}

/// Test actor that records what happens to it
#[derive(Clone)]
pub struct Recorder {
    fired: mpsc::UnboundedSender<Fired>,
    started: mpsc::UnboundedSender<()>,
    gate: Arc<Notify>,
    activation_failures: Arc<AtomicUsize>,
    hold_deactivation: Arc<AtomicBool>,
}

/// Test-side ends of the recorder's channels
pub struct RecorderEnds {
    pub fired: mpsc::UnboundedReceiver<Fired>,
    pub started: mpsc::UnboundedReceiver<()>,
    pub gate: Arc<Notify>,
    pub activation_failures: Arc<AtomicUsize>,
    /// While set, `on_deactivate` signals `started` and waits for `gate`
    pub hold_deactivation: Arc<AtomicBool>,
}

impl RecorderEnds {
    /// Drain everything fired so far
    pub fn drain(&mut self) -> Vec<Fired> {
        let mut out = Vec::new();
        while let Ok(fired) = self.fired.try_recv() {
            out.push(fired);
        }
        out
    }
}

pub fn recorder() -> (Recorder, RecorderEnds) {
    let (fired_tx, fired_rx) = mpsc::unbounded_channel();
    let (started_tx, started_rx) = mpsc::unbounded_channel();
    let gate = Arc::new(Notify::new());
    let activation_failures = Arc::new(AtomicUsize::new(0));
    let hold_deactivation = Arc::new(AtomicBool::new(false));
    (
        Recorder {
            fired: fired_tx,
            started: started_tx,
            gate: gate.clone(),
            activation_failures: activation_failures.clone(),
            hold_deactivation: hold_deactivation.clone(),
        },
        RecorderEnds {
            fired: fired_rx,
            started: started_rx,
            gate,
            activation_failures,
            hold_deactivation,
        },
    )
}

pub fn runtime(store: Arc<MemoryStore>, recorder: Recorder, config: DispatcherConfig) -> Runtime {
    runtime_with_time(store, recorder, config, WallClockTime::shared())
}

/// Build a runtime on an explicit clock, so restarts share one timeline
pub fn runtime_with_time(
    store: Arc<MemoryStore>,
    recorder: Recorder,
    config: DispatcherConfig,
    time: Arc<dyn TimeProvider>,
) -> Runtime {
    RuntimeBuilder::new()
        .register_actor(RECORDER, recorder)
        .with_store(store)
        .with_time(time)
        .with_dispatcher_config(config)
        .build()
        .expect("runtime builds")
}

pub fn json<T: Serialize>(value: &T) -> Bytes {
    Bytes::from(serde_json::to_vec(value).expect("serializable"))
}

#[async_trait]
impl Actor for Recorder {
    fn methods() -> &'static [&'static str] {
        &[
            "append",
            "log",
            "block",
            "stale_write",
            "start_timer",
            "stop_timer",
            "tick",
            "start_reminder",
            "stop_reminder",
            "get_reminder",
        ]
    }

    async fn invoke(&mut self, ctx: &mut ActorContext, method: &str, payload: Bytes) -> Result<Bytes> {
        match method {
            // Read-modify-write with a yield in between; overlapping turns
            // would lose the ETag race
            "append" => {
                let current = ctx.get_state_json::<Vec<String>>("log").await?;
                let (mut log, etag) = match current {
                    Some(v) => (v.value, Some(v.etag)),
                    None => (Vec::new(), None),
                };
                tokio::task::yield_now().await;
                log.push(String::from_utf8_lossy(&payload).into_owned());
                ctx.try_save_state_json("log", &log, etag)
                    .await?
                    .into_result("log")?;
                Ok(Bytes::from(log.len().to_string()))
            }
            "log" => {
                let log = ctx
                    .get_state_json::<Vec<String>>("log")
                    .await?
                    .map(|v| v.value)
                    .unwrap_or_default();
                Ok(json(&log))
            }
            "block" => {
                let _ = self.started.send(());
                self.gate.notified().await;
                Ok(Bytes::new())
            }
            // Write with a token that a concurrent writer already invalidated
            "stale_write" => {
                ctx.set_state("stale", Bytes::from_static(b"v1")).await?;
                let read = ctx
                    .get_state("stale")
                    .await?
                    .ok_or_else(|| Error::internal("missing"))?;
                ctx.set_state("stale", Bytes::from_static(b"v2")).await?;
                ctx.try_save_state("stale", Bytes::from_static(b"v3"), Some(read.etag))
                    .await?
                    .into_result("stale")?;
                Ok(Bytes::new())
            }
            "start_timer" => {
                let period_ms: u64 = serde_json::from_slice(&payload).map_err(|e| {
                    Error::DeserializationFailed {
                        reason: e.to_string(),
                    }
                })?;
                let schedule = Schedule {
                    due_ms: period_ms,
                    period_ms: Some(period_ms),
                    ttl_ms: None,
                };
                ctx.register_timer("heartbeat", schedule, "tick", Bytes::from_static(b"heartbeat"))?;
                Ok(Bytes::new())
            }
            "stop_timer" => {
                ctx.unregister_timer("heartbeat")?;
                Ok(Bytes::new())
            }
            "tick" => {
                let _ = self.fired.send(Fired {
                    kind: "timer",
                    name: String::from_utf8_lossy(&payload).into_owned(),
                    at_ms: ctx.now_ms(),
                });
                Ok(Bytes::new())
            }
            "start_reminder" => {
                let request: ReminderRequest = serde_json::from_slice(&payload).map_err(|e| {
                    Error::DeserializationFailed {
                        reason: e.to_string(),
                    }
                })?;
                let schedule = Schedule::from_millis(
                    &request.name,
                    request.due_ms,
                    request.period_ms,
                    request.ttl_ms,
                )?;
                ctx.register_reminder(&request.name, schedule, Bytes::new())
                    .await?;
                Ok(Bytes::new())
            }
            "stop_reminder" => {
                let name = String::from_utf8_lossy(&payload).into_owned();
                ctx.unregister_reminder(&name).await?;
                Ok(Bytes::new())
            }
            "get_reminder" => {
                let name = String::from_utf8_lossy(&payload).into_owned();
                let exists = ctx.get_reminder(&name).await?.is_some();
                Ok(json(&exists))
            }
            other => Err(Error::internal(format!("unhandled method {}", other))),
        }
    }

    async fn on_activate(&mut self, _ctx: &mut ActorContext) -> Result<()> {
        let remaining = self.activation_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.activation_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::internal("injected activation failure"));
        }
        Ok(())
    }

    async fn on_deactivate(&mut self, _ctx: &mut ActorContext) -> Result<()> {
        if self.hold_deactivation.swap(false, Ordering::SeqCst) {
            let _ = self.started.send(());
            self.gate.notified().await;
        }
        Ok(())
    }

    async fn receive_reminder(&mut self, ctx: &mut ActorContext, reminder: ReminderFired) -> Result<()> {
        let _ = self.fired.send(Fired {
            kind: "reminder",
            name: reminder.name,
            at_ms: ctx.now_ms(),
        });
        Ok(())
    }
}
