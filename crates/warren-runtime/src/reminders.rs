//! Durable reminder scheduling
//!
//! TigerStyle: Persist first, then schedule. Advance only after delivery.
//!
//! Reminders are stored in a [`ReminderStore`] and mirrored in memory. A
//! background loop sleeps until the earliest due time (or expiry), hands each
//! due reminder to a [`ReminderTarget`] as an actor turn, and persists the
//! advanced schedule only once the turn has run. A crash between delivery and
//! persistence therefore re-delivers: delivery is at-least-once.
//!
//! # Restart
//! `start` reloads every stored reminder and drops the expired ones. A reminder
//! that fell due while the process was down fires once immediately, and its
//! next firing is the first period tick after now, so missed ticks are
//! coalesced rather than replayed.
//!
//! # TTL
//! TTL runs from registration. A firing happens only while its due time is
//! before `registered_at + ttl`, and the record is deleted once that deadline
//! passes.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use warren_core::constants::{REMINDERS_PER_ACTOR_COUNT_MAX, REMINDER_RETRY_BACKOFF_MS};
use warren_core::{ActorId, Error, Reminder, ReminderFired, Result, Schedule, TimeProvider};
use warren_storage::ReminderStore;

// =============================================================================
// Target
// =============================================================================

/// Where due reminders are delivered
///
/// `Ok` means the reminder turn ran (even if the actor's handler returned an
/// error). `Err` means it could not run, and the firing is retried later.
#[async_trait]
pub trait ReminderTarget: Send + Sync + 'static {
    /// Run a reminder turn on `actor_id` and wait for it to finish
    async fn deliver_reminder(&self, actor_id: &ActorId, fired: ReminderFired) -> Result<()>;
}

// =============================================================================
// Scheduler
// =============================================================================

type ReminderKey = (ActorId, String);

#[derive(Debug)]
struct Entry {
    reminder: Reminder,
    /// Bumped on every registration; a finished delivery only updates the
    /// entry it was started for
    generation: u64,
    in_flight: bool,
    /// Earliest retry time after a failed delivery
    retry_at_ms: Option<u64>,
}

impl Entry {
    /// When the loop next needs to look at this entry
    fn wake_at_ms(&self) -> u64 {
        let expires_at = self.reminder.expires_at().unwrap_or(u64::MAX);
        if self.reminder.is_live() {
            let ready_at = self
                .reminder
                .next_due_at_ms
                .max(self.retry_at_ms.unwrap_or(0));
            ready_at.min(expires_at)
        } else {
            expires_at
        }
    }
}

struct Shared {
    store: Arc<dyn ReminderStore>,
    time: Arc<dyn TimeProvider>,
    /// Held across store writes so that the store sees mutations in map order
    entries: Mutex<HashMap<ReminderKey, Entry>>,
    generation: AtomicU64,
    wakeup: Notify,
    shutdown_tx: watch::Sender<bool>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Durable reminder registry and delivery loop
///
/// Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct ReminderScheduler {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ReminderScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReminderScheduler")
            .field("running", &self.is_running())
            .finish()
    }
}

impl ReminderScheduler {
    /// Create a scheduler over a store; nothing fires until `start`
    pub fn new(store: Arc<dyn ReminderStore>, time: Arc<dyn TimeProvider>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                store,
                time,
                entries: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                wakeup: Notify::new(),
                shutdown_tx,
                task: std::sync::Mutex::new(None),
            }),
        }
    }

    /// Register or replace a reminder
    ///
    /// The record is persisted before this returns. Re-registering an
    /// existing name restarts its schedule from now.
    #[instrument(skip(self, schedule, payload), fields(actor_id = %actor_id, name = %name), level = "debug")]
    pub async fn register(
        &self,
        actor_id: &ActorId,
        name: &str,
        schedule: Schedule,
        payload: Bytes,
    ) -> Result<Reminder> {
        schedule.validate(name)?;

        let reminder = Reminder::new(
            actor_id.clone(),
            name,
            schedule,
            payload,
            self.shared.time.now_ms(),
        );
        let key = (actor_id.clone(), name.to_string());

        let mut entries = self.shared.entries.lock().await;
        if !entries.contains_key(&key) {
            let count = entries.keys().filter(|(id, _)| id == actor_id).count();
            if count >= REMINDERS_PER_ACTOR_COUNT_MAX {
                return Err(Error::invalid_schedule(
                    name,
                    format!(
                        "reminder count limit {} reached",
                        REMINDERS_PER_ACTOR_COUNT_MAX
                    ),
                ));
            }
        }

        self.shared.store.save_reminder(&reminder).await?;
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        entries.insert(
            key,
            Entry {
                reminder: reminder.clone(),
                generation,
                in_flight: false,
                retry_at_ms: None,
            },
        );
        drop(entries);

        debug!(
            next_due_at_ms = reminder.next_due_at_ms,
            expires_at_ms = ?reminder.expires_at(),
            "Reminder registered"
        );
        self.shared.wakeup.notify_one();
        Ok(reminder)
    }

    /// Remove a reminder; no-op if it does not exist
    #[instrument(skip(self), fields(actor_id = %actor_id), level = "debug")]
    pub async fn unregister(&self, actor_id: &ActorId, name: &str) -> Result<()> {
        let key = (actor_id.clone(), name.to_string());
        let mut entries = self.shared.entries.lock().await;
        self.shared.store.delete_reminder(actor_id, name).await?;
        if entries.remove(&key).is_some() {
            debug!("Reminder unregistered");
        }
        drop(entries);
        self.shared.wakeup.notify_one();
        Ok(())
    }

    /// Read a reminder; expired reminders read as absent
    pub async fn get(&self, actor_id: &ActorId, name: &str) -> Result<Option<Reminder>> {
        let now_ms = self.shared.time.now_ms();
        let reminder = self.shared.store.get_reminder(actor_id, name).await?;
        Ok(reminder.filter(|r| r.expires_at().map_or(true, |exp| now_ms < exp)))
    }

    /// Number of reminders currently scheduled
    pub async fn len(&self) -> usize {
        self.shared.entries.lock().await.len()
    }

    /// Check if no reminders are scheduled
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Check if the delivery loop is running
    pub fn is_running(&self) -> bool {
        self.shared
            .task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Load stored reminders and start the delivery loop
    #[instrument(skip(self, target), level = "info")]
    pub async fn start(&self, target: Arc<dyn ReminderTarget>) -> Result<()> {
        if self.is_running() {
            return Err(Error::internal("reminder scheduler already started"));
        }

        let now_ms = self.shared.time.now_ms();
        let stored = self.shared.store.list_reminders().await?;
        let mut loaded = 0usize;
        let mut expired = 0usize;

        {
            let mut entries = self.shared.entries.lock().await;
            entries.clear();
            for reminder in stored {
                if reminder.expires_at().is_some_and(|exp| exp <= now_ms) {
                    self.shared
                        .store
                        .delete_reminder(&reminder.actor_id, &reminder.name)
                        .await?;
                    expired += 1;
                    continue;
                }
                let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
                entries.insert(
                    (reminder.actor_id.clone(), reminder.name.clone()),
                    Entry {
                        reminder,
                        generation,
                        in_flight: false,
                        retry_at_ms: None,
                    },
                );
                loaded += 1;
            }
        }

        self.shared.shutdown_tx.send_replace(false);
        let shutdown_rx = self.shared.shutdown_tx.subscribe();
        let shared = self.shared.clone();
        let task = tokio::spawn(async move {
            run_loop(shared, target, shutdown_rx).await;
        });
        *self
            .shared
            .task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(task);

        info!(loaded, expired, "Reminder scheduler started");
        Ok(())
    }

    /// Stop the delivery loop
    ///
    /// Reminders stay in the store. Deliveries already handed to the target
    /// are not cancelled.
    pub async fn shutdown(&self) {
        self.shared.shutdown_tx.send_replace(true);
        let task = self
            .shared
            .task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "Reminder loop terminated abnormally");
            }
            info!("Reminder scheduler stopped");
        }
    }

    /// Abort the loop without waiting (used from `Drop`)
    pub(crate) fn abort(&self) {
        if let Some(task) = self
            .shared
            .task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

// =============================================================================
// Delivery loop
// =============================================================================

struct DueReminder {
    key: ReminderKey,
    fired: ReminderFired,
    generation: u64,
}

async fn run_loop(
    shared: Arc<Shared>,
    target: Arc<dyn ReminderTarget>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let now_ms = shared.time.now_ms();
        let (due, next_wake_ms) = collect_due(&shared, now_ms).await;

        for reminder in due {
            let shared = shared.clone();
            let target = target.clone();
            tokio::spawn(async move {
                deliver(shared, target, reminder).await;
            });
        }

        let sleep_ms = next_wake_ms.map(|wake| wake.saturating_sub(now_ms));
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = shared.wakeup.notified() => {}
            _ = shared.time.sleep_ms(sleep_ms.unwrap_or(0)), if sleep_ms.is_some() => {}
        }
    }
    debug!("Reminder loop exited");
}

/// Mark due reminders in flight, drop expired ones, and find the next wake time
async fn collect_due(shared: &Shared, now_ms: u64) -> (Vec<DueReminder>, Option<u64>) {
    let mut entries = shared.entries.lock().await;
    let mut due = Vec::new();
    let mut expired = Vec::new();
    let mut next_wake_ms: Option<u64> = None;

    for (key, entry) in entries.iter_mut() {
        if entry.in_flight {
            continue;
        }

        if entry
            .reminder
            .expires_at()
            .is_some_and(|exp| now_ms >= exp)
        {
            expired.push(key.clone());
            continue;
        }

        let wake_at_ms = entry.wake_at_ms();
        if entry.reminder.is_live() && wake_at_ms <= now_ms {
            entry.in_flight = true;
            entry.retry_at_ms = None;
            due.push(DueReminder {
                key: key.clone(),
                fired: ReminderFired {
                    name: entry.reminder.name.clone(),
                    payload: entry.reminder.payload.clone(),
                    due_at_ms: entry.reminder.next_due_at_ms,
                },
                generation: entry.generation,
            });
            continue;
        }

        next_wake_ms = Some(next_wake_ms.map_or(wake_at_ms, |w| w.min(wake_at_ms)));
    }

    for key in expired {
        entries.remove(&key);
        match shared.store.delete_reminder(&key.0, &key.1).await {
            Ok(()) => info!(actor_id = %key.0, name = %key.1, "Reminder expired"),
            Err(e) => warn!(
                actor_id = %key.0,
                name = %key.1,
                error = %e,
                "Failed to delete expired reminder; it is dropped again on next start"
            ),
        }
    }

    (due, next_wake_ms)
}

/// What to do with an entry after its delivery finished
enum Outcome {
    Advance(Reminder),
    Finished,
    Retry,
}

async fn deliver(shared: Arc<Shared>, target: Arc<dyn ReminderTarget>, due: DueReminder) {
    let DueReminder {
        key,
        fired,
        generation,
    } = due;
    let due_at_ms = fired.due_at_ms;

    let result = target.deliver_reminder(&key.0, fired).await;
    let now_ms = shared.time.now_ms();

    let mut entries = shared.entries.lock().await;
    let outcome = match entries.get(&key) {
        // Unregistered or replaced while the turn ran: the newer state wins
        None => None,
        Some(entry) if entry.generation != generation => None,
        Some(entry) => Some(match &result {
            Ok(()) => match entry.reminder.schedule.next_due_after(due_at_ms, now_ms) {
                Some(next) => {
                    let mut advanced = entry.reminder.clone();
                    advanced.next_due_at_ms = next;
                    Outcome::Advance(advanced)
                }
                None => Outcome::Finished,
            },
            Err(_) => Outcome::Retry,
        }),
    };

    match outcome {
        None => {}
        Some(Outcome::Advance(advanced)) => match shared.store.save_reminder(&advanced).await {
            Ok(()) => {
                debug!(
                    actor_id = %key.0,
                    name = %key.1,
                    next_due_at_ms = advanced.next_due_at_ms,
                    live = advanced.is_live(),
                    "Reminder advanced"
                );
                if let Some(entry) = entries.get_mut(&key) {
                    entry.reminder = advanced;
                    entry.in_flight = false;
                }
            }
            Err(e) => {
                warn!(actor_id = %key.0, name = %key.1, error = %e, "Failed to persist reminder progress");
                set_retry(&mut entries, &key, now_ms);
            }
        },
        Some(Outcome::Finished) => match shared.store.delete_reminder(&key.0, &key.1).await {
            Ok(()) => {
                debug!(actor_id = %key.0, name = %key.1, "One-shot reminder completed");
                entries.remove(&key);
            }
            Err(e) => {
                warn!(actor_id = %key.0, name = %key.1, error = %e, "Failed to delete completed reminder");
                set_retry(&mut entries, &key, now_ms);
            }
        },
        Some(Outcome::Retry) => {
            if let Err(e) = &result {
                warn!(
                    actor_id = %key.0,
                    name = %key.1,
                    error = %e,
                    retry_in_ms = REMINDER_RETRY_BACKOFF_MS,
                    "Reminder delivery failed"
                );
            }
            set_retry(&mut entries, &key, now_ms);
        }
    }
    drop(entries);

    shared.wakeup.notify_one();
}

fn set_retry(entries: &mut HashMap<ReminderKey, Entry>, key: &ReminderKey, now_ms: u64) {
    if let Some(entry) = entries.get_mut(key) {
        entry.in_flight = false;
        entry.retry_at_ms = Some(now_ms.saturating_add(REMINDER_RETRY_BACKOFF_MS));
    }
}
