//! In-memory state and reminder storage
//!
//! For tests and single-process deployments that do not need durability
//! across restarts.
//!
//! TigerStyle: Simple in-memory implementation with explicit fault injection.

use crate::kv::{validate_write, ReminderStore, StateKey, StateStore};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use warren_core::{ActorId, ETag, Error, OccResult, Reminder, Result, Versioned};

/// State data: key -> (value, etag)
type StateData = HashMap<StateKey, (Bytes, ETag)>;

/// Reminder data: (actor, name) -> reminder
type ReminderData = HashMap<(ActorId, String), Reminder>;

/// In-memory store implementing both `StateStore` and `ReminderStore`
///
/// Clones share the same data, so a test can keep a handle to a store it
/// gave to a runtime and inspect or fail it from outside.
#[derive(Clone)]
pub struct MemoryStore {
    states: Arc<RwLock<StateData>>,
    reminders: Arc<RwLock<ReminderData>>,
    /// Store-wide revision counter; ETags are never reused
    revision: Arc<AtomicU64>,
    /// Fault injection: when false every operation fails with StoreUnavailable
    available: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
            reminders: Arc::new(RwLock::new(HashMap::new())),
            revision: Arc::new(AtomicU64::new(ETag::INITIAL.value())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate the backend going away (`false`) or coming back (`true`)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of stored state entries
    pub async fn state_count(&self) -> usize {
        self.states.read().await.len()
    }

    /// Number of stored reminders
    pub async fn reminder_count(&self) -> usize {
        self.reminders.read().await.len()
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::store_unavailable("memory", "backend marked unavailable"))
        }
    }

    fn next_etag(&self) -> ETag {
        ETag::new(self.revision.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &StateKey) -> Result<Option<Versioned<Bytes>>> {
        self.check_available()?;
        let states = self.states.read().await;
        Ok(states
            .get(key)
            .map(|(value, etag)| Versioned::new(value.clone(), *etag)))
    }

    #[instrument(skip(self, value), fields(key = %key, value_len = value.len(), expected = ?expected))]
    async fn try_save(
        &self,
        key: &StateKey,
        value: Bytes,
        expected: Option<ETag>,
    ) -> Result<OccResult<ETag>> {
        self.check_available()?;
        validate_write(key, &value)?;

        let mut states = self.states.write().await;
        let current = states.get(key).map(|(_, etag)| *etag);
        if current != expected {
            debug!(current = ?current, "ETag mismatch, write rejected");
            return Ok(OccResult::VersionConflict { expected, current });
        }

        let etag = self.next_etag();
        debug_assert!(current.map_or(true, |c| c.is_stale(&etag)));
        states.insert(key.clone(), (value, etag));
        Ok(OccResult::Success(etag))
    }

    #[instrument(skip(self, value), fields(key = %key, value_len = value.len()))]
    async fn set(&self, key: &StateKey, value: Bytes) -> Result<ETag> {
        self.check_available()?;
        validate_write(key, &value)?;

        let mut states = self.states.write().await;
        let etag = self.next_etag();
        states.insert(key.clone(), (value, etag));
        Ok(etag)
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn delete(&self, key: &StateKey) -> Result<()> {
        self.check_available()?;
        self.states.write().await.remove(key);
        Ok(())
    }
}

#[async_trait]
impl ReminderStore for MemoryStore {
    #[instrument(skip(self, reminder), fields(actor_id = %reminder.actor_id, name = %reminder.name))]
    async fn save_reminder(&self, reminder: &Reminder) -> Result<()> {
        self.check_available()?;
        self.reminders.write().await.insert(
            (reminder.actor_id.clone(), reminder.name.clone()),
            reminder.clone(),
        );
        Ok(())
    }

    #[instrument(skip(self), fields(actor_id = %actor_id))]
    async fn delete_reminder(&self, actor_id: &ActorId, name: &str) -> Result<()> {
        self.check_available()?;
        self.reminders
            .write()
            .await
            .remove(&(actor_id.clone(), name.to_string()));
        Ok(())
    }

    async fn get_reminder(&self, actor_id: &ActorId, name: &str) -> Result<Option<Reminder>> {
        self.check_available()?;
        Ok(self
            .reminders
            .read()
            .await
            .get(&(actor_id.clone(), name.to_string()))
            .cloned())
    }

    async fn list_reminders(&self) -> Result<Vec<Reminder>> {
        self.check_available()?;
        Ok(self.reminders.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use warren_core::Schedule;

    fn key(id: &str, name: &str) -> StateKey {
        StateKey::new("actorstore", ActorId::new("WorkerActor", id).unwrap(), name)
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStore::new();
        let k = key("order-1", "my_data");

        assert!(store.get(&k).await.unwrap().is_none());

        let etag = store.set(&k, Bytes::from("value1")).await.unwrap();
        let read = store.get(&k).await.unwrap().unwrap();
        assert_eq!(read.value, Bytes::from("value1"));
        assert_eq!(read.etag, etag);

        store.delete(&k).await.unwrap();
        assert!(store.get(&k).await.unwrap().is_none());

        // Delete is idempotent
        store.delete(&k).await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_store_isolation() {
        let store = MemoryStore::new();
        let k1 = key("actor-1", "key");
        let k2 = key("actor-2", "key");

        store.set(&k1, Bytes::from("value1")).await.unwrap();
        store.set(&k2, Bytes::from("value2")).await.unwrap();

        assert_eq!(
            store.get(&k1).await.unwrap().unwrap().value,
            Bytes::from("value1")
        );
        assert_eq!(
            store.get(&k2).await.unwrap().unwrap().value,
            Bytes::from("value2")
        );
    }

    #[tokio::test]
    async fn test_try_save_stale_etag_rejected() {
        let store = MemoryStore::new();
        let k = key("order-1", "my_data");

        let t0 = store.set(&k, Bytes::from("seed")).await.unwrap();

        let t1 = store
            .try_save(&k, Bytes::from("x"), Some(t0))
            .await
            .unwrap()
            .ok()
            .unwrap();
        assert_ne!(t0, t1);

        let second = store
            .try_save(&k, Bytes::from("y"), Some(t0))
            .await
            .unwrap();
        assert_eq!(
            second,
            OccResult::VersionConflict {
                expected: Some(t0),
                current: Some(t1),
            }
        );

        let read = store.get(&k).await.unwrap().unwrap();
        assert_eq!(read.value, Bytes::from("x"));
        assert_eq!(read.etag, t1);
    }

    #[tokio::test]
    async fn test_try_save_expect_absent() {
        let store = MemoryStore::new();
        let k = key("order-1", "my_data");

        assert!(store
            .try_save(&k, Bytes::from("first"), None)
            .await
            .unwrap()
            .is_success());
        assert!(store
            .try_save(&k, Bytes::from("second"), None)
            .await
            .unwrap()
            .is_conflict());
    }

    #[tokio::test]
    async fn test_etag_not_reused_after_delete() {
        let store = MemoryStore::new();
        let k = key("order-1", "my_data");

        let t1 = store.set(&k, Bytes::from("a")).await.unwrap();
        store.delete(&k).await.unwrap();
        let t2 = store.set(&k, Bytes::from("b")).await.unwrap();

        assert_ne!(t1, t2);
        assert!(store
            .try_save(&k, Bytes::from("c"), Some(t1))
            .await
            .unwrap()
            .is_conflict());
    }

    #[tokio::test]
    async fn test_concurrent_try_save_single_winner() {
        let store = MemoryStore::new();
        let k = key("order-1", "counter");
        let t0 = store.set(&k, Bytes::from("0")).await.unwrap();

        let attempts = (0..16).map(|i| {
            let store = store.clone();
            let k = k.clone();
            tokio::spawn(async move {
                store
                    .try_save(&k, Bytes::from(i.to_string()), Some(t0))
                    .await
                    .unwrap()
                    .is_success()
            })
        });
        let results = futures::future::join_all(attempts).await;
        let winners = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_operation() {
        let store = MemoryStore::new();
        let k = key("order-1", "my_data");
        store.set(&k, Bytes::from("a")).await.unwrap();

        store.set_available(false);
        assert!(matches!(
            store.get(&k).await,
            Err(Error::StoreUnavailable { .. })
        ));
        assert!(matches!(
            store.try_save(&k, Bytes::from("b"), None).await,
            Err(Error::StoreUnavailable { .. })
        ));
        assert!(store.list_reminders().await.is_err());

        store.set_available(true);
        assert_eq!(
            store.get(&k).await.unwrap().unwrap().value,
            Bytes::from("a")
        );
    }

    #[tokio::test]
    async fn test_reminder_upsert_and_delete() {
        let store = MemoryStore::new();
        let actor = ActorId::new("WorkerActor", "A").unwrap();
        let schedule = Schedule::periodic(Duration::from_secs(1), Duration::from_secs(30));

        let r1 = Reminder::new(actor.clone(), "R1", schedule, Bytes::from("p1"), 0);
        store.save_reminder(&r1).await.unwrap();

        let r1b = Reminder::new(actor.clone(), "R1", schedule, Bytes::from("p2"), 10);
        store.save_reminder(&r1b).await.unwrap();

        assert_eq!(store.reminder_count().await, 1);
        let read = store.get_reminder(&actor, "R1").await.unwrap().unwrap();
        assert_eq!(read.payload, Bytes::from("p2"));

        store.delete_reminder(&actor, "R1").await.unwrap();
        store.delete_reminder(&actor, "R1").await.unwrap();
        assert!(store.get_reminder(&actor, "R1").await.unwrap().is_none());
    }
}
