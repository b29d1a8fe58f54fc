//! Durable file-backed storage
//!
//! Keeps the full state and reminder tables in memory and rewrites a single
//! JSON snapshot in the data directory after every mutation. The snapshot is
//! written to a temporary file and renamed over the old one, so a crash leaves
//! either the previous or the new snapshot on disk, never a torn one.
//!
//! Suited to small deployments and to restart tests; every write costs a full
//! snapshot.

use crate::kv::{validate_write, ReminderStore, StateKey, StateStore};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use warren_core::{ActorId, ETag, Error, OccResult, Reminder, Result, Versioned};

/// Snapshot file name inside the data directory
const SNAPSHOT_FILE_NAME: &str = "warren-store.json";

/// On-disk format
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    revision: u64,
    states: Vec<StateRecord>,
    reminders: Vec<Reminder>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateRecord {
    key: StateKey,
    value: Bytes,
    etag: ETag,
}

/// In-memory tables mirrored to the snapshot
#[derive(Debug, Default, Clone)]
struct Tables {
    revision: u64,
    states: HashMap<StateKey, (Bytes, ETag)>,
    reminders: HashMap<(ActorId, String), Reminder>,
}

impl Tables {
    fn to_snapshot(&self) -> Snapshot {
        let mut states: Vec<StateRecord> = self
            .states
            .iter()
            .map(|(key, (value, etag))| StateRecord {
                key: key.clone(),
                value: value.clone(),
                etag: *etag,
            })
            .collect();
        states.sort_by(|a, b| a.key.cmp(&b.key));

        let mut reminders: Vec<Reminder> = self.reminders.values().cloned().collect();
        reminders.sort_by(|a, b| (&a.actor_id, &a.name).cmp(&(&b.actor_id, &b.name)));

        Snapshot {
            revision: self.revision,
            states,
            reminders,
        }
    }

    fn from_snapshot(snapshot: Snapshot) -> Self {
        let states = snapshot
            .states
            .into_iter()
            .map(|r| (r.key, (r.value, r.etag)))
            .collect();
        let reminders = snapshot
            .reminders
            .into_iter()
            .map(|r| ((r.actor_id.clone(), r.name.clone()), r))
            .collect();
        Self {
            revision: snapshot.revision,
            states,
            reminders,
        }
    }

    fn next_etag(&mut self) -> ETag {
        self.revision += 1;
        ETag::new(self.revision)
    }
}

/// File-backed store implementing both `StateStore` and `ReminderStore`
pub struct FileStore {
    path: PathBuf,
    tables: Mutex<Tables>,
}

impl FileStore {
    /// Open (or create) a store in `data_dir`, loading any existing snapshot
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|e| unavailable(data_dir, "create data dir", e))?;

        let path = data_dir.join(SNAPSHOT_FILE_NAME);
        let tables = match tokio::fs::read(&path).await {
            Ok(raw) => {
                let snapshot: Snapshot =
                    serde_json::from_slice(&raw).map_err(|e| Error::DeserializationFailed {
                        reason: format!("snapshot {}: {}", path.display(), e),
                    })?;
                Tables::from_snapshot(snapshot)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tables::default(),
            Err(e) => return Err(unavailable(&path, "read snapshot", e)),
        };

        info!(
            path = %path.display(),
            states = tables.states.len(),
            reminders = tables.reminders.len(),
            revision = tables.revision,
            "File store opened"
        );

        Ok(Self {
            path,
            tables: Mutex::new(tables),
        })
    }

    /// Path of the snapshot file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `mutate` to a copy of the tables, persist it, then publish it
    ///
    /// The lock is held across the write so snapshots hit the disk in
    /// mutation order. On a failed write the in-memory tables are unchanged.
    async fn commit<T>(&self, mutate: impl FnOnce(&mut Tables) -> T) -> Result<T> {
        let mut tables = self.tables.lock().await;
        let mut next = tables.clone();
        let out = mutate(&mut next);
        self.persist(&next).await?;
        *tables = next;
        Ok(out)
    }

    async fn persist(&self, tables: &Tables) -> Result<()> {
        let content =
            serde_json::to_vec_pretty(&tables.to_snapshot()).map_err(|e| {
                Error::SerializationFailed {
                    reason: e.to_string(),
                }
            })?;

        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &content)
            .await
            .map_err(|e| unavailable(&tmp_path, "write snapshot", e))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| unavailable(&self.path, "rename snapshot", e))?;

        debug!(
            path = %self.path.display(),
            bytes = content.len(),
            revision = tables.revision,
            "Snapshot written"
        );
        Ok(())
    }
}

fn unavailable(path: &Path, op: &str, e: std::io::Error) -> Error {
    Error::store_unavailable("file", format!("{} {}: {}", op, path.display(), e))
}

#[async_trait]
impl StateStore for FileStore {
    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &StateKey) -> Result<Option<Versioned<Bytes>>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .states
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
        validate_write(key, &value)?;

        let mut tables = self.tables.lock().await;
        let current = tables.states.get(key).map(|(_, etag)| *etag);
        if current != expected {
            debug!(current = ?current, "ETag mismatch, write rejected");
            return Ok(OccResult::VersionConflict { expected, current });
        }

        let mut next = tables.clone();
        let etag = next.next_etag();
        next.states.insert(key.clone(), (value, etag));
        self.persist(&next).await?;
        *tables = next;
        Ok(OccResult::Success(etag))
    }

    #[instrument(skip(self, value), fields(key = %key, value_len = value.len()))]
    async fn set(&self, key: &StateKey, value: Bytes) -> Result<ETag> {
        validate_write(key, &value)?;
        self.commit(|t| {
            let etag = t.next_etag();
            t.states.insert(key.clone(), (value, etag));
            etag
        })
        .await
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn delete(&self, key: &StateKey) -> Result<()> {
        if !self.tables.lock().await.states.contains_key(key) {
            return Ok(());
        }
        self.commit(|t| {
            t.states.remove(key);
        })
        .await
    }
}

#[async_trait]
impl ReminderStore for FileStore {
    #[instrument(skip(self, reminder), fields(actor_id = %reminder.actor_id, name = %reminder.name))]
    async fn save_reminder(&self, reminder: &Reminder) -> Result<()> {
        self.commit(|t| {
            t.reminders.insert(
                (reminder.actor_id.clone(), reminder.name.clone()),
                reminder.clone(),
            );
        })
        .await
    }

    #[instrument(skip(self), fields(actor_id = %actor_id))]
    async fn delete_reminder(&self, actor_id: &ActorId, name: &str) -> Result<()> {
        let slot = (actor_id.clone(), name.to_string());
        if !self.tables.lock().await.reminders.contains_key(&slot) {
            return Ok(());
        }
        self.commit(|t| {
            t.reminders.remove(&slot);
        })
        .await
    }

    async fn get_reminder(&self, actor_id: &ActorId, name: &str) -> Result<Option<Reminder>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .reminders
            .get(&(actor_id.clone(), name.to_string()))
            .cloned())
    }

    async fn list_reminders(&self) -> Result<Vec<Reminder>> {
        let tables = self.tables.lock().await;
        Ok(tables.reminders.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use warren_core::Schedule;

    fn key(name: &str) -> StateKey {
        StateKey::new(
            "actorstore",
            ActorId::new("WorkerActor", "order-1").unwrap(),
            name,
        )
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let k = key("my_data");

        let etag = {
            let store = FileStore::open(dir.path()).await.unwrap();
            store.set(&k, Bytes::from("persisted")).await.unwrap()
        };

        let store = FileStore::open(dir.path()).await.unwrap();
        let read = store.get(&k).await.unwrap().unwrap();
        assert_eq!(read.value, Bytes::from("persisted"));
        assert_eq!(read.etag, etag);
    }

    #[tokio::test]
    async fn test_file_store_revision_continues_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let k = key("my_data");

        let first = {
            let store = FileStore::open(dir.path()).await.unwrap();
            store.set(&k, Bytes::from("a")).await.unwrap();
            let etag = store.set(&key("other"), Bytes::from("b")).await.unwrap();
            store.delete(&key("other")).await.unwrap();
            etag
        };

        let store = FileStore::open(dir.path()).await.unwrap();
        let etag = store.set(&key("other"), Bytes::from("c")).await.unwrap();
        assert!(first.is_stale(&etag));
    }

    #[tokio::test]
    async fn test_file_store_try_save_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let k = key("my_data");

        let t1 = store
            .try_save(&k, Bytes::from("x"), None)
            .await
            .unwrap()
            .ok()
            .unwrap();
        assert!(store
            .try_save(&k, Bytes::from("y"), None)
            .await
            .unwrap()
            .is_conflict());
        assert!(store
            .try_save(&k, Bytes::from("z"), Some(t1))
            .await
            .unwrap()
            .is_success());
    }

    #[tokio::test]
    async fn test_file_store_reminders_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let actor = ActorId::new("WorkerActor", "A").unwrap();
        let reminder = Reminder::new(
            actor.clone(),
            "R1",
            Schedule::periodic(Duration::from_secs(1), Duration::from_secs(30)),
            Bytes::from_static(b"payload"),
            1_000,
        );

        {
            let store = FileStore::open(dir.path()).await.unwrap();
            store.save_reminder(&reminder).await.unwrap();
        }

        let store = FileStore::open(dir.path()).await.unwrap();
        assert_eq!(store.list_reminders().await.unwrap(), vec![reminder.clone()]);

        store.delete_reminder(&actor, "R1").await.unwrap();
        drop(store);

        let store = FileStore::open(dir.path()).await.unwrap();
        assert!(store.get_reminder(&actor, "R1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SNAPSHOT_FILE_NAME), b"not json").unwrap();

        let result = FileStore::open(dir.path()).await;
        assert!(matches!(result, Err(Error::DeserializationFailed { .. })));
    }
}
