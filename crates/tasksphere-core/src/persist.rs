use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, trace};

use crate::revive::{Revival, revive_tree};
use crate::storage::SlotStorage;

/// Typed values in named slots. Loading never fails: anything missing or
/// unreadable falls back to the caller's default. Saving never fails either;
/// write errors are logged and the caller's in-memory value stays the source
/// of truth.
#[derive(Debug, Clone)]
pub struct PersistentStore<S> {
    storage: S,
    revival: Revival,
}

impl<S: SlotStorage> PersistentStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            revival: Revival::default(),
        }
    }

    pub fn with_revival(mut self, revival: Revival) -> Self {
        self.revival = revival;
        self
    }

    #[tracing::instrument(skip(self, default))]
    pub fn load<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.try_load(key) {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!(key, "slot empty; using default");
                default
            }
            Err(err) => {
                error!(key, error = %format!("{err:#}"), "failed loading slot; using default");
                default
            }
        }
    }

    /// `Ok(None)` for an absent slot.
    pub fn try_load<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        let Some(raw) = self.storage.get_item(key)? else {
            return Ok(None);
        };

        let mut tree: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("slot '{key}' does not hold valid JSON"))?;
        let revived = revive_tree(&mut tree, self.revival);
        trace!(key, revived, "revived timestamp strings");

        let value = serde_json::from_value(tree)
            .with_context(|| format!("slot '{key}' has an unexpected shape"))?;
        Ok(Some(value))
    }

    #[tracing::instrument(skip(self, value))]
    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(err) = self.try_save(key, value) {
            error!(key, error = %format!("{err:#}"), "failed saving slot; keeping in-memory state");
        }
    }

    pub fn try_save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let text = serde_json::to_string(value)
            .with_context(|| format!("failed serializing slot '{key}'"))?;
        self.storage
            .set_item(key, &text)
            .with_context(|| format!("failed writing slot '{key}'"))?;
        debug!(key, bytes = text.len(), "saved slot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    use super::PersistentStore;
    use crate::revive::Revival;
    use crate::storage::{MemoryStorage, SlotStorage};
    use crate::task::{Task, TaskStatus};

    fn sample_tasks() -> Vec<Task> {
        let created = Utc
            .with_ymd_and_hms(2025, 2, 27, 8, 15, 0)
            .single()
            .expect("valid created");
        let due = Utc
            .with_ymd_and_hms(2025, 3, 1, 14, 30, 0)
            .single()
            .expect("valid due");
        vec![
            Task {
                id: Uuid::new_v4(),
                title: "Buy milk".to_string(),
                status: TaskStatus::NotStarted,
                created_at: created,
                updated_at: created,
                due_date: Some(due),
            },
            Task {
                id: Uuid::new_v4(),
                title: "File taxes".to_string(),
                status: TaskStatus::Completed,
                created_at: created,
                updated_at: created + chrono::Duration::milliseconds(1_250),
                due_date: None,
            },
        ]
    }

    #[test]
    fn absent_slot_yields_default() {
        let store = PersistentStore::new(MemoryStorage::new());
        let tasks: Vec<Task> = store.load("tasks", vec![]);
        assert!(tasks.is_empty());
    }

    #[test]
    fn date_bearing_tasks_roundtrip() {
        let store = PersistentStore::new(MemoryStorage::new());
        let tasks = sample_tasks();
        store.save("tasks", &tasks);
        let loaded: Vec<Task> = store.load("tasks", vec![]);
        assert_eq!(loaded, tasks);
    }

    #[test]
    fn saved_text_uses_iso_strings() {
        let storage = MemoryStorage::new();
        let store = PersistentStore::new(storage.clone());
        store.save("tasks", &sample_tasks());
        let raw = storage.get_item("tasks").expect("get").expect("slot written");
        assert!(raw.contains("\"dueDate\":\"2025-03-01T14:30:00.000Z\""));
        assert!(raw.contains("\"updatedAt\":\"2025-02-27T08:15:01.250Z\""));
    }

    #[test]
    fn corrupt_text_yields_default() {
        let storage = MemoryStorage::new();
        storage.set_item("tasks", "{not json").expect("seed");
        let store = PersistentStore::new(storage.clone());
        let tasks: Vec<Task> = store.load("tasks", vec![]);
        assert!(tasks.is_empty());

        storage.set_item("tasks", "{\"isDark\":true}").expect("seed");
        let tasks: Vec<Task> = store.load("tasks", vec![]);
        assert!(tasks.is_empty());
    }

    #[test]
    fn failed_write_is_swallowed() {
        let storage = MemoryStorage::with_quota(32);
        let store = PersistentStore::new(storage.clone());
        let tasks = sample_tasks();
        store.save("tasks", &tasks);
        assert!(store.try_save("tasks", &tasks).is_err());
        assert_eq!(storage.get_item("tasks").expect("get"), None);
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Note {
        title: String,
    }

    #[test]
    fn blind_revival_rewrites_timestamp_shaped_text() {
        let storage = MemoryStorage::new();
        storage
            .set_item("note", "{\"title\":\"2025-03-01T14:30:00Z\"}")
            .expect("seed");

        let blind = PersistentStore::new(storage.clone());
        let note: Option<Note> = blind.load("note", None);
        assert_eq!(
            note.map(|n| n.title).as_deref(),
            Some("2025-03-01T14:30:00.000Z")
        );

        let plain = PersistentStore::new(storage).with_revival(Revival::Disabled);
        let note: Option<Note> = plain.load("note", None);
        assert_eq!(note.map(|n| n.title).as_deref(), Some("2025-03-01T14:30:00Z"));
    }
}
