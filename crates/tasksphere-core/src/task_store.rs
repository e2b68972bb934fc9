use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::datetime::{DisplayZone, now_millis};
use crate::persist::PersistentStore;
use crate::storage::SlotStorage;
use crate::task::{DueDateParts, Task, TaskStatus};

pub const TASKS_KEY: &str = "tasks";

/// Appends `task`, regenerating its id if it collides with an existing one.
pub fn add(tasks: &[Task], mut task: Task) -> Vec<Task> {
    while tasks.iter().any(|t| t.id == task.id) {
        task.id = Uuid::new_v4();
    }
    let mut next = Vec::with_capacity(tasks.len() + 1);
    next.extend_from_slice(tasks);
    next.push(task);
    next
}

/// Retitles the matching task. Blank titles and unknown ids leave the
/// collection as it was.
pub fn update(tasks: &[Task], id: Uuid, title: &str, now: DateTime<Utc>) -> Vec<Task> {
    if title.trim().is_empty() {
        return tasks.to_vec();
    }
    replace_where(tasks, id, |task| {
        task.title = title.to_string();
        task.touch(now);
    })
}

pub fn delete(tasks: &[Task], id: Uuid) -> Vec<Task> {
    tasks.iter().filter(|task| task.id != id).cloned().collect()
}

pub fn set_status(tasks: &[Task], id: Uuid, status: TaskStatus, now: DateTime<Utc>) -> Vec<Task> {
    replace_where(tasks, id, |task| {
        task.status = status;
        task.touch(now);
    })
}

fn replace_where<F>(tasks: &[Task], id: Uuid, mut edit: F) -> Vec<Task>
where
    F: FnMut(&mut Task),
{
    tasks
        .iter()
        .map(|task| {
            let mut task = task.clone();
            if task.id == id {
                edit(&mut task);
            }
            task
        })
        .collect()
}

/// The task collection mirrored to the `tasks` slot. Every operation that
/// changes the collection writes the whole collection back; no-ops write
/// nothing.
#[derive(Debug)]
pub struct TaskStore<S> {
    persist: PersistentStore<S>,
    zone: DisplayZone,
    tasks: Vec<Task>,
}

impl<S: SlotStorage> TaskStore<S> {
    #[tracing::instrument(skip(persist))]
    pub fn open(persist: PersistentStore<S>, zone: DisplayZone) -> Self {
        let tasks: Vec<Task> = persist.load(TASKS_KEY, Vec::new());
        info!(count = tasks.len(), "loaded tasks");
        Self {
            persist,
            zone,
            tasks,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    #[tracing::instrument(skip(self, due))]
    pub fn add(&mut self, title: &str, due: &DueDateParts) -> Option<Task> {
        self.add_at(title, due, now_millis())
    }

    pub fn add_at(&mut self, title: &str, due: &DueDateParts, now: DateTime<Utc>) -> Option<Task> {
        let Some(task) = Task::create(title, due, &self.zone, now) else {
            debug!("blank title; add ignored");
            return None;
        };
        let next = add(&self.tasks, task);
        let created = next.last().cloned();
        self.commit(next);
        created
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn update(&mut self, id: Uuid, title: &str) -> bool {
        self.update_at(id, title, now_millis())
    }

    pub fn update_at(&mut self, id: Uuid, title: &str, now: DateTime<Utc>) -> bool {
        let next = update(&self.tasks, id, title, now);
        self.commit_if_changed(next)
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn delete(&mut self, id: Uuid) -> bool {
        let next = delete(&self.tasks, id);
        self.commit_if_changed(next)
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn set_status(&mut self, id: Uuid, status: TaskStatus) -> bool {
        self.set_status_at(id, status, now_millis())
    }

    pub fn set_status_at(&mut self, id: Uuid, status: TaskStatus, now: DateTime<Utc>) -> bool {
        let next = set_status(&self.tasks, id, status, now);
        self.commit_if_changed(next)
    }

    /// Completes an open task or reopens a completed one. Returns the new
    /// status, or `None` when the id is unknown.
    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn toggle_completed(&mut self, id: Uuid) -> Option<TaskStatus> {
        let status = self.get(id)?.status.toggled();
        self.set_status(id, status);
        Some(status)
    }

    fn commit_if_changed(&mut self, next: Vec<Task>) -> bool {
        if next == self.tasks {
            debug!("collection unchanged; nothing to save");
            return false;
        }
        self.commit(next);
        true
    }

    fn commit(&mut self, next: Vec<Task>) {
        self.tasks = next;
        self.persist.save(TASKS_KEY, &self.tasks);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::{TASKS_KEY, TaskStore};
    use crate::datetime::DisplayZone;
    use crate::persist::PersistentStore;
    use crate::storage::{MemoryStorage, SlotStorage};
    use crate::task::{DueDateParts, Task, TaskStatus};

    fn open(storage: &MemoryStorage) -> TaskStore<MemoryStorage> {
        TaskStore::open(PersistentStore::new(storage.clone()), DisplayZone::Local)
    }

    fn t0() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
            .single()
            .expect("valid t0")
    }

    #[test]
    fn add_creates_fresh_tasks() {
        let storage = MemoryStorage::new();
        let mut store = open(&storage);

        let a = store.add("Buy milk", &DueDateParts::default()).expect("add a");
        let b = store.add("Buy milk", &DueDateParts::default()).expect("add b");

        assert_ne!(a.id, b.id);
        assert_eq!(a.status, TaskStatus::NotStarted);
        assert_eq!(a.created_at, a.updated_at);
        assert_eq!(store.tasks().len(), 2);
        assert_eq!(store.tasks()[0].id, a.id, "insertion order is kept");
    }

    #[test]
    fn blank_add_is_a_no_op() {
        let storage = MemoryStorage::new();
        let mut store = open(&storage);
        assert!(store.add("", &DueDateParts::default()).is_none());
        assert!(store.add("   ", &DueDateParts::default()).is_none());
        assert!(store.tasks().is_empty());
        assert_eq!(storage.get_item(TASKS_KEY).expect("get"), None);
    }

    #[test]
    fn add_composes_due_date_in_local_time() {
        let storage = MemoryStorage::new();
        let mut store = open(&storage);

        let task = store
            .add("Dentist", &DueDateParts::new("2025-03-01", "14:30"))
            .expect("add");
        let due = task.due_date.expect("due set");
        let expected = chrono::NaiveDate::from_ymd_opt(2025, 3, 1)
            .and_then(|d| d.and_hms_opt(14, 30, 0))
            .expect("valid naive");
        assert_eq!(DisplayZone::Local.to_local_naive(due), expected);

        let partial = DueDateParts {
            date: Some("2025-03-01".to_string()),
            time: None,
        };
        let task = store.add("Dentist again", &partial).expect("add");
        assert!(task.due_date.is_none());
    }

    #[test]
    fn mutations_persist_and_reload() {
        let storage = MemoryStorage::new();
        let mut store = open(&storage);
        let task = store.add_at("Draft", &DueDateParts::default(), t0()).expect("add");

        assert!(store.update_at(task.id, "Final", t0() + Duration::minutes(3)));
        assert!(store.set_status_at(task.id, TaskStatus::Active, t0() + Duration::minutes(4)));

        let reopened = open(&storage);
        let loaded = reopened.get(task.id).expect("persisted");
        assert_eq!(loaded.title, "Final");
        assert_eq!(loaded.status, TaskStatus::Active);
        assert_eq!(loaded.created_at, t0());
        assert_eq!(loaded.updated_at, t0() + Duration::minutes(4));
    }

    #[test]
    fn unknown_ids_are_no_ops() {
        let storage = MemoryStorage::new();
        let mut store = open(&storage);
        store.add("Keep me", &DueDateParts::default()).expect("add");
        let before: Vec<Task> = store.tasks().to_vec();
        let unknown = Uuid::new_v4();

        assert!(!store.update(unknown, "x"));
        assert!(!store.delete(unknown));
        assert!(!store.set_status(unknown, TaskStatus::Active));
        assert_eq!(store.toggle_completed(unknown), None);
        assert_eq!(store.tasks(), before.as_slice());
    }

    #[test]
    fn blank_update_is_a_no_op() {
        let storage = MemoryStorage::new();
        let mut store = open(&storage);
        let task = store.add("Title", &DueDateParts::default()).expect("add");
        assert!(!store.update(task.id, "  "));
        assert_eq!(store.get(task.id).map(|t| t.title.as_str()), Some("Title"));
    }

    #[test]
    fn delete_removes_only_the_match() {
        let storage = MemoryStorage::new();
        let mut store = open(&storage);
        let a = store.add("a", &DueDateParts::default()).expect("add a");
        let b = store.add("b", &DueDateParts::default()).expect("add b");
        assert!(store.delete(a.id));
        assert_eq!(store.tasks().len(), 1);
        assert_eq!(store.tasks()[0].id, b.id);
        assert_eq!(open(&storage).tasks().len(), 1);
    }

    #[test]
    fn toggle_completes_and_reopens() {
        let storage = MemoryStorage::new();
        let mut store = open(&storage);
        let task = store.add("Ship it", &DueDateParts::default()).expect("add");
        assert_eq!(store.toggle_completed(task.id), Some(TaskStatus::Completed));
        assert_eq!(store.toggle_completed(task.id), Some(TaskStatus::NotStarted));
    }

    #[test]
    fn failed_writes_keep_memory_state() {
        let storage = MemoryStorage::with_quota(8);
        let mut store = open(&storage);
        let task = store.add("Too big to store", &DueDateParts::default()).expect("add");
        assert_eq!(store.tasks().len(), 1);
        assert!(store.set_status(task.id, TaskStatus::Completed));
        assert_eq!(store.get(task.id).map(|t| t.status), Some(TaskStatus::Completed));
        assert_eq!(storage.get_item(TASKS_KEY).expect("get"), None);
    }

    #[test]
    fn pure_add_avoids_id_collisions() {
        let first = Task::create("one", &DueDateParts::default(), &DisplayZone::Local, t0())
            .expect("task");
        let mut clash = first.clone();
        clash.title = "two".to_string();
        let next = super::add(std::slice::from_ref(&first), clash);
        assert_eq!(next.len(), 2);
        assert_ne!(next[0].id, next[1].id);
    }
}
