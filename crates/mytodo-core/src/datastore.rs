use std::collections::BTreeSet;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::ids::IdGenerator;
use crate::storage::Storage;
use crate::task::Task;

pub const DEFAULT_STORAGE_KEY: &str = "myTodoList";

/// Owns the persisted task collection, stored as one JSON array under a
/// single storage key. Every mutation rewrites the whole array.
#[derive(Debug)]
pub struct TaskStore<S: Storage> {
    storage: S,
    key: String,
    ids: IdGenerator,
}

impl<S: Storage> TaskStore<S> {
    pub fn new(storage: S, key: impl Into<String>) -> Self {
        Self::with_ids(storage, key, IdGenerator::new())
    }

    pub fn with_ids(storage: S, key: impl Into<String>, ids: IdGenerator) -> Self {
        let key = key.into();
        debug!(key = %key, "task store ready");
        Self { storage, key, ids }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The full collection; malformed stored data reads as empty.
    #[tracing::instrument(skip(self), fields(key = %self.key))]
    pub fn list(&self) -> anyhow::Result<Vec<Task>> {
        let Some(raw) = self
            .storage
            .get(&self.key)
            .with_context(|| format!("failed to read storage slot {}", self.key))?
        else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<Vec<Task>>(&raw) {
            Ok(tasks) => {
                debug!(count = tasks.len(), "loaded tasks");
                Ok(tasks)
            }
            Err(err) => {
                warn!(error = %err, "stored task list is malformed; treating as empty");
                Ok(Vec::new())
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn get(&self, id: u64) -> anyhow::Result<Option<Task>> {
        Ok(self.list()?.into_iter().find(|t| t.id == id))
    }

    pub fn next_id(&self, existing: &[Task]) -> u64 {
        self.ids.next_for(existing)
    }

    /// Replace the entry with the same id, or append under a fresh id.
    /// Returns the id the task was stored under.
    #[tracing::instrument(skip(self, task), fields(id = task.id))]
    pub fn save(&self, mut task: Task) -> anyhow::Result<u64> {
        let mut tasks = self.list()?;

        let id = match tasks.iter().position(|t| t.id == task.id) {
            Some(idx) => {
                debug!(index = idx, "updating existing task");
                let id = task.id;
                tasks[idx] = task;
                id
            }
            None => {
                let id = self.next_id(&tasks);
                task.id = id;
                info!(id, "created task");
                tasks.push(task);
                id
            }
        };

        self.persist(&tasks)?;
        Ok(id)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete(&self, id: u64) -> anyhow::Result<()> {
        let tasks = self.list()?;
        let before = tasks.len();
        let kept: Vec<Task> = tasks.into_iter().filter(|t| t.id != id).collect();
        info!(before, after = kept.len(), "deleted task");
        self.persist(&kept)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_many(&self, ids: &BTreeSet<u64>) -> anyhow::Result<()> {
        let tasks = self.list()?;
        let before = tasks.len();
        let kept: Vec<Task> = tasks
            .into_iter()
            .filter(|t| !ids.contains(&t.id))
            .collect();
        info!(before, after = kept.len(), "deleted tasks");
        self.persist(&kept)
    }

    #[tracing::instrument(skip(self, tasks), fields(count = tasks.len()))]
    pub fn replace_all(&self, tasks: &[Task]) -> anyhow::Result<()> {
        self.persist(tasks)
    }

    fn persist(&self, tasks: &[Task]) -> anyhow::Result<()> {
        let serialized = serde_json::to_string(tasks)?;
        self.storage
            .set(&self.key, &serialized)
            .with_context(|| format!("failed to write storage slot {}", self.key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn store() -> TaskStore<MemoryStorage> {
        TaskStore::new(MemoryStorage::new(), DEFAULT_STORAGE_KEY)
    }

    fn task(name: &str, tag: &str) -> Task {
        Task::new(name.to_string(), "2024-01-01".to_string(), tag.to_string())
    }

    #[test]
    fn empty_store_lists_nothing() {
        assert!(store().list().expect("list").is_empty());
    }

    #[test]
    fn first_save_assigns_id_and_defaults() {
        let store = store();
        let id = store.save(task("Pay rent", "bills")).expect("save");

        let tasks = store.list().expect("list");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, id);
        assert_ne!(id, 0);
        assert_eq!(tasks[0].name, "Pay rent");
        assert_eq!(tasks[0].deadline, "2024-01-01");
        assert_eq!(tasks[0].tag, "bills");
        assert!(!tasks[0].is_done);
    }

    #[test]
    fn save_with_known_id_overwrites_in_place() {
        let store = store();
        let first = store.save(task("a", "x")).expect("save");
        let second = store.save(task("b", "x")).expect("save");

        let mut edited = store.get(first).expect("get").expect("present");
        edited.name = "a2".to_string();
        edited.is_done = true;
        assert_eq!(store.save(edited).expect("save"), first);

        let tasks = store.list().expect("list");
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, first);
        assert_eq!(tasks[0].name, "a2");
        assert!(tasks[0].is_done);
        assert_eq!(tasks[1].id, second);
    }

    #[test]
    fn rapid_saves_get_unique_ids() {
        let store = store();
        let ids: BTreeSet<u64> = (0..50)
            .map(|i| store.save(task(&format!("t{i}"), "x")).expect("save"))
            .collect();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn deleting_absent_id_leaves_collection_unchanged() {
        let store = store();
        store.save(task("a", "x")).expect("save");
        store.save(task("b", "y")).expect("save");
        let before = store.list().expect("list");

        store.delete(123).expect("delete");
        assert_eq!(store.list().expect("list"), before);
    }

    #[test]
    fn delete_many_removes_only_named_ids() {
        let store = store();
        let a = store.save(task("a", "x")).expect("save");
        let b = store.save(task("b", "x")).expect("save");
        let c = store.save(task("c", "x")).expect("save");

        store
            .delete_many(&BTreeSet::from([a, c, 999]))
            .expect("delete many");
        let left: Vec<u64> = store.list().expect("list").iter().map(|t| t.id).collect();
        assert_eq!(left, vec![b]);
    }

    #[test]
    fn malformed_json_reads_as_empty() {
        let store = TaskStore::new(
            MemoryStorage::with_value(DEFAULT_STORAGE_KEY, "not json {{{"),
            DEFAULT_STORAGE_KEY,
        );
        assert!(store.list().expect("list").is_empty());

        store.save(task("fresh", "x")).expect("save");
        assert_eq!(store.list().expect("list").len(), 1);
    }

    #[test]
    fn reads_records_written_by_the_browser_app() {
        let raw = r#"[{"id":1700000000123,"name":"Gym","description":"legs","deadline":"2024-02-02","tag":"health","isDone":true,"isChecked":false},{"id":1700000000456,"name":"Imported","deadline":"2024-02-03","tag":"misc"}]"#;
        let store = TaskStore::new(
            MemoryStorage::with_value(DEFAULT_STORAGE_KEY, raw),
            DEFAULT_STORAGE_KEY,
        );

        let tasks = store.list().expect("list");
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].description.as_deref(), Some("legs"));
        assert!(tasks[0].is_done);
        assert!(!tasks[1].is_done);
    }
}
