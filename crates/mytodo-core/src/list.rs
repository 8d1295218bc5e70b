use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::datastore::TaskStore;
use crate::filter::ViewFilter;
use crate::interchange;
use crate::storage::Storage;
use crate::task::Task;

pub const CONFIRM_DELETE_ONE: &str = "Are you sure you want to delete this task?";
pub const CONFIRM_DELETE_MANY: &str = "Are you sure you want to delete these tasks?";

/// Asks the user to approve a destructive action.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: FnMut(&str) -> bool,
{
    fn confirm(&mut self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Working copy of the task collection for one list session.
#[derive(Debug)]
pub struct TaskList<'s, S: Storage> {
    store: &'s TaskStore<S>,
    tasks: Vec<Task>,
    select_all: bool,
}

impl<'s, S: Storage> TaskList<'s, S> {
    pub fn load(store: &'s TaskStore<S>) -> anyhow::Result<Self> {
        let mut list = Self {
            store,
            tasks: Vec::new(),
            select_all: false,
        };
        list.refresh()?;
        Ok(list)
    }

    #[instrument(skip(self))]
    pub fn refresh(&mut self) -> anyhow::Result<()> {
        let mut tasks = self.store.list()?;
        for task in &mut tasks {
            task.is_checked = false;
        }
        self.tasks = tasks;
        self.select_all = false;
        debug!(count = self.tasks.len(), "working list refreshed");
        Ok(())
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn find(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Lazily filtered view in insertion order. Cloning the iterator
    /// restarts it.
    pub fn filtered_view<'a>(
        &'a self,
        filter: &'a ViewFilter,
        now: DateTime<Utc>,
    ) -> impl Iterator<Item = &'a Task> + Clone + 'a {
        self.tasks.iter().filter(move |t| filter.matches(t, now))
    }

    /// Distinct tags in first-seen order.
    pub fn tags(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.tasks
            .iter()
            .filter(|t| seen.insert(t.tag.as_str()))
            .map(|t| t.tag.clone())
            .collect()
    }

    pub fn toggle_check(&mut self, id: u64) -> bool {
        match self.tasks.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                task.is_checked = !task.is_checked;
                true
            }
            None => false,
        }
    }

    pub fn check_all(&mut self, flag: bool) {
        self.select_all = flag;
        for task in &mut self.tasks {
            task.is_checked = flag;
        }
    }

    pub fn select_all(&self) -> bool {
        self.select_all
    }

    pub fn checked_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_checked).count()
    }

    pub fn is_any_checked(&self) -> bool {
        self.tasks.iter().any(|t| t.is_checked)
    }

    pub fn checked_ids(&self) -> BTreeSet<u64> {
        self.tasks
            .iter()
            .filter(|t| t.is_checked)
            .map(|t| t.id)
            .collect()
    }

    /// Flip one task's done flag and persist it. Returns `false` when no
    /// task has that id.
    #[instrument(skip(self))]
    pub fn toggle_done(&mut self, id: u64) -> anyhow::Result<bool> {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            return Ok(false);
        };
        task.is_done = !task.is_done;
        let mut stored = task.clone();
        stored.is_checked = false;
        self.store.save(stored)?;
        Ok(true)
    }

    #[instrument(skip(self, confirm))]
    pub fn delete_one(&mut self, id: u64, confirm: &mut impl Confirm) -> anyhow::Result<bool> {
        if !confirm.confirm(CONFIRM_DELETE_ONE) {
            debug!("delete declined");
            return Ok(false);
        }
        self.store.delete(id)?;
        self.refresh()?;
        Ok(true)
    }

    #[instrument(skip(self, confirm))]
    pub fn delete_checked(&mut self, confirm: &mut impl Confirm) -> anyhow::Result<bool> {
        let ids = self.checked_ids();
        if !confirm.confirm(CONFIRM_DELETE_MANY) {
            debug!("bulk delete declined");
            return Ok(false);
        }
        self.store.delete_many(&ids)?;
        info!(count = ids.len(), "deleted checked tasks");
        self.refresh()?;
        Ok(true)
    }

    /// Set the done flag on every checked task, persist each and reload.
    #[instrument(skip(self))]
    pub fn mark_checked(&mut self, done: bool) -> anyhow::Result<usize> {
        let mut changed = 0;
        for task in self.tasks.iter_mut().filter(|t| t.is_checked) {
            task.is_done = done;
            task.is_checked = false;
            self.store.save(task.clone())?;
            changed += 1;
        }
        info!(changed, done, "marked checked tasks");
        self.refresh()?;
        Ok(changed)
    }

    pub fn checked(&self) -> impl Iterator<Item = &Task> + Clone {
        self.tasks.iter().filter(|t| t.is_checked)
    }

    #[instrument(skip(self))]
    pub fn export_checked(&self) -> anyhow::Result<Vec<u8>> {
        debug!(count = self.checked_count(), "exporting checked tasks");
        interchange::export_workbook(self.checked())
    }

    /// Append every data row of the workbook as a new task and persist the
    /// merged list. Returns the number of imported rows.
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    pub fn import_from_workbook(&mut self, bytes: &[u8]) -> anyhow::Result<usize> {
        let drafts = interchange::import_workbook(bytes)?;
        let count = drafts.len();

        for mut task in drafts {
            task.id = self.store.next_id(&self.tasks);
            self.tasks.push(task);
        }

        let stored: Vec<Task> = self
            .tasks
            .iter()
            .cloned()
            .map(|mut t| {
                t.is_checked = false;
                t
            })
            .collect();
        self.store.replace_all(&stored)?;
        info!(count, total = self.tasks.len(), "imported tasks");
        self.refresh()?;
        Ok(count)
    }
}
