use tracing::{debug, info, instrument};

use crate::datastore::TaskStore;
use crate::route::Route;
use crate::storage::Storage;
use crate::task::Task;

pub const NAME_MAX_CHARS: usize = 50;
pub const DESCRIPTION_MAX_CHARS: usize = 200;
pub const REQUIRED_FIELDS_MESSAGE: &str = "Please fill in all required fields.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("task name is required")]
    MissingName,
    #[error("task name is {len} characters; the limit is {max}", max = NAME_MAX_CHARS)]
    NameTooLong { len: usize },
    #[error("deadline is required")]
    MissingDeadline,
    #[error("tag is required")]
    MissingTag,
    #[error("description is {len} characters; the limit is {max}", max = DESCRIPTION_MAX_CHARS)]
    DescriptionTooLong { len: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("Please fill in all required fields. ({0})")]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Check a draft against the form rules, reporting the first failing field.
pub fn validate(task: &Task) -> Result<(), ValidationError> {
    let name_len = task.name.chars().count();
    if name_len == 0 {
        return Err(ValidationError::MissingName);
    }
    if name_len > NAME_MAX_CHARS {
        return Err(ValidationError::NameTooLong { len: name_len });
    }
    if let Some(description) = &task.description {
        let len = description.chars().count();
        if len > DESCRIPTION_MAX_CHARS {
            return Err(ValidationError::DescriptionTooLong { len });
        }
    }
    if task.deadline.is_empty() {
        return Err(ValidationError::MissingDeadline);
    }
    if task.tag.is_empty() {
        return Err(ValidationError::MissingTag);
    }
    Ok(())
}

/// Holds one task draft for the create and edit forms.
#[derive(Debug)]
pub struct TaskEditor<'s, S: Storage> {
    store: &'s TaskStore<S>,
    draft: Task,
    error_message: Option<String>,
}

impl<'s, S: Storage> TaskEditor<'s, S> {
    /// Edit the stored task with `id`, or start a blank draft when `id` is
    /// `None` or unknown.
    #[instrument(skip(store))]
    pub fn open(store: &'s TaskStore<S>, id: Option<u64>) -> anyhow::Result<Self> {
        let draft = match id {
            Some(id) => store.get(id)?.unwrap_or_else(|| {
                debug!(id, "no task with that id; starting a blank draft");
                Task::draft()
            }),
            None => Task::draft(),
        };
        Ok(Self {
            store,
            draft,
            error_message: None,
        })
    }

    pub fn draft(&self) -> &Task {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut Task {
        &mut self.draft
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// The route this editor was opened on.
    pub fn route(&self) -> Route {
        if self.draft.id == 0 {
            Route::Add
        } else {
            Route::Edit(self.draft.id)
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate(&self.draft)
    }

    /// Validate and persist the draft, then hand back the list route.
    #[instrument(skip(self), fields(id = self.draft.id))]
    pub fn save(&mut self) -> Result<Route, EditorError> {
        if let Err(err) = self.validate() {
            debug!(error = %err, "draft rejected");
            self.error_message = Some(REQUIRED_FIELDS_MESSAGE.to_string());
            return Err(err.into());
        }
        self.error_message = None;

        if self.draft.description.as_deref() == Some("") {
            self.draft.description = None;
        }
        let mut task = self.draft.clone();
        task.is_checked = false;

        let id = self.store.save(task)?;
        self.draft.id = id;
        info!(id, "saved task from editor");
        Ok(Route::List)
    }
}
