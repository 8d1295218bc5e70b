use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Utc
};
use tracing::trace;

use crate::task::Task;

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq
)]
pub enum DeadlineFilter {
  #[default]
  All,
  Passed,
  Available
}

impl FromStr for DeadlineFilter {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" | "" => Ok(Self::All),
      | "passed" => Ok(Self::Passed),
      | "available" => {
        Ok(Self::Available)
      }
      | other => {
        Err(anyhow!(
          "unknown deadline filter: \
           {other} (expected all, \
           passed or available)"
        ))
      }
    }
  }
}

impl fmt::Display for DeadlineFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    let name = match self {
      | Self::All => "all",
      | Self::Passed => "passed",
      | Self::Available => "available"
    };
    f.write_str(name)
  }
}

impl DeadlineFilter {
  /// Unparseable deadlines only pass `All`.
  pub fn accepts(
    self,
    task: &Task,
    now: DateTime<Utc>
  ) -> bool {
    match self {
      | Self::All => true,
      | Self::Passed => {
        task
          .deadline_at()
          .is_some_and(|at| at < now)
      }
      | Self::Available => {
        task
          .deadline_at()
          .is_some_and(|at| at >= now)
      }
    }
  }
}

/// The three list predicates: name search, tag and deadline.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct ViewFilter {
  pub search:   String,
  pub tag:      Option<String>,
  pub deadline: DeadlineFilter
}

impl ViewFilter {
  pub fn new(
    search: impl Into<String>,
    tag: Option<String>,
    deadline: DeadlineFilter
  ) -> Self {
    Self {
      search: search.into(),
      tag,
      deadline
    }
  }

  pub fn is_empty(&self) -> bool {
    self.search.is_empty()
      && self.active_tag().is_none()
      && self.deadline
        == DeadlineFilter::All
  }

  fn active_tag(&self) -> Option<&str> {
    self
      .tag
      .as_deref()
      .filter(|t| !t.is_empty())
  }

  pub fn matches_search(
    &self,
    task: &Task
  ) -> bool {
    self.search.is_empty()
      || task
        .name
        .to_lowercase()
        .contains(
          &self.search.to_lowercase()
        )
  }

  pub fn matches_tag(
    &self,
    task: &Task
  ) -> bool {
    self
      .active_tag()
      .is_none_or(|tag| task.tag == tag)
  }

  pub fn matches_deadline(
    &self,
    task: &Task,
    now: DateTime<Utc>
  ) -> bool {
    self.deadline.accepts(task, now)
  }

  #[tracing::instrument(
    level = "trace",
    skip(self, task, now),
    fields(id = task.id)
  )]
  pub fn matches(
    &self,
    task: &Task,
    now: DateTime<Utc>
  ) -> bool {
    let ok = self.matches_search(task)
      && self.matches_tag(task)
      && self.matches_deadline(task, now);
    trace!(ok, "evaluated view filter");
    ok
  }
}
