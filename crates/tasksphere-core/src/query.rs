use std::fmt;
use std::str::FromStr;

use anyhow::Context;
use tracing::trace;

use crate::task::{
  Task,
  TaskStatus
};

/// Status half of the list filter; `All`
/// lets every status through.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
)]
pub enum StatusFilter {
  #[default]
  All,
  Only(TaskStatus)
}

impl StatusFilter {
  pub fn matches(
    self,
    status: TaskStatus
  ) -> bool {
    match self {
      | Self::All => true,
      | Self::Only(wanted) => {
        wanted == status
      }
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      | Self::All => "All",
      | Self::Only(status) => {
        status.label()
      }
    }
  }
}

impl fmt::Display for StatusFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | Self::All => f.write_str("all"),
      | Self::Only(status) => {
        fmt::Display::fmt(status, f)
      }
    }
  }
}

impl FromStr for StatusFilter {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    if s.trim().eq_ignore_ascii_case("all")
    {
      return Ok(Self::All);
    }
    let status = s
      .parse::<TaskStatus>()
      .context("invalid status filter")?;
    Ok(Self::Only(status))
  }
}

/// The list view's inputs, owned by the
/// front end and handed to [`query`].
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct TaskQuery {
  pub search: String,
  pub status: StatusFilter
}

impl TaskQuery {
  pub fn new(
    search: impl Into<String>,
    status: StatusFilter
  ) -> Self {
    Self {
      search: search.into(),
      status
    }
  }

  pub fn apply(
    &self,
    tasks: &[Task]
  ) -> Vec<Task> {
    query(tasks, &self.search, self.status)
  }
}

/// Tasks whose title contains `search`
/// (case-insensitive) and whose status
/// passes `status`, newest first. Equal
/// creation times keep collection order.
#[tracing::instrument(skip(tasks), fields(total = tasks.len()))]
pub fn query(
  tasks: &[Task],
  search: &str,
  status: StatusFilter
) -> Vec<Task> {
  let needle = search.to_lowercase();

  let mut visible: Vec<Task> = tasks
    .iter()
    .filter(|task| {
      needle.is_empty()
        || task
          .title
          .to_lowercase()
          .contains(&needle)
    })
    .filter(|task| {
      status.matches(task.status)
    })
    .cloned()
    .collect();

  visible.sort_by(|a, b| {
    b.created_at.cmp(&a.created_at)
  });

  trace!(
    visible = visible.len(),
    "computed visible tasks"
  );
  visible
}
