use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datetime::{DisplayZone, iso_date_serde, parse_due_parts};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    NotStarted,
    Active,
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::Active => "Active",
            Self::Completed => "Completed",
        }
    }

    /// Target of the completion checkbox.
    pub fn toggled(self) -> Self {
        match self {
            Self::Completed => Self::NotStarted,
            Self::NotStarted | Self::Active => Self::Completed,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "not-started" | "not_started" | "notstarted" => Ok(Self::NotStarted),
            "active" => Ok(Self::Active),
            "completed" | "done" => Ok(Self::Completed),
            other => Err(anyhow!(
                "unknown status '{other}' (expected not-started, active or completed)"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,

    pub title: String,

    pub status: TaskStatus,

    #[serde(with = "iso_date_serde")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "iso_date_serde")]
    pub updated_at: DateTime<Utc>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "iso_date_serde::option"
    )]
    pub due_date: Option<DateTime<Utc>>,
}

/// Raw due-date input: a `YYYY-MM-DD` date and an `HH:MM` time. Both halves are
/// required for a due date to be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DueDateParts {
    pub date: Option<String>,
    pub time: Option<String>,
}

impl DueDateParts {
    pub fn new(date: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            date: Some(date.into()),
            time: Some(time.into()),
        }
    }

    pub fn resolve(&self, zone: &DisplayZone) -> Option<DateTime<Utc>> {
        let (Some(date), Some(time)) = (self.date.as_deref(), self.time.as_deref()) else {
            return None;
        };
        let (date, time) = parse_due_parts(date, time)?;
        zone.compose(date, time)
    }
}

impl Task {
    /// Builds a fresh `not-started` task. Returns `None` for a blank title.
    pub fn create(
        title: &str,
        due: &DueDateParts,
        zone: &DisplayZone,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        if title.trim().is_empty() {
            return None;
        }

        Some(Self {
            id: Uuid::new_v4(),
            title: title.to_string(),
            status: TaskStatus::NotStarted,
            created_at: now,
            updated_at: now,
            due_date: due.resolve(zone),
        })
    }

    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status != TaskStatus::Completed && self.due_date.map(|due| due < now).unwrap_or(false)
    }

    /// Stamps a mutation, never moving `updated_at` before `created_at`.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now.max(self.created_at);
    }
}
