//! Core types for scheduled tasks.
//!
//! A task is a prompt owned by one tenant folder, due at `next_run`. The host
//! only creates and mutates these records; firing them belongs to the task
//! runner that reads the same store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

/// A scheduled unit of future work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// Owning tenant. Set once at creation and never changed.
    pub group_folder: String,
    pub chat_jid: String,
    pub prompt: String,
    pub schedule_type: ScheduleType,
    pub schedule_value: String,
    pub context_mode: ContextMode,
    pub status: TaskStatus,
    pub next_run: Option<DateTime<Utc>>,

    // Runner-managed state
    pub last_run: Option<DateTime<Utc>>,
    pub last_result: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// How a task's schedule value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Cron,
    Interval,
    Once,
}

impl ScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleType::Cron => "cron",
            ScheduleType::Interval => "interval",
            ScheduleType::Once => "once",
        }
    }
}

impl fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleType {
    type Err = ScheduleError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cron" => Ok(ScheduleType::Cron),
            "interval" => Ok(ScheduleType::Interval),
            "once" => Ok(ScheduleType::Once),
            other => Err(ScheduleError::UnknownType(other.to_string())),
        }
    }
}

/// Whether the runner gives the task the group's conversation or a fresh one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    Group,
    #[default]
    Isolated,
}

impl ContextMode {
    /// Lenient parse: anything missing or unrecognised becomes `Isolated`.
    pub fn from_request(raw: Option<&str>) -> Self {
        match raw {
            Some("group") => ContextMode::Group,
            _ => ContextMode::Isolated,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContextMode::Group => "group",
            ContextMode::Isolated => "isolated",
        }
    }
}

/// Lifecycle state. Removal deletes the record, so there is no third state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Paused,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Active => write!(f, "active"),
            TaskStatus::Paused => write!(f, "paused"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TaskStatus::Active),
            "paused" => Ok(TaskStatus::Paused),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// Generate a task id: creation millis plus a short random suffix so two
/// tasks created in the same millisecond do not collide.
pub fn new_task_id(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("task-{}-{}", now.timestamp_millis(), suffix)
}
