//! Persistence traits for scheduled tasks and the group registry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::groups::RegisteredGroup;
use crate::scheduler::{Task, TaskStatus};

/// Persisted collection of scheduled tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task.
    async fn create_task(&self, task: &Task) -> Result<(), DatabaseError>;

    /// Get a task by id.
    async fn get_task(&self, id: &str) -> Result<Option<Task>, DatabaseError>;

    /// All tasks, oldest first.
    async fn list_tasks(&self) -> Result<Vec<Task>, DatabaseError>;

    /// Tasks owned by one tenant folder, oldest first.
    async fn list_tasks_for_group(&self, group_folder: &str) -> Result<Vec<Task>, DatabaseError>;

    /// Set a task's status. Returns `false` if no such task exists.
    async fn update_task_status(&self, id: &str, status: TaskStatus)
    -> Result<bool, DatabaseError>;

    /// Remove a task. Returns `false` if no such task existed.
    async fn delete_task(&self, id: &str) -> Result<bool, DatabaseError>;

    // ── Runner-facing ───────────────────────────────────────────────

    /// Active tasks whose `next_run` is at or before `now`.
    async fn list_due_tasks(&self, now: DateTime<Utc>) -> Result<Vec<Task>, DatabaseError>;

    /// Record a completed run. A `None` next run means the task is finished
    /// and is removed.
    async fn record_task_run(
        &self,
        id: &str,
        ran_at: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
        result: &str,
    ) -> Result<(), DatabaseError>;
}

/// Read/write access to registered groups, keyed by jid.
#[async_trait]
pub trait GroupRegistry: Send + Sync {
    /// Every registration.
    async fn all_registered_groups(&self) -> Result<Vec<RegisteredGroup>, DatabaseError>;

    /// Create or overwrite the registration for `group.jid`.
    async fn upsert_registered_group(&self, group: &RegisteredGroup) -> Result<(), DatabaseError>;
}
