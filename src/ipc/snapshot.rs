//! Read-only snapshots written back into a tenant's mailbox.
//!
//! Sandboxes cannot query the host, so the host leaves JSON files next to
//! their `messages/` and `tasks/` directories: the chats they may see and the
//! tasks they may control.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;

use crate::error::IpcError;
use crate::groups::AvailableGroup;
use crate::scheduler::Task;

pub const GROUPS_SNAPSHOT: &str = "available_groups.json";
pub const TASKS_SNAPSHOT: &str = "current_tasks.json";

/// Writes snapshot files for a tenant.
#[async_trait]
pub trait SnapshotWriter: Send + Sync {
    /// Chat listing. Only main gets the full list; other tenants get an empty one.
    async fn write_groups_snapshot(
        &self,
        group_folder: &str,
        is_main: bool,
        available: &[AvailableGroup],
        registered_jids: &[String],
    ) -> Result<(), IpcError>;

    /// Task listing. Main sees every task; other tenants only their own.
    async fn write_tasks_snapshot(
        &self,
        group_folder: &str,
        is_main: bool,
        tasks: &[Task],
    ) -> Result<(), IpcError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GroupsSnapshot<'a> {
    groups: &'a [AvailableGroup],
    registered_jids: &'a [String],
    last_sync: DateTime<Utc>,
}

/// Snapshot writer that puts files in `<ipc-root>/<folder>/`.
#[derive(Debug, Clone)]
pub struct FileSnapshotWriter {
    root: PathBuf,
}

impl FileSnapshotWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn snapshot_path(&self, group_folder: &str, name: &str) -> PathBuf {
        self.root.join(group_folder).join(name)
    }

    /// Write via a temp file and rename so readers never see a partial file.
    async fn write_json(&self, path: &Path, value: &impl Serialize) -> Result<(), IpcError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| IpcError::io(parent, e))?;
        }
        let body =
            serde_json::to_vec_pretty(value).map_err(|e| IpcError::Snapshot(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body)
            .await
            .map_err(|e| IpcError::io(&tmp, e))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| IpcError::io(path, e))
    }
}

#[async_trait]
impl SnapshotWriter for FileSnapshotWriter {
    async fn write_groups_snapshot(
        &self,
        group_folder: &str,
        is_main: bool,
        available: &[AvailableGroup],
        registered_jids: &[String],
    ) -> Result<(), IpcError> {
        let (groups, registered_jids): (&[AvailableGroup], &[String]) = if is_main {
            (available, registered_jids)
        } else {
            (&[], &[])
        };
        let snapshot = GroupsSnapshot {
            groups,
            registered_jids,
            last_sync: Utc::now(),
        };
        self.write_json(&self.snapshot_path(group_folder, GROUPS_SNAPSHOT), &snapshot)
            .await
    }

    async fn write_tasks_snapshot(
        &self,
        group_folder: &str,
        is_main: bool,
        tasks: &[Task],
    ) -> Result<(), IpcError> {
        let visible: Vec<&Task> = tasks
            .iter()
            .filter(|t| is_main || t.group_folder == group_folder)
            .collect();
        self.write_json(&self.snapshot_path(group_folder, TASKS_SNAPSHOT), &visible)
            .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use tempfile::TempDir;

    use super::*;
    use crate::scheduler::{ContextMode, ScheduleType, TaskStatus};

    fn task(id: &str, folder: &str) -> Task {
        Task {
            id: id.into(),
            group_folder: folder.into(),
            chat_jid: "g".into(),
            prompt: "p".into(),
            schedule_type: ScheduleType::Interval,
            schedule_value: "1000".into(),
            context_mode: ContextMode::Group,
            status: TaskStatus::Active,
            next_run: None,
            last_run: None,
            last_result: None,
            created_at: Utc::now(),
        }
    }

    fn read(path: PathBuf) -> Value {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn non_main_sees_only_own_tasks() {
        let tmp = TempDir::new().unwrap();
        let writer = FileSnapshotWriter::new(tmp.path());
        let tasks = vec![task("a1", "alpha"), task("b1", "beta")];

        writer.write_tasks_snapshot("alpha", false, &tasks).await.unwrap();
        writer.write_tasks_snapshot("main", true, &tasks).await.unwrap();

        let alpha = read(writer.snapshot_path("alpha", TASKS_SNAPSHOT));
        assert_eq!(alpha.as_array().unwrap().len(), 1);
        assert_eq!(alpha[0]["id"], "a1");

        let main = read(writer.snapshot_path("main", TASKS_SNAPSHOT));
        assert_eq!(main.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn groups_snapshot_hidden_from_non_main() {
        let tmp = TempDir::new().unwrap();
        let writer = FileSnapshotWriter::new(tmp.path());
        let available = vec![AvailableGroup {
            jid: "g1".into(),
            name: "Family".into(),
            last_activity: None,
            is_registered: true,
        }];
        let registered = vec!["g1".to_string()];

        writer
            .write_groups_snapshot("main", true, &available, &registered)
            .await
            .unwrap();
        writer
            .write_groups_snapshot("alpha", false, &available, &registered)
            .await
            .unwrap();

        let main = read(writer.snapshot_path("main", GROUPS_SNAPSHOT));
        assert_eq!(main["groups"][0]["jid"], "g1");
        assert_eq!(main["registeredJids"][0], "g1");

        let alpha = read(writer.snapshot_path("alpha", GROUPS_SNAPSHOT));
        assert!(alpha["groups"].as_array().unwrap().is_empty());
        assert!(!tmp.path().join("alpha").join("available_groups.json.tmp").exists());
    }
}
