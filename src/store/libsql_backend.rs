//! libSQL backend: async `TaskStore` and `GroupRegistry` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::groups::RegisteredGroup;
use crate::scheduler::{ContextMode, ScheduleType, Task, TaskStatus};
use crate::store::migrations;
use crate::store::traits::{GroupRegistry, TaskStore};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        migrations::run_migrations(&backend.conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        migrations::run_migrations(&backend.conn).await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    async fn query_tasks(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Task>, DatabaseError> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut tasks = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            match row_to_task(&row) {
                Ok(task) => tasks.push(task),
                Err(e) => tracing::warn!("Skipping task row in {op}: {e}"),
            }
        }
        Ok(tasks)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Fixed-width UTC format so text comparison in SQL orders correctly.
fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn opt_ts(dt: Option<DateTime<Utc>>) -> libsql::Value {
    match dt {
        Some(dt) => libsql::Value::Text(fmt_ts(dt)),
        None => libsql::Value::Null,
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Serialization(format!("bad timestamp '{s}': {e}")))
}

fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    s.as_deref().map(parse_datetime).transpose()
}

const TASK_COLUMNS: &str = "id, group_folder, chat_jid, prompt, schedule_type, schedule_value, context_mode, status, next_run, last_run, last_result, created_at";

const GROUP_COLUMNS: &str =
    "jid, name, folder, trigger_pattern, requires_trigger, container_config, added_at";

/// Map a libsql Row to a Task. Column order matches TASK_COLUMNS.
fn row_to_task(row: &libsql::Row) -> Result<Task, DatabaseError> {
    let col = |e: libsql::Error| DatabaseError::Serialization(e.to_string());

    let schedule_type: ScheduleType = row
        .get::<String>(4)
        .map_err(col)?
        .parse()
        .map_err(|e: crate::error::ScheduleError| DatabaseError::Serialization(e.to_string()))?;
    let status: TaskStatus = row
        .get::<String>(7)
        .map_err(col)?
        .parse()
        .map_err(DatabaseError::Serialization)?;
    let context_mode = ContextMode::from_request(row.get::<String>(6).ok().as_deref());

    Ok(Task {
        id: row.get(0).map_err(col)?,
        group_folder: row.get(1).map_err(col)?,
        chat_jid: row.get(2).map_err(col)?,
        prompt: row.get(3).map_err(col)?,
        schedule_type,
        schedule_value: row.get(5).map_err(col)?,
        context_mode,
        status,
        next_run: parse_optional_datetime(row.get::<String>(8).ok())?,
        last_run: parse_optional_datetime(row.get::<String>(9).ok())?,
        last_result: row.get::<String>(10).ok(),
        created_at: parse_datetime(&row.get::<String>(11).map_err(col)?)?,
    })
}

fn row_to_group(row: &libsql::Row) -> Result<RegisteredGroup, DatabaseError> {
    let col = |e: libsql::Error| DatabaseError::Serialization(e.to_string());

    let container_config = match row.get::<String>(5).ok() {
        Some(raw) => Some(
            serde_json::from_str(&raw)
                .map_err(|e| DatabaseError::Serialization(format!("container_config: {e}")))?,
        ),
        None => None,
    };

    Ok(RegisteredGroup {
        jid: row.get(0).map_err(col)?,
        name: row.get(1).map_err(col)?,
        folder: row.get(2).map_err(col)?,
        trigger: row.get(3).map_err(col)?,
        requires_trigger: row.get::<i64>(4).unwrap_or(1) != 0,
        container_config,
        added_at: parse_datetime(&row.get::<String>(6).map_err(col)?)?,
    })
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl TaskStore for LibSqlBackend {
    async fn create_task(&self, task: &Task) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO scheduled_tasks ({TASK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    task.id.clone(),
                    task.group_folder.clone(),
                    task.chat_jid.clone(),
                    task.prompt.clone(),
                    task.schedule_type.as_str(),
                    task.schedule_value.clone(),
                    task.context_mode.as_str(),
                    task.status.to_string(),
                    opt_ts(task.next_run),
                    opt_ts(task.last_run),
                    match &task.last_result {
                        Some(r) => libsql::Value::Text(r.clone()),
                        None => libsql::Value::Null,
                    },
                    fmt_ts(task.created_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_task: {e}")))?;

        debug!(task_id = %task.id, group_folder = %task.group_folder, "Task inserted into DB");
        Ok(())
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>, DatabaseError> {
        let mut tasks = self
            .query_tasks(
                "get_task",
                &format!("SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE id = ?1"),
                params![id],
            )
            .await?;
        Ok(tasks.pop())
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, DatabaseError> {
        self.query_tasks(
            "list_tasks",
            &format!("SELECT {TASK_COLUMNS} FROM scheduled_tasks ORDER BY created_at, id"),
            (),
        )
        .await
    }

    async fn list_tasks_for_group(&self, group_folder: &str) -> Result<Vec<Task>, DatabaseError> {
        self.query_tasks(
            "list_tasks_for_group",
            &format!(
                "SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE group_folder = ?1 ORDER BY created_at, id"
            ),
            params![group_folder],
        )
        .await
    }

    async fn update_task_status(
        &self,
        id: &str,
        status: TaskStatus,
    ) -> Result<bool, DatabaseError> {
        let count = self
            .conn
            .execute(
                "UPDATE scheduled_tasks SET status = ?1 WHERE id = ?2",
                params![status.to_string(), id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_task_status: {e}")))?;
        Ok(count > 0)
    }

    async fn delete_task(&self, id: &str) -> Result<bool, DatabaseError> {
        let count = self
            .conn
            .execute("DELETE FROM scheduled_tasks WHERE id = ?1", params![id])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_task: {e}")))?;
        Ok(count > 0)
    }

    async fn list_due_tasks(&self, now: DateTime<Utc>) -> Result<Vec<Task>, DatabaseError> {
        self.query_tasks(
            "list_due_tasks",
            &format!(
                "SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE status = 'active' AND next_run IS NOT NULL AND next_run <= ?1 ORDER BY next_run"
            ),
            params![fmt_ts(now)],
        )
        .await
    }

    async fn record_task_run(
        &self,
        id: &str,
        ran_at: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
        result: &str,
    ) -> Result<(), DatabaseError> {
        if next_run.is_none() {
            self.delete_task(id).await?;
            debug!(task_id = %id, "Task finished and removed");
            return Ok(());
        }

        self.conn
            .execute(
                "UPDATE scheduled_tasks SET last_run = ?1, next_run = ?2, last_result = ?3 WHERE id = ?4",
                params![fmt_ts(ran_at), opt_ts(next_run), result, id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_task_run: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl GroupRegistry for LibSqlBackend {
    async fn all_registered_groups(&self) -> Result<Vec<RegisteredGroup>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {GROUP_COLUMNS} FROM registered_groups ORDER BY added_at, jid"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("all_registered_groups: {e}")))?;

        let mut groups = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("all_registered_groups: {e}")))?
        {
            match row_to_group(&row) {
                Ok(g) => groups.push(g),
                Err(e) => tracing::warn!("Skipping registered group row: {e}"),
            }
        }
        Ok(groups)
    }

    async fn upsert_registered_group(&self, group: &RegisteredGroup) -> Result<(), DatabaseError> {
        let container_config = match &group.container_config {
            Some(cfg) => libsql::Value::Text(
                serde_json::to_string(cfg)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
            ),
            None => libsql::Value::Null,
        };

        self.conn
            .execute(
                &format!(
                    "INSERT OR REPLACE INTO registered_groups ({GROUP_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                ),
                params![
                    group.jid.clone(),
                    group.name.clone(),
                    group.folder.clone(),
                    group.trigger.clone(),
                    group.requires_trigger as i64,
                    container_config,
                    fmt_ts(group.added_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_registered_group: {e}")))?;

        debug!(jid = %group.jid, folder = %group.folder, "Registered group upserted");
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
