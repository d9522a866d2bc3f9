//! Request processing: authorize, mutate, dispatch.
//!
//! Every function here returns `Ok(Outcome)` for anything the host decided
//! about, including refusals, and `Err` only for failures that should send
//! the file to quarantine.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::HostConfig;
use crate::error::IpcError;
use crate::groups::{RegisteredGroup, is_valid_folder};
use crate::ipc::actions::ActionRouter;
use crate::ipc::auth::{self, Denial};
use crate::ipc::identity::SourceGroup;
use crate::ipc::mailbox::Mailbox;
use crate::ipc::request::{
    MessageRequest, RegisterGroupRequest, ScheduleRequest, TaskControl, TaskControlRequest,
    TaskRequest,
};
use crate::ipc::snapshot::SnapshotWriter;
use crate::channels::{GroupMetadataSource, MessageSender};
use crate::scheduler::{
    ContextMode, ScheduleCalculator, ScheduleType, Task, TaskStatus, new_task_id,
};
use crate::store::{GroupRegistry, TaskStore};

/// Collaborators the processor talks to.
#[derive(Clone)]
pub struct IpcDeps {
    pub sender: Arc<dyn MessageSender>,
    pub tasks: Arc<dyn TaskStore>,
    pub groups: Arc<dyn GroupRegistry>,
    pub metadata: Arc<dyn GroupMetadataSource>,
    pub snapshots: Arc<dyn SnapshotWriter>,
    pub actions: Arc<ActionRouter>,
}

/// Result of a request that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The request took effect.
    Applied,
    /// Authorization refused it.
    Denied(Denial),
    /// Incomplete or semantically invalid; dropped.
    Invalid(String),
}

/// Applies mailbox requests to host state.
pub struct IpcProcessor {
    deps: IpcDeps,
    calculator: ScheduleCalculator,
    mailbox: Mailbox,
    assistant_name: String,
    dispatch_timeout: Duration,
}

impl IpcProcessor {
    pub fn new(config: &HostConfig, deps: IpcDeps) -> Self {
        Self {
            deps,
            calculator: ScheduleCalculator::new(config.timezone),
            mailbox: Mailbox::new(&config.ipc_dir),
            assistant_name: config.assistant_name.clone(),
            dispatch_timeout: config.dispatch_timeout,
        }
    }

    /// Handle a `messages/` request.
    pub async fn process_message(
        &self,
        source: &SourceGroup,
        request: MessageRequest,
    ) -> Result<Outcome, IpcError> {
        let (Some("message"), Some(chat_jid), Some(text)) =
            (request.kind.as_deref(), request.chat_jid, request.text)
        else {
            return Ok(invalid(source, "message", "expected type=message with chatJid and text"));
        };

        let groups = self.deps.groups.all_registered_groups().await?;
        if let Err(denial) = auth::authorize_message(source, &chat_jid, &groups) {
            return Ok(denied(source, "message", denial));
        }

        let text = format!("{}: {}", self.assistant_name, text);
        self.bounded("send_message", self.deps.sender.send_message(&chat_jid, &text))
            .await?;
        info!(source_group = %source.folder, chat_jid = %chat_jid, "IPC message sent");
        Ok(Outcome::Applied)
    }

    /// Handle a `tasks/` request.
    pub async fn process_task(
        &self,
        source: &SourceGroup,
        request: TaskRequest,
    ) -> Result<Outcome, IpcError> {
        match request {
            TaskRequest::Schedule(req) => self.schedule_task(source, req).await,
            TaskRequest::Control(control, req) => self.control_task(source, control, req).await,
            TaskRequest::RefreshGroups => self.refresh_groups(source).await,
            TaskRequest::RegisterGroup(req) => self.register_group(source, req).await,
            TaskRequest::Action { kind, payload } => {
                let Some(handler) = self.deps.actions.get(&kind) else {
                    return Ok(invalid(source, &kind, "unknown task type"));
                };
                self.bounded("action", handler.handle(payload, source))
                    .await?;
                info!(source_group = %source.folder, action = %kind, "Action dispatched");
                Ok(Outcome::Applied)
            }
        }
    }

    async fn schedule_task(
        &self,
        source: &SourceGroup,
        req: ScheduleRequest,
    ) -> Result<Outcome, IpcError> {
        const OP: &str = "schedule_task";

        let (Some(prompt), Some(schedule_type), Some(schedule_value), Some(target_jid)) = (
            req.prompt,
            req.schedule_type,
            req.schedule_value,
            req.target_jid,
        ) else {
            return Ok(invalid(
                source,
                OP,
                "requires prompt, schedule_type, schedule_value and targetJid",
            ));
        };

        let groups = self.deps.groups.all_registered_groups().await?;
        let target = match auth::authorize_schedule(source, &target_jid, &groups) {
            Ok(target) => target,
            Err(denial) => return Ok(denied(source, OP, denial)),
        };

        let now = Utc::now();
        let schedule_type: ScheduleType = match schedule_type.parse() {
            Ok(st) => st,
            Err(e) => return Ok(invalid(source, OP, &e.to_string())),
        };
        let next_run = match self.calculator.next_run(schedule_type, &schedule_value, now) {
            Ok(next) => next,
            Err(e) => return Ok(invalid(source, OP, &e.to_string())),
        };

        let task = Task {
            id: new_task_id(now),
            group_folder: target.folder.clone(),
            chat_jid: target_jid,
            prompt,
            schedule_type,
            schedule_value,
            context_mode: ContextMode::from_request(req.context_mode.as_deref()),
            status: TaskStatus::Active,
            next_run: Some(next_run),
            last_run: None,
            last_result: None,
            created_at: now,
        };
        self.deps.tasks.create_task(&task).await?;

        info!(
            source_group = %source.folder,
            task_id = %task.id,
            group_folder = %task.group_folder,
            schedule_type = %task.schedule_type,
            next_run = %next_run,
            "Task created via IPC"
        );
        self.refresh_task_snapshot(source).await?;
        Ok(Outcome::Applied)
    }

    async fn control_task(
        &self,
        source: &SourceGroup,
        control: TaskControl,
        req: TaskControlRequest,
    ) -> Result<Outcome, IpcError> {
        let op = control.as_str();
        let Some(task_id) = req.task_id else {
            return Ok(invalid(source, op, "requires taskId"));
        };

        let task = self.deps.tasks.get_task(&task_id).await?;
        if let Err(denial) = auth::authorize_task_control(source, &task_id, task.as_ref()) {
            return Ok(denied(source, op, denial));
        }

        // A concurrent removal by the runner between read and write is a no-op.
        let changed = match control {
            TaskControl::Pause => {
                self.deps
                    .tasks
                    .update_task_status(&task_id, TaskStatus::Paused)
                    .await?
            }
            TaskControl::Resume => {
                self.deps
                    .tasks
                    .update_task_status(&task_id, TaskStatus::Active)
                    .await?
            }
            TaskControl::Cancel => self.deps.tasks.delete_task(&task_id).await?,
        };
        if !changed {
            return Ok(denied(source, op, Denial::TaskNotFound { task_id }));
        }

        info!(source_group = %source.folder, task_id = %task_id, operation = op, "Task updated via IPC");
        self.refresh_task_snapshot(source).await?;
        Ok(Outcome::Applied)
    }

    async fn refresh_groups(&self, source: &SourceGroup) -> Result<Outcome, IpcError> {
        const OP: &str = "refresh_groups";
        if let Err(denial) = auth::authorize_main_only(source, OP) {
            return Ok(denied(source, OP, denial));
        }

        info!(source_group = %source.folder, "Group metadata refresh requested via IPC");
        self.bounded("sync_group_metadata", self.deps.metadata.sync_group_metadata(true))
            .await?;
        let available = self
            .bounded("available_groups", self.deps.metadata.available_groups())
            .await?;
        let registered_jids: Vec<String> = self
            .deps
            .groups
            .all_registered_groups()
            .await?
            .into_iter()
            .map(|g| g.jid)
            .collect();

        self.bounded(
            "write_groups_snapshot",
            self.deps
                .snapshots
                .write_groups_snapshot(&source.folder, true, &available, &registered_jids),
        )
        .await?;
        Ok(Outcome::Applied)
    }

    async fn register_group(
        &self,
        source: &SourceGroup,
        req: RegisterGroupRequest,
    ) -> Result<Outcome, IpcError> {
        const OP: &str = "register_group";
        if let Err(denial) = auth::authorize_main_only(source, OP) {
            return Ok(denied(source, OP, denial));
        }

        let (Some(jid), Some(name), Some(folder), Some(trigger)) =
            (req.jid, req.name, req.folder, req.trigger)
        else {
            return Ok(invalid(source, OP, "requires jid, name, folder and trigger"));
        };
        if !is_valid_folder(&folder) {
            return Ok(invalid(source, OP, &format!("unusable folder name '{folder}'")));
        }

        let group = RegisteredGroup {
            jid,
            name,
            folder,
            trigger,
            requires_trigger: req.requires_trigger.unwrap_or(true),
            added_at: Utc::now(),
            container_config: req.container_config,
        };
        self.deps.groups.upsert_registered_group(&group).await?;
        self.mailbox.ensure_group(&group.folder).await?;

        info!(
            source_group = %source.folder,
            jid = %group.jid,
            folder = %group.folder,
            "Group registered via IPC"
        );
        Ok(Outcome::Applied)
    }

    async fn refresh_task_snapshot(&self, source: &SourceGroup) -> Result<(), IpcError> {
        let tasks = if source.is_main {
            self.deps.tasks.list_tasks().await?
        } else {
            self.deps.tasks.list_tasks_for_group(&source.folder).await?
        };
        self.bounded(
            "write_tasks_snapshot",
            self.deps
                .snapshots
                .write_tasks_snapshot(&source.folder, source.is_main, &tasks),
        )
        .await
    }

    /// Run an external call under the dispatch timeout.
    async fn bounded<T, E>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, E>>,
    ) -> Result<T, IpcError>
    where
        IpcError: From<E>,
    {
        match tokio::time::timeout(self.dispatch_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(IpcError::DispatchTimeout {
                operation,
                timeout: self.dispatch_timeout,
            }),
        }
    }
}

fn denied(source: &SourceGroup, operation: &str, denial: Denial) -> Outcome {
    warn!(
        source_group = %source.folder,
        operation,
        reason = %denial,
        "Unauthorized IPC request blocked"
    );
    Outcome::Denied(denial)
}

fn invalid(source: &SourceGroup, operation: &str, reason: &str) -> Outcome {
    warn!(
        source_group = %source.folder,
        operation,
        reason,
        "Invalid IPC request dropped"
    );
    Outcome::Invalid(reason.to_string())
}
