//! Authorization gate.
//!
//! Pure decisions over the resolved [`SourceGroup`] and host-side state. No
//! identity field from a request payload is ever an input here.

use std::fmt;

use crate::groups::{RegisteredGroup, owning_folder};
use crate::ipc::identity::SourceGroup;
use crate::scheduler::Task;

/// Why a request was refused. Denials are logged and dropped, never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// Operation is reserved for the main tenant.
    MainOnly { operation: &'static str },
    /// Target jid is not registered to any tenant.
    UnregisteredTarget { jid: String },
    /// Target jid belongs to another tenant.
    NotOwner { target: String, owner: String },
    /// No task with this id.
    TaskNotFound { task_id: String },
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::MainOnly { operation } => write!(f, "{operation} is restricted to the main group"),
            Denial::UnregisteredTarget { jid } => write!(f, "target {jid} is not a registered group"),
            Denial::NotOwner { target, owner } => {
                write!(f, "{target} is owned by group '{owner}'")
            }
            Denial::TaskNotFound { task_id } => write!(f, "task {task_id} not found"),
        }
    }
}

/// Outbound message to `chat_jid`: main may message any chat, others only
/// chats registered to their own folder.
pub fn authorize_message(
    source: &SourceGroup,
    chat_jid: &str,
    groups: &[RegisteredGroup],
) -> Result<(), Denial> {
    if source.is_main {
        return Ok(());
    }
    match owning_folder(groups, chat_jid) {
        Some(owner) if owner == source.folder => Ok(()),
        Some(owner) => Err(Denial::NotOwner {
            target: chat_jid.to_string(),
            owner: owner.to_string(),
        }),
        None => Err(Denial::UnregisteredTarget {
            jid: chat_jid.to_string(),
        }),
    }
}

/// New task for `target_jid`: the target must be registered, and the
/// requester must be main or own it. Returns the target registration.
pub fn authorize_schedule<'a>(
    source: &SourceGroup,
    target_jid: &str,
    groups: &'a [RegisteredGroup],
) -> Result<&'a RegisteredGroup, Denial> {
    let target = groups
        .iter()
        .find(|g| g.jid == target_jid)
        .ok_or_else(|| Denial::UnregisteredTarget {
            jid: target_jid.to_string(),
        })?;

    if source.can_act_for(&target.folder) {
        Ok(target)
    } else {
        Err(Denial::NotOwner {
            target: target_jid.to_string(),
            owner: target.folder.clone(),
        })
    }
}

/// Pause/resume/cancel: the task must exist and the requester must be main or
/// the task's owning folder.
pub fn authorize_task_control<'a>(
    source: &SourceGroup,
    task_id: &str,
    task: Option<&'a Task>,
) -> Result<&'a Task, Denial> {
    let task = task.ok_or_else(|| Denial::TaskNotFound {
        task_id: task_id.to_string(),
    })?;

    if source.can_act_for(&task.group_folder) {
        Ok(task)
    } else {
        Err(Denial::NotOwner {
            target: task_id.to_string(),
            owner: task.group_folder.clone(),
        })
    }
}

/// Operations only the main tenant may request.
pub fn authorize_main_only(source: &SourceGroup, operation: &'static str) -> Result<(), Denial> {
    if source.is_main {
        Ok(())
    } else {
        Err(Denial::MainOnly { operation })
    }
}
