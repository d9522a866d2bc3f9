//! Request file shapes written by sandboxed agents.
//!
//! Fields are read leniently: a field that is absent or has the wrong JSON
//! type reads as `None`, and the processor drops the request with a warning.
//! Only a file that is not JSON at all is a parse failure worth quarantining.

use serde_json::Value;

fn str_field(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

/// `messages/*.json`
#[derive(Debug, Clone, Default)]
pub struct MessageRequest {
    pub kind: Option<String>,
    pub chat_jid: Option<String>,
    pub text: Option<String>,
}

impl MessageRequest {
    pub fn from_value(payload: &Value) -> Self {
        Self {
            kind: str_field(payload, "type"),
            chat_jid: str_field(payload, "chatJid"),
            text: str_field(payload, "text"),
        }
    }
}

/// `schedule_task` fields.
#[derive(Debug, Clone, Default)]
pub struct ScheduleRequest {
    pub prompt: Option<String>,
    pub schedule_type: Option<String>,
    /// Usually a string; a bare number is accepted for intervals.
    pub schedule_value: Option<String>,
    pub target_jid: Option<String>,
    pub context_mode: Option<String>,
}

impl ScheduleRequest {
    pub fn from_value(payload: &Value) -> Self {
        let schedule_value = match payload.get("schedule_value") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Self {
            prompt: str_field(payload, "prompt"),
            schedule_type: str_field(payload, "schedule_type"),
            schedule_value,
            target_jid: str_field(payload, "targetJid"),
            context_mode: str_field(payload, "context_mode"),
        }
    }
}

/// `pause_task` / `resume_task` / `cancel_task` fields.
#[derive(Debug, Clone, Default)]
pub struct TaskControlRequest {
    pub task_id: Option<String>,
}

impl TaskControlRequest {
    pub fn from_value(payload: &Value) -> Self {
        Self {
            task_id: str_field(payload, "taskId"),
        }
    }
}

/// `register_group` fields.
#[derive(Debug, Clone, Default)]
pub struct RegisterGroupRequest {
    pub jid: Option<String>,
    pub name: Option<String>,
    pub folder: Option<String>,
    pub trigger: Option<String>,
    pub requires_trigger: Option<bool>,
    pub container_config: Option<Value>,
}

impl RegisterGroupRequest {
    pub fn from_value(payload: &Value) -> Self {
        Self {
            jid: str_field(payload, "jid"),
            name: str_field(payload, "name"),
            folder: str_field(payload, "folder"),
            trigger: str_field(payload, "trigger"),
            requires_trigger: payload.get("requiresTrigger").and_then(Value::as_bool),
            container_config: payload
                .get("containerConfig")
                .filter(|v| !v.is_null())
                .cloned(),
        }
    }
}

/// Which state change a control request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskControl {
    Pause,
    Resume,
    Cancel,
}

impl TaskControl {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskControl::Pause => "pause_task",
            TaskControl::Resume => "resume_task",
            TaskControl::Cancel => "cancel_task",
        }
    }
}

/// `tasks/*.json`, dispatched on its `type` field.
#[derive(Debug, Clone)]
pub enum TaskRequest {
    Schedule(ScheduleRequest),
    Control(TaskControl, TaskControlRequest),
    RefreshGroups,
    RegisterGroup(RegisterGroupRequest),
    /// Anything else goes to the action router untouched.
    Action { kind: String, payload: Value },
}

/// Type names the host handles itself; action handlers may not claim them.
pub const RESERVED_TYPES: &[&str] = &[
    "schedule_task",
    "pause_task",
    "resume_task",
    "cancel_task",
    "refresh_groups",
    "register_group",
    "message",
];

impl TaskRequest {
    /// Dispatch on `type`. Anything without a host-handled type, including a
    /// payload that is not an object, becomes an action request.
    pub fn from_value(payload: Value) -> Self {
        let kind = str_field(&payload, "type").unwrap_or_default();
        match kind.as_str() {
            "schedule_task" => TaskRequest::Schedule(ScheduleRequest::from_value(&payload)),
            "pause_task" => {
                TaskRequest::Control(TaskControl::Pause, TaskControlRequest::from_value(&payload))
            }
            "resume_task" => {
                TaskRequest::Control(TaskControl::Resume, TaskControlRequest::from_value(&payload))
            }
            "cancel_task" => {
                TaskRequest::Control(TaskControl::Cancel, TaskControlRequest::from_value(&payload))
            }
            "refresh_groups" => TaskRequest::RefreshGroups,
            "register_group" => TaskRequest::RegisterGroup(RegisterGroupRequest::from_value(&payload)),
            _ => TaskRequest::Action { kind, payload },
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            TaskRequest::Schedule(_) => "schedule_task",
            TaskRequest::Control(control, _) => control.as_str(),
            TaskRequest::RefreshGroups => "refresh_groups",
            TaskRequest::RegisterGroup(_) => "register_group",
            TaskRequest::Action { kind, .. } => kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn schedule_request_fields() {
        let req = TaskRequest::from_value(json!({
            "type": "schedule_task",
            "prompt": "p",
            "schedule_type": "interval",
            "schedule_value": 60000,
            "targetJid": "g1",
            "groupFolder": "main"
        }));
        let TaskRequest::Schedule(s) = req else {
            panic!("expected schedule request");
        };
        assert_eq!(s.target_jid.as_deref(), Some("g1"));
        assert_eq!(s.schedule_value.as_deref(), Some("60000"));
        assert!(s.context_mode.is_none());
    }

    #[test]
    fn control_requests_keep_kind() {
        let req = TaskRequest::from_value(json!({ "type": "cancel_task", "taskId": "t1" }));
        assert_eq!(req.kind(), "cancel_task");
        assert!(matches!(
            req,
            TaskRequest::Control(TaskControl::Cancel, TaskControlRequest { task_id: Some(ref id) }) if id == "t1"
        ));
    }

    #[test]
    fn missing_fields_read_as_none() {
        let req = TaskRequest::from_value(json!({ "type": "pause_task" }));
        assert!(matches!(
            req,
            TaskRequest::Control(TaskControl::Pause, TaskControlRequest { task_id: None })
        ));
    }

    #[test]
    fn wrongly_typed_fields_read_as_none() {
        let req = TaskRequest::from_value(json!({ "type": "pause_task", "taskId": 42 }));
        assert!(matches!(
            req,
            TaskRequest::Control(TaskControl::Pause, TaskControlRequest { task_id: None })
        ));

        let msg = MessageRequest::from_value(&json!({ "type": "message", "chatJid": 123, "text": "x" }));
        assert!(msg.chat_jid.is_none());
        assert_eq!(msg.text.as_deref(), Some("x"));

        let reg = RegisterGroupRequest::from_value(&json!({ "jid": "g9", "requiresTrigger": "no" }));
        assert!(reg.requires_trigger.is_none());
    }

    #[test]
    fn non_object_payloads_have_no_fields() {
        let msg = MessageRequest::from_value(&json!([]));
        assert!(msg.kind.is_none() && msg.chat_jid.is_none() && msg.text.is_none());

        let req = TaskRequest::from_value(json!("pause_task"));
        assert_eq!(req.kind(), "");
    }

    #[test]
    fn unknown_types_become_actions() {
        let payload = json!({ "type": "send_email", "to": "a@example.com" });
        match TaskRequest::from_value(payload.clone()) {
            TaskRequest::Action { kind, payload: p } => {
                assert_eq!(kind, "send_email");
                assert_eq!(p, payload);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn message_request_camel_case() {
        let msg = MessageRequest::from_value(&json!({ "type": "message", "chatJid": "g1", "text": "hi" }));
        assert_eq!(msg.kind.as_deref(), Some("message"));
        assert_eq!(msg.chat_jid.as_deref(), Some("g1"));
    }
}
