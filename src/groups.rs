//! Tenant group records.
//!
//! A registered group binds a chat identifier (`jid`) to the mailbox folder
//! of the sandbox that serves it. The folder is the tenant's identity.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Reserved quarantine directory under the IPC root. Never a tenant.
pub const ERRORS_DIR: &str = "errors";

static FOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,63}$").expect("folder regex is valid")
});

/// Whether `folder` is safe to use as a single mailbox directory name.
pub fn is_valid_folder(folder: &str) -> bool {
    folder != ERRORS_DIR && FOLDER_RE.is_match(folder)
}

/// A tenant's registration, keyed by `jid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredGroup {
    pub jid: String,
    pub name: String,
    pub folder: String,
    pub trigger: String,
    pub requires_trigger: bool,
    pub added_at: DateTime<Utc>,
    pub container_config: Option<serde_json::Value>,
}

/// A chat the host knows about, registered or not. Written into snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableGroup {
    pub jid: String,
    pub name: String,
    pub last_activity: Option<DateTime<Utc>>,
    pub is_registered: bool,
}

/// Find the folder that owns `jid`, if any.
pub fn owning_folder<'a>(groups: &'a [RegisteredGroup], jid: &str) -> Option<&'a str> {
    groups
        .iter()
        .find(|g| g.jid == jid)
        .map(|g| g.folder.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_folder_names() {
        assert!(is_valid_folder("main"));
        assert!(is_valid_folder("team-eng"));
        assert!(is_valid_folder("family_chat2"));
    }

    #[test]
    fn rejects_traversal_and_reserved() {
        assert!(!is_valid_folder(""));
        assert!(!is_valid_folder(".."));
        assert!(!is_valid_folder("../main"));
        assert!(!is_valid_folder("a/b"));
        assert!(!is_valid_folder("-leading-dash"));
        assert!(!is_valid_folder("errors"));
        assert!(!is_valid_folder(&"x".repeat(65)));
    }

    #[test]
    fn owning_folder_lookup() {
        let groups = vec![RegisteredGroup {
            jid: "g1".into(),
            name: "Group One".into(),
            folder: "alpha".into(),
            trigger: "@Andy".into(),
            requires_trigger: true,
            added_at: Utc::now(),
            container_config: None,
        }];
        assert_eq!(owning_folder(&groups, "g1"), Some("alpha"));
        assert_eq!(owning_folder(&groups, "g2"), None);
    }
}
