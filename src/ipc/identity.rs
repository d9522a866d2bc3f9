//! Tenant identity from mailbox location.
//!
//! The directory a request file sits under is the only identity the host
//! trusts. Nothing inside a request can name a different tenant or claim
//! main privileges.

use std::path::Path;

use tokio::fs;
use tracing::warn;

use crate::error::IpcError;
use crate::groups::{ERRORS_DIR, is_valid_folder};

/// The tenant a request came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceGroup {
    pub folder: String,
    pub is_main: bool,
}

impl SourceGroup {
    pub fn new(folder: impl Into<String>, main_folder: &str) -> Self {
        let folder = folder.into();
        let is_main = folder == main_folder;
        Self { folder, is_main }
    }

    /// Whether this tenant may act on resources owned by `owner_folder`.
    pub fn can_act_for(&self, owner_folder: &str) -> bool {
        self.is_main || self.folder == owner_folder
    }
}

/// Enumerate tenant mailboxes under `ipc_root`, skipping the quarantine dir.
pub async fn resolve_source_groups(
    ipc_root: &Path,
    main_folder: &str,
) -> Result<Vec<SourceGroup>, IpcError> {
    let mut read_dir = fs::read_dir(ipc_root)
        .await
        .map_err(|e| IpcError::io(ipc_root, e))?;

    let mut groups = Vec::new();
    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| IpcError::io(ipc_root, e))?
    {
        let is_dir = entry
            .file_type()
            .await
            .map(|t| t.is_dir())
            .unwrap_or(false);
        if !is_dir {
            continue;
        }

        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            warn!(path = %entry.path().display(), "Skipping non-UTF-8 mailbox name");
            continue;
        };
        if name == ERRORS_DIR {
            continue;
        }
        if !is_valid_folder(&name) {
            warn!(folder = %name, "Skipping mailbox with unusable folder name; its files will not be processed");
            continue;
        }

        groups.push(SourceGroup::new(name, main_folder));
    }

    groups.sort_by(|a, b| a.folder.cmp(&b.folder));
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn main_flag_comes_from_folder_name_only() {
        assert!(SourceGroup::new("main", "main").is_main);
        assert!(!SourceGroup::new("alpha", "main").is_main);
        assert!(!SourceGroup::new("Main", "main").is_main);
    }

    #[test]
    fn can_act_for_owner_or_main() {
        let alpha = SourceGroup::new("alpha", "main");
        let main = SourceGroup::new("main", "main");
        assert!(alpha.can_act_for("alpha"));
        assert!(!alpha.can_act_for("beta"));
        assert!(main.can_act_for("beta"));
    }

    #[tokio::test]
    async fn resolves_directories_and_skips_errors() {
        let tmp = TempDir::new().unwrap();
        for dir in ["main", "alpha", "errors", ".hidden"] {
            std::fs::create_dir_all(tmp.path().join(dir)).unwrap();
        }
        std::fs::write(tmp.path().join("stray.json"), "{}").unwrap();

        let groups = resolve_source_groups(tmp.path(), "main").await.unwrap();
        let folders: Vec<_> = groups.iter().map(|g| g.folder.as_str()).collect();
        assert_eq!(folders, vec!["alpha", "main"]);
        assert!(groups.iter().find(|g| g.folder == "main").unwrap().is_main);
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let result = resolve_source_groups(&tmp.path().join("absent"), "main").await;
        assert!(matches!(result, Err(IpcError::Io { .. })));
    }
}
