//! On-disk mailbox layout and request-file disposal.
//!
//! ```text
//! <ipc-root>/<folder>/messages/*.json
//! <ipc-root>/<folder>/tasks/*.json
//! <ipc-root>/errors/<folder>-<filename>
//! ```
//!
//! Every file that is picked up is disposed of exactly once: deleted after
//! processing (including rejected requests) or moved to `errors/`.

use std::fmt;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::error::IpcError;
use crate::groups::ERRORS_DIR;

/// A tenant sub-channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxChannel {
    Messages,
    Tasks,
}

impl MailboxChannel {
    pub fn dir_name(&self) -> &'static str {
        match self {
            MailboxChannel::Messages => "messages",
            MailboxChannel::Tasks => "tasks",
        }
    }
}

impl fmt::Display for MailboxChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// What happened to a processed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposal {
    Deleted,
    Quarantined,
}

/// The mailbox tree rooted at the IPC directory.
#[derive(Debug, Clone)]
pub struct Mailbox {
    root: PathBuf,
}

impl Mailbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn errors_dir(&self) -> PathBuf {
        self.root.join(ERRORS_DIR)
    }

    pub fn group_dir(&self, folder: &str) -> PathBuf {
        self.root.join(folder)
    }

    pub fn channel_dir(&self, folder: &str, channel: MailboxChannel) -> PathBuf {
        self.group_dir(folder).join(channel.dir_name())
    }

    /// Create the root and quarantine directories.
    pub async fn ensure_layout(&self) -> Result<(), IpcError> {
        let errors = self.errors_dir();
        fs::create_dir_all(&errors)
            .await
            .map_err(|e| IpcError::io(errors, e))
    }

    /// Create a tenant's mailbox with both sub-channels.
    pub async fn ensure_group(&self, folder: &str) -> Result<(), IpcError> {
        for channel in [MailboxChannel::Messages, MailboxChannel::Tasks] {
            let dir = self.channel_dir(folder, channel);
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| IpcError::io(dir, e))?;
        }
        Ok(())
    }

    /// Pending request files in one sub-channel, by file name.
    ///
    /// A sub-channel that does not exist yet has nothing pending. Names not
    /// ending in `.json` are left alone; writers rename into place when done.
    pub async fn list_requests(
        &self,
        folder: &str,
        channel: MailboxChannel,
    ) -> Result<Vec<PathBuf>, IpcError> {
        let dir = self.channel_dir(folder, channel);
        let mut read_dir = match fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(IpcError::io(dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| IpcError::io(&dir, e))?
        {
            let path = entry.path();
            let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if is_json && is_file {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Read and parse a request file as JSON.
    pub async fn read_request(&self, path: &Path) -> Result<serde_json::Value, IpcError> {
        let raw = fs::read(path).await.map_err(|e| IpcError::io(path, e))?;
        serde_json::from_slice(&raw).map_err(|source| IpcError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Remove a file after it has been handled.
    pub async fn delete(&self, path: &Path) -> Result<Disposal, IpcError> {
        fs::remove_file(path)
            .await
            .map_err(|e| IpcError::io(path, e))?;
        debug!(file = %path.display(), "Request file deleted");
        Ok(Disposal::Deleted)
    }

    /// Move a file into `errors/`, prefixed with the source folder so equal
    /// file names from different tenants never collide.
    pub async fn quarantine(&self, path: &Path, folder: &str) -> Result<Disposal, IpcError> {
        let target = self.quarantine_path(path, folder);
        let errors = self.errors_dir();
        fs::create_dir_all(&errors)
            .await
            .map_err(|e| IpcError::io(&errors, e))?;
        fs::rename(path, &target)
            .await
            .map_err(|e| IpcError::io(path, e))?;
        warn!(
            source_group = %folder,
            file = %path.display(),
            quarantined_as = %target.display(),
            "Request file quarantined"
        );
        Ok(Disposal::Quarantined)
    }

    pub fn quarantine_path(&self, path: &Path, folder: &str) -> PathBuf {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.errors_dir().join(format!("{folder}-{file_name}"))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn setup() -> (TempDir, Mailbox) {
        let tmp = TempDir::new().unwrap();
        let mailbox = Mailbox::new(tmp.path());
        (tmp, mailbox)
    }

    #[tokio::test]
    async fn ensure_group_creates_both_channels() {
        let (_tmp, mailbox) = setup();
        mailbox.ensure_layout().await.unwrap();
        mailbox.ensure_group("alpha").await.unwrap();
        assert!(mailbox.errors_dir().is_dir());
        assert!(mailbox.channel_dir("alpha", MailboxChannel::Messages).is_dir());
        assert!(mailbox.channel_dir("alpha", MailboxChannel::Tasks).is_dir());
    }

    #[tokio::test]
    async fn list_missing_channel_is_empty() {
        let (_tmp, mailbox) = setup();
        let files = mailbox
            .list_requests("ghost", MailboxChannel::Tasks)
            .await
            .unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn list_only_json_files_sorted() {
        let (_tmp, mailbox) = setup();
        mailbox.ensure_group("alpha").await.unwrap();
        let dir = mailbox.channel_dir("alpha", MailboxChannel::Tasks);
        std::fs::write(dir.join("b.json"), "{}").unwrap();
        std::fs::write(dir.join("a.json"), "{}").unwrap();
        std::fs::write(dir.join("c.json.tmp"), "{").unwrap();
        std::fs::create_dir(dir.join("nested.json")).unwrap();

        let files = mailbox
            .list_requests("alpha", MailboxChannel::Tasks)
            .await
            .unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[tokio::test]
    async fn read_request_reports_parse_errors() {
        let (_tmp, mailbox) = setup();
        mailbox.ensure_group("alpha").await.unwrap();
        let path = mailbox
            .channel_dir("alpha", MailboxChannel::Tasks)
            .join("bad.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = mailbox.read_request(&path).await.unwrap_err();
        assert!(matches!(err, IpcError::Parse { .. }));
    }

    #[tokio::test]
    async fn quarantine_prefixes_source_folder() {
        let (_tmp, mailbox) = setup();
        mailbox.ensure_group("alpha").await.unwrap();
        let path = mailbox
            .channel_dir("alpha", MailboxChannel::Messages)
            .join("123.json");
        std::fs::write(&path, "oops").unwrap();

        let disposal = mailbox.quarantine(&path, "alpha").await.unwrap();
        assert_eq!(disposal, Disposal::Quarantined);
        assert!(!path.exists());
        assert!(mailbox.errors_dir().join("alpha-123.json").exists());
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let (_tmp, mailbox) = setup();
        mailbox.ensure_group("alpha").await.unwrap();
        let path = mailbox
            .channel_dir("alpha", MailboxChannel::Tasks)
            .join("t.json");
        std::fs::write(&path, "{}").unwrap();

        assert_eq!(mailbox.delete(&path).await.unwrap(), Disposal::Deleted);
        assert!(!path.exists());
    }
}
