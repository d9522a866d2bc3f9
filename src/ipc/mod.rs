//! File-based IPC between sandboxed agents and the host.
//!
//! Each tenant writes JSON request files into its own mailbox directory. The
//! [`IpcWatcher`] polls those directories, derives the tenant's identity from
//! the directory name alone, authorizes each request and applies it.

pub mod actions;
pub mod auth;
pub mod identity;
pub mod mailbox;
pub mod processor;
pub mod request;
pub mod snapshot;
pub mod watcher;

pub use actions::{ActionHandler, ActionRouter};
pub use auth::Denial;
pub use identity::SourceGroup;
pub use mailbox::{Disposal, Mailbox, MailboxChannel};
pub use processor::{IpcDeps, IpcProcessor, Outcome};
pub use snapshot::{FileSnapshotWriter, SnapshotWriter};
pub use watcher::{CycleReport, IpcWatcher, WatcherHandle};
