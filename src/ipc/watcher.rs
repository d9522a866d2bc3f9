//! Mailbox poll loop.
//!
//! One background task walks every tenant mailbox, hands each request file to
//! the [`IpcProcessor`] and disposes of it. Cycles never overlap: the next one
//! is scheduled a fixed delay after the previous one finishes.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::HostConfig;
use crate::error::IpcError;
use crate::ipc::identity::{SourceGroup, resolve_source_groups};
use crate::ipc::mailbox::{Disposal, Mailbox, MailboxChannel};
use crate::ipc::processor::{IpcDeps, IpcProcessor, Outcome};
use crate::ipc::request::{MessageRequest, TaskRequest};

/// Counts from one pass over the mailbox tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub processed: usize,
    pub deleted: usize,
    pub quarantined: usize,
}

/// Handle to a running watcher loop.
#[derive(Clone)]
pub struct WatcherHandle {
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl WatcherHandle {
    /// Stop the loop and wait for the in-flight cycle to finish.
    pub async fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.wake.notify_one();
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                error!("IPC watcher task failed: {e}");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !self.stop.load(Ordering::SeqCst)
    }
}

/// Polls `<ipc-root>/<folder>/{messages,tasks}` for every tenant.
pub struct IpcWatcher {
    mailbox: Mailbox,
    main_folder: String,
    poll_interval: Duration,
    processor: IpcProcessor,
    running: Mutex<Option<WatcherHandle>>,
}

impl IpcWatcher {
    pub fn new(config: &HostConfig, deps: IpcDeps) -> Self {
        Self {
            mailbox: Mailbox::new(&config.ipc_dir),
            main_folder: config.main_folder.clone(),
            poll_interval: config.poll_interval,
            processor: IpcProcessor::new(config, deps),
            running: Mutex::new(None),
        }
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Start the poll loop. Calling this again while the loop runs returns
    /// the existing handle. Fails if the mailbox root cannot be created.
    pub async fn start(self: &Arc<Self>) -> Result<WatcherHandle, IpcError> {
        let mut running = self.running.lock().await;
        if let Some(handle) = running.as_ref().filter(|h| h.is_running()) {
            debug!("IPC watcher already running");
            return Ok(handle.clone());
        }

        self.mailbox.ensure_layout().await?;

        let stop = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let watcher = Arc::clone(self);
        let loop_stop = Arc::clone(&stop);
        let loop_wake = Arc::clone(&wake);

        let task = tokio::spawn(async move {
            info!(
                ipc_dir = %watcher.mailbox.root().display(),
                poll_ms = watcher.poll_interval.as_millis() as u64,
                "IPC watcher started"
            );
            while !loop_stop.load(Ordering::SeqCst) {
                let report = watcher.run_cycle().await;
                if report.processed > 0 {
                    debug!(
                        processed = report.processed,
                        deleted = report.deleted,
                        quarantined = report.quarantined,
                        "IPC cycle complete"
                    );
                }
                tokio::select! {
                    _ = tokio::time::sleep(watcher.poll_interval) => {}
                    _ = loop_wake.notified() => {}
                }
            }
            info!("IPC watcher stopped");
        });

        let handle = WatcherHandle {
            stop,
            wake,
            task: Arc::new(Mutex::new(Some(task))),
        };
        *running = Some(handle.clone());
        Ok(handle)
    }

    /// One pass over every tenant: messages first, then tasks.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let sources = match resolve_source_groups(self.mailbox.root(), &self.main_folder).await {
            Ok(sources) => sources,
            Err(e) => {
                error!("Error reading IPC base directory: {e}");
                return report;
            }
        };

        for source in &sources {
            for channel in [MailboxChannel::Messages, MailboxChannel::Tasks] {
                let files = match self.mailbox.list_requests(&source.folder, channel).await {
                    Ok(files) => files,
                    Err(e) => {
                        error!(source_group = %source.folder, channel = %channel, "Error reading IPC directory: {e}");
                        continue;
                    }
                };
                for path in files {
                    report.processed += 1;
                    match self.handle_file(source, channel, &path).await {
                        Some(Disposal::Deleted) => report.deleted += 1,
                        Some(Disposal::Quarantined) => report.quarantined += 1,
                        None => {}
                    }
                }
            }
        }
        report
    }

    /// Process one file and dispose of it. Decided outcomes delete the file;
    /// failures move it to `errors/`.
    async fn handle_file(
        &self,
        source: &SourceGroup,
        channel: MailboxChannel,
        path: &Path,
    ) -> Option<Disposal> {
        let result = match self.mailbox.read_request(path).await {
            Ok(value) => self.dispatch(source, channel, value).await,
            Err(e) => Err(e),
        };

        let disposal = match result {
            Ok(outcome) => {
                debug!(source_group = %source.folder, file = %path.display(), ?outcome, "IPC request handled");
                self.mailbox.delete(path).await
            }
            Err(e) => {
                error!(
                    source_group = %source.folder,
                    channel = %channel,
                    file = %path.display(),
                    "Error processing IPC request: {e}"
                );
                self.mailbox.quarantine(path, &source.folder).await
            }
        };

        match disposal {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(file = %path.display(), "Failed to dispose of IPC request: {e}");
                None
            }
        }
    }

    async fn dispatch(
        &self,
        source: &SourceGroup,
        channel: MailboxChannel,
        value: Value,
    ) -> Result<Outcome, IpcError> {
        match channel {
            MailboxChannel::Messages => {
                let request = MessageRequest::from_value(&value);
                self.processor.process_message(source, request).await
            }
            MailboxChannel::Tasks => {
                let request = TaskRequest::from_value(value);
                self.processor.process_task(source, request).await
            }
        }
    }
}
