use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use ipc_host::channels::{LogSender, RegistryMetadata};
use ipc_host::config::HostConfig;
use ipc_host::ipc::{ActionRouter, FileSnapshotWriter, IpcDeps, IpcWatcher};
use ipc_host::store::{GroupRegistry, LibSqlBackend, TaskStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_tracing();

    let config = HostConfig::from_env().context("invalid configuration")?;

    eprintln!("IPC host v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   IPC root: {}", config.ipc_dir.display());
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Main group: {}", config.main_folder);
    eprintln!("   Timezone: {}", config.timezone);

    // ── Database ─────────────────────────────────────────────────────────
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let db = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("opening database at {}", config.db_path.display()))?,
    );
    let groups: Arc<dyn GroupRegistry> = db.clone();
    let tasks: Arc<dyn TaskStore> = db;

    // ── IPC watcher ──────────────────────────────────────────────────────
    let deps = IpcDeps {
        sender: Arc::new(LogSender),
        tasks,
        groups: Arc::clone(&groups),
        metadata: Arc::new(RegistryMetadata::new(groups)),
        snapshots: Arc::new(FileSnapshotWriter::new(&config.ipc_dir)),
        actions: Arc::new(ActionRouter::new()),
    };
    let watcher = Arc::new(IpcWatcher::new(&config, deps));
    let handle = watcher
        .start()
        .await
        .context("failed to start IPC watcher")?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("Shutdown requested");
    handle.shutdown().await;

    Ok(())
}

/// Console logging, plus a daily-rotated file when `IPC_HOST_LOG_DIR` is set.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = tracing_subscriber::fmt::layer().with_target(false);

    let (file_layer, guard) = match std::env::var("IPC_HOST_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "ipc-host.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}
