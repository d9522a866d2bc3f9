//! Error types for the IPC host.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for the host.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Schedule descriptor could not be turned into a next-run instant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("unknown schedule type: {0}")]
    UnknownType(String),

    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("cron expression '{0}' has no upcoming occurrence")]
    NoUpcoming(String),

    #[error("invalid interval '{0}': expected a positive millisecond count")]
    InvalidInterval(String),

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}

/// Failures while processing a mailbox file. Any of these quarantines the file.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed request file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("External dispatch '{operation}' timed out after {timeout:?}")]
    DispatchTimeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Snapshot write failed: {0}")]
    Snapshot(String),
}

impl IpcError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IpcError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Outbound message delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send message to {target}: {reason}")]
    SendFailed { target: String, reason: String },

    #[error("Group metadata sync failed: {0}")]
    SyncFailed(String),
}

/// Errors raised by external action handlers.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Action {action} failed: {reason}")]
    Failed { action: String, reason: String },

    #[error("Invalid payload for action {action}: {reason}")]
    InvalidPayload { action: String, reason: String },
}

/// Result type alias for the host.
pub type Result<T> = std::result::Result<T, Error>;
