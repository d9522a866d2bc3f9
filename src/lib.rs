//! IPC host: authorized mailbox relay for sandboxed agent groups.

pub mod channels;
pub mod config;
pub mod error;
pub mod groups;
pub mod ipc;
pub mod scheduler;
pub mod store;
