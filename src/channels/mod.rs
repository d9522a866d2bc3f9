//! Chat channel collaborators.
//!
//! The host never talks to a chat network itself. It relays through a
//! [`MessageSender`] and asks a [`GroupMetadataSource`] for chat listings.

pub mod log;

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::groups::AvailableGroup;

pub use log::{LogSender, RegistryMetadata};

/// Delivers outbound text to a chat.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(&self, target_jid: &str, text: &str) -> Result<(), ChannelError>;
}

/// Source of chat/group metadata from the messaging platform.
#[async_trait]
pub trait GroupMetadataSource: Send + Sync {
    /// Resync group names from the platform. `force` bypasses any cache window.
    async fn sync_group_metadata(&self, force: bool) -> Result<(), ChannelError>;

    /// Every chat the platform exposes, flagged by registration.
    async fn available_groups(&self) -> Result<Vec<AvailableGroup>, ChannelError>;
}
