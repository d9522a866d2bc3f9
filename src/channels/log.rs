//! Standalone collaborators used when no chat adapter is attached.
//!
//! `LogSender` writes relayed messages to the tracing output; `RegistryMetadata`
//! reports the registered groups as the only known chats.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::channels::{GroupMetadataSource, MessageSender};
use crate::error::ChannelError;
use crate::groups::AvailableGroup;
use crate::store::GroupRegistry;

/// Sender that only logs. Useful for running the host without a chat network.
#[derive(Debug, Default)]
pub struct LogSender;

#[async_trait]
impl MessageSender for LogSender {
    async fn send_message(&self, target_jid: &str, text: &str) -> Result<(), ChannelError> {
        info!(target_jid = %target_jid, chars = text.chars().count(), "Outbound message: {}", text);
        Ok(())
    }
}

/// Metadata source backed by the group registry alone.
pub struct RegistryMetadata {
    registry: Arc<dyn GroupRegistry>,
}

impl RegistryMetadata {
    pub fn new(registry: Arc<dyn GroupRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl GroupMetadataSource for RegistryMetadata {
    async fn sync_group_metadata(&self, force: bool) -> Result<(), ChannelError> {
        info!(force, "Group metadata sync requested (registry-only source, nothing to fetch)");
        Ok(())
    }

    async fn available_groups(&self) -> Result<Vec<AvailableGroup>, ChannelError> {
        let groups = self
            .registry
            .all_registered_groups()
            .await
            .map_err(|e| ChannelError::SyncFailed(e.to_string()))?;
        Ok(groups
            .into_iter()
            .map(|g| AvailableGroup {
                jid: g.jid,
                name: g.name,
                last_activity: None,
                is_registered: true,
            })
            .collect())
    }
}
