//! Notification dispatch for alert lifecycle events.
//!
//! The dispatcher decides *which* channels receive a notification and
//! *when* — severity thresholds, tenant restrictions, quiet hours, and
//! rolling-hour rate limits. The transport itself is behind the
//! [`ChannelSender`] seam: implementations (SMTP, webhooks, pagers) live
//! outside this workspace and are registered per channel type.

pub mod content;
pub mod dispatcher;
pub mod error;


use async_trait::async_trait;
use content::AlertContent;
use error::Result;
use fleetmon_common::types::{ChannelType, NotificationChannel};
use std::collections::HashMap;

/// The lifecycle event a notification announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyEvent {
    Triggered,
    /// Escalation fire for the given policy step index.
    Escalated { step: usize },
    Resolved,
}

/// Delivers rendered alert content through one transport kind.
///
/// The engine treats the channel's `config` payload as opaque; a sender
/// interprets it and reports success or failure. Failures are recorded but
/// not retried beyond the next natural lifecycle event.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Attempts delivery through the given channel.
    async fn send(&self, channel: &NotificationChannel, content: &AlertContent) -> Result<()>;

    /// The transport kind this sender handles.
    fn channel_type(&self) -> ChannelType;
}

/// Registry of [`ChannelSender`]s keyed by channel type.
pub struct SenderRegistry {
    senders: HashMap<ChannelType, Box<dyn ChannelSender>>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self {
            senders: HashMap::new(),
        }
    }

    pub fn register(&mut self, sender: Box<dyn ChannelSender>) {
        self.senders.insert(sender.channel_type(), sender);
    }

    pub fn get(&self, channel_type: ChannelType) -> Option<&dyn ChannelSender> {
        self.senders.get(&channel_type).map(|s| s.as_ref())
    }

    pub fn has_sender(&self, channel_type: ChannelType) -> bool {
        self.senders.contains_key(&channel_type)
    }

    pub fn sender_types(&self) -> Vec<ChannelType> {
        self.senders.keys().copied().collect()
    }
}

impl Default for SenderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
