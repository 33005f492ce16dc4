use fleetmon_common::types::ChannelType;

/// Errors that can occur within the notification subsystem.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// No sender is registered for the channel's transport kind.
    #[error("Notify: no sender registered for channel type '{0}'")]
    NoSender(ChannelType),

    /// The transport reported a delivery failure.
    #[error("Notify: delivery failed: {0}")]
    Delivery(String),

    /// A storage operation failed while gating or recording a dispatch.
    #[error("Notify: storage error: {0}")]
    Store(#[from] fleetmon_store::error::StoreError),

    /// JSON serialization or deserialization failed (e.g. channel config).
    #[error("Notify: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic notification error for cases not covered by other variants.
    #[error("Notify: {0}")]
    Other(String),
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
