/// Errors produced by the alert engine.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// A storage operation failed.
    #[error("Alert: storage error: {0}")]
    Store(#[from] fleetmon_store::error::StoreError),

    /// Dispatching a notification failed.
    #[error("Alert: notify error: {0}")]
    Notify(#[from] fleetmon_notify::error::NotifyError),

    /// A rule could not be evaluated (e.g. malformed condition payload).
    /// Isolated per rule: the rest of the evaluation pass continues.
    #[error("Alert: rule evaluation failed: {0}")]
    Rule(String),
}

/// Convenience `Result` alias for engine operations.
pub type Result<T> = std::result::Result<T, AlertError>;
