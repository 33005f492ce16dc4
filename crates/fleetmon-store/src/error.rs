use fleetmon_common::types::AlertStatus;

/// Errors that can occur within the storage layer.
///
/// Lookups by id return `Ok(None)` for absence; [`StoreError::NotFound`] is
/// reserved for mutating calls that name a row which must exist.
///
/// # Examples
///
/// ```rust
/// use fleetmon_store::error::StoreError;
///
/// let err = StoreError::NotFound {
///     entity: "alert_rule",
///     id: "rule-99".to_string(),
/// };
/// assert!(err.to_string().contains("alert_rule"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A required record was not found.
    #[error("Store: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// The requested status change is not allowed from the current state.
    #[error("Store: invalid alert transition {from} -> {to}")]
    InvalidTransition { from: AlertStatus, to: AlertStatus },

    /// A write was rejected because the payload is malformed.
    #[error("Store: validation failed: {0}")]
    Validation(String),

    /// JSON serialization or deserialization failure (e.g. config columns).
    #[error("Store: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic storage error for cases not covered by other variants.
    #[error("Store: {0}")]
    Other(String),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
