//! Persistence surface for the fleetmon alert engine.
//!
//! The engine talks to storage exclusively through the [`AlertStore`] trait.
//! The in-memory implementation ([`memory::MemoryStore`]) is the reference
//! backend used by tests and embedded deployments; durable SQL backends live
//! outside this workspace behind the same trait.

pub mod error;
pub mod memory;
pub mod seed;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use error::Result;
use fleetmon_common::types::{
    Alert, AlertFilter, AlertHistoryEntry, AlertRule, AlertSettings, AlertStatus, AlertSummary,
    DedupKey, EscalationPolicy, MaintenanceWindow, NewAlert, NotificationChannel,
};

/// Durable store for alerts, rules, escalation policies, channels,
/// maintenance windows, settings, and history.
///
/// Implementations must be safe to share across tasks (`Send + Sync`):
/// the rule evaluator, escalation scheduler, and notification dispatcher
/// all operate over the same store concurrently, and every cross-field
/// update below is required to be atomic within one call.
#[async_trait]
pub trait AlertStore: Send + Sync {
    // ---- Alerts ----

    /// Atomic get-active-or-create on the alert's de-duplication key.
    ///
    /// If an open (non-terminal) alert already exists for the key, its
    /// repeat counter is incremented and it is returned with `created =
    /// false`; otherwise a new alert is inserted with the given initial
    /// status. Concurrent callers racing on the same key must observe
    /// exactly one created alert.
    async fn create_or_get_active(
        &self,
        new: NewAlert,
        initial_status: AlertStatus,
        suppressed_until: Option<DateTime<Utc>>,
    ) -> Result<(Alert, bool)>;

    async fn get_alert(&self, id: &str) -> Result<Option<Alert>>;

    /// Alerts matching the filter, newest first, with pagination applied.
    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>>;

    /// Open (pre-terminal) alerts matching the filter.
    async fn list_open_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>>;

    /// Historical listing: everything that has left the active status.
    async fn list_alert_history(&self, filter: &AlertFilter) -> Result<Vec<Alert>>;

    /// Applies a status transition, stamping the matching lifecycle
    /// timestamps, bumping `state_change_count`, and appending the history
    /// entry — all in one atomic step. Rejects transitions out of terminal
    /// states and transitions the state machine does not allow.
    async fn update_status(
        &self,
        id: &str,
        new_status: AlertStatus,
        actor: Option<&str>,
        details: Option<&str>,
        suppressed_until: Option<DateTime<Utc>>,
    ) -> Result<Alert>;

    /// Operator acknowledgement. Allowed from the active state only.
    async fn acknowledge_alert(&self, id: &str, actor: &str) -> Result<Alert> {
        self.update_status(id, AlertStatus::Acknowledged, Some(actor), None, None)
            .await
    }

    /// Resolution. Allowed from active, acknowledged, and suppressed states.
    async fn resolve_alert(&self, id: &str) -> Result<Alert> {
        self.update_status(id, AlertStatus::Resolved, None, None, None)
            .await
    }

    /// Explicit suppression until the given instant.
    async fn suppress_alert(&self, id: &str, until: DateTime<Utc>) -> Result<Alert> {
        self.update_status(id, AlertStatus::Suppressed, None, None, Some(until))
            .await
    }

    async fn set_flapping(&self, id: &str, flapping: bool) -> Result<()>;

    /// Persists one completed escalation fire.
    async fn record_escalation(&self, id: &str, level: u32, at: DateTime<Utc>) -> Result<()>;

    async fn update_notification_status(
        &self,
        id: &str,
        sent: u32,
        last_notified: DateTime<Utc>,
    ) -> Result<()>;

    /// Links a child alert to its synthetic group parent and bumps the
    /// parent's child count.
    async fn attach_to_parent(&self, child_id: &str, parent_id: &str) -> Result<()>;

    /// Status transitions recorded for the alert since `since`.
    async fn count_history_since(&self, alert_id: &str, since: DateTime<Utc>) -> Result<u32>;

    async fn list_history_entries(&self, alert_id: &str) -> Result<Vec<AlertHistoryEntry>>;

    /// Most recently closed (resolved or expired) alert for the key, used
    /// for cooldown checks.
    async fn last_closed_for_key(&self, key: &DedupKey) -> Result<Option<Alert>>;

    async fn compute_summary(&self, now: DateTime<Utc>) -> Result<AlertSummary>;

    // ---- Rules ----

    async fn create_rule(&self, rule: AlertRule) -> Result<AlertRule>;
    async fn get_rule(&self, id: &str) -> Result<Option<AlertRule>>;
    async fn list_rules(&self) -> Result<Vec<AlertRule>>;
    async fn list_enabled_rules(&self) -> Result<Vec<AlertRule>>;
    async fn update_rule(&self, rule: AlertRule) -> Result<AlertRule>;
    async fn delete_rule(&self, id: &str) -> Result<bool>;

    // ---- Escalation policies ----

    async fn create_policy(&self, policy: EscalationPolicy) -> Result<EscalationPolicy>;
    async fn get_policy(&self, id: &str) -> Result<Option<EscalationPolicy>>;
    async fn list_policies(&self) -> Result<Vec<EscalationPolicy>>;
    async fn update_policy(&self, policy: EscalationPolicy) -> Result<EscalationPolicy>;
    async fn delete_policy(&self, id: &str) -> Result<bool>;

    // ---- Notification channels ----

    async fn create_channel(&self, channel: NotificationChannel) -> Result<NotificationChannel>;
    async fn get_channel(&self, id: &str) -> Result<Option<NotificationChannel>>;
    async fn list_channels(&self) -> Result<Vec<NotificationChannel>>;
    async fn update_channel(&self, channel: NotificationChannel) -> Result<NotificationChannel>;
    async fn delete_channel(&self, id: &str) -> Result<bool>;

    /// Atomic rolling-hour rate-limit reservation.
    ///
    /// Rolls the hour bucket when `now` is past `hour_started_at + 1h`,
    /// then either claims one send (incrementing `sent_this_hour` and
    /// stamping `last_sent_at`) or refuses because the bucket is full.
    /// Roll-and-claim happen in one step; there is no separate reset sweep.
    async fn try_reserve_send(&self, channel_id: &str, now: DateTime<Utc>) -> Result<bool>;

    // ---- Maintenance windows ----

    async fn create_window(&self, window: MaintenanceWindow) -> Result<MaintenanceWindow>;
    async fn get_window(&self, id: &str) -> Result<Option<MaintenanceWindow>>;
    async fn list_windows(&self) -> Result<Vec<MaintenanceWindow>>;
    async fn delete_window(&self, id: &str) -> Result<bool>;

    /// Windows whose `[start, end]` range contains `now`.
    async fn list_active_windows(&self, now: DateTime<Utc>) -> Result<Vec<MaintenanceWindow>>;

    // ---- Settings ----

    /// Returns the saved settings, or defaults when never saved.
    async fn get_settings(&self) -> Result<AlertSettings>;
    async fn save_settings(&self, settings: AlertSettings) -> Result<()>;
}
