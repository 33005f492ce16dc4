//! Channel selection and gating for one lifecycle event.

use crate::content::AlertContent;
use crate::error::Result;
use crate::{NotifyEvent, SenderRegistry};
use chrono::{DateTime, Utc};
use fleetmon_common::quiet;
use fleetmon_common::types::{Alert, NotificationChannel, Severity};
use fleetmon_store::AlertStore;
use std::sync::Arc;

/// Dispatches notifications for alert lifecycle events.
///
/// For each candidate channel the dispatcher applies, in order: the
/// enabled flag, the channel's minimum severity, its tenant restriction,
/// quiet hours, and the rolling-hour rate limit. Channels that pass are
/// handed to the registered [`crate::ChannelSender`]; a failing channel
/// never blocks the others.
pub struct NotificationDispatcher {
    store: Arc<dyn AlertStore>,
    registry: SenderRegistry,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn AlertStore>, registry: SenderRegistry) -> Self {
        Self { store, registry }
    }

    /// Dispatches to the candidate channel set using the current instant.
    pub async fn dispatch(
        &self,
        alert: &Alert,
        event: NotifyEvent,
        channel_ids: &[String],
    ) -> Result<u32> {
        self.dispatch_at(alert, event, channel_ids, Utc::now()).await
    }

    /// Dispatches using an explicit instant. The same `now` is used for
    /// every quiet-hours and rate-limit decision in the pass, so clock
    /// skew cannot produce double-sends within one dispatch.
    pub async fn dispatch_at(
        &self,
        alert: &Alert,
        event: NotifyEvent,
        channel_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<u32> {
        if channel_ids.is_empty() {
            return Ok(0);
        }

        let settings = self.store.get_settings().await?;
        let is_quiet = quiet::is_quiet_at(&settings.quiet_hours, now);
        let content = AlertContent::render(alert, event);

        let mut delivered = 0u32;
        for channel_id in channel_ids {
            let channel = match self.store.get_channel(channel_id).await? {
                Some(c) => c,
                None => {
                    tracing::warn!(channel_id, "Notification channel not found, skipping");
                    continue;
                }
            };

            if !self.channel_passes_gates(&channel, alert, is_quiet, &settings.quiet_hours) {
                continue;
            }

            if !self.store.try_reserve_send(&channel.id, now).await? {
                tracing::debug!(
                    channel = %channel.name,
                    alert_id = %alert.id,
                    "Notification skipped (hourly rate limit reached)"
                );
                continue;
            }

            let sender = match self.registry.get(channel.channel_type) {
                Some(s) => s,
                None => {
                    tracing::warn!(
                        channel = %channel.name,
                        channel_type = %channel.channel_type,
                        "No sender registered for channel type"
                    );
                    continue;
                }
            };

            match sender.send(&channel, &content).await {
                Ok(()) => {
                    delivered += 1;
                    tracing::info!(
                        channel = %channel.name,
                        channel_type = %channel.channel_type,
                        alert_id = %alert.id,
                        "Notification sent"
                    );
                }
                Err(e) => {
                    // Isolated: the reservation is consumed, the rest of
                    // the channel set still gets its chance.
                    tracing::error!(
                        channel = %channel.name,
                        channel_type = %channel.channel_type,
                        alert_id = %alert.id,
                        error = %e,
                        "Failed to send notification"
                    );
                }
            }
        }

        if delivered > 0 {
            self.store
                .update_notification_status(
                    &alert.id,
                    alert.notifications_sent + delivered,
                    now,
                )
                .await?;
        }

        Ok(delivered)
    }

    fn channel_passes_gates(
        &self,
        channel: &NotificationChannel,
        alert: &Alert,
        is_quiet: bool,
        quiet_hours: &fleetmon_common::types::QuietHours,
    ) -> bool {
        if !channel.enabled {
            return false;
        }

        if alert.severity < channel.min_severity {
            tracing::debug!(
                channel = %channel.name,
                alert_severity = %alert.severity,
                min_severity = %channel.min_severity,
                "Notification skipped (below channel severity threshold)"
            );
            return false;
        }

        if !channel.tenant_ids.is_empty() {
            let in_tenant = alert
                .tenant_id
                .as_deref()
                .is_some_and(|t| channel.tenant_ids.iter().any(|x| x == t));
            if !in_tenant {
                return false;
            }
        }

        if channel.use_quiet_hours && is_quiet {
            let critical_bypass =
                quiet_hours.allow_critical && alert.severity == Severity::Critical;
            if !critical_bypass {
                tracing::debug!(
                    channel = %channel.name,
                    alert_id = %alert.id,
                    "Notification skipped (quiet hours)"
                );
                return false;
            }
        }

        true
    }
}
