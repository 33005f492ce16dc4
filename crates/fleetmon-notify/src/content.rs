//! Plain-text rendering of an alert for channel senders.

use crate::NotifyEvent;
use fleetmon_common::types::Alert;

/// Rendered notification payload handed to a [`crate::ChannelSender`].
/// Transports that want structured data can re-serialize from the alert;
/// the subject/body pair is the lowest common denominator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertContent {
    pub subject: String,
    pub body: String,
}

impl AlertContent {
    /// Renders the subject and body for a lifecycle event.
    ///
    /// # Examples
    ///
    /// ```
    /// # use fleetmon_notify::content::AlertContent;
    /// # use fleetmon_notify::NotifyEvent;
    /// # use fleetmon_common::types::*;
    /// # use chrono::Utc;
    /// # let now = Utc::now();
    /// # let alert = Alert {
    /// #     id: "1".into(), rule_id: None, alert_type: AlertType::SupplyCritical,
    /// #     severity: Severity::Critical, scope: AlertScope::Device,
    /// #     status: AlertStatus::Active, tenant_id: None, site_id: None,
    /// #     agent_id: None, device_id: Some("PRN-1".into()),
    /// #     title: "Critical supply: PRN-1".into(), message: "black at 3%".into(),
    /// #     details: None, triggered_at: now, acknowledged_at: None,
    /// #     acknowledged_by: None, resolved_at: None, suppressed_until: None,
    /// #     expires_at: None, escalation_level: 0, last_escalated_at: None,
    /// #     state_change_count: 0, is_flapping: false, parent_alert_id: None,
    /// #     child_count: 0, repeat_count: 0, notifications_sent: 0,
    /// #     last_notified_at: None, created_at: now, updated_at: now,
    /// # };
    /// let content = AlertContent::render(&alert, NotifyEvent::Triggered);
    /// assert_eq!(content.subject, "[CRITICAL] Critical supply: PRN-1");
    /// ```
    pub fn render(alert: &Alert, event: NotifyEvent) -> Self {
        let severity = alert.severity.to_string().to_uppercase();
        let subject = match event {
            NotifyEvent::Triggered => format!("[{severity}] {}", alert.title),
            NotifyEvent::Escalated { step } => {
                format!("[{severity}] [ESCALATION {}] {}", step + 1, alert.title)
            }
            NotifyEvent::Resolved => format!("[RESOLVED] {}", alert.title),
        };

        let mut body = format!(
            "Alert: {}\nSeverity: {}\nScope: {}\nStatus: {}\nTime: {}\n",
            alert.title,
            alert.severity,
            alert.scope,
            alert.status,
            alert.triggered_at.to_rfc3339(),
        );
        if let Some(tenant) = &alert.tenant_id {
            body.push_str(&format!("Tenant: {tenant}\n"));
        }
        if let Some(site) = &alert.site_id {
            body.push_str(&format!("Site: {site}\n"));
        }
        if let Some(agent) = &alert.agent_id {
            body.push_str(&format!("Agent: {agent}\n"));
        }
        if let Some(device) = &alert.device_id {
            body.push_str(&format!("Device: {device}\n"));
        }
        body.push('\n');
        body.push_str(&alert.message);
        body.push('\n');

        Self { subject, body }
    }
}
