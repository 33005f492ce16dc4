//! In-memory reference implementation of [`AlertStore`].
//!
//! All state lives behind a single mutex, so every trait method is one
//! short critical section: `create_or_get_active` and `try_reserve_send`
//! get their atomicity guarantees from the lock itself rather than from a
//! unique constraint. This is the backend used by the engine's tests and
//! by embedded single-process deployments.

use crate::error::{Result, StoreError};
use crate::AlertStore;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use fleetmon_common::id;
use fleetmon_common::quiet;
use fleetmon_common::types::{
    Alert, AlertFilter, AlertHistoryEntry, AlertRule, AlertSettings, AlertStatus, AlertSummary,
    DedupKey, EscalationPolicy, MaintenanceWindow, NewAlert, NotificationChannel,
};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    alerts: HashMap<String, Alert>,
    /// Open (pre-terminal) alert per de-duplication key.
    open_by_key: HashMap<DedupKey, String>,
    history: Vec<AlertHistoryEntry>,
    rules: HashMap<String, AlertRule>,
    policies: HashMap<String, EscalationPolicy>,
    channels: HashMap<String, NotificationChannel>,
    windows: HashMap<String, MaintenanceWindow>,
    settings: Option<AlertSettings>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Transitions the alert state machine allows. Terminal states admit none.
fn transition_allowed(from: AlertStatus, to: AlertStatus) -> bool {
    use AlertStatus::*;
    matches!(
        (from, to),
        (Active, Acknowledged)
            | (Active, Resolved)
            | (Active, Suppressed)
            | (Active, Expired)
            | (Acknowledged, Resolved)
            | (Acknowledged, Suppressed)
            | (Acknowledged, Expired)
            | (Suppressed, Active)
            | (Suppressed, Resolved)
            | (Suppressed, Expired)
    )
}

fn action_for(old: AlertStatus, new: AlertStatus) -> &'static str {
    match (old, new) {
        (AlertStatus::Suppressed, AlertStatus::Active) => "reactivated",
        (_, AlertStatus::Acknowledged) => "acknowledged",
        (_, AlertStatus::Resolved) => "resolved",
        (_, AlertStatus::Suppressed) => "suppressed",
        (_, AlertStatus::Expired) => "expired",
        _ => "updated",
    }
}

fn assign_id(existing: String) -> String {
    if existing.is_empty() {
        id::next_id()
    } else {
        existing
    }
}

impl Inner {
    fn push_history(
        &mut self,
        alert_id: &str,
        action: &str,
        old: Option<AlertStatus>,
        new: Option<AlertStatus>,
        actor: Option<&str>,
        details: Option<&str>,
        at: DateTime<Utc>,
    ) {
        self.history.push(AlertHistoryEntry {
            id: id::next_id(),
            alert_id: alert_id.to_string(),
            action: action.to_string(),
            old_status: old,
            new_status: new,
            actor: actor.map(str::to_string),
            details: details.map(str::to_string),
            timestamp: at,
        });
    }

    fn filtered_alerts(&self, filter: &AlertFilter, pred: impl Fn(&Alert) -> bool) -> Vec<Alert> {
        let mut out: Vec<Alert> = self
            .alerts
            .values()
            .filter(|a| pred(a) && filter.matches(a))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));
        let offset = filter.offset.unwrap_or(0);
        let out: Vec<Alert> = out.into_iter().skip(offset).collect();
        match filter.limit {
            Some(limit) => out.into_iter().take(limit).collect(),
            None => out,
        }
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn create_or_get_active(
        &self,
        new: NewAlert,
        initial_status: AlertStatus,
        suppressed_until: Option<DateTime<Utc>>,
    ) -> Result<(Alert, bool)> {
        if initial_status.is_terminal() {
            return Err(StoreError::Validation(
                "alerts cannot be created in a terminal status".into(),
            ));
        }
        if initial_status == AlertStatus::Suppressed && suppressed_until.is_none() {
            return Err(StoreError::Validation(
                "suppressed creation requires suppressed_until".into(),
            ));
        }

        let key = new.dedup_key();
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap();

        if let Some(existing_id) = inner.open_by_key.get(&key).cloned() {
            let alert = inner
                .alerts
                .get_mut(&existing_id)
                .expect("open_by_key points at a stored alert");
            alert.repeat_count += 1;
            alert.updated_at = now;
            return Ok((alert.clone(), false));
        }

        let alert = Alert {
            id: id::next_id(),
            rule_id: new.rule_id,
            alert_type: new.alert_type,
            severity: new.severity,
            scope: new.scope,
            status: initial_status,
            tenant_id: new.tenant_id,
            site_id: new.site_id,
            agent_id: new.agent_id,
            device_id: new.device_id,
            title: new.title,
            message: new.message,
            details: new.details,
            triggered_at: now,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            suppressed_until: if initial_status == AlertStatus::Suppressed {
                suppressed_until
            } else {
                None
            },
            expires_at: new.expires_at,
            escalation_level: 0,
            last_escalated_at: None,
            state_change_count: 0,
            is_flapping: false,
            parent_alert_id: None,
            child_count: 0,
            repeat_count: 0,
            notifications_sent: 0,
            last_notified_at: None,
            created_at: now,
            updated_at: now,
        };

        inner.open_by_key.insert(key, alert.id.clone());
        inner.push_history(
            &alert.id,
            "created",
            None,
            Some(initial_status),
            None,
            None,
            now,
        );
        inner.alerts.insert(alert.id.clone(), alert.clone());
        Ok((alert, true))
    }

    async fn get_alert(&self, id: &str) -> Result<Option<Alert>> {
        Ok(self.inner.lock().unwrap().alerts.get(id).cloned())
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        Ok(self.inner.lock().unwrap().filtered_alerts(filter, |_| true))
    }

    async fn list_open_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .filtered_alerts(filter, |a| !a.status.is_terminal()))
    }

    async fn list_alert_history(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .filtered_alerts(filter, |a| a.status != AlertStatus::Active))
    }

    async fn update_status(
        &self,
        id: &str,
        new_status: AlertStatus,
        actor: Option<&str>,
        details: Option<&str>,
        suppressed_until: Option<DateTime<Utc>>,
    ) -> Result<Alert> {
        if new_status == AlertStatus::Suppressed && suppressed_until.is_none() {
            return Err(StoreError::Validation(
                "suppression requires suppressed_until".into(),
            ));
        }

        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap();
        let old_status = match inner.alerts.get(id) {
            Some(a) => a.status,
            None => {
                return Err(StoreError::NotFound {
                    entity: "alert",
                    id: id.to_string(),
                })
            }
        };
        if !transition_allowed(old_status, new_status) {
            return Err(StoreError::InvalidTransition {
                from: old_status,
                to: new_status,
            });
        }

        let key = {
            let alert = inner.alerts.get_mut(id).unwrap();
            alert.status = new_status;
            alert.state_change_count += 1;
            alert.updated_at = now;
            match new_status {
                AlertStatus::Acknowledged => {
                    alert.acknowledged_at = Some(now);
                    alert.acknowledged_by = actor.map(str::to_string);
                }
                AlertStatus::Resolved => {
                    alert.resolved_at = Some(now);
                    alert.suppressed_until = None;
                }
                AlertStatus::Suppressed => {
                    alert.suppressed_until = suppressed_until;
                }
                AlertStatus::Active | AlertStatus::Expired => {
                    alert.suppressed_until = None;
                }
            }
            alert.dedup_key()
        };

        if new_status.is_terminal() {
            inner.open_by_key.remove(&key);
        }
        inner.push_history(
            id,
            action_for(old_status, new_status),
            Some(old_status),
            Some(new_status),
            actor,
            details,
            now,
        );
        Ok(inner.alerts.get(id).unwrap().clone())
    }

    async fn set_flapping(&self, id: &str, flapping: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let alert = inner.alerts.get_mut(id).ok_or_else(|| StoreError::NotFound {
            entity: "alert",
            id: id.to_string(),
        })?;
        alert.is_flapping = flapping;
        alert.updated_at = Utc::now();
        Ok(())
    }

    async fn record_escalation(&self, id: &str, level: u32, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let alert = inner.alerts.get_mut(id).ok_or_else(|| StoreError::NotFound {
            entity: "alert",
            id: id.to_string(),
        })?;
        // escalation_level is non-decreasing while the alert is open
        if level < alert.escalation_level {
            return Err(StoreError::Validation(format!(
                "escalation level may not decrease ({} -> {})",
                alert.escalation_level, level
            )));
        }
        alert.escalation_level = level;
        alert.last_escalated_at = Some(at);
        alert.updated_at = Utc::now();
        Ok(())
    }

    async fn update_notification_status(
        &self,
        id: &str,
        sent: u32,
        last_notified: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let alert = inner.alerts.get_mut(id).ok_or_else(|| StoreError::NotFound {
            entity: "alert",
            id: id.to_string(),
        })?;
        alert.notifications_sent = sent;
        alert.last_notified_at = Some(last_notified);
        alert.updated_at = Utc::now();
        Ok(())
    }

    async fn attach_to_parent(&self, child_id: &str, parent_id: &str) -> Result<()> {
        if child_id == parent_id {
            return Err(StoreError::Validation(
                "an alert cannot be its own parent".into(),
            ));
        }
        let mut inner = self.inner.lock().unwrap();
        if !inner.alerts.contains_key(child_id) {
            return Err(StoreError::NotFound {
                entity: "alert",
                id: child_id.to_string(),
            });
        }
        match inner.alerts.get(parent_id) {
            None => {
                return Err(StoreError::NotFound {
                    entity: "alert",
                    id: parent_id.to_string(),
                })
            }
            // A child may not become a parent; the grouping tree is one level.
            Some(p) if p.parent_alert_id.is_some() => {
                return Err(StoreError::Validation(
                    "parent alert is itself a group member".into(),
                ));
            }
            Some(_) => {}
        }
        let now = Utc::now();
        let child = inner.alerts.get_mut(child_id).unwrap();
        child.parent_alert_id = Some(parent_id.to_string());
        child.updated_at = now;
        let parent = inner.alerts.get_mut(parent_id).unwrap();
        parent.child_count += 1;
        parent.updated_at = now;
        Ok(())
    }

    async fn count_history_since(&self, alert_id: &str, since: DateTime<Utc>) -> Result<u32> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .history
            .iter()
            .filter(|e| {
                e.alert_id == alert_id && e.timestamp >= since && e.old_status.is_some()
            })
            .count() as u32)
    }

    async fn list_history_entries(&self, alert_id: &str) -> Result<Vec<AlertHistoryEntry>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .history
            .iter()
            .filter(|e| e.alert_id == alert_id)
            .cloned()
            .collect())
    }

    async fn last_closed_for_key(&self, key: &DedupKey) -> Result<Option<Alert>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .alerts
            .values()
            .filter(|a| a.status.is_terminal() && &a.dedup_key() == key)
            .max_by_key(|a| a.resolved_at.unwrap_or(a.updated_at))
            .cloned())
    }

    async fn compute_summary(&self, now: DateTime<Utc>) -> Result<AlertSummary> {
        let inner = self.inner.lock().unwrap();
        let mut summary = AlertSummary::default();
        let today = now.date_naive();

        for alert in inner.alerts.values() {
            if alert.status == AlertStatus::Resolved
                && alert.resolved_at.is_some_and(|t| t.date_naive() == today)
            {
                summary.resolved_today_count += 1;
            }
            if alert.status.is_terminal() {
                continue;
            }
            match alert.status {
                AlertStatus::Active => summary.active_count += 1,
                AlertStatus::Acknowledged => summary.acknowledged_count += 1,
                AlertStatus::Suppressed => summary.suppressed_count += 1,
                _ => {}
            }
            match alert.severity {
                fleetmon_common::types::Severity::Critical => summary.critical_count += 1,
                fleetmon_common::types::Severity::Warning => summary.warning_count += 1,
                fleetmon_common::types::Severity::Info => summary.info_count += 1,
            }
            *summary
                .alerts_by_type
                .entry(alert.alert_type.to_string())
                .or_insert(0) += 1;
            *summary
                .alerts_by_scope
                .entry(alert.scope.to_string())
                .or_insert(0) += 1;
        }

        let settings = inner.settings.clone().unwrap_or_default();
        summary.is_quiet_hours = quiet::is_quiet_at(&settings.quiet_hours, now);
        summary.has_maintenance = inner.windows.values().any(|w| w.is_active_at(now));
        Ok(summary)
    }

    // ---- Rules ----

    async fn create_rule(&self, mut rule: AlertRule) -> Result<AlertRule> {
        if rule.name.trim().is_empty() {
            return Err(StoreError::Validation("rule name is required".into()));
        }
        if rule.threshold.is_some() != rule.threshold_unit.is_some() {
            return Err(StoreError::Validation(
                "threshold and threshold_unit must be set together".into(),
            ));
        }
        let now = Utc::now();
        rule.id = assign_id(rule.id);
        rule.created_at = now;
        rule.updated_at = now;
        let mut inner = self.inner.lock().unwrap();
        inner.rules.insert(rule.id.clone(), rule.clone());
        Ok(rule)
    }

    async fn get_rule(&self, id: &str) -> Result<Option<AlertRule>> {
        Ok(self.inner.lock().unwrap().rules.get(id).cloned())
    }

    async fn list_rules(&self) -> Result<Vec<AlertRule>> {
        let inner = self.inner.lock().unwrap();
        let mut rules: Vec<AlertRule> = inner.rules.values().cloned().collect();
        rules.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rules)
    }

    async fn list_enabled_rules(&self) -> Result<Vec<AlertRule>> {
        Ok(self
            .list_rules()
            .await?
            .into_iter()
            .filter(|r| r.enabled)
            .collect())
    }

    async fn update_rule(&self, mut rule: AlertRule) -> Result<AlertRule> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.rules.contains_key(&rule.id) {
            return Err(StoreError::NotFound {
                entity: "alert_rule",
                id: rule.id,
            });
        }
        rule.updated_at = Utc::now();
        inner.rules.insert(rule.id.clone(), rule.clone());
        Ok(rule)
    }

    async fn delete_rule(&self, id: &str) -> Result<bool> {
        Ok(self.inner.lock().unwrap().rules.remove(id).is_some())
    }

    // ---- Escalation policies ----

    async fn create_policy(&self, mut policy: EscalationPolicy) -> Result<EscalationPolicy> {
        if policy.steps.is_empty() {
            return Err(StoreError::Validation(
                "escalation policy requires at least one step".into(),
            ));
        }
        let now = Utc::now();
        policy.id = assign_id(policy.id);
        policy.created_at = now;
        policy.updated_at = now;
        let mut inner = self.inner.lock().unwrap();
        inner.policies.insert(policy.id.clone(), policy.clone());
        Ok(policy)
    }

    async fn get_policy(&self, id: &str) -> Result<Option<EscalationPolicy>> {
        Ok(self.inner.lock().unwrap().policies.get(id).cloned())
    }

    async fn list_policies(&self) -> Result<Vec<EscalationPolicy>> {
        let inner = self.inner.lock().unwrap();
        let mut policies: Vec<EscalationPolicy> = inner.policies.values().cloned().collect();
        policies.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(policies)
    }

    async fn update_policy(&self, mut policy: EscalationPolicy) -> Result<EscalationPolicy> {
        if policy.steps.is_empty() {
            return Err(StoreError::Validation(
                "escalation policy requires at least one step".into(),
            ));
        }
        let mut inner = self.inner.lock().unwrap();
        if !inner.policies.contains_key(&policy.id) {
            return Err(StoreError::NotFound {
                entity: "escalation_policy",
                id: policy.id,
            });
        }
        policy.updated_at = Utc::now();
        inner.policies.insert(policy.id.clone(), policy.clone());
        Ok(policy)
    }

    async fn delete_policy(&self, id: &str) -> Result<bool> {
        Ok(self.inner.lock().unwrap().policies.remove(id).is_some())
    }

    // ---- Notification channels ----

    async fn create_channel(&self, mut channel: NotificationChannel) -> Result<NotificationChannel> {
        if channel.name.trim().is_empty() {
            return Err(StoreError::Validation("channel name is required".into()));
        }
        let now = Utc::now();
        channel.id = assign_id(channel.id);
        channel.created_at = now;
        channel.updated_at = now;
        let mut inner = self.inner.lock().unwrap();
        inner.channels.insert(channel.id.clone(), channel.clone());
        Ok(channel)
    }

    async fn get_channel(&self, id: &str) -> Result<Option<NotificationChannel>> {
        Ok(self.inner.lock().unwrap().channels.get(id).cloned())
    }

    async fn list_channels(&self) -> Result<Vec<NotificationChannel>> {
        let inner = self.inner.lock().unwrap();
        let mut channels: Vec<NotificationChannel> = inner.channels.values().cloned().collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(channels)
    }

    async fn update_channel(&self, mut channel: NotificationChannel) -> Result<NotificationChannel> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.channels.contains_key(&channel.id) {
            return Err(StoreError::NotFound {
                entity: "notification_channel",
                id: channel.id,
            });
        }
        channel.updated_at = Utc::now();
        inner.channels.insert(channel.id.clone(), channel.clone());
        Ok(channel)
    }

    async fn delete_channel(&self, id: &str) -> Result<bool> {
        Ok(self.inner.lock().unwrap().channels.remove(id).is_some())
    }

    async fn try_reserve_send(&self, channel_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let channel =
            inner
                .channels
                .get_mut(channel_id)
                .ok_or_else(|| StoreError::NotFound {
                    entity: "notification_channel",
                    id: channel_id.to_string(),
                })?;

        let bucket_expired = match channel.hour_started_at {
            Some(started) => now - started >= Duration::hours(1),
            None => true,
        };
        if bucket_expired {
            channel.sent_this_hour = 0;
            channel.hour_started_at = Some(now);
        }

        if channel.rate_limit_per_hour > 0 && channel.sent_this_hour >= channel.rate_limit_per_hour
        {
            return Ok(false);
        }

        channel.sent_this_hour += 1;
        channel.last_sent_at = Some(now);
        channel.updated_at = now;
        Ok(true)
    }

    // ---- Maintenance windows ----

    async fn create_window(&self, mut window: MaintenanceWindow) -> Result<MaintenanceWindow> {
        if window.name.trim().is_empty() {
            return Err(StoreError::Validation("window name is required".into()));
        }
        if window.end_time <= window.start_time {
            return Err(StoreError::Validation(
                "window end time must be after start time".into(),
            ));
        }
        let now = Utc::now();
        window.id = assign_id(window.id);
        window.created_at = now;
        window.updated_at = now;
        let mut inner = self.inner.lock().unwrap();
        inner.windows.insert(window.id.clone(), window.clone());
        Ok(window)
    }

    async fn get_window(&self, id: &str) -> Result<Option<MaintenanceWindow>> {
        Ok(self.inner.lock().unwrap().windows.get(id).cloned())
    }

    async fn list_windows(&self) -> Result<Vec<MaintenanceWindow>> {
        let inner = self.inner.lock().unwrap();
        let mut windows: Vec<MaintenanceWindow> = inner.windows.values().cloned().collect();
        windows.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(windows)
    }

    async fn delete_window(&self, id: &str) -> Result<bool> {
        Ok(self.inner.lock().unwrap().windows.remove(id).is_some())
    }

    async fn list_active_windows(&self, now: DateTime<Utc>) -> Result<Vec<MaintenanceWindow>> {
        let inner = self.inner.lock().unwrap();
        let mut windows: Vec<MaintenanceWindow> = inner
            .windows
            .values()
            .filter(|w| w.is_active_at(now))
            .cloned()
            .collect();
        windows.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(windows)
    }

    // ---- Settings ----

    async fn get_settings(&self) -> Result<AlertSettings> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .settings
            .clone()
            .unwrap_or_default())
    }

    async fn save_settings(&self, mut settings: AlertSettings) -> Result<()> {
        settings.updated_at = Utc::now();
        self.inner.lock().unwrap().settings = Some(settings);
        Ok(())
    }
}
