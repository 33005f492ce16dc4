//! The alert state machine and its bookkeeping.
//!
//! States: active, acknowledged, resolved, suppressed, expired. The store
//! enforces which transitions are legal and keeps the history trail; this
//! manager decides *when* transitions happen and layers de-duplication,
//! maintenance-window suppression, flap damping, and grouping on top.

use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use fleetmon_common::types::{
    Alert, AlertFilter, AlertStatus, DedupKey, MaintenanceWindow, NewAlert, Severity,
};
use fleetmon_store::error::StoreError;
use fleetmon_store::AlertStore;
use std::sync::Arc;

/// What happened when a violation asked for an alert.
#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    /// A new active alert was created.
    Created(Alert),
    /// A maintenance window matched; the alert was created suppressed.
    SuppressedByWindow(Alert),
    /// An open alert already existed for the key; its repeat counter was
    /// incremented and nothing else changed.
    Deduplicated(Alert),
}

pub struct AlertLifecycleManager {
    store: Arc<dyn AlertStore>,
}

impl AlertLifecycleManager {
    pub fn new(store: Arc<dyn AlertStore>) -> Self {
        Self { store }
    }

    /// Creates (or de-duplicates) an alert for a sustained violation.
    ///
    /// Active maintenance windows are consulted first: a window covering
    /// the alert's scope, target, and type converts the creation into a
    /// suppressed one ending with the window, unless the alert type always
    /// bypasses maintenance or the window lets critical alerts through.
    pub async fn trigger(&self, new: NewAlert) -> Result<TriggerOutcome> {
        let now = Utc::now();
        let settings = self.store.get_settings().await?;

        let suppressed_until = if new.alert_type.is_critical_bypass() {
            None
        } else {
            self.store
                .list_active_windows(now)
                .await?
                .into_iter()
                .find(|w| {
                    w.covers(&new) && !(w.allow_critical && new.severity == Severity::Critical)
                })
                .map(|w| w.end_time)
        };

        let (alert, created) = match suppressed_until {
            Some(until) => {
                self.store
                    .create_or_get_active(new, AlertStatus::Suppressed, Some(until))
                    .await?
            }
            None => {
                self.store
                    .create_or_get_active(new, AlertStatus::Active, None)
                    .await?
            }
        };

        if !created {
            tracing::debug!(
                alert_id = %alert.id,
                key = %alert.dedup_key(),
                repeat_count = alert.repeat_count,
                "Alert de-duplicated onto existing open alert"
            );
            return Ok(TriggerOutcome::Deduplicated(alert));
        }

        if alert.status == AlertStatus::Suppressed {
            tracing::info!(
                alert_id = %alert.id,
                alert_type = %alert.alert_type,
                until = ?alert.suppressed_until,
                "Alert created suppressed (maintenance window)"
            );
            return Ok(TriggerOutcome::SuppressedByWindow(alert));
        }

        tracing::info!(
            alert_id = %alert.id,
            alert_type = %alert.alert_type,
            severity = %alert.severity,
            key = %alert.dedup_key(),
            "Alert created"
        );

        if settings.grouping_enabled {
            self.maybe_group(&alert, settings.grouping_threshold)
                .await?;
        }

        let alert = self.store.get_alert(&alert.id).await?.unwrap_or(alert);
        Ok(TriggerOutcome::Created(alert))
    }

    /// Operator acknowledgement. Only active alerts can be acknowledged.
    pub async fn acknowledge(&self, id: &str, actor: &str) -> Result<Alert> {
        let alert = self
            .store
            .update_status(id, AlertStatus::Acknowledged, Some(actor), None, None)
            .await?;
        tracing::info!(alert_id = %id, actor, "Alert acknowledged");
        self.flap_check(&alert.id).await?;
        Ok(alert)
    }

    /// Resolution, manual or automatic. Valid from active, acknowledged,
    /// and suppressed states.
    pub async fn resolve(&self, id: &str, actor: Option<&str>) -> Result<Alert> {
        let alert = self
            .store
            .update_status(id, AlertStatus::Resolved, actor, None, None)
            .await?;
        tracing::info!(alert_id = %id, "Alert resolved");
        Ok(alert)
    }

    /// Explicit suppression until a future instant.
    pub async fn suppress(&self, id: &str, until: DateTime<Utc>, actor: Option<&str>) -> Result<Alert> {
        if until <= Utc::now() {
            return Err(StoreError::Validation(
                "suppressed_until must be in the future".into(),
            )
            .into());
        }
        let alert = self
            .store
            .update_status(id, AlertStatus::Suppressed, actor, None, Some(until))
            .await?;
        tracing::info!(alert_id = %id, until = %until, "Alert suppressed");
        self.flap_check(&alert.id).await?;
        Ok(alert)
    }

    /// Expires every open alert whose `expires_at` has passed. Returns the
    /// number expired; individual failures are logged and skipped.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Result<u32> {
        let open = self.store.list_open_alerts(&AlertFilter::default()).await?;
        let mut expired = 0;
        for alert in open {
            if !alert.expires_at.is_some_and(|t| t <= now) {
                continue;
            }
            match self
                .store
                .update_status(&alert.id, AlertStatus::Expired, None, None, None)
                .await
            {
                Ok(_) => {
                    tracing::info!(alert_id = %alert.id, "Alert expired");
                    expired += 1;
                }
                Err(e) => {
                    tracing::error!(alert_id = %alert.id, error = %e, "Failed to expire alert");
                }
            }
        }
        Ok(expired)
    }

    /// Reactivates suppressed alerts whose window has elapsed. The
    /// violation is assumed still present; if it cleared in the meantime
    /// the next evaluation pass resolves the reactivated alert.
    pub async fn release_due_suppressions(&self, now: DateTime<Utc>) -> Result<Vec<Alert>> {
        let suppressed = self
            .store
            .list_open_alerts(&AlertFilter {
                status: Some(AlertStatus::Suppressed),
                ..Default::default()
            })
            .await?;

        let mut released = Vec::new();
        for alert in suppressed {
            if !alert.suppressed_until.is_some_and(|t| t <= now) {
                continue;
            }
            match self
                .store
                .update_status(&alert.id, AlertStatus::Active, None, None, None)
                .await
            {
                Ok(reactivated) => {
                    tracing::info!(alert_id = %reactivated.id, "Suppression elapsed, alert reactivated");
                    self.flap_check(&reactivated.id).await?;
                    released.push(reactivated);
                }
                Err(e) => {
                    tracing::error!(alert_id = %alert.id, error = %e, "Failed to reactivate alert");
                }
            }
        }
        Ok(released)
    }

    /// Auto-resolves the open alert for a de-duplication key whose
    /// violation has cleared, whatever pre-terminal state it is in.
    pub async fn resolve_cleared(&self, key: &DedupKey) -> Result<Option<Alert>> {
        let filter = AlertFilter {
            alert_type: Some(key.alert_type),
            scope: Some(key.scope),
            tenant_id: key.tenant_id.clone(),
            site_id: key.site_id.clone(),
            agent_id: key.agent_id.clone(),
            device_id: key.device_id.clone(),
            ..Default::default()
        };
        let open = self.store.list_open_alerts(&filter).await?;
        let Some(alert) = open.into_iter().find(|a| &a.dedup_key() == key) else {
            return Ok(None);
        };

        let resolved = self
            .store
            .update_status(
                &alert.id,
                AlertStatus::Resolved,
                None,
                Some("violation cleared"),
                None,
            )
            .await?;
        tracing::info!(alert_id = %resolved.id, key = %key, "Alert auto-resolved");
        Ok(Some(resolved))
    }

    /// One-shot retroactive sweep when a maintenance window is created:
    /// open alerts the window covers are suppressed until it ends.
    pub async fn apply_window(&self, window: &MaintenanceWindow) -> Result<u32> {
        let open = self.store.list_open_alerts(&AlertFilter::default()).await?;
        let mut suppressed = 0;
        for alert in open {
            if alert.status == AlertStatus::Suppressed {
                continue;
            }
            if alert.alert_type.is_critical_bypass() {
                continue;
            }
            if window.allow_critical && alert.severity == Severity::Critical {
                continue;
            }
            if !window.covers_alert(&alert) {
                continue;
            }
            match self
                .store
                .update_status(
                    &alert.id,
                    AlertStatus::Suppressed,
                    None,
                    Some("maintenance window"),
                    Some(window.end_time),
                )
                .await
            {
                Ok(_) => suppressed += 1,
                Err(e) => {
                    tracing::error!(alert_id = %alert.id, error = %e, "Failed to suppress alert for window");
                }
            }
        }
        if suppressed > 0 {
            tracing::info!(window = %window.name, count = suppressed, "Maintenance window suppressed open alerts");
        }
        Ok(suppressed)
    }

    /// Re-evaluates the flap flag from the persisted transition history.
    /// A flapping alert stays visible but is skipped by escalation and
    /// dispatch until it quiesces.
    pub async fn flap_check(&self, alert_id: &str) -> Result<()> {
        let settings = self.store.get_settings().await?;
        if !settings.flapping_enabled {
            return Ok(());
        }
        let Some(alert) = self.store.get_alert(alert_id).await? else {
            return Ok(());
        };
        if alert.status.is_terminal() {
            return Ok(());
        }

        let since = Utc::now() - Duration::minutes(settings.flapping_window_mins as i64);
        let transitions = self.store.count_history_since(alert_id, since).await?;

        if transitions > settings.flapping_threshold && !alert.is_flapping {
            self.store.set_flapping(alert_id, true).await?;
            tracing::warn!(
                alert_id,
                transitions,
                threshold = settings.flapping_threshold,
                "Alert is flapping; escalation and notification damped"
            );
        } else if alert.is_flapping && transitions <= settings.flapping_threshold {
            self.store.set_flapping(alert_id, false).await?;
            tracing::info!(alert_id, "Alert quiesced; flap damping lifted");
        }
        Ok(())
    }

    /// Groups same-type, same-scope alert storms under a synthetic parent.
    ///
    /// The parent is an alert with the shared type and scope but no target
    /// identifiers, so its de-duplication key is stable and get-or-create
    /// reuses it. Children keep their own lifecycle but are skipped by
    /// escalation and dispatch in favor of the parent.
    async fn maybe_group(&self, alert: &Alert, threshold: u32) -> Result<()> {
        let has_target = alert.tenant_id.is_some()
            || alert.site_id.is_some()
            || alert.agent_id.is_some()
            || alert.device_id.is_some();
        if !has_target {
            // The synthetic parent itself.
            return Ok(());
        }

        let peers = self
            .store
            .list_open_alerts(&AlertFilter {
                alert_type: Some(alert.alert_type),
                scope: Some(alert.scope),
                ..Default::default()
            })
            .await?;

        let members: Vec<&Alert> = peers
            .iter()
            .filter(|a| {
                a.tenant_id.is_some()
                    || a.site_id.is_some()
                    || a.agent_id.is_some()
                    || a.device_id.is_some()
            })
            .collect();
        if (members.len() as u32) <= threshold {
            return Ok(());
        }

        let (parent, created) = self
            .store
            .create_or_get_active(
                NewAlert {
                    rule_id: None,
                    alert_type: alert.alert_type,
                    severity: alert.severity,
                    scope: alert.scope,
                    tenant_id: None,
                    site_id: None,
                    agent_id: None,
                    device_id: None,
                    title: format!("Multiple {} alerts", alert.alert_type),
                    message: format!(
                        "{} {} alerts are currently active",
                        members.len(),
                        alert.alert_type
                    ),
                    details: None,
                    expires_at: None,
                },
                AlertStatus::Active,
                None,
            )
            .await?;
        if created {
            tracing::info!(
                parent_id = %parent.id,
                alert_type = %alert.alert_type,
                members = members.len(),
                "Created synthetic group parent"
            );
        }

        for member in members {
            if member.parent_alert_id.is_some() || member.id == parent.id {
                continue;
            }
            if let Err(e) = self.store.attach_to_parent(&member.id, &parent.id).await {
                tracing::error!(
                    child_id = %member.id,
                    parent_id = %parent.id,
                    error = %e,
                    "Failed to attach alert to group parent"
                );
            }
        }
        Ok(())
    }
}
