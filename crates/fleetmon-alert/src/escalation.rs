//! Timed escalation of active alerts.
//!
//! Each tick walks the active alerts and advances any whose policy has a
//! fire due. All progress lives in the persisted `escalation_level` and
//! `last_escalated_at` fields: a restarted scheduler recomputes what has
//! already fired and never re-sends a recorded step. The fire is recorded
//! before dispatch, so delivery is at-most-once per step.

use crate::error::Result;
use crate::lifecycle::AlertLifecycleManager;
use chrono::{DateTime, Duration, Utc};
use fleetmon_common::types::{Alert, AlertFilter, AlertStatus};
use fleetmon_notify::dispatcher::NotificationDispatcher;
use fleetmon_notify::NotifyEvent;
use fleetmon_store::AlertStore;
use std::sync::Arc;

const DEFAULT_TICK_SECS: u64 = 60;

pub struct EscalationScheduler {
    store: Arc<dyn AlertStore>,
    lifecycle: Arc<AlertLifecycleManager>,
    dispatcher: Arc<NotificationDispatcher>,
    tick_secs: u64,
}

impl EscalationScheduler {
    pub fn new(
        store: Arc<dyn AlertStore>,
        lifecycle: Arc<AlertLifecycleManager>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            lifecycle,
            dispatcher,
            tick_secs: DEFAULT_TICK_SECS,
        }
    }

    pub fn with_tick_secs(mut self, tick_secs: u64) -> Self {
        self.tick_secs = tick_secs.max(1);
        self
    }

    /// Runs the scheduler loop until the task is dropped.
    pub async fn run(&self) {
        tracing::info!(tick_secs = self.tick_secs, "Escalation scheduler started");
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(self.tick_secs));
        loop {
            tick.tick().await;
            if let Err(e) = self.tick_at(Utc::now()).await {
                tracing::error!(error = %e, "Escalation tick failed");
            }
        }
    }

    /// One scheduler pass at an explicit instant: time-driven housekeeping
    /// (expiry, suppression release) followed by escalation advancement.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<()> {
        self.lifecycle.expire_due(now).await?;
        self.lifecycle.release_due_suppressions(now).await?;

        let active = self
            .store
            .list_open_alerts(&AlertFilter {
                status: Some(AlertStatus::Active),
                ..Default::default()
            })
            .await?;

        for alert in active {
            if let Err(e) = self.advance_alert(&alert, now).await {
                // A single alert's failure never stalls the rest of the pass.
                tracing::error!(alert_id = %alert.id, error = %e, "Escalation advance failed");
            }
        }
        Ok(())
    }

    /// Advances one alert by at most one fire per tick. Catch-up after
    /// downtime happens across successive ticks rather than in a burst.
    async fn advance_alert(&self, alert: &Alert, now: DateTime<Utc>) -> Result<()> {
        if alert.is_flapping {
            tracing::debug!(alert_id = %alert.id, "Escalation skipped (flapping)");
            return Ok(());
        }
        if alert.parent_alert_id.is_some() {
            // Grouped children escalate through their parent.
            return Ok(());
        }

        let Some(rule_id) = &alert.rule_id else {
            return Ok(());
        };
        let Some(rule) = self.store.get_rule(rule_id).await? else {
            tracing::debug!(alert_id = %alert.id, rule_id, "Rule no longer exists");
            return Ok(());
        };
        let Some(policy_id) = &rule.escalation_policy_id else {
            return Ok(());
        };
        let Some(policy) = self.store.get_policy(policy_id).await? else {
            tracing::warn!(alert_id = %alert.id, policy_id, "Escalation policy not found");
            return Ok(());
        };
        if !policy.enabled {
            return Ok(());
        }

        let plan = policy.fire_plan();
        let level = alert.escalation_level as usize;
        let Some(fire) = plan.get(level) else {
            return Ok(()); // fully escalated
        };

        let due = alert.triggered_at + Duration::minutes(fire.offset_minutes as i64);
        if now < due {
            return Ok(());
        }

        // Persist first: a crash between record and dispatch drops one
        // notification rather than duplicating it after restart.
        self.store
            .record_escalation(&alert.id, (level + 1) as u32, now)
            .await?;

        let step = &policy.steps[fire.step_index];
        tracing::info!(
            alert_id = %alert.id,
            level = level + 1,
            step = fire.step_index,
            policy = %policy.name,
            "Alert escalated"
        );

        let refreshed = self
            .store
            .get_alert(&alert.id)
            .await?
            .unwrap_or_else(|| alert.clone());
        if let Err(e) = self
            .dispatcher
            .dispatch_at(
                &refreshed,
                NotifyEvent::Escalated {
                    step: fire.step_index,
                },
                &step.channel_ids,
                now,
            )
            .await
        {
            tracing::error!(alert_id = %alert.id, error = %e, "Escalation notification failed");
        }
        Ok(())
    }
}
