//! Rule evaluation over incoming fact updates.
//!
//! A fact update is one observation about a target (device, agent, site,
//! tenant): metric readings plus boolean condition flags. Each enabled
//! rule whose scope and allow-lists match the fact is checked for a
//! violation; sustained-duration, cooldown, and the hourly alert cap are
//! applied before the lifecycle manager is asked to create an alert, and
//! a cleared violation asks it to auto-resolve the key's open alert.

use crate::error::{AlertError, Result};
use crate::lifecycle::{AlertLifecycleManager, TriggerOutcome};
use chrono::{DateTime, Duration, Utc};
use fleetmon_common::types::{
    AlertFilter, AlertRule, AlertScope, AlertSettings, AlertType, DedupKey, NewAlert,
    ThresholdUnit,
};
use fleetmon_notify::dispatcher::NotificationDispatcher;
use fleetmon_notify::NotifyEvent;
use fleetmon_store::AlertStore;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// One observation about a target, produced by the polling pipeline.
#[derive(Debug, Clone, Default)]
pub struct FactUpdate {
    pub tenant_id: Option<String>,
    pub site_id: Option<String>,
    pub agent_id: Option<String>,
    pub device_id: Option<String>,
    pub observed_at: DateTime<Utc>,
    /// Numeric readings, e.g. `"supply.black" -> 3.0`, `"pages_today" -> 1400.0`.
    pub metrics: HashMap<String, f64>,
    /// Boolean condition flags, e.g. `"offline"`, `"paper_jam"`, `"error"`.
    pub conditions: HashSet<String>,
}

impl FactUpdate {
    /// Best available display name for messages.
    pub fn display_name(&self) -> &str {
        self.device_id
            .as_deref()
            .or(self.agent_id.as_deref())
            .or(self.site_id.as_deref())
            .or(self.tenant_id.as_deref())
            .unwrap_or("fleet")
    }

    fn has_target_for(&self, scope: AlertScope) -> bool {
        match scope {
            AlertScope::Fleet => true,
            AlertScope::Tenant => self.tenant_id.is_some(),
            AlertScope::Site => self.site_id.is_some(),
            AlertScope::Agent => self.agent_id.is_some(),
            AlertScope::Device => self.device_id.is_some(),
        }
    }
}

struct Violation {
    title: String,
    message: String,
}

/// Matches fact updates against enabled rules and drives alert creation
/// and auto-resolution through the lifecycle manager.
pub struct RuleEvaluator {
    store: Arc<dyn AlertStore>,
    lifecycle: Arc<AlertLifecycleManager>,
    dispatcher: Arc<NotificationDispatcher>,
    /// First continuously-violating instant per de-duplication key, for
    /// the sustained-duration check. Advisory only: losing it on restart
    /// delays a fire by at most one sustain window, it never double-fires.
    pending: Mutex<HashMap<DedupKey, DateTime<Utc>>>,
}

impl RuleEvaluator {
    pub fn new(
        store: Arc<dyn AlertStore>,
        lifecycle: Arc<AlertLifecycleManager>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            lifecycle,
            dispatcher,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluates a batch of facts at the current instant.
    pub async fn tick(&self, facts: &[FactUpdate]) -> Result<()> {
        self.tick_at(facts, Utc::now()).await
    }

    /// Evaluates a batch of facts at an explicit instant.
    pub async fn tick_at(&self, facts: &[FactUpdate], now: DateTime<Utc>) -> Result<()> {
        let settings = self.store.get_settings().await?;
        if !settings.enabled {
            return Ok(());
        }

        let rules = self.store.list_enabled_rules().await?;
        if rules.is_empty() {
            return Ok(());
        }

        for fact in facts {
            for rule in &rules {
                if let Err(e) = self.evaluate_rule(rule, fact, &settings, now).await {
                    // One broken rule never stops the rest of the pass.
                    tracing::error!(
                        rule_id = %rule.id,
                        rule = %rule.name,
                        error = %e,
                        "Rule evaluation failed, skipping"
                    );
                }
            }
        }
        Ok(())
    }

    async fn evaluate_rule(
        &self,
        rule: &AlertRule,
        fact: &FactUpdate,
        settings: &AlertSettings,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !fact.has_target_for(rule.scope) {
            return Ok(());
        }
        if !rule.matches_target(
            fact.tenant_id.as_deref(),
            fact.site_id.as_deref(),
            fact.agent_id.as_deref(),
        ) {
            return Ok(());
        }

        let key = DedupKey {
            alert_type: rule.alert_type,
            scope: rule.scope,
            tenant_id: fact.tenant_id.clone(),
            site_id: fact.site_id.clone(),
            agent_id: fact.agent_id.clone(),
            device_id: fact.device_id.clone(),
        };

        match check_violation(rule, fact)? {
            Some(violation) => {
                self.handle_violation(rule, fact, key, violation, settings, now)
                    .await
            }
            None => self.handle_clear(rule, key).await,
        }
    }

    async fn handle_violation(
        &self,
        rule: &AlertRule,
        fact: &FactUpdate,
        key: DedupKey,
        violation: Violation,
        settings: &AlertSettings,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let first_seen = {
            let mut pending = self.pending.lock().unwrap();
            *pending.entry(key.clone()).or_insert(now)
        };
        if now - first_seen < Duration::minutes(rule.duration_minutes as i64) {
            return Ok(()); // not yet sustained
        }

        // Cooldown: the key must not have closed too recently.
        let cooldown_mins = if rule.cooldown_minutes > 0 {
            rule.cooldown_minutes
        } else {
            settings.default_cooldown_mins
        };
        if cooldown_mins > 0 {
            if let Some(closed) = self.store.last_closed_for_key(&key).await? {
                let closed_at = closed.resolved_at.unwrap_or(closed.updated_at);
                if now - closed_at < Duration::minutes(cooldown_mins as i64) {
                    tracing::debug!(key = %key, "Alert creation skipped (cooldown)");
                    return Ok(());
                }
            }
        }

        // Global hourly cap on alert creation.
        if settings.max_alerts_per_hour > 0 {
            let recent = self
                .store
                .list_alerts(&AlertFilter {
                    start: Some(now - Duration::hours(1)),
                    ..Default::default()
                })
                .await?;
            if recent.len() as u32 >= settings.max_alerts_per_hour {
                tracing::warn!(
                    cap = settings.max_alerts_per_hour,
                    "Hourly alert cap reached, suppressing new alert creation"
                );
                return Ok(());
            }
        }

        let new = NewAlert {
            rule_id: Some(rule.id.clone()),
            alert_type: rule.alert_type,
            severity: rule.severity,
            scope: rule.scope,
            tenant_id: fact.tenant_id.clone(),
            site_id: fact.site_id.clone(),
            agent_id: fact.agent_id.clone(),
            device_id: fact.device_id.clone(),
            title: violation.title,
            message: violation.message,
            details: None,
            expires_at: None,
        };

        if let TriggerOutcome::Created(alert) = self.lifecycle.trigger(new).await? {
            // Trigger notifications go to the rule's own channel set;
            // escalation policies fire through the scheduler.
            if let Err(e) = self
                .dispatcher
                .dispatch_at(&alert, NotifyEvent::Triggered, &rule.channel_ids, now)
                .await
            {
                tracing::error!(alert_id = %alert.id, error = %e, "Trigger notification failed");
            }
        }
        Ok(())
    }

    async fn handle_clear(&self, rule: &AlertRule, key: DedupKey) -> Result<()> {
        self.pending.lock().unwrap().remove(&key);
        if let Some(resolved) = self.lifecycle.resolve_cleared(&key).await? {
            if let Err(e) = self
                .dispatcher
                .dispatch(&resolved, NotifyEvent::Resolved, &rule.channel_ids)
                .await
            {
                tracing::error!(alert_id = %resolved.id, error = %e, "Resolve notification failed");
            }
        }
        Ok(())
    }

    /// Runs the evaluator on a fixed interval, pulling facts from the
    /// given source on every tick. The polling pipeline that produces the
    /// facts is outside this crate.
    pub async fn run<F, Fut>(&self, interval_secs: u64, fact_source: F)
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Vec<FactUpdate>>,
    {
        tracing::info!(interval_secs, "Rule evaluator started");
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        loop {
            tick.tick().await;
            let facts = fact_source().await;
            if let Err(e) = self.tick(&facts).await {
                tracing::error!(error = %e, "Evaluation pass failed");
            }
        }
    }
}

/// Default thresholds applied when a rule leaves the field unset.
fn default_threshold(alert_type: AlertType) -> f64 {
    match alert_type {
        AlertType::SupplyLow => 20.0,
        AlertType::SupplyCritical => 5.0,
        AlertType::UsageHigh => 1000.0,
        _ => 0.0,
    }
}

/// The condition flag a boolean rule checks for, if the type has one.
fn condition_flag(alert_type: AlertType) -> Option<&'static str> {
    match alert_type {
        AlertType::DeviceOffline | AlertType::AgentOffline => Some("offline"),
        AlertType::PaperJam => Some("paper_jam"),
        AlertType::DeviceError => Some("error"),
        AlertType::ServiceRequired => Some("service_required"),
        AlertType::ConnectionFailure => Some("connection_failure"),
        AlertType::AgentOutdated => Some("outdated"),
        AlertType::AgentStorageFull => Some("storage_full"),
        AlertType::MaintenanceDue => Some("maintenance_due"),
        AlertType::SiteOutage => Some("site_outage"),
        AlertType::FleetMassOutage => Some("mass_outage"),
        _ => None,
    }
}

fn check_violation(rule: &AlertRule, fact: &FactUpdate) -> Result<Option<Violation>> {
    let name = fact.display_name();

    match rule.alert_type {
        AlertType::SupplyLow | AlertType::SupplyCritical => {
            let threshold = rule
                .threshold
                .unwrap_or_else(|| default_threshold(rule.alert_type));
            let unit = rule.threshold_unit.unwrap_or(ThresholdUnit::Percent);
            for (metric, value) in &fact.metrics {
                let Some(supply) = metric.strip_prefix("supply.") else {
                    continue;
                };
                if unit.violated(*value, threshold) {
                    let (label, adjective) = if rule.alert_type == AlertType::SupplyCritical {
                        ("Critical Supply", "critically low")
                    } else {
                        ("Low Supply", "low")
                    };
                    return Ok(Some(Violation {
                        title: format!("{label}: {name}"),
                        message: format!("{supply} supply is {adjective} at {value:.0}% on {name}"),
                    }));
                }
            }
            Ok(None)
        }

        AlertType::UsageHigh => {
            let threshold = rule
                .threshold
                .unwrap_or_else(|| default_threshold(rule.alert_type));
            let unit = rule.threshold_unit.unwrap_or(ThresholdUnit::Pages);
            match fact.metrics.get("pages_today") {
                Some(pages) if unit.violated(*pages, threshold) => Ok(Some(Violation {
                    title: format!("High Usage: {name}"),
                    message: format!("{name} has printed {pages:.0} pages today"),
                })),
                _ => Ok(None),
            }
        }

        AlertType::Custom => {
            let flag = rule
                .condition
                .as_ref()
                .and_then(|c| c.get("flag"))
                .and_then(|f| f.as_str())
                .ok_or_else(|| {
                    AlertError::Rule(format!(
                        "custom rule '{}' has no condition flag",
                        rule.name
                    ))
                })?;
            if fact.conditions.contains(flag) {
                Ok(Some(Violation {
                    title: format!("{}: {name}", rule.name),
                    message: format!("{name} reports condition '{flag}'"),
                }))
            } else {
                Ok(None)
            }
        }

        other => {
            let Some(flag) = condition_flag(other) else {
                return Ok(None);
            };
            if fact.conditions.contains(flag) {
                let title = match other {
                    AlertType::DeviceOffline => format!("Device Offline: {name}"),
                    AlertType::AgentOffline => format!("Agent Offline: {name}"),
                    AlertType::PaperJam => format!("Paper Jam: {name}"),
                    AlertType::DeviceError => format!("Device Error: {name}"),
                    _ => format!("{}: {name}", other),
                };
                Ok(Some(Violation {
                    title,
                    message: format!("{name} reports condition '{flag}'"),
                }))
            } else {
                Ok(None)
            }
        }
    }
}
