//! Built-in alert rule seeding.
//!
//! On a first run with zero rules present, a fixed rule set is inserted so
//! a fresh deployment alerts on the common failure modes out of the box.
//! Idempotent: skipped entirely if any rule already exists.

use crate::error::Result;
use crate::AlertStore;
use chrono::Utc;
use fleetmon_common::types::{AlertRule, AlertScope, AlertType, Severity, ThresholdUnit};

/// The default rule set inserted on first initialization.
pub fn default_rules() -> Vec<AlertRule> {
    let now = Utc::now();
    let base = AlertRule {
        id: String::new(),
        name: String::new(),
        description: None,
        enabled: true,
        alert_type: AlertType::SupplyLow,
        severity: Severity::Warning,
        scope: AlertScope::Device,
        tenant_ids: Vec::new(),
        site_ids: Vec::new(),
        agent_ids: Vec::new(),
        condition: None,
        threshold: None,
        threshold_unit: None,
        duration_minutes: 0,
        channel_ids: Vec::new(),
        escalation_policy_id: None,
        cooldown_minutes: 0,
        created_at: now,
        updated_at: now,
        created_by: Some("system".to_string()),
    };

    vec![
        AlertRule {
            name: "Low Supply Warning".into(),
            description: Some("Alerts when any supply level drops below 20%".into()),
            alert_type: AlertType::SupplyLow,
            severity: Severity::Warning,
            threshold: Some(20.0),
            threshold_unit: Some(ThresholdUnit::Percent),
            cooldown_minutes: 60,
            ..base.clone()
        },
        AlertRule {
            name: "Critical Supply Level".into(),
            description: Some("Alerts when any supply level drops below 5%".into()),
            alert_type: AlertType::SupplyCritical,
            severity: Severity::Critical,
            threshold: Some(5.0),
            threshold_unit: Some(ThresholdUnit::Percent),
            cooldown_minutes: 30,
            ..base.clone()
        },
        AlertRule {
            name: "Device Offline".into(),
            description: Some("Alerts when a device has been offline for 15 minutes".into()),
            alert_type: AlertType::DeviceOffline,
            severity: Severity::Warning,
            duration_minutes: 15,
            cooldown_minutes: 60,
            ..base.clone()
        },
        AlertRule {
            name: "Agent Disconnected".into(),
            description: Some("Alerts when an agent has been disconnected for 10 minutes".into()),
            alert_type: AlertType::AgentOffline,
            severity: Severity::Warning,
            scope: AlertScope::Agent,
            duration_minutes: 10,
            cooldown_minutes: 30,
            ..base.clone()
        },
        AlertRule {
            name: "Device Error".into(),
            description: Some("Alerts when a device reports an error status".into()),
            alert_type: AlertType::DeviceError,
            severity: Severity::Warning,
            cooldown_minutes: 15,
            ..base.clone()
        },
        AlertRule {
            name: "High Usage Volume".into(),
            description: Some("Alerts when daily page count exceeds 1000 pages".into()),
            enabled: false, // opt-in
            alert_type: AlertType::UsageHigh,
            severity: Severity::Info,
            threshold: Some(1000.0),
            threshold_unit: Some(ThresholdUnit::Pages),
            cooldown_minutes: 1440,
            ..base
        },
    ]
}

/// Inserts the default rules if none exist. Returns the number seeded.
pub async fn seed_default_rules(store: &dyn AlertStore) -> Result<u32> {
    if !store.list_rules().await?.is_empty() {
        return Ok(0);
    }

    let defaults = default_rules();
    let mut seeded = 0;
    for rule in defaults {
        let name = rule.name.clone();
        store.create_rule(rule).await?;
        tracing::debug!(rule = %name, "Seeded default alert rule");
        seeded += 1;
    }
    tracing::info!(count = seeded, "Seeded default alert rules");
    Ok(seeded)
}
