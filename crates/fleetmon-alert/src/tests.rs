use crate::escalation::EscalationScheduler;
use crate::evaluator::{FactUpdate, RuleEvaluator};
use crate::lifecycle::{AlertLifecycleManager, TriggerOutcome};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use fleetmon_common::types::{
    AlertFilter, AlertRule, AlertScope, AlertSettings, AlertStatus, AlertType, ChannelType,
    EscalationPolicy, EscalationStep, MaintenanceWindow, NewAlert, NotificationChannel,
    Severity, ThresholdUnit,
};
use fleetmon_notify::content::AlertContent;
use fleetmon_notify::dispatcher::NotificationDispatcher;
use fleetmon_notify::{ChannelSender, SenderRegistry};
use fleetmon_store::memory::MemoryStore;
use fleetmon_store::AlertStore;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Captures deliveries as (channel_id, subject) pairs.
struct RecordingSender {
    kind: ChannelType,
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl ChannelSender for RecordingSender {
    async fn send(
        &self,
        channel: &NotificationChannel,
        content: &AlertContent,
    ) -> fleetmon_notify::error::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((channel.id.clone(), content.subject.clone()));
        Ok(())
    }

    fn channel_type(&self) -> ChannelType {
        self.kind
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    lifecycle: Arc<AlertLifecycleManager>,
    dispatcher: Arc<NotificationDispatcher>,
    evaluator: RuleEvaluator,
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SenderRegistry::new();
        registry.register(Box::new(RecordingSender {
            kind: ChannelType::Email,
            sent: sent.clone(),
        }));
        let dispatcher = Arc::new(NotificationDispatcher::new(store.clone(), registry));
        let lifecycle = Arc::new(AlertLifecycleManager::new(store.clone()));
        let evaluator = RuleEvaluator::new(store.clone(), lifecycle.clone(), dispatcher.clone());
        Self {
            store,
            lifecycle,
            dispatcher,
            evaluator,
            sent,
        }
    }

    fn scheduler(&self) -> EscalationScheduler {
        EscalationScheduler::new(
            self.store.clone(),
            self.lifecycle.clone(),
            self.dispatcher.clone(),
        )
    }

    async fn channel(&self) -> NotificationChannel {
        self.store
            .create_channel(NotificationChannel {
                id: String::new(),
                name: "ops".into(),
                channel_type: ChannelType::Email,
                enabled: true,
                config: serde_json::json!({}),
                min_severity: Severity::Info,
                tenant_ids: Vec::new(),
                rate_limit_per_hour: 0,
                sent_this_hour: 0,
                hour_started_at: None,
                last_sent_at: None,
                use_quiet_hours: false,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    fn sent_to(&self, channel_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == channel_id)
            .map(|(_, subject)| subject.clone())
            .collect()
    }
}

fn base_rule(alert_type: AlertType, severity: Severity) -> AlertRule {
    let now = Utc::now();
    AlertRule {
        id: String::new(),
        name: format!("{alert_type} rule"),
        description: None,
        enabled: true,
        alert_type,
        severity,
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
        created_by: None,
    }
}

fn device_fact(device: &str, metrics: &[(&str, f64)], conditions: &[&str]) -> FactUpdate {
    FactUpdate {
        tenant_id: Some("t1".into()),
        site_id: Some("s1".into()),
        agent_id: Some("a1".into()),
        device_id: Some(device.into()),
        observed_at: Utc::now(),
        metrics: metrics
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect::<HashMap<_, _>>(),
        conditions: conditions
            .iter()
            .map(|c| c.to_string())
            .collect::<HashSet<_>>(),
    }
}

fn policy(steps: Vec<EscalationStep>) -> EscalationPolicy {
    let now = Utc::now();
    EscalationPolicy {
        id: String::new(),
        name: "default".into(),
        description: None,
        enabled: true,
        steps,
        created_at: now,
        updated_at: now,
    }
}

async fn open_alerts(store: &MemoryStore, status: AlertStatus) -> Vec<fleetmon_common::types::Alert> {
    store
        .list_open_alerts(&AlertFilter {
            status: Some(status),
            ..Default::default()
        })
        .await
        .unwrap()
}

// ── End-to-end: the critical supply scenario ──

#[tokio::test]
async fn critical_supply_fires_escalates_and_auto_resolves() {
    let h = Harness::new();
    let trigger_ch = h.channel().await;
    let escalate_ch = h.channel().await;

    let pol = h
        .store
        .create_policy(policy(vec![EscalationStep {
            delay_minutes: 0,
            channel_ids: vec![escalate_ch.id.clone()],
            repeat: 0,
        }]))
        .await
        .unwrap();

    let mut rule = base_rule(AlertType::SupplyCritical, Severity::Critical);
    rule.name = "Critical Supply Level".into();
    rule.threshold = Some(5.0);
    rule.threshold_unit = Some(ThresholdUnit::Percent);
    rule.channel_ids = vec![trigger_ch.id.clone()];
    rule.escalation_policy_id = Some(pol.id.clone());
    h.store.create_rule(rule).await.unwrap();

    // A 3% reading fires immediately (duration 0)
    h.evaluator
        .tick(&[device_fact("PRN-1", &[("supply.black", 3.0)], &[])])
        .await
        .unwrap();

    let active = open_alerts(&h.store, AlertStatus::Active).await;
    assert_eq!(active.len(), 1);
    let alert = &active[0];
    assert_eq!(alert.alert_type, AlertType::SupplyCritical);
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(h.sent_to(&trigger_ch.id).len(), 1);
    assert!(h.sent_to(&trigger_ch.id)[0].starts_with("[CRITICAL]"));

    // Step 1 (delay 0) fires on the next scheduler tick
    h.scheduler().tick_at(Utc::now()).await.unwrap();
    let alert = h.store.get_alert(&alert.id).await.unwrap().unwrap();
    assert_eq!(alert.escalation_level, 1);
    assert_eq!(h.sent_to(&escalate_ch.id).len(), 1);

    // Supply recovers: the alert auto-resolves
    h.evaluator
        .tick(&[device_fact("PRN-1", &[("supply.black", 50.0)], &[])])
        .await
        .unwrap();

    assert!(open_alerts(&h.store, AlertStatus::Active).await.is_empty());
    let history = h
        .store
        .list_alert_history(&AlertFilter::default())
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, AlertStatus::Resolved);
    // Resolve notification went to the rule's channel set
    assert_eq!(h.sent_to(&trigger_ch.id).len(), 2);
    assert!(h.sent_to(&trigger_ch.id)[1].starts_with("[RESOLVED]"));
}

// ── Sustained duration and cooldown ──

#[tokio::test]
async fn sustained_duration_gates_firing() {
    let h = Harness::new();
    let mut rule = base_rule(AlertType::DeviceOffline, Severity::Warning);
    rule.duration_minutes = 10;
    h.store.create_rule(rule).await.unwrap();

    let t0 = Utc::now();
    let fact = device_fact("PRN-1", &[], &["offline"]);

    h.evaluator.tick_at(&[fact.clone()], t0).await.unwrap();
    assert!(open_alerts(&h.store, AlertStatus::Active).await.is_empty());

    h.evaluator
        .tick_at(&[fact.clone()], t0 + Duration::minutes(5))
        .await
        .unwrap();
    assert!(open_alerts(&h.store, AlertStatus::Active).await.is_empty());

    h.evaluator
        .tick_at(&[fact], t0 + Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(open_alerts(&h.store, AlertStatus::Active).await.len(), 1);
}

#[tokio::test]
async fn violation_clear_resets_the_sustain_clock() {
    let h = Harness::new();
    let mut rule = base_rule(AlertType::DeviceOffline, Severity::Warning);
    rule.duration_minutes = 10;
    h.store.create_rule(rule).await.unwrap();

    let t0 = Utc::now();
    let offline = device_fact("PRN-1", &[], &["offline"]);
    let online = device_fact("PRN-1", &[], &[]);

    h.evaluator.tick_at(&[offline.clone()], t0).await.unwrap();
    h.evaluator
        .tick_at(&[online], t0 + Duration::minutes(5))
        .await
        .unwrap();
    // Violating again 6 minutes in: the clock restarted at minute 6
    h.evaluator
        .tick_at(&[offline.clone()], t0 + Duration::minutes(6))
        .await
        .unwrap();
    h.evaluator
        .tick_at(&[offline.clone()], t0 + Duration::minutes(12))
        .await
        .unwrap();
    assert!(open_alerts(&h.store, AlertStatus::Active).await.is_empty());

    h.evaluator
        .tick_at(&[offline], t0 + Duration::minutes(16))
        .await
        .unwrap();
    assert_eq!(open_alerts(&h.store, AlertStatus::Active).await.len(), 1);
}

#[tokio::test]
async fn cooldown_blocks_retrigger_until_elapsed() {
    let h = Harness::new();
    let mut rule = base_rule(AlertType::SupplyCritical, Severity::Critical);
    rule.threshold = Some(5.0);
    rule.threshold_unit = Some(ThresholdUnit::Percent);
    rule.cooldown_minutes = 30;
    h.store.create_rule(rule).await.unwrap();

    let low = device_fact("PRN-1", &[("supply.black", 3.0)], &[]);
    let ok = device_fact("PRN-1", &[("supply.black", 60.0)], &[]);

    let t0 = Utc::now();
    h.evaluator.tick_at(&[low.clone()], t0).await.unwrap();
    assert_eq!(open_alerts(&h.store, AlertStatus::Active).await.len(), 1);

    h.evaluator
        .tick_at(&[ok], t0 + Duration::minutes(1))
        .await
        .unwrap();
    assert!(open_alerts(&h.store, AlertStatus::Active).await.is_empty());

    // Violating again inside the cooldown window creates nothing
    h.evaluator
        .tick_at(&[low.clone()], t0 + Duration::minutes(5))
        .await
        .unwrap();
    assert!(open_alerts(&h.store, AlertStatus::Active).await.is_empty());

    // After the cooldown the key may fire again
    h.evaluator
        .tick_at(&[low], t0 + Duration::minutes(45))
        .await
        .unwrap();
    assert_eq!(open_alerts(&h.store, AlertStatus::Active).await.len(), 1);
}

// ── Escalation timing, idempotence, repeats ──

#[tokio::test]
async fn escalation_steps_fire_on_schedule_and_survive_restart() {
    let h = Harness::new();
    let ch_a = h.channel().await;
    let ch_b = h.channel().await;

    let pol = h
        .store
        .create_policy(policy(vec![
            EscalationStep {
                delay_minutes: 0,
                channel_ids: vec![ch_a.id.clone()],
                repeat: 0,
            },
            EscalationStep {
                delay_minutes: 15,
                channel_ids: vec![ch_b.id.clone()],
                repeat: 0,
            },
        ]))
        .await
        .unwrap();

    let mut rule = base_rule(AlertType::DeviceError, Severity::Warning);
    rule.escalation_policy_id = Some(pol.id.clone());
    let rule = h.store.create_rule(rule).await.unwrap();

    let outcome = h
        .lifecycle
        .trigger(NewAlert {
            rule_id: Some(rule.id),
            alert_type: AlertType::DeviceError,
            severity: Severity::Warning,
            scope: AlertScope::Device,
            tenant_id: None,
            site_id: None,
            agent_id: None,
            device_id: Some("PRN-1".into()),
            title: "Device Error: PRN-1".into(),
            message: "fault reported".into(),
            details: None,
            expires_at: None,
        })
        .await
        .unwrap();
    let TriggerOutcome::Created(alert) = outcome else {
        panic!("expected creation");
    };

    // Step 0 (delay 0) is due immediately; step 1 is not
    let scheduler = h.scheduler();
    scheduler.tick_at(Utc::now()).await.unwrap();
    assert_eq!(h.sent_to(&ch_a.id).len(), 1);
    assert!(h.sent_to(&ch_b.id).is_empty());

    // Re-ticking at the same instant does not re-fire step 0
    scheduler.tick_at(Utc::now()).await.unwrap();
    assert_eq!(h.sent_to(&ch_a.id).len(), 1);

    // Step 1 fires at trigger + 15
    let later = Utc::now() + Duration::minutes(16);
    scheduler.tick_at(later).await.unwrap();
    assert_eq!(h.sent_to(&ch_b.id).len(), 1);

    let stored = h.store.get_alert(&alert.id).await.unwrap().unwrap();
    assert_eq!(stored.escalation_level, 2);
    assert_eq!(stored.last_escalated_at, Some(later));

    // A fresh scheduler over the same store re-fires nothing
    let restarted = h.scheduler();
    restarted.tick_at(later).await.unwrap();
    restarted
        .tick_at(later + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(h.sent_to(&ch_a.id).len(), 1);
    assert_eq!(h.sent_to(&ch_b.id).len(), 1);
}

#[tokio::test]
async fn repeat_refires_the_same_step_before_advancing() {
    let h = Harness::new();
    let ch = h.channel().await;
    let pol = h
        .store
        .create_policy(policy(vec![EscalationStep {
            delay_minutes: 5,
            channel_ids: vec![ch.id.clone()],
            repeat: 2,
        }]))
        .await
        .unwrap();

    let mut rule = base_rule(AlertType::DeviceError, Severity::Warning);
    rule.escalation_policy_id = Some(pol.id);
    let rule = h.store.create_rule(rule).await.unwrap();

    let TriggerOutcome::Created(alert) = h
        .lifecycle
        .trigger(NewAlert {
            rule_id: Some(rule.id),
            alert_type: AlertType::DeviceError,
            severity: Severity::Warning,
            scope: AlertScope::Device,
            tenant_id: None,
            site_id: None,
            agent_id: None,
            device_id: Some("PRN-1".into()),
            title: "Device Error: PRN-1".into(),
            message: "fault reported".into(),
            details: None,
            expires_at: None,
        })
        .await
        .unwrap()
    else {
        panic!("expected creation");
    };

    let scheduler = h.scheduler();
    let t0 = Utc::now();

    // Fires at +5, +10, +15; one per tick
    for (minutes, expected) in [(4, 0), (5, 1), (10, 2), (15, 3), (30, 3)] {
        scheduler
            .tick_at(t0 + Duration::minutes(minutes))
            .await
            .unwrap();
        assert_eq!(h.sent_to(&ch.id).len(), expected, "at +{minutes}m");
    }

    let stored = h.store.get_alert(&alert.id).await.unwrap().unwrap();
    assert_eq!(stored.escalation_level, 3);
    // Every fire announced the same (single) step
    assert!(h
        .sent_to(&ch.id)
        .iter()
        .all(|s| s.contains("[ESCALATION 1]")));
}

#[tokio::test]
async fn acknowledged_alert_stops_escalating() {
    let h = Harness::new();
    let ch = h.channel().await;
    let pol = h
        .store
        .create_policy(policy(vec![EscalationStep {
            delay_minutes: 0,
            channel_ids: vec![ch.id.clone()],
            repeat: 0,
        }]))
        .await
        .unwrap();

    let mut rule = base_rule(AlertType::DeviceError, Severity::Warning);
    rule.escalation_policy_id = Some(pol.id);
    let rule = h.store.create_rule(rule).await.unwrap();

    let TriggerOutcome::Created(alert) = h
        .lifecycle
        .trigger(NewAlert {
            rule_id: Some(rule.id),
            alert_type: AlertType::DeviceError,
            severity: Severity::Warning,
            scope: AlertScope::Device,
            tenant_id: None,
            site_id: None,
            agent_id: None,
            device_id: Some("PRN-1".into()),
            title: "Device Error: PRN-1".into(),
            message: "fault reported".into(),
            details: None,
            expires_at: None,
        })
        .await
        .unwrap()
    else {
        panic!("expected creation");
    };

    let acked = h.lifecycle.acknowledge(&alert.id, "admin").await.unwrap();
    assert_eq!(acked.status, AlertStatus::Acknowledged);
    assert!(acked.acknowledged_at.is_some());

    h.scheduler().tick_at(Utc::now()).await.unwrap();
    assert!(h.sent_to(&ch.id).is_empty());
    let stored = h.store.get_alert(&alert.id).await.unwrap().unwrap();
    assert_eq!(stored.escalation_level, 0);
}

// ── Flapping ──

#[tokio::test]
async fn flapping_alert_is_damped() {
    let h = Harness::new();
    let mut settings = AlertSettings::default();
    settings.flapping_threshold = 3;
    settings.flapping_window_mins = 60;
    h.store.save_settings(settings).await.unwrap();

    let ch = h.channel().await;
    let pol = h
        .store
        .create_policy(policy(vec![EscalationStep {
            delay_minutes: 0,
            channel_ids: vec![ch.id.clone()],
            repeat: 0,
        }]))
        .await
        .unwrap();
    let mut rule = base_rule(AlertType::DeviceError, Severity::Warning);
    rule.escalation_policy_id = Some(pol.id);
    let rule = h.store.create_rule(rule).await.unwrap();

    let TriggerOutcome::Created(alert) = h
        .lifecycle
        .trigger(NewAlert {
            rule_id: Some(rule.id),
            alert_type: AlertType::DeviceError,
            severity: Severity::Warning,
            scope: AlertScope::Device,
            tenant_id: None,
            site_id: None,
            agent_id: None,
            device_id: Some("PRN-1".into()),
            title: "Device Error: PRN-1".into(),
            message: "fault reported".into(),
            details: None,
            expires_at: None,
        })
        .await
        .unwrap()
    else {
        panic!("expected creation");
    };

    // Oscillate: suppress -> reactivate, twice (4 transitions > threshold 3)
    for _ in 0..2 {
        h.lifecycle
            .suppress(&alert.id, Utc::now() + Duration::hours(1), Some("admin"))
            .await
            .unwrap();
        h.store
            .update_status(&alert.id, AlertStatus::Active, None, None, None)
            .await
            .unwrap();
    }
    h.lifecycle.flap_check(&alert.id).await.unwrap();

    let stored = h.store.get_alert(&alert.id).await.unwrap().unwrap();
    assert!(stored.is_flapping);
    assert!(stored.state_change_count >= 4);

    // Escalation must not advance while flapping
    h.scheduler().tick_at(Utc::now()).await.unwrap();
    let stored = h.store.get_alert(&alert.id).await.unwrap().unwrap();
    assert_eq!(stored.escalation_level, 0);
    assert!(h.sent_to(&ch.id).is_empty());
}

// ── Maintenance windows ──

fn site_window(site: &str, allow_critical: bool) -> MaintenanceWindow {
    let now = Utc::now();
    MaintenanceWindow {
        id: String::new(),
        name: "planned site work".into(),
        description: None,
        scope: AlertScope::Site,
        tenant_id: None,
        site_id: Some(site.into()),
        agent_id: None,
        device_id: None,
        start_time: now - Duration::minutes(5),
        end_time: now + Duration::hours(4),
        timezone: "UTC".into(),
        recurring: false,
        recur_pattern: None,
        recur_days: vec![],
        alert_types: vec![],
        allow_critical,
        created_at: now,
        updated_at: now,
        created_by: None,
    }
}

#[tokio::test]
async fn maintenance_window_converts_creation_to_suppressed() {
    let h = Harness::new();
    let ch = h.channel().await;
    let window = h.store.create_window(site_window("s1", false)).await.unwrap();

    let mut rule = base_rule(AlertType::DeviceOffline, Severity::Warning);
    rule.channel_ids = vec![ch.id.clone()];
    h.store.create_rule(rule).await.unwrap();

    h.evaluator
        .tick(&[device_fact("PRN-1", &[], &["offline"])])
        .await
        .unwrap();

    let suppressed = open_alerts(&h.store, AlertStatus::Suppressed).await;
    assert_eq!(suppressed.len(), 1);
    assert_eq!(suppressed[0].suppressed_until, Some(window.end_time));
    // No trigger notification for a window-suppressed creation
    assert!(h.sent_to(&ch.id).is_empty());
}

#[tokio::test]
async fn allow_critical_window_lets_critical_alerts_through() {
    let h = Harness::new();
    h.store.create_window(site_window("s1", true)).await.unwrap();

    let mut rule = base_rule(AlertType::AgentOffline, Severity::Critical);
    rule.scope = AlertScope::Agent;
    h.store.create_rule(rule).await.unwrap();

    h.evaluator
        .tick(&[device_fact("PRN-1", &[], &["offline"])])
        .await
        .unwrap();

    assert_eq!(open_alerts(&h.store, AlertStatus::Active).await.len(), 1);
    assert!(open_alerts(&h.store, AlertStatus::Suppressed).await.is_empty());
}

#[tokio::test]
async fn new_window_retroactively_suppresses_open_alerts() {
    let h = Harness::new();
    h.store
        .create_rule(base_rule(AlertType::DeviceOffline, Severity::Warning))
        .await
        .unwrap();

    h.evaluator
        .tick(&[device_fact("PRN-1", &[], &["offline"])])
        .await
        .unwrap();
    assert_eq!(open_alerts(&h.store, AlertStatus::Active).await.len(), 1);

    let window = h.store.create_window(site_window("s1", false)).await.unwrap();
    let swept = h.lifecycle.apply_window(&window).await.unwrap();
    assert_eq!(swept, 1);

    let suppressed = open_alerts(&h.store, AlertStatus::Suppressed).await;
    assert_eq!(suppressed.len(), 1);
    assert_eq!(suppressed[0].suppressed_until, Some(window.end_time));
}

#[tokio::test]
async fn elapsed_suppression_reactivates_on_tick() {
    let h = Harness::new();
    h.store
        .create_rule(base_rule(AlertType::DeviceOffline, Severity::Warning))
        .await
        .unwrap();
    h.evaluator
        .tick(&[device_fact("PRN-1", &[], &["offline"])])
        .await
        .unwrap();
    let alert = open_alerts(&h.store, AlertStatus::Active)
        .await
        .pop()
        .unwrap();

    h.lifecycle
        .suppress(&alert.id, Utc::now() + Duration::seconds(1), Some("admin"))
        .await
        .unwrap();

    h.scheduler()
        .tick_at(Utc::now() + Duration::minutes(1))
        .await
        .unwrap();

    let stored = h.store.get_alert(&alert.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AlertStatus::Active);
    assert!(stored.suppressed_until.is_none());
}

// ── Grouping ──

#[tokio::test]
async fn alert_storm_is_grouped_under_a_synthetic_parent() {
    let h = Harness::new();
    let mut settings = AlertSettings::default();
    settings.grouping_threshold = 2;
    h.store.save_settings(settings).await.unwrap();

    h.store
        .create_rule(base_rule(AlertType::DeviceError, Severity::Warning))
        .await
        .unwrap();

    for device in ["PRN-1", "PRN-2", "PRN-3"] {
        h.evaluator
            .tick(&[device_fact(device, &[], &["error"])])
            .await
            .unwrap();
    }

    let open = h
        .store
        .list_open_alerts(&AlertFilter::default())
        .await
        .unwrap();
    let parent = open
        .iter()
        .find(|a| a.device_id.is_none() && a.child_count > 0)
        .expect("synthetic parent exists");
    assert_eq!(parent.child_count, 3);
    assert_eq!(parent.alert_type, AlertType::DeviceError);

    let children: Vec<_> = open
        .iter()
        .filter(|a| a.parent_alert_id.as_deref() == Some(parent.id.as_str()))
        .collect();
    assert_eq!(children.len(), 3);
}

// ── Evaluator gating ──

#[tokio::test]
async fn broken_rule_does_not_block_other_rules() {
    let h = Harness::new();

    // Custom rule with no condition payload: evaluation errors out
    let mut broken = base_rule(AlertType::Custom, Severity::Info);
    broken.name = "broken custom".into();
    h.store.create_rule(broken).await.unwrap();

    h.store
        .create_rule(base_rule(AlertType::DeviceError, Severity::Warning))
        .await
        .unwrap();

    h.evaluator
        .tick(&[device_fact("PRN-1", &[], &["error"])])
        .await
        .unwrap();

    assert_eq!(open_alerts(&h.store, AlertStatus::Active).await.len(), 1);
}

#[tokio::test]
async fn agent_allow_list_filters_facts() {
    let h = Harness::new();
    let mut rule = base_rule(AlertType::DeviceError, Severity::Warning);
    rule.agent_ids = vec!["a9".into()];
    h.store.create_rule(rule).await.unwrap();

    h.evaluator
        .tick(&[device_fact("PRN-1", &[], &["error"])]) // agent a1
        .await
        .unwrap();
    assert!(open_alerts(&h.store, AlertStatus::Active).await.is_empty());
}

#[tokio::test]
async fn disabled_engine_evaluates_nothing() {
    let h = Harness::new();
    let mut settings = AlertSettings::default();
    settings.enabled = false;
    h.store.save_settings(settings).await.unwrap();

    h.store
        .create_rule(base_rule(AlertType::DeviceError, Severity::Warning))
        .await
        .unwrap();
    h.evaluator
        .tick(&[device_fact("PRN-1", &[], &["error"])])
        .await
        .unwrap();
    assert!(open_alerts(&h.store, AlertStatus::Active).await.is_empty());
}

#[tokio::test]
async fn hourly_cap_limits_alert_creation() {
    let h = Harness::new();
    let mut settings = AlertSettings::default();
    settings.max_alerts_per_hour = 2;
    settings.grouping_enabled = false;
    h.store.save_settings(settings).await.unwrap();

    h.store
        .create_rule(base_rule(AlertType::DeviceError, Severity::Warning))
        .await
        .unwrap();

    for device in ["PRN-1", "PRN-2", "PRN-3"] {
        h.evaluator
            .tick(&[device_fact(device, &[], &["error"])])
            .await
            .unwrap();
    }
    assert_eq!(open_alerts(&h.store, AlertStatus::Active).await.len(), 2);
}

#[tokio::test]
async fn custom_rule_matches_its_condition_flag() {
    let h = Harness::new();
    let mut rule = base_rule(AlertType::Custom, Severity::Info);
    rule.name = "Door Open".into();
    rule.condition = Some(serde_json::json!({"flag": "door_open"}));
    h.store.create_rule(rule).await.unwrap();

    h.evaluator
        .tick(&[device_fact("PRN-1", &[], &["door_open"])])
        .await
        .unwrap();

    let active = open_alerts(&h.store, AlertStatus::Active).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].title, "Door Open: PRN-1");
}
