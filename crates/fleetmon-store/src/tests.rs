use crate::memory::MemoryStore;
use crate::seed::seed_default_rules;
use crate::AlertStore;
use crate::error::StoreError;
use chrono::{Duration, Utc};
use fleetmon_common::types::{
    AlertFilter, AlertScope, AlertStatus, AlertType, NewAlert, NotificationChannel, ChannelType,
    Severity,
};
use std::sync::Arc;

fn sample_alert(device: &str) -> NewAlert {
    NewAlert {
        rule_id: None,
        alert_type: AlertType::SupplyCritical,
        severity: Severity::Critical,
        scope: AlertScope::Device,
        tenant_id: Some("t1".into()),
        site_id: None,
        agent_id: Some("a1".into()),
        device_id: Some(device.into()),
        title: format!("Critical supply: {device}"),
        message: "black supply is at 3%".into(),
        details: None,
        expires_at: None,
    }
}

fn sample_channel(rate_limit: u32) -> NotificationChannel {
    NotificationChannel {
        id: String::new(),
        name: "ops-email".into(),
        channel_type: ChannelType::Email,
        enabled: true,
        config: serde_json::json!({"to_addresses": ["ops@example.com"]}),
        min_severity: Severity::Info,
        tenant_ids: Vec::new(),
        rate_limit_per_hour: rate_limit,
        sent_this_hour: 0,
        hour_started_at: None,
        last_sent_at: None,
        use_quiet_hours: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn create_is_deduplicated_on_key() {
    let store = MemoryStore::new();

    let (first, created) = store
        .create_or_get_active(sample_alert("d1"), AlertStatus::Active, None)
        .await
        .unwrap();
    assert!(created);
    assert_eq!(first.repeat_count, 0);

    let (second, created) = store
        .create_or_get_active(sample_alert("d1"), AlertStatus::Active, None)
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(second.id, first.id);
    assert_eq!(second.repeat_count, 1);

    // A different device is a different key
    let (_, created) = store
        .create_or_get_active(sample_alert("d2"), AlertStatus::Active, None)
        .await
        .unwrap();
    assert!(created);
}

#[tokio::test]
async fn concurrent_creates_yield_one_active_alert() {
    let store = Arc::new(MemoryStore::new());

    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .create_or_get_active(sample_alert("d1"), AlertStatus::Active, None)
                .await
                .unwrap()
        }));
    }

    let mut created_count = 0;
    for handle in handles {
        let (_, created) = handle.await.unwrap();
        if created {
            created_count += 1;
        }
    }
    assert_eq!(created_count, 1);

    let active = store
        .list_open_alerts(&AlertFilter::default())
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].repeat_count, 15);
}

#[tokio::test]
async fn acknowledge_requires_active() {
    let store = MemoryStore::new();
    let (alert, _) = store
        .create_or_get_active(sample_alert("d1"), AlertStatus::Active, None)
        .await
        .unwrap();

    let acked = store
        .update_status(&alert.id, AlertStatus::Acknowledged, Some("admin"), None, None)
        .await
        .unwrap();
    assert_eq!(acked.status, AlertStatus::Acknowledged);
    assert!(acked.acknowledged_at.is_some());
    assert_eq!(acked.acknowledged_by.as_deref(), Some("admin"));

    // Acknowledging again is not a valid transition
    let err = store
        .update_status(&alert.id, AlertStatus::Acknowledged, Some("admin"), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));
}

#[tokio::test]
async fn terminal_states_reject_all_transitions() {
    let store = MemoryStore::new();
    let (alert, _) = store
        .create_or_get_active(sample_alert("d1"), AlertStatus::Active, None)
        .await
        .unwrap();
    store
        .update_status(&alert.id, AlertStatus::Resolved, None, None, None)
        .await
        .unwrap();

    for target in [
        AlertStatus::Active,
        AlertStatus::Acknowledged,
        AlertStatus::Suppressed,
        AlertStatus::Expired,
    ] {
        let until = (target == AlertStatus::Suppressed).then(|| Utc::now() + Duration::hours(1));
        let err = store
            .update_status(&alert.id, target, None, None, until)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }
}

#[tokio::test]
async fn resolve_frees_the_dedup_key() {
    let store = MemoryStore::new();
    let (first, _) = store
        .create_or_get_active(sample_alert("d1"), AlertStatus::Active, None)
        .await
        .unwrap();
    store
        .update_status(&first.id, AlertStatus::Resolved, None, None, None)
        .await
        .unwrap();

    let (second, created) = store
        .create_or_get_active(sample_alert("d1"), AlertStatus::Active, None)
        .await
        .unwrap();
    assert!(created);
    assert_ne!(second.id, first.id);

    let closed = store
        .last_closed_for_key(&first.dedup_key())
        .await
        .unwrap()
        .expect("resolved alert is retained as history");
    assert_eq!(closed.id, first.id);
}

#[tokio::test]
async fn suppression_is_counted_separately_in_summary() {
    let store = MemoryStore::new();
    let (alert, _) = store
        .create_or_get_active(sample_alert("d1"), AlertStatus::Active, None)
        .await
        .unwrap();
    let until = Utc::now() + Duration::hours(2);
    let suppressed = store
        .update_status(&alert.id, AlertStatus::Suppressed, Some("admin"), None, Some(until))
        .await
        .unwrap();
    assert_eq!(suppressed.status, AlertStatus::Suppressed);
    assert_eq!(suppressed.suppressed_until, Some(until));

    let summary = store.compute_summary(Utc::now()).await.unwrap();
    assert_eq!(summary.active_count, 0);
    assert_eq!(summary.suppressed_count, 1);
}

#[tokio::test]
async fn suppression_requires_until() {
    let store = MemoryStore::new();
    let (alert, _) = store
        .create_or_get_active(sample_alert("d1"), AlertStatus::Active, None)
        .await
        .unwrap();
    let err = store
        .update_status(&alert.id, AlertStatus::Suppressed, None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[tokio::test]
async fn transitions_append_history_and_bump_change_count() {
    let store = MemoryStore::new();
    let (alert, _) = store
        .create_or_get_active(sample_alert("d1"), AlertStatus::Active, None)
        .await
        .unwrap();
    store
        .update_status(&alert.id, AlertStatus::Acknowledged, Some("admin"), None, None)
        .await
        .unwrap();
    let resolved = store
        .update_status(&alert.id, AlertStatus::Resolved, Some("admin"), None, None)
        .await
        .unwrap();
    assert_eq!(resolved.state_change_count, 2);

    let entries = store.list_history_entries(&alert.id).await.unwrap();
    // created + acknowledged + resolved
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].action, "created");
    assert_eq!(entries[1].action, "acknowledged");
    assert_eq!(entries[2].action, "resolved");

    let transitions = store
        .count_history_since(&alert.id, Utc::now() - Duration::minutes(10))
        .await
        .unwrap();
    // "created" has no old status and is not a transition
    assert_eq!(transitions, 2);
}

#[tokio::test]
async fn history_listing_excludes_active() {
    let store = MemoryStore::new();
    let (active, _) = store
        .create_or_get_active(sample_alert("d1"), AlertStatus::Active, None)
        .await
        .unwrap();
    let (resolved, _) = store
        .create_or_get_active(sample_alert("d2"), AlertStatus::Active, None)
        .await
        .unwrap();
    store
        .update_status(&resolved.id, AlertStatus::Resolved, None, None, None)
        .await
        .unwrap();

    let history = store
        .list_alert_history(&AlertFilter::default())
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, resolved.id);

    let open = store
        .list_open_alerts(&AlertFilter {
            status: Some(AlertStatus::Active),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, active.id);
}

#[tokio::test]
async fn escalation_level_may_not_decrease() {
    let store = MemoryStore::new();
    let (alert, _) = store
        .create_or_get_active(sample_alert("d1"), AlertStatus::Active, None)
        .await
        .unwrap();
    let now = Utc::now();
    store.record_escalation(&alert.id, 2, now).await.unwrap();
    let err = store.record_escalation(&alert.id, 1, now).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let alert = store.get_alert(&alert.id).await.unwrap().unwrap();
    assert_eq!(alert.escalation_level, 2);
    assert_eq!(alert.last_escalated_at, Some(now));
}

#[tokio::test]
async fn rate_limit_refuses_after_bucket_is_full() {
    let store = MemoryStore::new();
    let channel = store.create_channel(sample_channel(3)).await.unwrap();
    let now = Utc::now();

    for _ in 0..3 {
        assert!(store.try_reserve_send(&channel.id, now).await.unwrap());
    }
    // Fourth attempt in the same hour is refused, not queued
    assert!(!store.try_reserve_send(&channel.id, now).await.unwrap());

    let loaded = store.get_channel(&channel.id).await.unwrap().unwrap();
    assert_eq!(loaded.sent_this_hour, 3);
}

#[tokio::test]
async fn rate_limit_bucket_rolls_after_an_hour() {
    let store = MemoryStore::new();
    let channel = store.create_channel(sample_channel(1)).await.unwrap();
    let start = Utc::now();

    assert!(store.try_reserve_send(&channel.id, start).await.unwrap());
    assert!(!store.try_reserve_send(&channel.id, start).await.unwrap());

    // One hour later the bucket resets and a send goes through again
    let later = start + Duration::hours(1);
    assert!(store.try_reserve_send(&channel.id, later).await.unwrap());

    let loaded = store.get_channel(&channel.id).await.unwrap().unwrap();
    assert_eq!(loaded.sent_this_hour, 1);
    assert_eq!(loaded.hour_started_at, Some(later));
}

#[tokio::test]
async fn unlimited_channels_always_reserve() {
    let store = MemoryStore::new();
    let channel = store.create_channel(sample_channel(0)).await.unwrap();
    let now = Utc::now();
    for _ in 0..50 {
        assert!(store.try_reserve_send(&channel.id, now).await.unwrap());
    }
}

#[tokio::test]
async fn seeding_is_idempotent() {
    let store = MemoryStore::new();
    let seeded = seed_default_rules(&store).await.unwrap();
    assert_eq!(seeded, 6);

    let rules = store.list_rules().await.unwrap();
    assert_eq!(rules.len(), 6);
    assert!(rules.iter().any(|r| r.alert_type == AlertType::SupplyCritical));
    // The high-usage rule ships disabled
    assert!(rules
        .iter()
        .any(|r| r.alert_type == AlertType::UsageHigh && !r.enabled));

    let seeded_again = seed_default_rules(&store).await.unwrap();
    assert_eq!(seeded_again, 0);
    assert_eq!(store.list_rules().await.unwrap().len(), 6);
}

#[tokio::test]
async fn filter_time_range_limits_results() {
    let store = MemoryStore::new();
    store
        .create_or_get_active(sample_alert("d1"), AlertStatus::Active, None)
        .await
        .unwrap();

    let none = store
        .list_alerts(&AlertFilter {
            end: Some(Utc::now() - Duration::hours(1)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(none.is_empty());

    let all = store
        .list_alerts(&AlertFilter {
            start: Some(Utc::now() - Duration::hours(1)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[test]
fn filter_accepts_since_until_aliases() {
    let filter: AlertFilter = serde_json::from_str(
        r#"{"since": "2024-03-04T00:00:00Z", "until": "2024-03-05T00:00:00Z"}"#,
    )
    .unwrap();
    assert!(filter.start.is_some());
    assert!(filter.end.is_some());
}
