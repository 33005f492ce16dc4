use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Alert severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use fleetmon_common::types::Severity;
///
/// let sev: Severity = "warning".parse().unwrap();
/// assert_eq!(sev, Severity::Warning);
/// assert_eq!(sev.to_string(), "warning");
/// assert!(Severity::Critical > Severity::Info);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Lifecycle status of an alert. `Resolved` and `Expired` are terminal;
/// no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    Suppressed,
    Expired,
}

impl AlertStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::Expired)
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Suppressed => "suppressed",
            AlertStatus::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(AlertStatus::Active),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            "suppressed" => Ok(AlertStatus::Suppressed),
            "expired" => Ok(AlertStatus::Expired),
            _ => Err(format!("unknown alert status: {s}")),
        }
    }
}

/// Level of the fleet hierarchy an alert applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertScope {
    Fleet,
    Tenant,
    Site,
    Agent,
    Device,
}

impl std::fmt::Display for AlertScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertScope::Fleet => "fleet",
            AlertScope::Tenant => "tenant",
            AlertScope::Site => "site",
            AlertScope::Agent => "agent",
            AlertScope::Device => "device",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AlertScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fleet" => Ok(AlertScope::Fleet),
            "tenant" => Ok(AlertScope::Tenant),
            "site" => Ok(AlertScope::Site),
            "agent" => Ok(AlertScope::Agent),
            "device" => Ok(AlertScope::Device),
            _ => Err(format!("unknown alert scope: {s}")),
        }
    }
}

/// Kind of problem an alert describes. Stored as a wire string for
/// backward-compatible persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    DeviceOffline,
    AgentOffline,
    SupplyLow,
    SupplyCritical,
    PaperJam,
    ServiceRequired,
    DeviceError,
    UsageHigh,
    MaintenanceDue,
    ConnectionFailure,
    AgentOutdated,
    AgentStorageFull,
    SiteOutage,
    FleetMassOutage,
    Custom,
}

impl AlertType {
    /// Alert types severe enough to bypass maintenance-window suppression.
    pub fn is_critical_bypass(&self) -> bool {
        matches!(
            self,
            AlertType::SupplyCritical
                | AlertType::DeviceError
                | AlertType::SiteOutage
                | AlertType::FleetMassOutage
        )
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertType::DeviceOffline => "device_offline",
            AlertType::AgentOffline => "agent_offline",
            AlertType::SupplyLow => "supply_low",
            AlertType::SupplyCritical => "supply_critical",
            AlertType::PaperJam => "paper_jam",
            AlertType::ServiceRequired => "service_required",
            AlertType::DeviceError => "device_error",
            AlertType::UsageHigh => "usage_high",
            AlertType::MaintenanceDue => "maintenance_due",
            AlertType::ConnectionFailure => "connection_failure",
            AlertType::AgentOutdated => "agent_outdated",
            AlertType::AgentStorageFull => "agent_storage_full",
            AlertType::SiteOutage => "site_outage",
            AlertType::FleetMassOutage => "fleet_mass_outage",
            AlertType::Custom => "custom",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "device_offline" => Ok(AlertType::DeviceOffline),
            "agent_offline" => Ok(AlertType::AgentOffline),
            "supply_low" => Ok(AlertType::SupplyLow),
            "supply_critical" => Ok(AlertType::SupplyCritical),
            "paper_jam" => Ok(AlertType::PaperJam),
            "service_required" => Ok(AlertType::ServiceRequired),
            "device_error" => Ok(AlertType::DeviceError),
            "usage_high" => Ok(AlertType::UsageHigh),
            "maintenance_due" => Ok(AlertType::MaintenanceDue),
            "connection_failure" => Ok(AlertType::ConnectionFailure),
            "agent_outdated" => Ok(AlertType::AgentOutdated),
            "agent_storage_full" => Ok(AlertType::AgentStorageFull),
            "site_outage" => Ok(AlertType::SiteOutage),
            "fleet_mass_outage" => Ok(AlertType::FleetMassOutage),
            "custom" => Ok(AlertType::Custom),
            _ => Err(format!("unknown alert type: {s}")),
        }
    }
}

/// Delivery transport kind for a notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Email,
    Webhook,
    Slack,
    Teams,
    Pagerduty,
    Sms,
    Push,
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChannelType::Email => "email",
            ChannelType::Webhook => "webhook",
            ChannelType::Slack => "slack",
            ChannelType::Teams => "teams",
            ChannelType::Pagerduty => "pagerduty",
            ChannelType::Sms => "sms",
            ChannelType::Push => "push",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "email" => Ok(ChannelType::Email),
            "webhook" => Ok(ChannelType::Webhook),
            "slack" => Ok(ChannelType::Slack),
            "teams" => Ok(ChannelType::Teams),
            "pagerduty" => Ok(ChannelType::Pagerduty),
            "sms" => Ok(ChannelType::Sms),
            "push" => Ok(ChannelType::Push),
            _ => Err(format!("unknown channel type: {s}")),
        }
    }
}

/// Unit a threshold rule compares against. The comparison direction depends
/// on the unit: supply percentages deplete (violation when the reading is at
/// or below the threshold), page counts and minutes accumulate (violation
/// when the reading is at or above it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdUnit {
    Percent,
    Pages,
    Minutes,
}

impl ThresholdUnit {
    pub fn violated(&self, value: f64, threshold: f64) -> bool {
        match self {
            ThresholdUnit::Percent => value <= threshold,
            ThresholdUnit::Pages | ThresholdUnit::Minutes => value >= threshold,
        }
    }
}

impl std::fmt::Display for ThresholdUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ThresholdUnit::Percent => "percent",
            ThresholdUnit::Pages => "pages",
            ThresholdUnit::Minutes => "minutes",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ThresholdUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "percent" => Ok(ThresholdUnit::Percent),
            "pages" => Ok(ThresholdUnit::Pages),
            "minutes" => Ok(ThresholdUnit::Minutes),
            _ => Err(format!("unknown threshold unit: {s}")),
        }
    }
}

/// Identifies "the same problem": at most one active alert may exist per
/// key at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    pub alert_type: AlertType,
    pub scope: AlertScope,
    pub tenant_id: Option<String>,
    pub site_id: Option<String>,
    pub agent_id: Option<String>,
    pub device_id: Option<String>,
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}",
            self.alert_type,
            self.scope,
            self.tenant_id.as_deref().unwrap_or(""),
            self.site_id.as_deref().unwrap_or(""),
            self.agent_id.as_deref().unwrap_or(""),
            self.device_id.as_deref().unwrap_or(""),
        )
    }
}

/// One detected, tracked occurrence of a problem.
///
/// Alerts are created by the rule evaluator, mutated by the lifecycle
/// manager, escalation scheduler, and notification dispatcher, and never
/// deleted: once non-active they are retained as history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub rule_id: Option<String>,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub scope: AlertScope,
    pub status: AlertStatus,
    pub tenant_id: Option<String>,
    pub site_id: Option<String>,
    pub agent_id: Option<String>,
    pub device_id: Option<String>,
    pub title: String,
    pub message: String,
    pub details: Option<String>,
    pub triggered_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Set if and only if `status == Suppressed`.
    pub suppressed_until: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Completed escalation fires. Non-decreasing while active.
    pub escalation_level: u32,
    pub last_escalated_at: Option<DateTime<Utc>>,
    pub state_change_count: u32,
    pub is_flapping: bool,
    pub parent_alert_id: Option<String>,
    pub child_count: u32,
    /// De-duplicated re-trigger attempts while active.
    pub repeat_count: u32,
    pub notifications_sent: u32,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Alert {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            alert_type: self.alert_type,
            scope: self.scope,
            tenant_id: self.tenant_id.clone(),
            site_id: self.site_id.clone(),
            agent_id: self.agent_id.clone(),
            device_id: self.device_id.clone(),
        }
    }
}

/// Payload for creating an alert. The store assigns the id and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAlert {
    pub rule_id: Option<String>,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub scope: AlertScope,
    pub tenant_id: Option<String>,
    pub site_id: Option<String>,
    pub agent_id: Option<String>,
    pub device_id: Option<String>,
    pub title: String,
    pub message: String,
    pub details: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewAlert {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            alert_type: self.alert_type,
            scope: self.scope,
            tenant_id: self.tenant_id.clone(),
            site_id: self.site_id.clone(),
            agent_id: self.agent_id.clone(),
            device_id: self.device_id.clone(),
        }
    }
}

/// A trigger definition. Referenced, never copied, by the alerts it fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub enabled: bool,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub scope: AlertScope,
    /// Empty allow-lists match everything.
    #[serde(default)]
    pub tenant_ids: Vec<String>,
    #[serde(default)]
    pub site_ids: Vec<String>,
    #[serde(default)]
    pub agent_ids: Vec<String>,
    /// Opaque condition payload for custom rules.
    #[serde(default)]
    pub condition: Option<serde_json::Value>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub threshold_unit: Option<ThresholdUnit>,
    /// Sustain window before firing; 0 fires immediately.
    pub duration_minutes: u32,
    #[serde(default)]
    pub channel_ids: Vec<String>,
    #[serde(default)]
    pub escalation_policy_id: Option<String>,
    /// Minimum gap between closing and re-triggering the same key.
    pub cooldown_minutes: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl AlertRule {
    /// Whether a fact at the given coordinates passes the rule's allow-lists.
    pub fn matches_target(
        &self,
        tenant_id: Option<&str>,
        site_id: Option<&str>,
        agent_id: Option<&str>,
    ) -> bool {
        let in_list = |list: &[String], id: Option<&str>| {
            list.is_empty() || id.is_some_and(|v| list.iter().any(|x| x == v))
        };
        in_list(&self.tenant_ids, tenant_id)
            && in_list(&self.site_ids, site_id)
            && in_list(&self.agent_ids, agent_id)
    }
}

/// One entry in an ordered escalation policy: a delay from the previous
/// fire, a channel set, and an optional repeat count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationStep {
    pub delay_minutes: u32,
    pub channel_ids: Vec<String>,
    #[serde(default)]
    pub repeat: u32,
}

/// A single planned escalation fire, flattened from a policy's steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedFire {
    pub step_index: usize,
    /// Offset from the alert's trigger time, in minutes.
    pub offset_minutes: u32,
}

/// Ordered list of timed escalation steps. An alert's `escalation_level`
/// indexes into the flattened [`fire_plan`](EscalationPolicy::fire_plan).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationPolicy {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub enabled: bool,
    pub steps: Vec<EscalationStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EscalationPolicy {
    /// Flattens the steps into the ordered fire schedule. A step with
    /// `repeat = n` fires `1 + n` times at `delay_minutes` intervals before
    /// the next step's delay starts counting.
    ///
    /// # Examples
    ///
    /// ```
    /// use fleetmon_common::types::{EscalationPolicy, EscalationStep};
    /// use chrono::Utc;
    ///
    /// let policy = EscalationPolicy {
    ///     id: "p1".into(),
    ///     name: "default".into(),
    ///     description: None,
    ///     enabled: true,
    ///     steps: vec![
    ///         EscalationStep { delay_minutes: 0, channel_ids: vec!["c1".into()], repeat: 0 },
    ///         EscalationStep { delay_minutes: 15, channel_ids: vec!["c2".into()], repeat: 1 },
    ///     ],
    ///     created_at: Utc::now(),
    ///     updated_at: Utc::now(),
    /// };
    /// let plan = policy.fire_plan();
    /// let offsets: Vec<u32> = plan.iter().map(|f| f.offset_minutes).collect();
    /// assert_eq!(offsets, vec![0, 15, 30]);
    /// ```
    pub fn fire_plan(&self) -> Vec<PlannedFire> {
        let mut plan = Vec::new();
        let mut offset = 0u32;
        for (step_index, step) in self.steps.iter().enumerate() {
            for _ in 0..=step.repeat {
                offset = offset.saturating_add(step.delay_minutes);
                plan.push(PlannedFire {
                    step_index,
                    offset_minutes: offset,
                });
            }
        }
        plan
    }
}

/// A delivery target with severity, tenant, quiet-hours, and rate-limit
/// gating. The transport config is opaque to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    pub channel_type: ChannelType,
    pub enabled: bool,
    #[serde(default)]
    pub config: serde_json::Value,
    pub min_severity: Severity,
    /// Empty means no tenant restriction.
    #[serde(default)]
    pub tenant_ids: Vec<String>,
    /// 0 means unlimited.
    pub rate_limit_per_hour: u32,
    pub sent_this_hour: u32,
    /// Start of the current rolling-hour bucket. Rolled atomically by the
    /// store when a send is reserved past the hour boundary.
    pub hour_started_at: Option<DateTime<Utc>>,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub use_quiet_hours: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A scope- and time-bounded suppression rule for alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub scope: AlertScope,
    pub tenant_id: Option<String>,
    pub site_id: Option<String>,
    pub agent_id: Option<String>,
    pub device_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub timezone: String,
    #[serde(default)]
    pub recurring: bool,
    #[serde(default)]
    pub recur_pattern: Option<String>,
    /// 0 = Sunday .. 6 = Saturday.
    #[serde(default)]
    pub recur_days: Vec<u8>,
    /// Empty allow-list matches all alert types.
    #[serde(default)]
    pub alert_types: Vec<AlertType>,
    /// Critical alerts bypass this window when set.
    pub allow_critical: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl MaintenanceWindow {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now && now <= self.end_time
    }

    /// Whether the window covers the given alert coordinates and type.
    /// A fleet-scoped window covers everything; narrower scopes require a
    /// matching target identifier at the window's level.
    pub fn covers(&self, alert: &NewAlert) -> bool {
        if !self.alert_types.is_empty() && !self.alert_types.contains(&alert.alert_type) {
            return false;
        }
        match self.scope {
            AlertScope::Fleet => true,
            AlertScope::Tenant => self.tenant_id.is_some() && self.tenant_id == alert.tenant_id,
            AlertScope::Site => self.site_id.is_some() && self.site_id == alert.site_id,
            AlertScope::Agent => self.agent_id.is_some() && self.agent_id == alert.agent_id,
            AlertScope::Device => self.device_id.is_some() && self.device_id == alert.device_id,
        }
    }

    /// Same coverage check against an existing alert (used by the one-shot
    /// retroactive sweep when a window is created).
    pub fn covers_alert(&self, alert: &Alert) -> bool {
        if !self.alert_types.is_empty() && !self.alert_types.contains(&alert.alert_type) {
            return false;
        }
        match self.scope {
            AlertScope::Fleet => true,
            AlertScope::Tenant => self.tenant_id.is_some() && self.tenant_id == alert.tenant_id,
            AlertScope::Site => self.site_id.is_some() && self.site_id == alert.site_id,
            AlertScope::Agent => self.agent_id.is_some() && self.agent_id == alert.agent_id,
            AlertScope::Device => self.device_id.is_some() && self.device_id == alert.device_id,
        }
    }
}

/// Daily time window during which non-critical notifications are withheld.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuietHours {
    pub enabled: bool,
    /// HH:MM
    pub start_time: String,
    /// HH:MM
    pub end_time: String,
    pub timezone: String,
    /// 0 = Sunday .. 6 = Saturday. Empty means every day.
    #[serde(default)]
    pub days_of_week: Vec<u8>,
    pub allow_critical: bool,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start_time: "22:00".to_string(),
            end_time: "07:00".to_string(),
            timezone: "local".to_string(),
            days_of_week: Vec::new(),
            allow_critical: true,
        }
    }
}

/// Process-wide alerting tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSettings {
    pub enabled: bool,
    pub default_cooldown_mins: u32,
    pub max_alerts_per_hour: u32,
    pub alert_retention_days: u32,
    pub aggregation_enabled: bool,
    pub aggregation_window_mins: u32,
    pub quiet_hours: QuietHours,
    pub flapping_enabled: bool,
    pub flapping_threshold: u32,
    pub flapping_window_mins: u32,
    pub grouping_enabled: bool,
    pub grouping_threshold: u32,
    pub dependencies_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_cooldown_mins: 30,
            max_alerts_per_hour: 100,
            alert_retention_days: 90,
            aggregation_enabled: false,
            aggregation_window_mins: 5,
            quiet_hours: QuietHours::default(),
            flapping_enabled: true,
            flapping_threshold: 5,
            flapping_window_mins: 10,
            grouping_enabled: true,
            grouping_threshold: 5,
            dependencies_enabled: false,
            updated_at: Utc::now(),
        }
    }
}

/// Immutable record of a status transition. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertHistoryEntry {
    pub id: String,
    pub alert_id: String,
    pub action: String,
    pub old_status: Option<AlertStatus>,
    pub new_status: Option<AlertStatus>,
    pub actor: Option<String>,
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate view of the current alert state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertSummary {
    pub active_count: u32,
    pub acknowledged_count: u32,
    pub suppressed_count: u32,
    pub resolved_today_count: u32,
    pub critical_count: u32,
    pub warning_count: u32,
    pub info_count: u32,
    pub alerts_by_type: HashMap<String, u32>,
    pub alerts_by_scope: HashMap<String, u32>,
    pub is_quiet_hours: bool,
    pub has_maintenance: bool,
}

/// Filter for alert listings. `since`/`until` are accepted as wire aliases
/// for `start`/`end`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertFilter {
    #[serde(default)]
    pub status: Option<AlertStatus>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub scope: Option<AlertScope>,
    #[serde(default)]
    pub alert_type: Option<AlertType>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default, alias = "since")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, alias = "until")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

impl AlertFilter {
    /// Whether an alert passes every set predicate. Pagination is not
    /// applied here; the store slices after filtering.
    pub fn matches(&self, alert: &Alert) -> bool {
        if self.status.is_some_and(|s| s != alert.status) {
            return false;
        }
        if self.severity.is_some_and(|s| s != alert.severity) {
            return false;
        }
        if self.scope.is_some_and(|s| s != alert.scope) {
            return false;
        }
        if self.alert_type.is_some_and(|t| t != alert.alert_type) {
            return false;
        }
        let id_matches = |want: &Option<String>, got: &Option<String>| match want {
            Some(w) => got.as_deref() == Some(w.as_str()),
            None => true,
        };
        if !id_matches(&self.tenant_id, &alert.tenant_id)
            || !id_matches(&self.site_id, &alert.site_id)
            || !id_matches(&self.agent_id, &alert.agent_id)
            || !id_matches(&self.device_id, &alert.device_id)
        {
            return false;
        }
        if self.start.is_some_and(|t| alert.triggered_at < t) {
            return false;
        }
        if self.end.is_some_and(|t| alert.triggered_at > t) {
            return false;
        }
        true
    }
}
