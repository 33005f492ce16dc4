//! Quiet-hours evaluation.
//!
//! A pure membership check: given a [`QuietHours`] config and an instant,
//! decide whether the instant falls inside the configured daily window.
//! Configuration mistakes (bad `HH:MM` strings, unknown timezone names)
//! degrade to "not quiet" so a typo can never silently disable alerting.

use crate::types::QuietHours;
use chrono::{DateTime, Datelike, Local, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

/// Parses `HH:MM` into minutes since midnight. Fail-open: `None` on any
/// malformed input (missing colon, non-numeric parts, out-of-range values).
fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.split_once(':')?;
    let hour: u32 = h.trim().parse().ok()?;
    let min: u32 = m.trim().parse().ok()?;
    if hour > 23 || min > 59 {
        return None;
    }
    Some(hour * 60 + min)
}

/// Local wall-clock coordinates of `now` in the configured zone:
/// (minutes since midnight, weekday with 0 = Sunday).
///
/// `"local"`, the empty string, and unresolvable names fall back to the
/// evaluation host's local zone; this never errors.
fn local_coordinates(timezone: &str, now: DateTime<Utc>) -> (u32, u8) {
    if !timezone.is_empty() && timezone != "local" {
        if let Ok(tz) = Tz::from_str(timezone) {
            let local = tz.from_utc_datetime(&now.naive_utc());
            return (
                local.hour() * 60 + local.minute(),
                local.weekday().num_days_from_sunday() as u8,
            );
        }
    }
    let local = now.with_timezone(&Local);
    (
        local.hour() * 60 + local.minute(),
        local.weekday().num_days_from_sunday() as u8,
    )
}

/// Whether `now` falls inside the quiet window.
///
/// Overnight windows wrap midnight: with `start > end`, membership is
/// `now >= start || now < end`.
///
/// # Examples
///
/// ```
/// use fleetmon_common::quiet::is_quiet_at;
/// use fleetmon_common::types::QuietHours;
/// use chrono::{TimeZone, Utc};
///
/// let qh = QuietHours {
///     enabled: true,
///     start_time: "22:00".into(),
///     end_time: "06:00".into(),
///     timezone: "UTC".into(),
///     days_of_week: vec![],
///     allow_critical: true,
/// };
/// let late = Utc.with_ymd_and_hms(2024, 3, 4, 23, 30, 0).unwrap();
/// let midday = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
/// assert!(is_quiet_at(&qh, late));
/// assert!(!is_quiet_at(&qh, midday));
/// ```
pub fn is_quiet_at(config: &QuietHours, now: DateTime<Utc>) -> bool {
    if !config.enabled {
        return false;
    }

    let (Some(start), Some(end)) = (
        parse_hhmm(&config.start_time),
        parse_hhmm(&config.end_time),
    ) else {
        return false;
    };

    let (current, weekday) = local_coordinates(&config.timezone, now);

    if !config.days_of_week.is_empty() && !config.days_of_week.contains(&weekday) {
        return false;
    }

    if start > end {
        current >= start || current < end
    } else {
        start <= current && current < end
    }
}
