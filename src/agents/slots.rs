//! Service-slot synthesis.
//!
//! Expands a center's weekly operating hours, expressed in the center's
//! timezone, into hourly UTC instants. Slots are carried on the wire as
//! `YYYY-MM-DDTHH:MM:SSZ` strings.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;

use crate::types::{DayHours, ServiceCenter};

/// Wire format for slot instants.
pub fn format_slot(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub fn parse_slot(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn day_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

fn parse_hhmm(raw: &str) -> Option<(u32, u32)> {
    let (h, m) = raw.split_once(':')?;
    Some((h.parse().ok()?, m.parse().ok()?))
}

fn center_tz(timezone: &str) -> Tz {
    timezone.parse().unwrap_or(Tz::UTC)
}

/// Hourly UTC slots for the next `days_ahead` days, starting tomorrow,
/// inside the per-day operating window. Days missing from the schedule
/// use the 09:00–18:00 default.
pub fn expand_operating_hours(
    operating_hours: &BTreeMap<String, DayHours>,
    timezone: &str,
    start: DateTime<Utc>,
    days_ahead: u32,
) -> Vec<String> {
    let tz = center_tz(timezone);
    let default_hours = DayHours::default();
    let mut slots = Vec::new();

    for day_offset in 1..=i64::from(days_ahead) {
        let slot_date = (start + Duration::days(day_offset)).date_naive();
        let hours = operating_hours
            .get(day_name(slot_date.weekday()))
            .unwrap_or(&default_hours);
        let Some((start_hour, _)) = parse_hhmm(&hours.start) else {
            continue;
        };
        let Some((end_hour, _)) = parse_hhmm(&hours.end) else {
            continue;
        };

        for hour in start_hour..end_hour {
            let Some(naive) = slot_date.and_hms_opt(hour, 0, 0) else {
                continue;
            };
            // DST gaps make some local times unrepresentable; skip them.
            let Some(local) = tz.from_local_datetime(&naive).earliest() else {
                continue;
            };
            slots.push(format_slot(local.with_timezone(&Utc)));
        }
    }
    slots
}

/// Whether a slot instant falls inside the center's operating window.
pub fn slot_within_operating_hours(slot: &str, center: &ServiceCenter) -> bool {
    let Some(at) = parse_slot(slot) else {
        return false;
    };
    let local = at.with_timezone(&center_tz(&center.timezone));
    let default_hours = DayHours::default();
    let hours = center
        .operating_hours
        .get(day_name(local.weekday()))
        .unwrap_or(&default_hours);
    let (Some((start_hour, _)), Some((end_hour, _))) =
        (parse_hhmm(&hours.start), parse_hhmm(&hours.end))
    else {
        return false;
    };
    (start_hour..end_hour).contains(&local.hour())
}
