//! Semantic checks for `opening_hours` and `special_hours`
//!
//! Runs after schema validation, so field shapes are already known good.
//! Times are `HHMM`; an omitted `end` means midnight at the end of the day.
//! A window whose start is later than a non-midnight end runs overnight and
//! also occupies `[0000, end]` on the following day. Windows on the same day
//! may not overlap. `is_overnight` is computed here and written back.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde_json::{Map, Value};

const MIDNIGHT: &str = "0000";
const DAY_MINUTES: u32 = 24 * 60;

/// Leap year so that `02-29` is a valid special day
const REFERENCE_YEAR: i32 = 2000;

fn minutes(hhmm: &str) -> Result<u32, String> {
    let valid = hhmm.len() == 4 && hhmm.bytes().all(|b| b.is_ascii_digit());
    if !valid {
        return Err(format!("invalid time '{}'", hhmm));
    }
    let h: u32 = hhmm[..2].parse().map_err(|_| format!("invalid time '{}'", hhmm))?;
    let m: u32 = hhmm[2..].parse().map_err(|_| format!("invalid time '{}'", hhmm))?;
    if h > 23 || m > 59 {
        return Err(format!("invalid time '{}'", hhmm));
    }
    Ok(h * 60 + m)
}

/// A window resolved against its own day, plus its spill into the next day
struct Resolved {
    start: u32,
    end: u32,
    spill_end: Option<u32>,
    is_overnight: bool,
}

fn resolve(start: &str, end: Option<&str>) -> Result<Resolved, String> {
    let end = end.unwrap_or(MIDNIGHT);
    let is_overnight = end != MIDNIGHT && start > end;
    let start_min = minutes(start)?;
    let end_min = minutes(end)?;

    if is_overnight {
        return Ok(Resolved {
            start: start_min,
            end: DAY_MINUTES,
            spill_end: Some(end_min),
            is_overnight,
        });
    }

    let end_min = if end == MIDNIGHT { DAY_MINUTES } else { end_min };
    if start_min >= end_min {
        return Err(format!("window {}-{} is empty", start, end));
    }
    Ok(Resolved {
        start: start_min,
        end: end_min,
        spill_end: None,
        is_overnight,
    })
}

fn check_overlaps<K: std::fmt::Display>(field: &str, days: BTreeMap<K, Vec<(u32, u32)>>) -> Result<(), String> {
    for (day, mut windows) in days {
        windows.sort();
        for pair in windows.windows(2) {
            if pair[0].1 > pair[1].0 {
                return Err(format!("{}: overlapping windows on day {}", field, day));
            }
        }
    }
    Ok(())
}

fn entries<'a>(attrs: &'a mut Map<String, Value>, field: &str) -> Option<&'a mut Vec<Value>> {
    attrs.get_mut(field).and_then(Value::as_array_mut)
}

fn str_field<'a>(entry: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    entry.get(key).and_then(Value::as_str)
}

/// Validate weekly `opening_hours` (`day` 0..=6)
pub fn check_opening_hours(attrs: &mut Map<String, Value>) -> Result<(), String> {
    const FIELD: &str = "opening_hours";
    let Some(list) = entries(attrs, FIELD) else {
        return Ok(());
    };

    let mut days: BTreeMap<u64, Vec<(u32, u32)>> = BTreeMap::new();
    for entry in list.iter_mut() {
        let Some(entry) = entry.as_object_mut() else {
            return Err(format!("{}: entries must be objects", FIELD));
        };
        let day = entry
            .get("day")
            .and_then(Value::as_u64)
            .filter(|d| *d <= 6)
            .ok_or_else(|| format!("{}: day must be 0-6", FIELD))?;
        let start = str_field(entry, "start").ok_or_else(|| format!("{}: start is required", FIELD))?;
        let window = resolve(start, str_field(entry, "end")).map_err(|e| format!("{}: {}", FIELD, e))?;

        days.entry(day).or_default().push((window.start, window.end));
        if let Some(end) = window.spill_end {
            days.entry((day + 1) % 7).or_default().push((0, end));
        }
        entry.insert("is_overnight".into(), Value::Bool(window.is_overnight));
    }

    check_overlaps(FIELD, days)
}

fn parse_special_day(raw: &str) -> Result<NaiveDate, String> {
    let (m, d) = raw
        .split_once('-')
        .ok_or_else(|| format!("invalid date '{}'", raw))?;
    let month: u32 = m.parse().map_err(|_| format!("invalid date '{}'", raw))?;
    let day: u32 = d.parse().map_err(|_| format!("invalid date '{}'", raw))?;
    NaiveDate::from_ymd_opt(REFERENCE_YEAR, month, day).ok_or_else(|| format!("invalid date '{}'", raw))
}

fn month_day(date: NaiveDate) -> String {
    format!("{:02}-{:02}", date.month(), date.day())
}

/// Validate date-specific `special_hours` (`day` as `MM-DD`)
pub fn check_special_hours(attrs: &mut Map<String, Value>) -> Result<(), String> {
    const FIELD: &str = "special_hours";
    let Some(list) = entries(attrs, FIELD) else {
        return Ok(());
    };

    let mut days: BTreeMap<String, Vec<(u32, u32)>> = BTreeMap::new();
    for entry in list.iter_mut() {
        let Some(entry) = entry.as_object_mut() else {
            return Err(format!("{}: entries must be objects", FIELD));
        };
        let raw_day = str_field(entry, "day").ok_or_else(|| format!("{}: day is required", FIELD))?;
        let date = parse_special_day(raw_day).map_err(|e| format!("{}: {}", FIELD, e))?;
        let closed = entry.get("closed").and_then(Value::as_bool).unwrap_or(false);

        if closed {
            if entry.contains_key("start") || entry.contains_key("end") {
                return Err(format!("{}: closed day {} cannot have times", FIELD, raw_day));
            }
            continue;
        }

        let start = str_field(entry, "start")
            .ok_or_else(|| format!("{}: start is required unless closed", FIELD))?;
        let window = resolve(start, str_field(entry, "end")).map_err(|e| format!("{}: {}", FIELD, e))?;

        days.entry(month_day(date)).or_default().push((window.start, window.end));
        if let Some(end) = window.spill_end {
            let next = date.succ_opt().unwrap_or(date);
            days.entry(month_day(next)).or_default().push((0, end));
        }
        entry.insert("is_overnight".into(), Value::Bool(window.is_overnight));
    }

    check_overlaps(FIELD, days)
}

/// Run every hours check over an item's attrs
pub fn check_hours(attrs: &mut Map<String, Value>) -> Result<(), String> {
    check_opening_hours(attrs)?;
    check_special_hours(attrs)
}
