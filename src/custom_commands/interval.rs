use chrono::{DateTime, Datelike, Duration, DurationRound, Timelike, Utc};
use std::str::FromStr;

use super::types::{CronSchedule, CustomCommand, IntervalSchedule, TimeExclusions, Trigger};
use crate::constants::{MAX_INTERVAL_MINUTES, MIN_INTERVAL_MINUTES};
use crate::error::CcError;

/// Upper bound on hour jumps while searching cron occurrences (a bit over a year)
const CRON_SEARCH_STEPS: usize = 9_000;

/// Next run for a timed command, `None` when it should never run
pub fn next_run_time(cmd: &CustomCommand, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, CcError> {
    match &cmd.trigger {
        Trigger::Interval(schedule) => Ok(next_interval_run(schedule, cmd.last_run, now)),
        Trigger::Cron(schedule) => next_cron_run(schedule, now),
        _ => Ok(None),
    }
}

/// Next run for an interval schedule.
///
/// Starts at `last_run + interval`, catches up to `now` if that already passed, then
/// skips excluded weekdays (resetting to midnight) and excluded hours.
pub fn next_interval_run(
    schedule: &IntervalSchedule,
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if !(MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES).contains(&schedule.minutes) {
        return None;
    }

    let exclusions = &schedule.exclusions;
    if !is_satisfiable(exclusions) {
        return None;
    }

    let interval = Duration::minutes(i64::from(schedule.minutes));
    let mut next = match last_run {
        Some(last) => last + interval,
        None => now,
    };
    if next < now {
        next = now;
    }

    // Hour skipping can cross midnight into an excluded day, so run both passes twice
    next = skip_excluded_days(next, &exclusions.weekdays, true);
    next = skip_excluded_hours(next, &exclusions.hours);
    next = skip_excluded_days(next, &exclusions.weekdays, true);
    next = skip_excluded_hours(next, &exclusions.hours);

    Some(next)
}

/// First occurrence of a cron schedule after `now` outside the excluded days and hours
pub fn next_cron_run(schedule: &CronSchedule, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, CcError> {
    let parsed = parse_cron(&schedule.expression)?;
    let exclusions = &schedule.exclusions;
    if !is_satisfiable(exclusions) {
        return Ok(None);
    }

    let mut cursor = now;
    for _ in 0..CRON_SEARCH_STEPS {
        let Some(candidate) = parsed.after(&cursor).next() else {
            return Ok(None);
        };

        if is_excluded_day(candidate, &exclusions.weekdays) {
            cursor = start_of_day(candidate) + Duration::days(1) - Duration::seconds(1);
        } else if exclusions.hours.contains(&(candidate.hour() as u8)) {
            cursor = start_of_hour(candidate) + Duration::hours(1) - Duration::seconds(1);
        } else {
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}

/// Parse a cron expression.
///
/// Five-field expressions use standard numbering (Sunday = 0 or 7) and are converted to the
/// `cron` crate's form; six and seven field forms pass through unchanged.
pub fn parse_cron(expression: &str) -> Result<cron::Schedule, CcError> {
    let invalid = || CcError::InvalidCron(expression.to_string());

    let fields: Vec<&str> = expression.split_whitespace().collect();
    let full = if fields.len() == 5 {
        let weekdays = crate_weekday_field(fields[4]).ok_or_else(invalid)?;
        format!("0 {} {} {} {} {}", fields[0], fields[1], fields[2], fields[3], weekdays)
    } else {
        expression.trim().to_string()
    };
    cron::Schedule::from_str(&full).map_err(|_| invalid())
}

/// Rewrite a standard day-of-week field (0-7, Sunday = 0 and 7) into the `cron` crate's
/// 1-7 numbering with Sunday = 1. Day names pass through.
fn crate_weekday_field(field: &str) -> Option<String> {
    if field == "*" || field == "?" {
        return Some(field.to_string());
    }

    let mut items = Vec::new();
    for item in field.split(',') {
        if item.chars().any(|c| c.is_ascii_alphabetic()) {
            items.push(item.to_string());
            continue;
        }

        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, step.parse::<usize>().ok().filter(|s| *s > 0)?),
            None => (item, 1),
        };
        let (start, end) = if range == "*" {
            (0, 6)
        } else if let Some((a, b)) = range.split_once('-') {
            (a.parse::<u8>().ok()?, b.parse::<u8>().ok()?)
        } else {
            let day = range.parse::<u8>().ok()?;
            if item.contains('/') { (day, 6) } else { (day, day) }
        };
        if start > end || end > 7 {
            return None;
        }

        let mut days: Vec<u8> = (start..=end).step_by(step).map(|d| d % 7 + 1).collect();
        days.sort_unstable();
        days.dedup();
        items.extend(days.iter().map(u8::to_string));
    }
    Some(items.join(","))
}

/// A schedule that excludes every weekday or every hour can never run
fn is_satisfiable(exclusions: &TimeExclusions) -> bool {
    let all_days = (0..7u8).all(|d| exclusions.weekdays.contains(&d));
    let all_hours = (0..24u8).all(|h| exclusions.hours.contains(&h));
    !all_days && !all_hours
}

fn is_excluded_day(t: DateTime<Utc>, weekdays: &[u8]) -> bool {
    weekdays.contains(&(t.weekday().num_days_from_sunday() as u8))
}

fn skip_excluded_days(mut t: DateTime<Utc>, weekdays: &[u8], reset_clock: bool) -> DateTime<Utc> {
    let mut moved = false;
    for _ in 0..7 {
        if !is_excluded_day(t, weekdays) {
            break;
        }
        t += Duration::days(1);
        moved = true;
    }

    if moved && reset_clock {
        t = start_of_day(t);
    }
    t
}

fn skip_excluded_hours(mut t: DateTime<Utc>, hours: &[u8]) -> DateTime<Utc> {
    for _ in 0..24 {
        if !hours.contains(&(t.hour() as u8)) {
            break;
        }
        t += Duration::hours(1);
    }
    t
}

fn start_of_day(t: DateTime<Utc>) -> DateTime<Utc> {
    t.duration_trunc(Duration::days(1)).unwrap_or(t)
}

fn start_of_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    t.duration_trunc(Duration::hours(1)).unwrap_or(t)
}
