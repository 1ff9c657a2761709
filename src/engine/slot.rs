use chrono::{Datelike, NaiveDateTime};

use crate::config::BusinessHours;
use crate::timestamp;

use super::EngineError;

/// Parse `raw` and check it against the operating window and the clock.
/// Returns the parsed start on success.
pub fn validate_slot(
    raw: &str,
    duration_min: u32,
    now: NaiveDateTime,
    hours: &BusinessHours,
) -> Result<NaiveDateTime, EngineError> {
    let start =
        timestamp::parse(raw).ok_or_else(|| EngineError::InvalidTimestamp(raw.to_string()))?;
    check_slot(start, duration_min, now, hours)?;
    Ok(start)
}

/// Rules in order; the first that fails is reported.
pub fn check_slot(
    start: NaiveDateTime,
    duration_min: u32,
    now: NaiveDateTime,
    hours: &BusinessHours,
) -> Result<(), EngineError> {
    let weekday = start.weekday();
    if weekday == hours.closed_day {
        return Err(EngineError::ClosedDay(weekday));
    }
    let begins_at = timestamp::minute_of_day(start);
    if begins_at < hours.opens_at {
        return Err(EngineError::BeforeOpening {
            opens_at: hours.opens_at,
        });
    }
    let ends_at = begins_at.saturating_add(duration_min);
    if ends_at > hours.closes_at {
        return Err(EngineError::ClosesBeforeFinish {
            ends_at,
            closes_at: hours.closes_at,
        });
    }
    if start.date() < now.date() {
        return Err(EngineError::PastDate);
    }
    if start.date() == now.date() && start < now {
        return Err(EngineError::PastTime);
    }
    Ok(())
}
