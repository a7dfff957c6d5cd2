//! Minimal cron-style schedule matching (spec §4.6 "cron-like(expr)").
//!
//! Supports the five standard fields (`minute hour day-of-month month
//! day-of-week`), each either `*`, a step (`*/n`), or a comma list of
//! values. No ranges (`1-5`), no named months/weekdays — enough to express
//! the common "every N minutes/hours" and "at HH:MM on weekday W" shapes
//! without pulling in a dedicated cron dependency the teacher never reached
//! for.

use chrono::{Datelike, Duration as ChronoDuration, Timelike};

use crate::error::{Result, TaskmeshError};

/// One cron field's accepted values.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Any,
    Step(u32),
    List(Vec<u32>),
}

impl Field {
    fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw == "*" {
            return Ok(Field::Any);
        }
        if let Some(step) = raw.strip_prefix("*/") {
            let n: u32 = step
                .parse()
                .map_err(|_| TaskmeshError::ParseError(format!("invalid cron step: {raw}")))?;
            if n == 0 {
                return Err(TaskmeshError::ParseError("cron step must be positive".into()));
            }
            return Ok(Field::Step(n));
        }
        let values: Result<Vec<u32>> = raw
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<u32>()
                    .map_err(|_| TaskmeshError::ParseError(format!("invalid cron field: {raw}")))
            })
            .collect();
        Ok(Field::List(values?))
    }

    fn matches(&self, value: u32) -> bool {
        match self {
            Field::Any => true,
            Field::Step(n) => value % n == 0,
            Field::List(values) => values.contains(&value),
        }
    }
}

/// A parsed 5-field cron-like expression: `minute hour day-of-month month
/// day-of-week`.
#[derive(Debug, Clone)]
pub struct CronExpr {
    raw: String,
    minute: Field,
    hour: Field,
    day_of_month: Field,
    month: Field,
    day_of_week: Field,
}

/// Upper bound on how far ahead `next_after` searches before giving up.
/// One non-leap year of minutes; enough for any field combination that
/// actually occurs (a field combination that never occurs, like day 31 in
/// February every year, will exhaust this and return `None`).
const MAX_SEARCH_MINUTES: i64 = 366 * 24 * 60;

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(TaskmeshError::ParseError(format!(
                "cron expression must have 5 fields, got {}: {expr}",
                fields.len()
            )));
        }
        Ok(Self {
            raw: expr.to_string(),
            minute: Field::parse(fields[0])?,
            hour: Field::parse(fields[1])?,
            day_of_month: Field::parse(fields[2])?,
            month: Field::parse(fields[3])?,
            day_of_week: Field::parse(fields[4])?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Earliest minute-aligned instant strictly after `after` that matches
    /// every field. `None` if nothing matches within the search horizon.
    pub fn next_after(&self, after: chrono::DateTime<chrono::Utc>) -> Option<chrono::DateTime<chrono::Utc>> {
        let mut candidate = (after + ChronoDuration::minutes(1))
            .with_second(0)
            .and_then(|d| d.with_nanosecond(0))?;
        for _ in 0..MAX_SEARCH_MINUTES {
            let weekday = candidate.weekday().num_days_from_sunday();
            if self.minute.matches(candidate.minute())
                && self.hour.matches(candidate.hour())
                && self.day_of_month.matches(candidate.day())
                && self.month.matches(candidate.month())
                && self.day_of_week.matches(weekday)
            {
                return Some(candidate);
            }
            candidate += ChronoDuration::minutes(1);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn every_five_minutes() {
        let expr = CronExpr::parse("*/5 * * * *").unwrap();
        let start = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 10, 2, 30).unwrap();
        let next = expr.next_after(start).unwrap();
        assert_eq!(next, chrono::Utc.with_ymd_and_hms(2026, 1, 1, 10, 5, 0).unwrap());
    }

    #[test]
    fn fixed_time_of_day() {
        let expr = CronExpr::parse("30 9 * * *").unwrap();
        let start = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        let next = expr.next_after(start).unwrap();
        assert_eq!(next, chrono::Utc.with_ymd_and_hms(2026, 1, 2, 9, 30, 0).unwrap());
    }

    #[test]
    fn specific_weekday_list() {
        // 2026-01-05 is a Monday.
        let expr = CronExpr::parse("0 0 * * 1,3,5").unwrap();
        let start = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let next = expr.next_after(start).unwrap();
        assert_eq!(next, chrono::Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap());
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(CronExpr::parse("* * *").is_err());
    }

    #[test]
    fn rejects_zero_step() {
        assert!(CronExpr::parse("*/0 * * * *").is_err());
    }
}
