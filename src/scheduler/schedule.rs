//! Schedule descriptor → next-run instant.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::ScheduleError;
use crate::scheduler::task::ScheduleType;

/// Naive formats accepted for `once`, interpreted in the scheduling timezone.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// ISO-8601 forms with an explicit offset that RFC 3339 parsing rejects.
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M%:z", "%Y-%m-%dT%H:%M%z"];

/// Computes when a newly scheduled task first becomes due.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleCalculator {
    tz: Tz,
}

impl ScheduleCalculator {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Compute the next run for a descriptor, relative to `now`.
    ///
    /// `once` values are returned as given even when already in the past; the
    /// runner treats such a task as immediately due.
    pub fn next_run(
        &self,
        schedule_type: ScheduleType,
        value: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, ScheduleError> {
        match schedule_type {
            ScheduleType::Cron => self.next_cron(value, now),
            ScheduleType::Interval => next_interval(value, now),
            ScheduleType::Once => self.parse_once(value),
        }
    }

    fn next_cron(&self, expr: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        let schedule = cron::Schedule::from_str(&normalize_cron(expr)).map_err(|e| {
            ScheduleError::InvalidCron {
                expr: expr.to_string(),
                reason: e.to_string(),
            }
        })?;
        schedule
            .after(&now.with_timezone(&self.tz))
            .next()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| ScheduleError::NoUpcoming(expr.to_string()))
    }

    fn parse_once(&self, value: &str) -> Result<DateTime<Utc>, ScheduleError> {
        let value = value.trim();
        let invalid = || ScheduleError::InvalidTimestamp(value.to_string());

        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Ok(dt.with_timezone(&Utc));
        }
        if let Some(dt) = OFFSET_FORMATS
            .iter()
            .find_map(|fmt| DateTime::parse_from_str(value, fmt).ok())
        {
            return Ok(dt.with_timezone(&Utc));
        }
        if let Some(utc) = value.strip_suffix(['Z', 'z']) {
            let naive = parse_naive(utc).ok_or_else(invalid)?;
            return Ok(Utc.from_utc_datetime(&naive));
        }

        let naive = parse_naive(value).ok_or_else(invalid)?;
        match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
            // Wall time skipped by a DST jump: keep the offset from before the
            // gap, which lands the same distance past the transition.
            LocalResult::None => {
                let before = self
                    .tz
                    .offset_from_utc_datetime(&(naive - Duration::days(1)))
                    .fix();
                let utc = naive - Duration::seconds(i64::from(before.local_minus_utc()));
                Ok(Utc.from_utc_datetime(&utc))
            }
        }
    }
}

fn parse_naive(value: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn next_interval(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
    let invalid = || ScheduleError::InvalidInterval(value.to_string());
    let ms: i64 = value.trim().parse().map_err(|_| invalid())?;
    if ms <= 0 {
        return Err(invalid());
    }
    now.checked_add_signed(Duration::milliseconds(ms))
        .ok_or_else(invalid)
}

/// Convert a classic 5-field expression to the `cron` crate's dialect.
///
/// The crate wants a leading seconds field and numbers weekdays 1-7 from
/// Sunday, where classic cron uses 0-6 (with 7 also meaning Sunday). Numeric
/// weekday items are expanded and renumbered; names and `*` pass through.
/// Expressions with 6 or 7 fields are already in the crate's dialect.
pub fn normalize_cron(expr: &str) -> String {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.as_slice() {
        [minute, hour, dom, month, dow] => {
            format!("0 {minute} {hour} {dom} {month} {}", shift_weekdays(dow))
        }
        _ => expr.trim().to_string(),
    }
}

fn shift_weekdays(field: &str) -> String {
    field
        .split(',')
        .map(|item| shift_weekday_item(item).unwrap_or_else(|| item.to_string()))
        .collect::<Vec<_>>()
        .join(",")
}

/// `None` leaves the item untouched for the cron parser to accept or reject.
fn shift_weekday_item(item: &str) -> Option<String> {
    let (base, step) = match item.split_once('/') {
        Some((base, step)) => (base, step.parse::<u32>().ok().filter(|s| *s > 0)?),
        None => (item, 1),
    };
    let (lo, hi) = match base {
        "*" | "?" if step == 1 => return None,
        "*" | "?" => (0, 6),
        _ => match base.split_once('-') {
            Some((lo, hi)) => (lo.parse::<u32>().ok()?, hi.parse::<u32>().ok()?),
            None => {
                let day = base.parse::<u32>().ok()?;
                (day, if step > 1 { 6 } else { day })
            }
        },
    };
    if hi > 7 || lo > hi {
        return None;
    }

    let days: BTreeSet<u32> = (lo..=hi).step_by(step as usize).map(|d| d % 7 + 1).collect();
    Some(
        days.iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(","),
    )
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike, Weekday};

    use super::*;

    fn calc() -> ScheduleCalculator {
        ScheduleCalculator::new(chrono_tz::UTC)
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn normalize_adds_seconds_to_five_fields() {
        assert_eq!(normalize_cron("0 9 * * *"), "0 0 9 * * *");
        assert_eq!(normalize_cron("0 0 9 * * *"), "0 0 9 * * *");
    }

    #[test]
    fn normalize_renumbers_weekdays() {
        assert_eq!(normalize_cron("0 9 * * 0"), "0 0 9 * * 1");
        assert_eq!(normalize_cron("0 9 * * 7"), "0 0 9 * * 1");
        assert_eq!(normalize_cron("0 9 * * 1-5"), "0 0 9 * * 2,3,4,5,6");
        assert_eq!(normalize_cron("0 9 * * 5-7"), "0 0 9 * * 1,6,7");
        assert_eq!(normalize_cron("0 9 * * */2"), "0 0 9 * * 1,3,5,7");
        assert_eq!(normalize_cron("0 9 * * MON-FRI"), "0 0 9 * * MON-FRI");
    }

    #[test]
    fn cron_weekdays_match_classic_numbering() {
        // 2026-03-01 is a Sunday.
        let sunday = at("2026-03-01T10:00:00Z");

        let monday = calc().next_run(ScheduleType::Cron, "0 9 * * 1", sunday).unwrap();
        assert_eq!(monday, at("2026-03-02T09:00:00Z"));
        assert_eq!(monday.weekday(), Weekday::Mon);

        let next_sunday = calc().next_run(ScheduleType::Cron, "0 9 * * 0", sunday).unwrap();
        assert_eq!(next_sunday, at("2026-03-08T09:00:00Z"));
        assert_eq!(next_sunday.weekday(), Weekday::Sun);

        let friday_evening = at("2026-03-06T10:00:00Z");
        let weekday = calc()
            .next_run(ScheduleType::Cron, "0 9 * * 1-5", friday_evening)
            .unwrap();
        assert_eq!(weekday, at("2026-03-09T09:00:00Z"));
        assert_eq!(weekday.weekday(), Weekday::Mon);
    }

    #[test]
    fn cron_next_occurrence_after_now() {
        let now = at("2026-03-02T08:30:00Z");
        let next = calc()
            .next_run(ScheduleType::Cron, "0 9 * * *", now)
            .unwrap();
        assert_eq!(next, at("2026-03-02T09:00:00Z"));
    }

    #[test]
    fn cron_respects_timezone() {
        let berlin = ScheduleCalculator::new(chrono_tz::Europe::Berlin);
        // 09:00 in Berlin during CET is 08:00 UTC.
        let now = at("2026-01-15T06:00:00Z");
        let next = berlin.next_run(ScheduleType::Cron, "0 9 * * *", now).unwrap();
        assert_eq!(next, at("2026-01-15T08:00:00Z"));
    }

    #[test]
    fn cron_invalid_rejected() {
        let err = calc()
            .next_run(ScheduleType::Cron, "not a cron", Utc::now())
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidCron { .. }));
    }

    #[test]
    fn interval_adds_millis() {
        let now = at("2026-03-02T08:30:00Z");
        let next = calc()
            .next_run(ScheduleType::Interval, "60000", now)
            .unwrap();
        assert_eq!(next, at("2026-03-02T08:31:00Z"));
    }

    #[test]
    fn interval_rejects_zero_negative_and_text() {
        for bad in ["0", "-5", "abc", "", "1.5"] {
            let err = calc()
                .next_run(ScheduleType::Interval, bad, Utc::now())
                .unwrap_err();
            assert_eq!(err, ScheduleError::InvalidInterval(bad.to_string()));
        }
    }

    #[test]
    fn once_past_instant_passes_through() {
        let past = "2001-01-01T00:00:00Z";
        let next = calc()
            .next_run(ScheduleType::Once, past, Utc::now())
            .unwrap();
        assert_eq!(next, at(past));
    }

    #[test]
    fn once_naive_uses_schedule_timezone() {
        let tokyo = ScheduleCalculator::new(chrono_tz::Asia::Tokyo);
        let next = tokyo
            .next_run(ScheduleType::Once, "2026-05-01T09:00:00", Utc::now())
            .unwrap();
        assert_eq!(next, at("2026-05-01T00:00:00Z"));
        assert_eq!(next.hour(), 0);
    }

    #[test]
    fn once_offset_without_seconds() {
        let utc = calc()
            .next_run(ScheduleType::Once, "2030-01-01T09:00Z", Utc::now())
            .unwrap();
        assert_eq!(utc, at("2030-01-01T09:00:00Z"));

        let offset = calc()
            .next_run(ScheduleType::Once, "2030-01-01T09:00+02:00", Utc::now())
            .unwrap();
        assert_eq!(offset, at("2030-01-01T07:00:00Z"));
    }

    #[test]
    fn once_in_dst_gap_moves_forward() {
        // Berlin skips 02:00-03:00 on 2026-03-29; 02:30 becomes 03:30 CEST.
        let berlin = ScheduleCalculator::new(chrono_tz::Europe::Berlin);
        let next = berlin
            .next_run(ScheduleType::Once, "2026-03-29T02:30:00", Utc::now())
            .unwrap();
        assert_eq!(next, at("2026-03-29T01:30:00Z"));
    }

    #[test]
    fn once_garbage_rejected() {
        let err = calc()
            .next_run(ScheduleType::Once, "tomorrow-ish", Utc::now())
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidTimestamp(_)));
    }
}
