//! Expansion of scheduled events into concrete occurrences.
//!
//! Occurrences keep the time of day of the event's start date. An
//! occurrence is returned when any part of `[start, start + duration)` falls
//! inside the window; zero-length occurrences count when their start does.

use chrono::{DateTime, Datelike, Months, NaiveDate, TimeDelta, Utc, Weekday};
use cookline_model::{DayRule, EventSegments, Recurrence, RecurrenceMode, ScheduledEvent};
use serde::{Deserialize, Serialize};

/// Upper bound on recurrence steps for a single event and window.
const MAX_STEPS: usize = 10_000;

/// One concrete run of a scheduled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub event_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub segments: EventSegments,
}

struct Window {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    duration: TimeDelta,
}

impl Window {
    fn admits(&self, start: DateTime<Utc>) -> bool {
        start < self.end && (start >= self.start || start + self.duration > self.start)
    }

    /// Earliest start that can still overlap the window.
    fn earliest_start(&self) -> DateTime<Utc> {
        self.start - self.duration
    }
}

/// Occurrences of `event` overlapping `[window_start, window_end)`, in
/// chronological order. Removed and paused events have none.
pub fn expand_occurrences(
    event: &ScheduledEvent,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<Occurrence> {
    if !event.is_active() || window_end <= window_start {
        return Vec::new();
    }
    let window = Window {
        start: window_start,
        end: window_end,
        duration: TimeDelta::seconds(event.duration_secs.max(0)),
    };
    let rule = &event.recurring;
    let every_n = rule.every_n.max(1);

    let starts = match rule.mode {
        RecurrenceMode::None => vec![event.start_date],
        RecurrenceMode::Days => day_steps(event.start_date, &window, every_n),
        RecurrenceMode::Weeks => week_steps(event.start_date, &window, rule, every_n),
        RecurrenceMode::Months => month_steps(event.start_date, &window, rule, every_n, 1),
        RecurrenceMode::Years => month_steps(event.start_date, &window, rule, every_n, 12),
    };

    starts
        .into_iter()
        .filter(|start| window.admits(*start))
        .map(|start| Occurrence {
            event_id: event.id.clone(),
            start,
            end: start + window.duration,
            segments: event.segments.clone(),
        })
        .collect()
}

/// Whole periods of `period_days` that end before the window can be hit.
fn skipped_periods(anchor: DateTime<Utc>, window: &Window, period_days: i64) -> i64 {
    let gap = (window.earliest_start() - anchor).num_days();
    if gap <= 0 { 0 } else { gap / period_days }
}

fn day_steps(anchor: DateTime<Utc>, window: &Window, every_n: u32) -> Vec<DateTime<Utc>> {
    let step = i64::from(every_n);
    let mut current = anchor + TimeDelta::days(skipped_periods(anchor, window, step) * step);
    let mut out = Vec::new();
    while current < window.end && out.len() < MAX_STEPS {
        out.push(current);
        current += TimeDelta::days(step);
    }
    out
}

/// Walks day by day through the first week of every `every_n`-week cycle,
/// emitting on allowed weekdays.
fn week_steps(anchor: DateTime<Utc>, window: &Window, rule: &Recurrence, every_n: u32) -> Vec<DateTime<Utc>> {
    let allowed: Vec<Weekday> = if rule.weekdays.is_empty() {
        vec![anchor.weekday()]
    } else {
        rule.weekdays.clone()
    };
    let cycle = 7 * i64::from(every_n);
    let mut offset = skipped_periods(anchor, window, cycle) * cycle;
    let mut out = Vec::new();
    for _ in 0..MAX_STEPS {
        let current = anchor + TimeDelta::days(offset);
        if current >= window.end {
            break;
        }
        if allowed.contains(&current.weekday()) {
            out.push(current);
        }
        offset += 1;
        if offset % cycle == 7 {
            offset += cycle - 7;
        }
    }
    out
}

/// Monthly (`stride_months == 1`) or yearly (`stride_months == 12`)
/// recurrence. Yearly rules pin the month to `rule.month`, defaulting to the
/// anchor's month.
fn month_steps(
    anchor: DateTime<Utc>,
    window: &Window,
    rule: &Recurrence,
    every_n: u32,
    stride_months: u32,
) -> Vec<DateTime<Utc>> {
    let day_rule = rule.day_rule.unwrap_or(DayRule::DayOfMonth { day: anchor.day() });
    let first_month = if stride_months == 12 {
        let month = rule.month.filter(|m| (1..=12).contains(m)).unwrap_or(anchor.month());
        NaiveDate::from_ymd_opt(anchor.year(), month, 1)
    } else {
        NaiveDate::from_ymd_opt(anchor.year(), anchor.month(), 1)
    };
    let Some(first_month) = first_month else {
        return Vec::new();
    };

    let step = stride_months * every_n;
    let mut out = Vec::new();
    let mut month = first_month;
    for _ in 0..MAX_STEPS {
        if month.and_time(anchor.time()).and_utc() >= window.end {
            break;
        }
        if let Some(day) = select_day(month, day_rule) {
            let candidate = day.and_time(anchor.time()).and_utc();
            if candidate >= anchor && candidate >= window.earliest_start() {
                out.push(candidate);
            }
        }
        match month.checked_add_months(Months::new(step)) {
            Some(next) => month = next,
            None => break,
        }
    }
    out
}

/// The day `rule` selects within the month starting at `month`.
fn select_day(month: NaiveDate, rule: DayRule) -> Option<NaiveDate> {
    match rule {
        DayRule::DayOfMonth { day } => NaiveDate::from_ymd_opt(month.year(), month.month(), day),
        DayRule::NthWeekday { nth, weekday } => match nth {
            1..=4 => NaiveDate::from_weekday_of_month_opt(month.year(), month.month(), weekday, nth as u8),
            -1 | 5 => NaiveDate::from_weekday_of_month_opt(month.year(), month.month(), weekday, 5)
                .or_else(|| NaiveDate::from_weekday_of_month_opt(month.year(), month.month(), weekday, 4)),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cookline_model::decode;
    use serde_json::json;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()
    }

    fn event(recurring: serde_json::Value, start: &str) -> ScheduledEvent {
        decode(&json!({
            "id": "ev",
            "startDate": start,
            "durationSecs": 3600,
            "recurring": recurring,
        }))
        .unwrap()
    }

    fn days_of(occurrences: &[Occurrence]) -> Vec<u32> {
        occurrences.iter().map(|o| o.start.day()).collect()
    }

    #[test]
    fn non_recurring_event_occurs_once() {
        let ev = event(json!({"mode": "none"}), "2025-03-05T10:00:00Z");
        let occ = expand_occurrences(&ev, at(2025, 3, 1), at(2025, 3, 31));
        assert_eq!(occ.len(), 1);
        assert_eq!(occ[0].end - occ[0].start, TimeDelta::hours(1));
        assert!(expand_occurrences(&ev, at(2025, 3, 6), at(2025, 3, 31)).is_empty());
    }

    #[test]
    fn running_occurrence_at_window_start_is_included() {
        let ev = event(json!({"mode": "none"}), "2025-03-05T09:30:00Z");
        let occ = expand_occurrences(&ev, at(2025, 3, 5), at(2025, 3, 31));
        assert_eq!(occ.len(), 1);
    }

    #[test]
    fn every_three_days() {
        let ev = event(json!({"mode": "days", "everyN": 3}), "2025-02-20T10:00:00Z");
        let occ = expand_occurrences(&ev, at(2025, 3, 1), at(2025, 3, 11));
        // 20 Feb + 9 days = 1 Mar
        assert_eq!(days_of(&occ), vec![1, 4, 7, 10]);
    }

    #[test]
    fn mondays_and_thursdays_over_two_weeks() {
        // 3 March 2025 is a Monday.
        let ev = event(
            json!({"mode": "weeks", "everyN": 1, "weekdays": ["Mon", "Thu"]}),
            "2025-03-03T10:00:00Z",
        );
        let occ = expand_occurrences(&ev, at(2025, 3, 3), at(2025, 3, 17));
        assert_eq!(days_of(&occ), vec![3, 6, 10, 13]);
    }

    #[test]
    fn every_other_week_skips_a_week() {
        let ev = event(
            json!({"mode": "weeks", "everyN": 2, "weekdays": ["Mon"]}),
            "2025-03-03T10:00:00Z",
        );
        let occ = expand_occurrences(&ev, at(2025, 3, 3), at(2025, 4, 1));
        assert_eq!(days_of(&occ), vec![3, 17, 31]);
    }

    #[test]
    fn day_of_month_skips_short_months() {
        let ev = event(
            json!({"mode": "months", "dayRule": {"mode": "dayOfMonth", "day": 31}}),
            "2025-01-31T10:00:00Z",
        );
        let occ = expand_occurrences(&ev, at(2025, 1, 1), at(2025, 6, 1));
        let months: Vec<u32> = occ.iter().map(|o| o.start.month()).collect();
        assert_eq!(months, vec![1, 3, 5]);
    }

    #[test]
    fn last_friday_of_month() {
        let ev = event(
            json!({"mode": "months", "dayRule": {"mode": "nthWeekday", "nth": -1, "weekday": "Fri"}}),
            "2025-01-01T10:00:00Z",
        );
        let occ = expand_occurrences(&ev, at(2025, 1, 1), at(2025, 3, 1));
        assert_eq!(days_of(&occ), vec![31, 28]);
    }

    #[test]
    fn yearly_in_fixed_month() {
        let ev = event(
            json!({"mode": "years", "month": 12, "dayRule": {"mode": "dayOfMonth", "day": 25}}),
            "2020-06-01T10:00:00Z",
        );
        let occ = expand_occurrences(&ev, at(2025, 1, 1), at(2026, 1, 1));
        assert_eq!(occ.len(), 1);
        assert_eq!(occ[0].start, at(2025, 12, 25));
    }

    #[test]
    fn paused_event_has_no_occurrences() {
        let mut ev = event(json!({"mode": "days"}), "2025-03-01T10:00:00Z");
        ev.paused = true;
        assert!(expand_occurrences(&ev, at(2025, 3, 1), at(2025, 3, 31)).is_empty());
    }
}
