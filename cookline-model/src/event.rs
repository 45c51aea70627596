use crate::offer::OfferOverride;
use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How an event repeats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceMode {
    #[default]
    None,
    Days,
    Weeks,
    Months,
    Years,
}

/// Day selection for monthly and yearly recurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum DayRule {
    /// A fixed day of the month (1-31). Months without that day are skipped.
    DayOfMonth { day: u32 },
    /// The `nth` occurrence of `weekday` in the month; `-1` (or 5 when the
    /// month has only four) selects the last one.
    NthWeekday { nth: i32, weekday: Weekday },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recurrence {
    #[serde(default)]
    pub mode: RecurrenceMode,
    /// Interval between repetitions in units of `mode`.
    #[serde(default = "default_every_n")]
    pub every_n: u32,
    /// Allowed weekdays for `weeks` mode.
    #[serde(default)]
    pub weekdays: Vec<Weekday>,
    #[serde(default)]
    pub day_rule: Option<DayRule>,
    /// Month of the year (1-12) for `years` mode.
    #[serde(default)]
    pub month: Option<u32>,
}

fn default_every_n() -> u32 {
    1
}

impl Default for Recurrence {
    fn default() -> Self {
        Self {
            mode: RecurrenceMode::None,
            every_n: 1,
            weekdays: Vec::new(),
            day_rule: None,
            month: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSegments {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

impl EventSegments {
    pub fn admits(&self, segment_id: &str) -> bool {
        (self.allow.is_empty() || self.allow.iter().any(|s| s == segment_id))
            && !self.deny.iter().any(|s| s == segment_id)
    }
}

/// A scheduled live-ops event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEvent {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub removed: bool,
    #[serde(default)]
    pub paused: bool,
    pub start_date: DateTime<Utc>,
    /// Length of each occurrence in seconds.
    #[serde(default)]
    pub duration_secs: i64,
    #[serde(default)]
    pub recurring: Recurrence,
    #[serde(default)]
    pub segments: EventSegments,
    #[serde(default)]
    pub affected_offers: Vec<OfferOverride>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScheduledEvent {
    pub fn is_active(&self) -> bool {
        !self.removed && !self.paused
    }
}
