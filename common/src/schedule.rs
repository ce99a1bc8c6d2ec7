use chrono::{DateTime, Datelike, Duration, FixedOffset, TimeZone, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::types::ScheduleMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

const WEEK: [DayOfWeek; 7] = [
    DayOfWeek::Mon,
    DayOfWeek::Tue,
    DayOfWeek::Wed,
    DayOfWeek::Thu,
    DayOfWeek::Fri,
    DayOfWeek::Sat,
    DayOfWeek::Sun,
];

impl DayOfWeek {
    /// Monday is 0.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Self {
        WEEK[index % 7]
    }

    pub fn from_chrono(weekday: Weekday) -> Self {
        Self::from_index(weekday.num_days_from_monday() as usize)
    }
}

/// From `start_minutes` on `day`, the schedule reports `mode` until the next entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub day: DayOfWeek,
    #[serde(rename = "startMinutes")]
    pub start_minutes: u16,
    pub mode: ScheduleMode,
}

impl ScheduleEntry {
    pub fn validate(&self) -> bool {
        self.start_minutes < 24 * 60
    }
}

/// Built-in weekly schedule, used as the schedule source when enabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schedule {
    pub enabled: bool,
    pub entries: Vec<ScheduleEntry>,
}

impl Schedule {
    pub fn normalize(&mut self) {
        self.entries.retain(ScheduleEntry::validate);
        self.entries
            .sort_by_key(|entry| (entry.day.index(), entry.start_minutes));
    }

    pub fn current_mode(&self, now: DateTime<FixedOffset>) -> Option<ScheduleMode> {
        if !self.enabled || self.entries.is_empty() {
            return None;
        }

        let today = DayOfWeek::from_chrono(now.weekday());
        let minutes = now.hour() as u16 * 60 + now.minute() as u16;

        // Latest entry at or before now, walking back a full week. Offset 7 is
        // today again, which picks up entries later in the day from last week.
        (0..=7)
            .find_map(|offset| {
                let day = DayOfWeek::from_index(today.index() + 7 - offset);
                self.entries
                    .iter()
                    .filter(|entry| {
                        entry.day == day && (offset != 0 || entry.start_minutes <= minutes)
                    })
                    .max_by_key(|entry| entry.start_minutes)
            })
            .map(|entry| entry.mode)
    }

    /// Epoch seconds of the next entry strictly after `now`, within a week.
    pub fn next_event_epoch(&self, now: DateTime<FixedOffset>) -> Option<i64> {
        if !self.enabled {
            return None;
        }

        let today = DayOfWeek::from_chrono(now.weekday()).index();
        let minutes = now.hour() as u16 * 60 + now.minute() as u16;

        self.entries
            .iter()
            .filter_map(|entry| {
                let mut days_ahead = (entry.day.index() + 7 - today) % 7;
                if days_ahead == 0 && entry.start_minutes <= minutes {
                    days_ahead = 7;
                }
                let date = now.date_naive() + Duration::days(days_ahead as i64);
                let naive = date.and_hms_opt(
                    u32::from(entry.start_minutes / 60),
                    u32::from(entry.start_minutes % 60),
                    0,
                )?;
                now.offset().from_local_datetime(&naive).single()
            })
            .min()
            .map(|next| next.timestamp())
    }
}
