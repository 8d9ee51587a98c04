//! Weekly recurrence: day masks and next-fire computation
//!
//! Day numbering is fixed: bit 0 = Monday ... bit 6 = Sunday, i.e. the bit index is
//! `Weekday::num_days_from_monday()`. The same numbering is used when masks are built
//! and when they are matched here.

use std::fmt;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Local, NaiveDate, NaiveTime, TimeZone, Utc,
    Weekday,
};
use serde::{Deserialize, Serialize};

use crate::WolError;

/// Minimum lead time: an occurrence at or before `now + 1s` belongs to the past.
pub const FIRE_BUFFER: Duration = Duration::seconds(1);

/// Number of consecutive days inspected before giving up
const SEARCH_DAYS: usize = 8;

/// 7-bit weekday mask, bit 0 = Monday ... bit 6 = Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayMask(u8);

impl DayMask {
    pub const EMPTY: DayMask = DayMask(0);
    pub const ALL: DayMask = DayMask(0x7F);
    pub const WEEKDAYS: DayMask = DayMask(0x1F);
    /// Day substituted for an all-zero mask
    pub const DEFAULT_DAY: Weekday = Weekday::Mon;

    pub fn from_bits(bits: i64) -> Result<Self, WolError> {
        if !(0..=0x7F).contains(&bits) {
            return Err(WolError::Validation(format!(
                "Day bitmap {} is outside the 7-bit range",
                bits
            )));
        }
        Ok(DayMask(bits as u8))
    }

    pub fn from_days(days: &[Weekday]) -> Self {
        days.iter()
            .fold(DayMask::EMPTY, |mask, day| mask.with(*day))
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn with(self, day: Weekday) -> Self {
        DayMask(self.0 | (1 << day.num_days_from_monday()))
    }

    /// Replace "never" with the single default day so callers never persist an empty mask.
    pub fn normalized(self) -> Self {
        if self.is_empty() {
            DayMask::EMPTY.with(Self::DEFAULT_DAY)
        } else {
            self
        }
    }

    pub fn days(&self) -> Vec<Weekday> {
        [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ]
        .into_iter()
        .filter(|d| self.contains(*d))
        .collect()
    }
}

impl fmt::Display for DayMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.days().iter().map(|d| d.to_string()).collect();
        write!(f, "[{}]", names.join(","))
    }
}

/// Validate a time of day
pub fn validate_time(hour: i64, minute: i64) -> Result<(u32, u32), WolError> {
    if !(0..=23).contains(&hour) || !(0..=59).contains(&minute) {
        return Err(WolError::Validation(format!(
            "Invalid time of day {}:{}",
            hour, minute
        )));
    }
    Ok((hour as u32, minute as u32))
}

fn at_local<Tz: TimeZone>(tz: &Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Tz>> {
    // `earliest` keeps DST fall-back deterministic; a spring-forward gap yields None
    tz.from_local_datetime(&date.and_time(time)).earliest()
}

/// Next instant at `hour:minute:00.000` (wall clock of `now`'s zone) on a day in `days`.
///
/// Today's occurrence is only eligible if it is strictly later than `now + 1s`; otherwise
/// the search starts tomorrow. At most 8 consecutive days are inspected. Returns `None`
/// for an empty mask or an out-of-range time.
pub fn next_fire_instant<Tz: TimeZone>(
    hour: u32,
    minute: u32,
    days: DayMask,
    now: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    if days.is_empty() {
        return None;
    }
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let tz = now.timezone();
    let threshold = now.clone() + FIRE_BUFFER;

    let mut date = now.date_naive();
    match at_local(&tz, date, time) {
        Some(today) if today > threshold => {}
        _ => date = date.succ_opt()?,
    }

    for _ in 0..SEARCH_DAYS {
        if days.contains(date.weekday()) {
            if let Some(candidate) = at_local(&tz, date, time) {
                return Some(candidate);
            }
        }
        date = date.succ_opt()?;
    }
    None
}

/// Wall clock in which schedule times of day are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleZone {
    /// Host local time, including its daylight-saving transitions
    Local,
    /// Constant offset from UTC
    Fixed(FixedOffset),
}

impl ScheduleZone {
    /// [`next_fire_instant`] evaluated in this zone as of `now`
    pub fn next_fire_utc(
        &self,
        hour: u32,
        minute: u32,
        days: DayMask,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self {
            ScheduleZone::Local => {
                next_fire_instant(hour, minute, days, &now.with_timezone(&Local))
                    .map(|at| at.with_timezone(&Utc))
            }
            ScheduleZone::Fixed(offset) => {
                next_fire_instant(hour, minute, days, &now.with_timezone(offset))
                    .map(|at| at.with_timezone(&Utc))
            }
        }
    }

    /// `at` as read on this zone's wall clock
    pub fn wall_clock(&self, at: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self {
            ScheduleZone::Local => at.with_timezone(&Local).fixed_offset(),
            ScheduleZone::Fixed(offset) => at.with_timezone(offset),
        }
    }
}

impl fmt::Display for ScheduleZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleZone::Local => write!(f, "local"),
            ScheduleZone::Fixed(offset) => write!(f, "{}", offset),
        }
    }
}
