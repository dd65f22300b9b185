//! Weekly recurrence of a reminder
//!
//! A reminder fires at a fixed time of day on the weekdays selected by a [`WeekMask`]. The next
//! trigger is always recomputed from the wall clock, nothing about the future is stored.

use core::fmt;

use chrono::DateTime;
use chrono::Datelike;
use chrono::Days;
use chrono::NaiveDate;
use chrono::NaiveTime;
use chrono::TimeDelta;
use chrono::TimeZone;
use chrono::Weekday;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Minutes in a single day, the exclusive upper bound of a [`TimeOfDay`]
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Days to look ahead before giving up on the mask
const DAYS_PER_WEEK: usize = 7;

/// Bit field selecting the weekdays a reminder occurs on
///
/// Monday is the lowest bit, Sunday the highest of the seven used bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "u8", into = "u8")]
pub struct WeekMask(u8);

impl WeekMask {
    pub const MONDAY: Self = Self(1);
    pub const TUESDAY: Self = Self(1 << 1);
    pub const WEDNESDAY: Self = Self(1 << 2);
    pub const THURSDAY: Self = Self(1 << 3);
    pub const FRIDAY: Self = Self(1 << 4);
    pub const SATURDAY: Self = Self(1 << 5);
    pub const SUNDAY: Self = Self(1 << 6);

    /// Every day of the week
    pub const ALL_DAYS: Self = Self(127);

    /// Monday up to and including Friday
    pub const WEEKDAYS: Self = Self(31);

    /// Saturday and Sunday
    pub const WEEKEND: Self = Self(96);

    /// Mask from raw bits, anything above the seventh bit is dropped
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL_DAYS.0)
    }

    /// The raw bits
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Does the mask select no day at all?
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// An empty mask means every day
    #[must_use]
    pub const fn normalized(self) -> Self {
        if self.is_empty() {
            Self::ALL_DAYS
        } else {
            self
        }
    }

    /// The bit of a single weekday
    pub const fn for_day(day: Weekday) -> Self {
        match day {
            Weekday::Mon => Self::MONDAY,
            Weekday::Tue => Self::TUESDAY,
            Weekday::Wed => Self::WEDNESDAY,
            Weekday::Thu => Self::THURSDAY,
            Weekday::Fri => Self::FRIDAY,
            Weekday::Sat => Self::SATURDAY,
            Weekday::Sun => Self::SUNDAY,
        }
    }

    /// Is the given weekday selected?
    pub const fn is_active_for_day(self, day: Weekday) -> bool {
        self.0 & Self::for_day(day).0 != 0
    }
}

impl Default for WeekMask {
    fn default() -> Self {
        Self::ALL_DAYS
    }
}

impl From<u8> for WeekMask {
    fn from(bits: u8) -> Self {
        Self::from_bits(bits)
    }
}

impl From<WeekMask> for u8 {
    fn from(mask: WeekMask) -> Self {
        mask.bits()
    }
}

impl core::ops::BitOr for WeekMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Minutes outside of a single day
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0} is not a valid time of day, expected minutes in 0..1440")]
pub struct InvalidTimeOfDay(pub i64);

/// Time of day as minutes since midnight
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(try_from = "i64", into = "u16")]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    /// Midnight
    pub const MIDNIGHT: Self = Self(0);

    /// Time of day from minutes since midnight
    pub fn from_minutes(minutes: i64) -> Result<Self, InvalidTimeOfDay> {
        u16::try_from(minutes)
            .ok()
            .filter(|minutes| *minutes < MINUTES_PER_DAY)
            .map(Self)
            .ok_or(InvalidTimeOfDay(minutes))
    }

    /// Time of day from hours and minutes
    pub fn from_hm(hour: u16, minute: u16) -> Result<Self, InvalidTimeOfDay> {
        if minute >= 60 {
            return Err(InvalidTimeOfDay(i64::from(hour) * 60 + i64::from(minute)));
        }

        Self::from_minutes(i64::from(hour) * 60 + i64::from(minute))
    }

    /// Minutes since midnight
    pub const fn minutes(self) -> u16 {
        self.0
    }

    pub const fn hour(self) -> u16 {
        self.0 / 60
    }

    pub const fn minute(self) -> u16 {
        self.0 % 60
    }

    /// The time of day at zero seconds
    pub fn as_naive_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(u32::from(self.hour()), u32::from(self.minute()), 0)
            .unwrap_or(NaiveTime::MIN)
    }
}

impl TryFrom<i64> for TimeOfDay {
    type Error = InvalidTimeOfDay;

    fn try_from(minutes: i64) -> Result<Self, Self::Error> {
        Self::from_minutes(minutes)
    }
}

impl From<TimeOfDay> for u16 {
    fn from(time: TimeOfDay) -> Self {
        time.minutes()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// Compute the next instant a reminder should fire, strictly after `now`
///
/// Starts from today at `time`, moves to tomorrow when that moment is not in the future and
/// then walks forward at most a week until a day selected by `days` is found. When no day
/// matches (empty mask) the first candidate is used, as if every day was selected.
pub fn next_trigger<Tz: TimeZone>(
    now: &DateTime<Tz>,
    time: TimeOfDay,
    days: WeekMask,
) -> DateTime<Tz> {
    let timezone = now.timezone();

    let mut date = now.date_naive();
    if at_local_time(&timezone, date, time) <= *now {
        date = next_day(date);
    }

    let first_candidate = date;

    for _ in 0..DAYS_PER_WEEK {
        if days.is_active_for_day(date.weekday()) {
            return at_local_time(&timezone, date, time);
        }

        date = next_day(date);
    }

    at_local_time(&timezone, first_candidate, time)
}

fn next_day(date: NaiveDate) -> NaiveDate {
    date.checked_add_days(Days::new(1)).unwrap_or(date)
}

/// Resolve a wall clock time on a given date
///
/// Ambiguous times (clocks going back) take the earliest instant, times that do not exist
/// (clocks going forward) are shifted forward by an hour.
fn at_local_time<Tz: TimeZone>(timezone: &Tz, date: NaiveDate, time: TimeOfDay) -> DateTime<Tz> {
    let local = date.and_time(time.as_naive_time());

    timezone
        .from_local_datetime(&local)
        .earliest()
        .or_else(|| {
            timezone
                .from_local_datetime(&(local + TimeDelta::hours(1)))
                .earliest()
        })
        .unwrap_or_else(|| timezone.from_utc_datetime(&local))
}
