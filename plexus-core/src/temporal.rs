//! Temporal kinds and ISO-8601 duration arithmetic.
//!
//! Dates, datetimes and times are plain `chrono` types; durations keep their
//! calendar components separate so that adding a month lands on the same day
//! of the next month (clamped to its end) instead of a fixed 30 days.

use std::fmt;

use chrono::{DateTime, FixedOffset, Months, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Average Gregorian month in seconds, used only for ordering durations.
const SECONDS_PER_MONTH: i64 = 2_629_746;
const SECONDS_PER_DAY: i64 = 86_400;

/// An ISO-8601 duration with calendar-aware month/day components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CalendarDuration {
    pub months: i64,
    pub days: i64,
    pub seconds: i64,
    pub nanos: u32,
}

impl CalendarDuration {
    pub fn new(months: i64, days: i64, seconds: i64, nanos: u32) -> Self {
        Self {
            months,
            days,
            seconds,
            nanos,
        }
    }

    /// Parses the `PnYnMnDTnHnMnS` form, with optional leading sign and
    /// fractional seconds.
    pub fn parse(input: &str) -> Result<Self> {
        let original = input;
        let (negative, rest) = match input.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, input),
        };
        let body = rest
            .strip_prefix('P')
            .ok_or_else(|| Error::TypeError(format!("invalid duration: {original}")))?;

        let mut months: i64 = 0;
        let mut days: i64 = 0;
        let mut seconds: i64 = 0;
        let mut nanos: u32 = 0;
        let mut in_time = false;
        let mut number = String::new();

        for ch in body.chars() {
            match ch {
                'T' | 't' => {
                    if in_time || !number.is_empty() {
                        return Err(Error::TypeError(format!("invalid duration: {original}")));
                    }
                    in_time = true;
                }
                '0'..='9' | '.' | '-' => number.push(ch),
                unit => {
                    if number.is_empty() {
                        return Err(Error::TypeError(format!("invalid duration: {original}")));
                    }
                    let value: f64 = number
                        .parse()
                        .map_err(|_| Error::TypeError(format!("invalid duration: {original}")))?;
                    number.clear();
                    match (unit.to_ascii_uppercase(), in_time) {
                        ('Y', false) => months += (value as i64) * 12,
                        ('M', false) => months += value as i64,
                        ('W', false) => days += (value as i64) * 7,
                        ('D', false) => days += value as i64,
                        ('H', true) => seconds += (value * 3600.0) as i64,
                        ('M', true) => seconds += (value * 60.0) as i64,
                        ('S', true) => {
                            seconds += value.trunc() as i64;
                            nanos = (value.fract().abs() * 1e9).round() as u32;
                        }
                        _ => {
                            return Err(Error::TypeError(format!("invalid duration: {original}")));
                        }
                    }
                }
            }
        }
        if !number.is_empty() {
            return Err(Error::TypeError(format!("invalid duration: {original}")));
        }

        let mut out = Self::new(months, days, seconds, nanos);
        if negative {
            out = out.negated();
        }
        Ok(out)
    }

    pub fn negated(&self) -> Self {
        // Nanos stay positive; borrow a second when flipping.
        if self.nanos == 0 {
            Self::new(-self.months, -self.days, -self.seconds, 0)
        } else {
            Self::new(
                -self.months,
                -self.days,
                -self.seconds - 1,
                1_000_000_000 - self.nanos,
            )
        }
    }

    /// Approximate length used only to order durations.
    pub fn estimated_seconds(&self) -> f64 {
        (self.months * SECONDS_PER_MONTH + self.days * SECONDS_PER_DAY + self.seconds) as f64
            + f64::from(self.nanos) / 1e9
    }
}

impl fmt::Display for CalendarDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.months == 0 && self.days == 0 && self.seconds == 0 && self.nanos == 0 {
            return write!(f, "PT0S");
        }
        let mut out = String::from("P");
        let years = self.months / 12;
        let months = self.months % 12;
        if years != 0 {
            out.push_str(&format!("{years}Y"));
        }
        if months != 0 {
            out.push_str(&format!("{months}M"));
        }
        if self.days != 0 {
            out.push_str(&format!("{}D", self.days));
        }
        if self.seconds != 0 || self.nanos != 0 {
            out.push('T');
            let hours = self.seconds / 3600;
            let minutes = (self.seconds % 3600) / 60;
            let secs = self.seconds % 60;
            if hours != 0 {
                out.push_str(&format!("{hours}H"));
            }
            if minutes != 0 {
                out.push_str(&format!("{minutes}M"));
            }
            if secs != 0 || self.nanos != 0 {
                if self.nanos == 0 {
                    out.push_str(&format!("{secs}S"));
                } else {
                    let frac = format!("{:.9}", f64::from(self.nanos) / 1e9);
                    out.push_str(&format!("{secs}{}S", frac.trim_start_matches('0')));
                }
            }
        }
        write!(f, "{out}")
    }
}

pub fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|_| Error::TypeError(format!("invalid date: {input}")))
}

pub fn parse_time(input: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(input, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M"))
        .map_err(|_| Error::TypeError(format!("invalid time: {input}")))
}

pub fn parse_datetime(input: &str) -> Result<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt);
    }
    // Accept a naive datetime and pin it to UTC.
    chrono::NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc().fixed_offset())
        .map_err(|_| Error::TypeError(format!("invalid datetime: {input}")))
}

/// Calendar-aware month shift, clamping to the last day of the target month.
fn shift_months(date: NaiveDate, months: i64) -> Result<NaiveDate> {
    let shifted = if months >= 0 {
        date.checked_add_months(Months::new(months as u32))
    } else {
        date.checked_sub_months(Months::new((-months) as u32))
    };
    shifted.ok_or_else(|| Error::TypeError("date arithmetic out of range".to_string()))
}

pub fn add_duration_to_date(date: NaiveDate, duration: &CalendarDuration) -> Result<NaiveDate> {
    let with_months = shift_months(date, duration.months)?;
    with_months
        .checked_add_signed(chrono::Duration::days(duration.days))
        .ok_or_else(|| Error::TypeError("date arithmetic out of range".to_string()))
}

pub fn add_duration_to_datetime(
    datetime: DateTime<FixedOffset>,
    duration: &CalendarDuration,
) -> Result<DateTime<FixedOffset>> {
    use chrono::{NaiveDateTime, TimeZone};

    let offset = *datetime.offset();
    let local = datetime.naive_local();
    let date = shift_months(local.date(), duration.months)?;
    let shifted = NaiveDateTime::new(date, local.time())
        .checked_add_signed(
            chrono::Duration::days(duration.days)
                + chrono::Duration::seconds(duration.seconds)
                + chrono::Duration::nanoseconds(i64::from(duration.nanos)),
        )
        .ok_or_else(|| Error::TypeError("datetime arithmetic out of range".to_string()))?;
    offset
        .from_local_datetime(&shifted)
        .single()
        .ok_or_else(|| Error::TypeError("datetime arithmetic out of range".to_string()))
}

pub fn add_duration_to_time(time: NaiveTime, duration: &CalendarDuration) -> NaiveTime {
    // Times wrap around midnight; calendar components do not apply.
    let delta = chrono::Duration::seconds(duration.seconds)
        + chrono::Duration::nanoseconds(i64::from(duration.nanos));
    time.overflowing_add_signed(delta).0
}

pub fn format_time(time: &NaiveTime) -> String {
    if time.nanosecond() == 0 {
        time.format("%H:%M:%S").to_string()
    } else {
        time.format("%H:%M:%S%.f").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        for input in ["P1Y2M3DT4H5M6S", "P3D", "PT0S", "PT1H30M", "P2W"] {
            let d = CalendarDuration::parse(input).unwrap();
            let back = CalendarDuration::parse(&d.to_string()).unwrap();
            assert_eq!(d, back, "{input}");
        }
    }

    #[test]
    fn month_addition_clamps_to_month_end() {
        let jan31 = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let one_month = CalendarDuration::new(1, 0, 0, 0);
        let feb = add_duration_to_date(jan31, &one_month).unwrap();
        assert_eq!(feb, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn negative_duration_subtracts() {
        let mar15 = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let back = CalendarDuration::parse("-P1M15D").unwrap();
        let result = add_duration_to_date(mar15, &back).unwrap();
        assert_eq!(result, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
    }

    #[test]
    fn time_wraps_at_midnight() {
        let late = NaiveTime::from_hms_opt(23, 30, 0).unwrap();
        let hour = CalendarDuration::new(0, 0, 3600, 0);
        assert_eq!(
            add_duration_to_time(late, &hour),
            NaiveTime::from_hms_opt(0, 30, 0).unwrap()
        );
    }

    #[test]
    fn estimated_seconds_orders_durations() {
        let month = CalendarDuration::parse("P1M").unwrap();
        let four_weeks = CalendarDuration::parse("P28D").unwrap();
        assert!(month.estimated_seconds() > four_weeks.estimated_seconds());
    }
}
