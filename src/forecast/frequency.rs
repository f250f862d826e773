use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use regex::Regex;
use std::fmt;
use std::str::FromStr;

use crate::forecast::error::InputError;

const FREQUENCY_PATTERN: &str = r"^\s*(\d+)?\s*(MS|M|W|D|H|h|T|min|S|s)\s*$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyUnit {
    Second,
    Minute,
    Hour,
    Day,
    /// Weekly, anchored on Sundays.
    Week,
    MonthStart,
    MonthEnd,
}

/// A calendar frequency code such as `D`, `H`, `2H`, `W`, `MS` or `M`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frequency {
    multiple: u32,
    unit: FrequencyUnit,
}

impl Frequency {
    pub const DAILY: Frequency = Frequency {
        multiple: 1,
        unit: FrequencyUnit::Day,
    };

    pub fn new(multiple: u32, unit: FrequencyUnit) -> Self {
        Self {
            multiple: multiple.max(1),
            unit,
        }
    }

    pub fn parse(code: &str) -> Result<Self, InputError> {
        let re = Regex::new(FREQUENCY_PATTERN)
            .map_err(|e| InputError::InvalidFrequency(e.to_string()))?;
        let caps = re
            .captures(code)
            .ok_or_else(|| InputError::InvalidFrequency(code.to_string()))?;

        let multiple = match caps.get(1) {
            Some(m) => m
                .as_str()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| InputError::InvalidFrequency(code.to_string()))?,
            None => 1,
        };

        let unit = match &caps[2] {
            "S" | "s" => FrequencyUnit::Second,
            "T" | "min" => FrequencyUnit::Minute,
            "H" | "h" => FrequencyUnit::Hour,
            "D" => FrequencyUnit::Day,
            "W" => FrequencyUnit::Week,
            "MS" => FrequencyUnit::MonthStart,
            _ => FrequencyUnit::MonthEnd,
        };

        Ok(Self { multiple, unit })
    }

    pub fn multiple(&self) -> u32 {
        self.multiple
    }

    pub fn unit(&self) -> FrequencyUnit {
        self.unit
    }

    /// Whether `ts` already sits on this frequency's calendar grid.
    pub fn is_anchored(&self, ts: NaiveDateTime) -> bool {
        match self.unit {
            FrequencyUnit::Week => ts.weekday() == Weekday::Sun,
            FrequencyUnit::MonthStart => ts.day() == 1,
            FrequencyUnit::MonthEnd => Some(ts.day()) == last_day_of_month(ts.year(), ts.month()),
            _ => true,
        }
    }

    /// The next timestamp strictly after `ts`, moving one multiple of the frequency.
    /// Anchored units first snap to the next grid point.
    pub fn step_after(&self, ts: NaiveDateTime) -> Option<NaiveDateTime> {
        (0..self.multiple).try_fold(ts, |current, _| self.unit_step(current))
    }

    /// `periods` timestamps starting at `start` (rolled forward onto the grid).
    pub fn date_range(&self, start: NaiveDateTime, periods: usize) -> Option<Vec<NaiveDateTime>> {
        let mut current = if self.is_anchored(start) {
            start
        } else {
            self.unit_step(start)?
        };

        let mut axis = Vec::with_capacity(periods);
        for i in 0..periods {
            axis.push(current);
            if i + 1 < periods {
                current = self.step_after(current)?;
            }
        }
        Some(axis)
    }

    fn unit_step(&self, ts: NaiveDateTime) -> Option<NaiveDateTime> {
        match self.unit {
            FrequencyUnit::Second => ts.checked_add_signed(Duration::seconds(1)),
            FrequencyUnit::Minute => ts.checked_add_signed(Duration::minutes(1)),
            FrequencyUnit::Hour => ts.checked_add_signed(Duration::hours(1)),
            FrequencyUnit::Day => ts.checked_add_signed(Duration::days(1)),
            FrequencyUnit::Week => {
                let from_sunday = ts.weekday().num_days_from_sunday() as i64;
                let days = if from_sunday == 0 { 7 } else { 7 - from_sunday };
                ts.checked_add_signed(Duration::days(days))
            }
            FrequencyUnit::MonthStart => {
                let (year, month) = next_month(ts.year(), ts.month());
                NaiveDate::from_ymd_opt(year, month, 1).map(|d| d.and_time(ts.time()))
            }
            FrequencyUnit::MonthEnd => {
                let this_end = last_day_of_month(ts.year(), ts.month())?;
                let (year, month) = if ts.day() < this_end {
                    (ts.year(), ts.month())
                } else {
                    next_month(ts.year(), ts.month())
                };
                let day = last_day_of_month(year, month)?;
                NaiveDate::from_ymd_opt(year, month, day).map(|d| d.and_time(ts.time()))
            }
        }
    }
}

impl Default for Frequency {
    fn default() -> Self {
        Self::DAILY
    }
}

impl FromStr for Frequency {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self.unit {
            FrequencyUnit::Second => "S",
            FrequencyUnit::Minute => "T",
            FrequencyUnit::Hour => "H",
            FrequencyUnit::Day => "D",
            FrequencyUnit::Week => "W",
            FrequencyUnit::MonthStart => "MS",
            FrequencyUnit::MonthEnd => "M",
        };
        if self.multiple == 1 {
            write!(f, "{}", code)
        } else {
            write!(f, "{}{}", self.multiple, code)
        }
    }
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    let (y, m) = next_month(year, month);
    NaiveDate::from_ymd_opt(y, m, 1)?.pred_opt().map(|d| d.day())
}
