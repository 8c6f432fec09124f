use std::fmt::Display;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};

use super::error::ConfigError;

/// Longest accepted period, ten years, in either unit.
pub const MAX_INTERVAL_DAYS: u64 = 3650;
pub const MAX_INTERVAL_SECONDS: u64 = MAX_INTERVAL_DAYS * 24 * 60 * 60;

/// One entry of the schedule file, as written by the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTaskDescriptor {
    pub name: String,
    #[serde(deserialize_with = "number_or_string")]
    pub interval: u64,
    pub unit: String,
    #[serde(default)]
    pub time: Option<String>,
}

// "interval": 1 and "interval": "1" are both accepted.
fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Interval {
        Number(u64),
        Text(String),
    }

    match Interval::deserialize(deserializer)? {
        Interval::Number(n) => Ok(n),
        Interval::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum IntervalUnit {
    Day,
    Seconds,
}

impl Display for IntervalUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntervalUnit::Day => write!(f, "day"),
            IntervalUnit::Seconds => write!(f, "seconds"),
        }
    }
}

impl IntervalUnit {
    fn max_interval(&self) -> u64 {
        match self {
            IntervalUnit::Day => MAX_INTERVAL_DAYS,
            IntervalUnit::Seconds => MAX_INTERVAL_SECONDS,
        }
    }
}

impl FromStr for IntervalUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" | "days" => Ok(IntervalUnit::Day),
            "second" | "seconds" => Ok(IntervalUnit::Seconds),
            _ => Err(()),
        }
    }
}

/// When a task fires. Day schedules are in local wall-clock time.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Schedule {
    EverySeconds(u64),
    EveryDays { days: u64, at: NaiveTime },
}

impl Schedule {
    /// The first fire time strictly after `now`.
    ///
    /// `last` is the previous scheduled fire time. Fire times that passed
    /// while the job was running are skipped rather than queued. `None` when
    /// the next fire time is not representable.
    pub fn next_run(&self, now: NaiveDateTime, last: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
        match *self {
            Schedule::EverySeconds(secs) => {
                let step = Duration::try_seconds(i64::try_from(secs).ok()?)?;
                let mut next = last.unwrap_or(now).checked_add_signed(step)?;
                while next <= now {
                    next = next.checked_add_signed(step)?;
                }
                Some(next)
            }
            Schedule::EveryDays { days, at } => {
                let step = Duration::try_days(i64::try_from(days).ok()?)?;
                let mut next = match last {
                    Some(last) => last.date().and_time(at).checked_add_signed(step)?,
                    None => now.date().and_time(at),
                };
                if last.is_none() && next <= now {
                    next = next.checked_add_signed(Duration::days(1))?;
                }
                while next <= now {
                    next = next.checked_add_signed(step)?;
                }
                Some(next)
            }
        }
    }
}

/// A descriptor that passed validation and names a registered job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub name: String,
    pub unit: IntervalUnit,
    pub schedule: Schedule,
}

impl TaskDescriptor {
    pub fn parse(raw: &RawTaskDescriptor) -> Result<Self, ConfigError> {
        if raw.interval == 0 {
            return Err(ConfigError::ZeroInterval(raw.name.clone()));
        }

        let unit: IntervalUnit = raw.unit.parse().map_err(|_| ConfigError::UnknownUnit {
            task: raw.name.clone(),
            unit: raw.unit.clone(),
        })?;

        if raw.interval > unit.max_interval() {
            return Err(ConfigError::IntervalTooLarge {
                task: raw.name.clone(),
                interval: raw.interval,
                unit: unit.to_string(),
                max: unit.max_interval(),
            });
        }

        let schedule = match unit {
            IntervalUnit::Seconds => Schedule::EverySeconds(raw.interval),
            IntervalUnit::Day => Schedule::EveryDays {
                days: raw.interval,
                at: parse_time_of_day(&raw.name, raw.time.as_deref())?,
            },
        };

        Ok(Self {
            name: raw.name.clone(),
            unit,
            schedule,
        })
    }
}

fn parse_time_of_day(task: &str, time: Option<&str>) -> Result<NaiveTime, ConfigError> {
    let time = match time.map(str::trim) {
        None | Some("") => return Ok(NaiveTime::MIN),
        Some(time) => time,
    };

    NaiveTime::parse_from_str(time, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M"))
        .map_err(|_| ConfigError::BadTime {
            task: task.to_string(),
            time: time.to_string(),
        })
}
