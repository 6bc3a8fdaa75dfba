// src/schedule.rs
//! When jobs fire: a next-fire-time capability, decoupled from the work a
//! job actually does. The scheduler's timer loop only ever asks "when is
//! the next tick after `from`" and sleeps until then.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Fixed cadence, measured from the previous tick.
    Every { secs: u64 },
    /// Once a day at HH:MM UTC.
    DailyAt { hour: u8, minute: u8 },
}

impl Schedule {
    pub fn every_secs(secs: u64) -> Self {
        Schedule::Every { secs }
    }

    pub fn every_minutes(minutes: u64) -> Self {
        Schedule::Every { secs: minutes * 60 }
    }

    pub fn daily_at(hour: u8, minute: u8) -> Self {
        Schedule::DailyAt { hour, minute }
    }

    /// Reject schedules that could never fire sensibly.
    pub fn validate(&self) -> Result<()> {
        match self {
            Schedule::Every { secs: 0 } => {
                Err(Error::InvalidSchedule("interval of zero seconds".into()))
            }
            Schedule::DailyAt { hour, minute } if *hour > 23 || *minute > 59 => Err(
                Error::InvalidSchedule(format!("clock time {hour:02}:{minute:02} out of range")),
            ),
            _ => Ok(()),
        }
    }

    /// Next UTC fire time strictly after `from`. `None` means the schedule
    /// cannot produce a tick (fails [`Schedule::validate`]).
    pub fn next_fire_at(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Every { secs } => {
                if *secs == 0 {
                    return None;
                }
                Some(from + Duration::seconds(i64::try_from(*secs).ok()?))
            }
            Schedule::DailyAt { hour, minute } => {
                if *hour > 23 || *minute > 59 {
                    return None;
                }
                let today = Utc
                    .with_ymd_and_hms(
                        from.year(),
                        from.month(),
                        from.day(),
                        *hour as u32,
                        *minute as u32,
                        0,
                    )
                    .single()?;
                if today > from {
                    Some(today)
                } else {
                    Some(today + Duration::days(1))
                }
            }
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Schedule::Every { secs } => write!(f, "every {secs}s"),
            Schedule::DailyAt { hour, minute } => {
                write!(f, "daily at {hour:02}:{minute:02} UTC")
            }
        }
    }
}
