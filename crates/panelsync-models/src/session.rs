use chrono::{DateTime, Datelike, NaiveDateTime, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;

use crate::config::{ConfigError, ScheduleConfig};

/// Outcome of classifying an instant against the trading window.
///
/// `Closed` covers both "after today's close" and "not a trading day";
/// the daemon treats them identically (done for today).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    InSession,
    BeforeOpen,
    Closed,
}

/// A same-day trading window in a fixed timezone.
///
/// Loaded once at startup and never mutated. Overnight windows
/// (start > end) are rejected at construction.
#[derive(Debug, Clone)]
pub struct TradingWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub days: Vec<Weekday>,
    pub tz: Tz,
}

impl TradingWindow {
    pub fn from_schedule(schedule: &ScheduleConfig) -> Result<Self, ConfigError> {
        let start = parse_time("schedule.start", &schedule.start)?;
        let end = parse_time("schedule.end", &schedule.end)?;
        if start > end {
            return Err(ConfigError::WindowOrder {
                start: schedule.start.clone(),
                end: schedule.end.clone(),
            });
        }

        let tz: Tz = schedule
            .timezone
            .parse()
            .map_err(|_| ConfigError::UnknownTimezone(schedule.timezone.clone()))?;

        let days = schedule
            .days
            .iter()
            .map(|d| {
                d.parse::<Weekday>()
                    .map_err(|_| ConfigError::UnknownWeekday(d.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            start,
            end,
            days,
            tz,
        })
    }

    /// Classify an instant already expressed in the window's timezone.
    /// Both window bounds are inclusive.
    pub fn status_at(&self, now: DateTime<Tz>) -> SessionStatus {
        if !self.days.contains(&now.weekday()) {
            return SessionStatus::Closed;
        }
        let time = now.time();
        if time < self.start {
            SessionStatus::BeforeOpen
        } else if time <= self.end {
            SessionStatus::InSession
        } else {
            SessionStatus::Closed
        }
    }

    /// Classify a UTC instant by first converting it into the window's
    /// timezone.
    pub fn status_at_utc(&self, now: DateTime<Utc>) -> SessionStatus {
        self.status_at(now.with_timezone(&self.tz))
    }

    /// Classify a naive instant, interpreting it as already being local
    /// to the window's timezone.
    pub fn status_at_local(&self, naive: NaiveDateTime) -> SessionStatus {
        match naive.and_local_timezone(self.tz) {
            chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => {
                self.status_at(dt)
            }
            // A nonexistent local time (DST gap) cannot fall inside a
            // same-day trading window that was validated at startup.
            chrono::LocalResult::None => SessionStatus::Closed,
        }
    }
}

fn parse_time(field: &'static str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| ConfigError::InvalidTime {
        field,
        value: value.to_string(),
    })
}
