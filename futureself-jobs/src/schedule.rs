//! Calendar schedules for recurring jobs.

use chrono::{Datelike, Days, Weekday};
use futureself_core::{ConfigError, ScheduleConfig, Timestamp};
use std::fmt;
use std::time::Duration;

/// When a job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Once a week at the given UTC time.
    Weekly {
        weekday: Weekday,
        hour: u32,
        minute: u32,
    },
    /// At a fixed interval, measured from the previous firing.
    Every(Duration),
}

impl Schedule {
    pub fn weekly(weekday: Weekday, hour: u32, minute: u32) -> Result<Self, ConfigError> {
        if hour > 23 || minute > 59 {
            return Err(ConfigError::InvalidValue {
                field: "schedule.weekly".to_string(),
                value: format!("{hour:02}:{minute:02}"),
                reason: "not a valid time of day".to_string(),
            });
        }
        Ok(Schedule::Weekly {
            weekday,
            hour,
            minute,
        })
    }

    /// The weekly letter schedule from config.
    pub fn weekly_from(config: &ScheduleConfig) -> Result<Self, ConfigError> {
        let weekday = u8::try_from(config.weekly_weekday)
            .ok()
            .and_then(|day| Weekday::try_from(day).ok())
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "schedule.weekly_weekday".to_string(),
                value: config.weekly_weekday.to_string(),
                reason: "must be 0-6".to_string(),
            })?;
        Self::weekly(weekday, config.weekly_hour, config.weekly_minute)
    }

    /// The retry queue schedule from config.
    pub fn retry_from(config: &ScheduleConfig) -> Self {
        Schedule::Every(config.retry_interval)
    }

    /// First firing strictly after `now`.
    pub fn next_after(&self, now: Timestamp) -> Timestamp {
        match *self {
            Schedule::Every(interval) => {
                now + chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::weeks(1))
            }
            Schedule::Weekly {
                weekday,
                hour,
                minute,
            } => {
                let today = now.date_naive();
                (0..=7u64)
                    .filter_map(|offset| today.checked_add_days(Days::new(offset)))
                    .filter(|date| date.weekday() == weekday)
                    .filter_map(|date| date.and_hms_opt(hour, minute, 0))
                    .map(|at| at.and_utc())
                    .find(|at| *at > now)
                    .unwrap_or(now + chrono::Duration::weeks(1))
            }
        }
    }

    /// Time to sleep from `now` until the next firing.
    pub fn delay_until_next(&self, now: Timestamp) -> Duration {
        (self.next_after(now) - now).to_std().unwrap_or(Duration::ZERO)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Weekly {
                weekday,
                hour,
                minute,
            } => write!(f, "weekly {weekday} {hour:02}:{minute:02} UTC"),
            Schedule::Every(interval) => write!(f, "every {}s", interval.as_secs()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> Timestamp {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_weekly_later_same_week() {
        let schedule = Schedule::weekly(Weekday::Mon, 9, 0).unwrap();
        // 2025-01-01 is a Wednesday
        let next = schedule.next_after(at(2025, 1, 1, 12, 0));
        assert_eq!(next, at(2025, 1, 6, 9, 0));
    }

    #[test]
    fn test_weekly_same_day_before_and_after() {
        let schedule = Schedule::weekly(Weekday::Mon, 9, 0).unwrap();
        assert_eq!(schedule.next_after(at(2025, 1, 6, 8, 59)), at(2025, 1, 6, 9, 0));
        // Exactly at the firing time moves to next week
        assert_eq!(schedule.next_after(at(2025, 1, 6, 9, 0)), at(2025, 1, 13, 9, 0));
    }

    #[test]
    fn test_every_adds_interval() {
        let schedule = Schedule::Every(Duration::from_secs(300));
        let now = at(2025, 1, 1, 0, 0);
        assert_eq!(schedule.next_after(now), at(2025, 1, 1, 0, 5));
        assert_eq!(schedule.delay_until_next(now), Duration::from_secs(300));
    }

    #[test]
    fn test_from_config() {
        let config = ScheduleConfig::default();
        assert_eq!(
            Schedule::weekly_from(&config).unwrap(),
            Schedule::Weekly {
                weekday: Weekday::Mon,
                hour: 9,
                minute: 0
            }
        );
        assert_eq!(
            Schedule::retry_from(&config),
            Schedule::Every(Duration::from_secs(300))
        );

        let bad = ScheduleConfig {
            weekly_weekday: 9,
            ..config
        };
        assert!(Schedule::weekly_from(&bad).is_err());
    }

    #[test]
    fn test_invalid_time_rejected() {
        assert!(Schedule::weekly(Weekday::Fri, 24, 0).is_err());
        assert!(Schedule::weekly(Weekday::Fri, 23, 60).is_err());
    }
}
