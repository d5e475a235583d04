use anyhow::Context;
use chrono::{DateTime, Duration, NaiveTime, Utc};

const DEFAULT_RUN_AT_UTC: &str = "05:00";

/// Fixed time of day (UTC) at which the daily generation fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    pub run_at: NaiveTime,
}

impl DailySchedule {
    pub fn from_env() -> anyhow::Result<Self> {
        let s = std::env::var("GENERATION_SCHEDULE_UTC")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RUN_AT_UTC.to_string());
        Self::parse(&s)
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let run_at = NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .with_context(|| format!("invalid GENERATION_SCHEDULE_UTC {s:?} (expected HH:MM)"))?;
        Ok(Self { run_at })
    }

    /// First firing strictly after `now`.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive().and_time(self.run_at).and_utc();
        if today > now {
            today
        } else {
            today + Duration::days(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fires_later_today_when_not_yet_reached() {
        let schedule = DailySchedule::parse("05:00").unwrap();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 4, 59, 0).unwrap();
        assert_eq!(
            schedule.next_run_after(now),
            Utc.with_ymd_and_hms(2025, 6, 1, 5, 0, 0).unwrap()
        );
    }

    #[test]
    fn fires_tomorrow_once_passed() {
        let schedule = DailySchedule::parse("05:00").unwrap();
        let exactly = Utc.with_ymd_and_hms(2025, 6, 1, 5, 0, 0).unwrap();
        assert_eq!(
            schedule.next_run_after(exactly),
            Utc.with_ymd_and_hms(2025, 6, 2, 5, 0, 0).unwrap()
        );
    }

    #[test]
    fn rejects_bad_time() {
        assert!(DailySchedule::parse("25:00").is_err());
        assert!(DailySchedule::parse("5am").is_err());
    }
}
