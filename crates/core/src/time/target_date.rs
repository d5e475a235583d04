use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Target date of a generation run: the explicit `YYYY-MM-DD` override, or
/// tomorrow (UTC) relative to `now_utc`.
pub fn resolve_target_date(
    target_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<NaiveDate> {
    match target_date_arg.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => parse_date_key(s),
        None => Ok(now_utc.date_naive() + Duration::days(1)),
    }
}

pub fn parse_date_key(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .with_context(|| format!("invalid date {s:?} (expected YYYY-MM-DD)"))
}

pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
