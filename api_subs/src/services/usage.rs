use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};

/// Start of the current quota week: the most recent Sunday 00:00 UTC at or before `now`.
pub fn week_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_since_sunday = i64::from(now.weekday().num_days_from_sunday());
    (now.date_naive() - Duration::days(days_since_sunday))
        .and_time(NaiveTime::MIN)
        .and_utc()
}

pub fn remaining(limit: i64, used: i64) -> i64 {
    (limit - used).max(0)
}
