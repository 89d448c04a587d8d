use chrono::{DateTime, Days, NaiveTime, TimeZone};

/// Next store rebuild after `now`: the morning threshold if it is still
/// ahead today, otherwise the coming local midnight. Chains that only
/// publish the current day have fresh data by the morning threshold.
pub fn next_refresh_at<Tz: TimeZone>(now: &DateTime<Tz>, morning_hour: u32) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();
    let morning = NaiveTime::from_hms_opt(morning_hour.min(23), 0, 0)
        .and_then(|time| tz.from_local_datetime(&today.and_time(time)).earliest())
        .filter(|morning| morning > now);
    if let Some(morning) = morning {
        return morning;
    }

    let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
    tz.from_local_datetime(&tomorrow.and_time(NaiveTime::MIN))
        .earliest()
        .unwrap_or_else(|| now.clone() + chrono::Duration::hours(24))
}

/// Wait until the next refresh, never negative.
pub fn until_next_refresh<Tz: TimeZone>(now: &DateTime<Tz>, morning_hour: u32) -> std::time::Duration {
    let next = next_refresh_at(now, morning_hour);
    next.signed_duration_since(now.clone())
        .to_std()
        .unwrap_or_default()
}
