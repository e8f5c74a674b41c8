use chrono::{DateTime, Datelike, Local, Utc};

pub fn app_version(_: &str) -> askama::Result<String> {
    Ok(env!("CARGO_PKG_VERSION").to_string())
}

/// Human-readable relative time ("just now", "N minutes/hours/days/weeks/
/// months/years ago") for a per-entry timestamp, per spec §4.6.
pub fn relative_time(value: &DateTime<Utc>) -> askama::Result<String> {
    Ok(relative_time_from(*value, Utc::now()))
}

fn relative_time_from(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds().max(0);
    if seconds < 60 {
        return "just now".to_string();
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return plural(minutes, "minute");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return plural(hours, "hour");
    }
    let days = hours / 24;
    if days < 7 {
        return plural(days, "day");
    }
    let weeks = days / 7;
    if days < 30 {
        return plural(weeks, "week");
    }
    let months = days / 30;
    if days < 365 {
        return plural(months, "month");
    }
    let years = days / 365;
    plural(years, "year")
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{n} {unit}s ago")
    }
}

/// "Today", "Yesterday", the weekday name within the current week, or the
/// full date otherwise — the calendar-date group header from spec §4.6.
/// Bucketed by the *local* calendar date, per spec §4.6, not UTC: a
/// timestamp just after local midnight must not fall into "yesterday"'s
/// group just because it's still the previous day in UTC.
pub fn date_group_label(value: &DateTime<Utc>) -> askama::Result<String> {
    Ok(date_group_label_from(
        value.with_timezone(&Local).date_naive(),
        Local::now().date_naive(),
    ))
}

fn date_group_label_from(
    date: chrono::NaiveDate,
    today: chrono::NaiveDate,
) -> String {
    if date == today {
        return "Today".to_string();
    }
    if date == today - chrono::Duration::days(1) {
        return "Yesterday".to_string();
    }
    let days_ago = (today - date).num_days();
    if (0..7).contains(&days_ago) {
        return date.weekday().to_string();
    }
    date.format("%B %-d, %Y").to_string()
}
