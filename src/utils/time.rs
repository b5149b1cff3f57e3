use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// Shifts `date` by `months` calendar months, keeping the day of month when the
/// target month is long enough and clamping to its last day otherwise
/// (Jan 31 + 1 month = Feb 28/29).
pub fn add_months_keeping_day(date: NaiveDate, months: u32) -> NaiveDate {
    let target_idx = date.month0() as i64 + months as i64;
    let year = date.year() + (target_idx / 12) as i32;
    let month = (target_idx % 12) as u32 + 1;
    let day = date.day().min(last_day_of_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(date)
}

/// `[first instant of the month, first instant of the next month)` for `now`.
pub fn month_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now);
    let last = last_day_of_month(now.year(), now.month()) as i64;
    (start, start + Duration::days(last))
}

pub fn format_date_time(value: DateTime<Utc>) -> String {
    value.format("%d.%m.%Y %H:%M").to_string()
}
