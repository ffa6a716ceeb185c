use std::fmt::Write as _;

use chrono::{DateTime, Datelike, NaiveDate, Offset, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::timezone::{DEFAULT_TIME_ZONE, local_day_bounds, local_year_bounds, parse_time_zone};

const WEEKDAYS_KR: [&str; 7] = [
    "월요일", "화요일", "수요일", "목요일", "금요일", "토요일", "일요일",
];
const WEEKDAYS_EN: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];
const MONTHS_EN: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];
const DAYS_IN_YEAR_FOR_PERCENT: i64 = 365;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatetimeError {
    #[error("unknown time zone '{0}', falling back to UTC")]
    UnknownTimeZone(String),
    #[error("invalid date '{0}': expected YYYY-MM-DD or YYYY/MM/DD")]
    InvalidDate(String),
}

/// Where "now" comes from. Tests pin it with `Fixed`.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Self::System => Utc::now(),
            Self::Fixed(instant) => *instant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSnapshot {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub ampm: String,
    pub hour_12: u32,
    pub timezone: String,
    pub timezone_name: String,
    pub timezone_offset_seconds: i32,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateSnapshot {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    /// 0 is Monday.
    pub weekday: u32,
    pub weekday_kr: String,
    pub weekday_en: String,
    pub month_name_kr: String,
    pub month_name_en: String,
    pub day_of_year: u32,
    pub week_of_year: u32,
    pub is_leap_year: bool,
    pub days_in_month: u32,
    pub timezone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatetimeSnapshot {
    pub date: DateSnapshot,
    pub time: TimeSnapshot,
    pub iso_format: String,
    pub elapsed_seconds_today: i64,
    pub remaining_seconds_today: i64,
    pub elapsed_days_this_year: i64,
    pub remaining_days_this_year: i64,
    pub datetime_kr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateDifference {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub days: i64,
    pub weeks: i64,
    pub months: i64,
    pub years: i64,
}

/// Read-only access to wall-clock information for one configured time zone.
pub trait TimeSource: Send + Sync {
    fn current_time(&self) -> TimeSnapshot;

    fn current_date(&self) -> DateSnapshot;

    fn datetime_info(&self) -> DatetimeSnapshot;

    fn time_difference(&self, from: &str, to: Option<&str>)
    -> Result<DateDifference, DatetimeError>;
}

#[derive(Debug, Clone)]
pub struct DatetimeProvider {
    time_zone: String,
    clock: Clock,
}

impl Default for DatetimeProvider {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_ZONE)
    }
}

impl DatetimeProvider {
    pub fn new(time_zone: impl Into<String>) -> Self {
        Self::with_clock(time_zone, Clock::System)
    }

    pub fn with_clock(time_zone: impl Into<String>, clock: Clock) -> Self {
        Self {
            time_zone: time_zone.into(),
            clock,
        }
    }

    fn local_now(&self) -> (DateTime<Tz>, Option<String>) {
        let now = self.clock.now();
        match parse_time_zone(&self.time_zone) {
            Some(tz) => (now.with_timezone(&tz), None),
            None => {
                let err = DatetimeError::UnknownTimeZone(self.time_zone.clone());
                warn!(time_zone = %self.time_zone, "unknown time zone, using UTC");
                (now.with_timezone(&chrono_tz::UTC), Some(err.to_string()))
            }
        }
    }
}

impl TimeSource for DatetimeProvider {
    fn current_time(&self) -> TimeSnapshot {
        let (local, error) = self.local_now();
        time_snapshot(&local, error)
    }

    fn current_date(&self) -> DateSnapshot {
        let (local, error) = self.local_now();
        date_snapshot(&local, error)
    }

    fn datetime_info(&self) -> DatetimeSnapshot {
        let (local, error) = self.local_now();
        let tz = local.timezone();

        let (elapsed_seconds_today, remaining_seconds_today) =
            match local_day_bounds(local.date_naive(), &tz) {
                Some((start, end)) => ((local - start).num_seconds(), (end - local).num_seconds()),
                None => {
                    let elapsed = i64::from(local.num_seconds_from_midnight());
                    (elapsed, 86_400 - elapsed)
                }
            };
        let (elapsed_days_this_year, remaining_days_this_year) =
            match local_year_bounds(local.year(), &tz) {
                Some((start, end)) => ((local - start).num_days(), (end - local).num_days()),
                None => {
                    let elapsed = i64::from(local.ordinal0());
                    (elapsed, i64::from(days_in_year(local.year())) - elapsed)
                }
            };

        let time = time_snapshot(&local, error.clone());
        let datetime_kr = format!(
            "{} {} {}시 {}분",
            local.format("%Y년 %m월 %d일"),
            time.ampm,
            time.hour_12,
            time.minute
        );

        DatetimeSnapshot {
            date: date_snapshot(&local, error.clone()),
            time,
            iso_format: local.to_rfc3339(),
            elapsed_seconds_today,
            remaining_seconds_today,
            elapsed_days_this_year,
            remaining_days_this_year,
            datetime_kr,
            error,
        }
    }

    fn time_difference(
        &self,
        from: &str,
        to: Option<&str>,
    ) -> Result<DateDifference, DatetimeError> {
        let from_date = parse_calendar_date(from)?;
        let to_date = match to.map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) => parse_calendar_date(value)?,
            None => self.local_now().0.date_naive(),
        };

        let days = (to_date - from_date).num_days();
        Ok(DateDifference {
            from_date,
            to_date,
            days,
            weeks: days / 7,
            months: days / 30,
            years: days / 365,
        })
    }
}

fn time_snapshot(local: &DateTime<Tz>, error: Option<String>) -> TimeSnapshot {
    let (is_pm, hour_12) = local.hour12();
    TimeSnapshot {
        hour: local.hour(),
        minute: local.minute(),
        second: local.second(),
        ampm: if is_pm { "오후" } else { "오전" }.to_string(),
        hour_12,
        timezone: local.timezone().name().to_string(),
        timezone_name: local.format("%Z").to_string(),
        timezone_offset_seconds: local.offset().fix().local_minus_utc(),
        timestamp: local.timestamp(),
        error,
    }
}

fn date_snapshot(local: &DateTime<Tz>, error: Option<String>) -> DateSnapshot {
    let weekday = local.weekday().num_days_from_monday();
    let weekday_index = weekday as usize;
    let month_index = local.month0() as usize;
    DateSnapshot {
        year: local.year(),
        month: local.month(),
        day: local.day(),
        weekday,
        weekday_kr: WEEKDAYS_KR[weekday_index].to_string(),
        weekday_en: WEEKDAYS_EN[weekday_index].to_string(),
        month_name_kr: format!("{}월", local.month()),
        month_name_en: MONTHS_EN[month_index].to_string(),
        day_of_year: local.ordinal(),
        week_of_year: local.iso_week().week(),
        is_leap_year: is_leap_year(local.year()),
        days_in_month: days_in_month(local.year(), local.month()),
        timezone: local.timezone().name().to_string(),
        error,
    }
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

fn days_in_year(year: i32) -> u32 {
    if is_leap_year(year) { 366 } else { 365 }
}

fn parse_calendar_date(value: &str) -> Result<NaiveDate, DatetimeError> {
    let trimmed = value.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y/%m/%d"))
        .map_err(|_| DatetimeError::InvalidDate(trimmed.to_string()))
}

/// Renders a UTC offset as `UTC+9`, `UTC+5:30` or `UTC-3`.
pub fn format_utc_offset(offset_seconds: i32) -> String {
    let sign = if offset_seconds < 0 { '-' } else { '+' };
    let total_minutes = offset_seconds.unsigned_abs() / 60;
    let (hours, minutes) = (total_minutes / 60, total_minutes % 60);
    if minutes == 0 {
        format!("UTC{sign}{hours}")
    } else {
        format!("UTC{sign}{hours}:{minutes:02}")
    }
}

pub fn format_time(time: &TimeSnapshot) -> String {
    let mut formatted = String::from("## 현재 시간 정보\n\n");
    let _ = writeln!(
        formatted,
        "* **현재 시각:** {} {}:{:02}:{:02}",
        time.ampm, time.hour_12, time.minute, time.second
    );
    let _ = writeln!(
        formatted,
        "* **24시간제:** {:02}:{:02}:{:02}",
        time.hour, time.minute, time.second
    );
    let _ = writeln!(
        formatted,
        "* **시간대:** {} ({})",
        time.timezone,
        format_utc_offset(time.timezone_offset_seconds)
    );
    push_error_line(&mut formatted, time.error.as_deref());
    formatted
}

pub fn format_date(date: &DateSnapshot) -> String {
    let mut formatted = String::from("## 현재 날짜 정보\n\n");
    let _ = writeln!(
        formatted,
        "* **오늘 날짜:** {}년 {}월 {}일 {}",
        date.year, date.month, date.day, date.weekday_kr
    );
    let _ = writeln!(
        formatted,
        "* **영문 표기:** {} {}, {} ({})",
        date.month_name_en, date.day, date.year, date.weekday_en
    );
    let _ = writeln!(
        formatted,
        "* **올해 정보:** {}년은 {}입니다.",
        date.year,
        leap_label(date.is_leap_year)
    );
    let _ = writeln!(formatted, "* **이번 달 일수:** {}일", date.days_in_month);
    let _ = writeln!(
        formatted,
        "* **올해 {}번째 날 / 제{}주차**",
        date.day_of_year, date.week_of_year
    );
    push_error_line(&mut formatted, date.error.as_deref());
    formatted
}

pub fn format_datetime_info(info: &DatetimeSnapshot) -> String {
    let (date, time) = (&info.date, &info.time);
    let mut formatted = String::from("## 현재 날짜/시간 정보\n\n");
    let _ = writeln!(
        formatted,
        "* **현재 시각:** {}년 {}월 {}일 {} {} {}시 {}분 {}초",
        date.year,
        date.month,
        date.day,
        date.weekday_kr,
        time.ampm,
        time.hour_12,
        time.minute,
        time.second
    );
    let _ = writeln!(
        formatted,
        "* **시간대:** {} ({})\n",
        time.timezone,
        format_utc_offset(time.timezone_offset_seconds)
    );
    let _ = writeln!(
        formatted,
        "**오늘 경과 시간:** {}",
        format_hms(info.elapsed_seconds_today)
    );
    let _ = writeln!(
        formatted,
        "**오늘 남은 시간:** {}\n",
        format_hms(info.remaining_seconds_today)
    );
    let _ = writeln!(
        formatted,
        "**올해 정보:** {}년은 {}입니다.",
        date.year,
        leap_label(date.is_leap_year)
    );
    let _ = writeln!(
        formatted,
        "**올해 경과일:** {}일 (전체의 약 {}%)",
        info.elapsed_days_this_year,
        info.elapsed_days_this_year * 100 / DAYS_IN_YEAR_FOR_PERCENT
    );
    let _ = writeln!(
        formatted,
        "**올해 남은일:** {}일\n",
        info.remaining_days_this_year
    );
    let _ = writeln!(formatted, "**ISO 형식:** {}", info.iso_format);
    push_error_line(&mut formatted, info.error.as_deref());
    formatted
}

pub fn format_time_difference(difference: &DateDifference) -> String {
    format!(
        "{}부터 {}까지 {}일 (약 {}주, {}개월, {}년)",
        difference.from_date,
        difference.to_date,
        difference.days,
        difference.weeks,
        difference.months,
        difference.years
    )
}

fn format_hms(total_seconds: i64) -> String {
    format!(
        "{}시간 {}분 {}초",
        total_seconds / 3600,
        (total_seconds % 3600) / 60,
        total_seconds % 60
    )
}

fn leap_label(is_leap_year: bool) -> &'static str {
    if is_leap_year { "윤년" } else { "평년" }
}

fn push_error_line(formatted: &mut String, error: Option<&str>) {
    if let Some(error) = error {
        let _ = writeln!(formatted, "* **오류:** {error}");
    }
}
