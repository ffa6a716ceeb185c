use chrono::{DateTime, Days, LocalResult, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

pub const DEFAULT_TIME_ZONE: &str = "Asia/Seoul";

pub fn parse_time_zone(value: &str) -> Option<Tz> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    trimmed.parse::<Tz>().ok()
}

/// Start of `local_date` and of the following day, both in `tz`.
pub fn local_day_bounds(local_date: NaiveDate, tz: &Tz) -> Option<(DateTime<Tz>, DateTime<Tz>)> {
    let next_day = local_date.checked_add_days(Days::new(1))?;
    Some((local_midnight(local_date, tz)?, local_midnight(next_day, tz)?))
}

/// Start of January 1st of `year` and of the following year, both in `tz`.
pub fn local_year_bounds(year: i32, tz: &Tz) -> Option<(DateTime<Tz>, DateTime<Tz>)> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let end = NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)?;
    Some((local_midnight(start, tz)?, local_midnight(end, tz)?))
}

fn local_midnight(local_date: NaiveDate, tz: &Tz) -> Option<DateTime<Tz>> {
    resolve_local_datetime(tz, local_date.and_hms_opt(0, 0, 0)?)
}

fn resolve_local_datetime(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(value) => Some(value),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        // Midnight skipped by a DST jump: the day starts one hour later.
        LocalResult::None => tz
            .from_local_datetime(&(local + chrono::Duration::hours(1)))
            .earliest(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Timelike};

    use super::{
        DEFAULT_TIME_ZONE, local_day_bounds, local_year_bounds, parse_time_zone,
    };

    #[test]
    fn parse_time_zone_accepts_trimmed_iana_name() {
        let tz = parse_time_zone(" Asia/Seoul ").expect("known time zone");
        assert_eq!(tz.name(), DEFAULT_TIME_ZONE);
    }

    #[test]
    fn parse_time_zone_rejects_invalid_values() {
        assert!(parse_time_zone("").is_none());
        assert!(parse_time_zone("Mars/Olympus").is_none());
        assert!(parse_time_zone("not-a-time-zone").is_none());
    }

    #[test]
    fn day_bounds_span_one_local_day() {
        let tz = parse_time_zone("America/Los_Angeles").expect("known time zone");
        let local_date = NaiveDate::from_ymd_opt(2026, 2, 17).expect("valid local date");
        let (start, end) = local_day_bounds(local_date, &tz).expect("day bounds");

        assert_eq!(start.hour(), 0);
        assert_eq!((end - start).num_hours(), 24);
    }

    #[test]
    fn day_bounds_shrink_on_spring_forward() {
        let tz = parse_time_zone("America/New_York").expect("known time zone");
        let local_date = NaiveDate::from_ymd_opt(2026, 3, 8).expect("valid local date");
        let (start, end) = local_day_bounds(local_date, &tz).expect("day bounds");

        assert_eq!((end - start).num_hours(), 23);
    }

    #[test]
    fn year_bounds_cover_leap_years() {
        let tz = parse_time_zone(DEFAULT_TIME_ZONE).expect("known time zone");
        let (start, end) = local_year_bounds(2024, &tz).expect("year bounds");

        assert_eq!((end - start).num_days(), 366);
    }
}
