use chrono::{Datelike, Duration, NaiveDate, Weekday};

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The `count` weekdays strictly after `last`. Exchange holidays are not
/// skipped.
pub fn business_days_after(last: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(count);
    let mut current = last;
    while dates.len() < count {
        current += Duration::days(1);
        if is_business_day(current) {
            dates.push(current);
        }
    }
    dates
}

/// `count` consecutive weekdays starting at `first` (or the next weekday).
pub fn business_days_from(first: NaiveDate, count: usize) -> Vec<NaiveDate> {
    business_days_after(first - Duration::days(1), count)
}
