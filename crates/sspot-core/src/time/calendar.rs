//! Calendar date conversions using O(1) algorithms
//!
//! Howard Hinnant's `civil_from_days` / `days_from_civil`.
//! Reference: http://howardhinnant.github.io/date_algorithms.html

/// Days from 0000-03-01 to 1970-01-01
const EPOCH_SHIFT: i64 = 719_468;

const DAYS_PER_ERA: i64 = 146_097;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Days since the Unix epoch to (year, month, day)
pub const fn civil_from_days(days: i64) -> (i32, u8, u8) {
    let z = days + EPOCH_SHIFT;
    let era = if z >= 0 { z } else { z - (DAYS_PER_ERA - 1) } / DAYS_PER_ERA;
    let doe = z - era * DAYS_PER_ERA; // [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365; // [0, 399]
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp = (5 * doy + 2) / 153; // March = 0
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year as i32, month, day)
}

/// (year, month, day) to days since the Unix epoch
pub const fn days_from_civil(year: i32, month: u8, day: u8) -> i64 {
    let (y, m) = if month <= 2 {
        (year as i64 - 1, month as i64 + 9)
    } else {
        (year as i64, month as i64 - 3)
    };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let doy = (153 * m + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * DAYS_PER_ERA + doe - EPOCH_SHIFT
}

/// Day of week for a day count, 0 = Sunday.
pub const fn weekday(days: i64) -> u8 {
    // 1970-01-01 was a Thursday
    (days + 4).rem_euclid(7) as u8
}

/// Day count of the last Sunday in a 31-day month
pub const fn last_sunday_of(year: i32, month: u8) -> i64 {
    let last = days_from_civil(year, month, 31);
    last - weekday(last) as i64
}
